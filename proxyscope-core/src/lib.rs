// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Proxyscope Core
//!
//! Filter state, address synchronization, pagination, granularity
//! resolution and series reshaping for the transaction dashboard. Nothing in
//! this crate performs network I/O.

pub mod address;
pub mod config;
pub mod error;
pub mod filter;
pub mod granularity;
pub mod pagination;
pub mod series;
pub mod timestamp;
pub mod transaction;

pub use address::{patch_address, read_filter_state, write_filter_state, AddressParams, FilterStore};
pub use config::{ApiConfig, DashboardConfig, ListingConfig, StatisticsConfig};
pub use error::{ProxyscopeError, Result};
pub use filter::{
    normalize_tags, FilterDefaults, FilterKey, FilterState, FilterUpdate, SortOrder,
    DEFAULT_PAGE_SIZE,
};
pub use granularity::{
    enabled_granularities, select_granularity, Granularity, GranularityResolver, RangeSpan,
    Resolution, StatisticsParams,
};
pub use pagination::{total_pages, PageInfo};
pub use series::{
    series_key, Legend, ReshapedSeries, SeriesRecord, SeriesReshaper, StatisticsBucket,
    StatisticsRecord, UNKNOWN_DIMENSION,
};
pub use timestamp::{format_timestamp, parse_timestamp, truncate_to_seconds};
pub use transaction::{StatisticsKind, TransactionField, TransactionPage, TransactionRecord};
