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

//! Proxyscope Query
//!
//! Query dispatch for the transaction dashboard: data sources (HTTP and
//! in-memory), last-request-wins dispatch, and the listing and statistics
//! pipelines built on top of them.

pub mod dispatcher;
pub mod error;
pub mod http;
pub mod listing;
pub mod memory;
pub mod source;
pub mod statistics;

pub use dispatcher::{DashboardQuery, Gate, QueryDispatcher, QueryState, Ticket};
pub use error::FetchError;
pub use http::HttpSource;
pub use listing::{ColumnDescriptor, ListingDescriptor, ListingPipeline, TransactionsQuery};
pub use memory::MemorySource;
pub use source::DashboardSource;
pub use statistics::{StatisticsPipeline, StatisticsQuery};
