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

//! Core error types

use crate::filter::FilterKey;
use crate::granularity::Granularity;
use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, ProxyscopeError>;

/// Errors raised while validating filter input or loading configuration.
///
/// Range and page arithmetic never produce these: the granularity resolver
/// and the pagination controller return "no valid option" values instead.
#[derive(Debug, Error)]
pub enum ProxyscopeError {
    // Filter validation
    #[error("{key} must be a positive integer (got {value:?})")]
    InvalidPositiveInteger { key: FilterKey, value: String },

    #[error("{key} is not an ISO-8601 timestamp: {value:?}")]
    InvalidTimestamp { key: FilterKey, value: String },

    #[error("date_from ({from}) is after date_to ({to})")]
    InvalidDateRange { from: String, to: String },

    #[error("sort_type must be \"asc\" or empty (got {0:?})")]
    InvalidSortType(String),

    // Granularity
    #[error("Unknown granularity: {0}")]
    UnknownGranularity(String),

    #[error("Granularity {0} is not enabled for the current date range")]
    GranularityDisabled(Granularity),

    // Configuration
    #[error("Failed to read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
