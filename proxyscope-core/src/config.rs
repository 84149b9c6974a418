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

//! Dashboard configuration
//!
//! Loaded from a TOML file, then overridden from environment variables.

use crate::error::{ProxyscopeError, Result};
use crate::filter::DEFAULT_PAGE_SIZE;
use crate::granularity::Granularity;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DashboardConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub statistics: StatisticsConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Base URL of the dashboard API (e.g., "http://127.0.0.1:8080/api")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Transport timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ListingConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,

    /// Upper bound applied to user-chosen page sizes
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,

    /// Rows in the per-project latest transactions panel
    #[serde(default = "default_latest_page_size")]
    pub latest_page_size: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StatisticsConfig {
    /// Granularity selected before any range is known
    #[serde(default = "default_period")]
    pub default_period: Granularity,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080/api".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> u64 {
    100
}

fn default_latest_page_size() -> u64 {
    5
}

fn default_period() -> Granularity {
    Granularity::FALLBACK
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            latest_page_size: default_latest_page_size(),
        }
    }
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            default_period: default_period(),
        }
    }
}

impl ListingConfig {
    /// Clamp a requested page size into `[1, max_page_size]`.
    pub fn clamp_page_size(&self, page_size: u64) -> u64 {
        page_size.clamp(1, self.max_page_size.max(1))
    }
}

impl DashboardConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// File (when given) first, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides
    ///
    /// Supported environment variables:
    /// - PROXYSCOPE_API_URL: API base URL
    /// - PROXYSCOPE_REQUEST_TIMEOUT: transport timeout in seconds
    /// - PROXYSCOPE_PAGE_SIZE: default listing page size
    /// - PROXYSCOPE_MAX_PAGE_SIZE: maximum listing page size
    /// - PROXYSCOPE_DEFAULT_PERIOD: initial statistics granularity
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("PROXYSCOPE_API_URL") {
            self.api.base_url = url;
        }

        if let Ok(timeout) = std::env::var("PROXYSCOPE_REQUEST_TIMEOUT") {
            if let Ok(val) = timeout.parse() {
                self.api.request_timeout_secs = val;
            }
        }

        if let Ok(size) = std::env::var("PROXYSCOPE_PAGE_SIZE") {
            if let Ok(val) = size.parse() {
                self.listing.default_page_size = val;
            }
        }

        if let Ok(size) = std::env::var("PROXYSCOPE_MAX_PAGE_SIZE") {
            if let Ok(val) = size.parse() {
                self.listing.max_page_size = val;
            }
        }

        if let Ok(period) = std::env::var("PROXYSCOPE_DEFAULT_PERIOD") {
            if let Ok(val) = period.parse() {
                self.statistics.default_period = val;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(ProxyscopeError::InvalidConfig("api.base_url is empty".into()));
        }
        if self.listing.default_page_size == 0 || self.listing.max_page_size == 0 {
            return Err(ProxyscopeError::InvalidConfig(
                "listing page sizes must be positive".into(),
            ));
        }
        if self.listing.default_page_size > self.listing.max_page_size {
            return Err(ProxyscopeError::InvalidConfig(format!(
                "listing.default_page_size ({}) exceeds max_page_size ({})",
                self.listing.default_page_size, self.listing.max_page_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = DashboardConfig::default();
        assert_eq!(config.listing.default_page_size, 10);
        assert_eq!(config.statistics.default_period, Granularity::Daily);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[api]\nbase_url = \"https://dash.example.com/api\"\n\n[statistics]\ndefault_period = \"5minute\""
        )
        .unwrap();
        let config = DashboardConfig::from_file(file.path()).unwrap();
        assert_eq!(config.api.base_url, "https://dash.example.com/api");
        assert_eq!(config.api.request_timeout_secs, 30);
        assert_eq!(config.statistics.default_period, Granularity::FiveMinute);
        assert_eq!(config.listing.max_page_size, 100);
    }

    #[test]
    fn test_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[listing]\ndefault_page_size = 500").unwrap();
        assert!(matches!(
            DashboardConfig::from_file(file.path()),
            Err(ProxyscopeError::InvalidConfig(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[listing\n").unwrap();
        assert!(matches!(
            DashboardConfig::from_file(file.path()),
            Err(ProxyscopeError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_clamp_page_size() {
        let listing = ListingConfig::default();
        assert_eq!(listing.clamp_page_size(0), 1);
        assert_eq!(listing.clamp_page_size(1_000), 100);
        assert_eq!(listing.clamp_page_size(25), 25);
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("PROXYSCOPE_MAX_PAGE_SIZE", "250");
        let config = DashboardConfig::from_env();
        assert_eq!(config.listing.max_page_size, 250);
        std::env::remove_var("PROXYSCOPE_MAX_PAGE_SIZE");
    }
}
