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

//! HTTP data source for the dashboard API.

use crate::error::FetchError;
use crate::source::DashboardSource;
use async_trait::async_trait;
use proxyscope_core::{
    ApiConfig, FilterState, StatisticsBucket, StatisticsKind, StatisticsParams, TransactionPage,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Error body the API returns alongside 4xx/5xx statuses.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Map a non-success response to a [`FetchError`], keeping the server's
/// code and message when the body carries them.
pub fn error_from_response(status: u16, body: &str) -> FetchError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.code.unwrap_or_else(|| format!("http_{}", status));
    let message = parsed
        .message
        .or(parsed.error)
        .unwrap_or_else(|| body.trim().to_string());
    FetchError::server(status, code, message)
}

/// Query-string pairs for a transactions request.
pub fn transaction_query(filters: &FilterState) -> Vec<(&'static str, String)> {
    filters
        .iter()
        .map(|(key, value)| (key.as_str(), value.to_string()))
        .collect()
}

/// Talks to the dashboard API over HTTP. No retries.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(config: &ApiConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<T, FetchError> {
        let url = self.url(path);
        debug!(url = %url, query = ?query, "GET");
        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let error = error_from_response(status.as_u16(), &body);
            warn!(url = %url, status = status.as_u16(), code = %error.code, "request failed");
            return Err(error);
        }
        serde_json::from_str(&body).map_err(|e| FetchError::decode(format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl DashboardSource for HttpSource {
    async fn fetch_transactions(
        &self,
        filters: &FilterState,
    ) -> Result<TransactionPage, FetchError> {
        self.get_json("transactions", &transaction_query(filters))
            .await
    }

    async fn fetch_statistics(
        &self,
        kind: StatisticsKind,
        params: &StatisticsParams,
    ) -> Result<Vec<StatisticsBucket>, FetchError> {
        let path = format!("statistics/{}", kind.as_str());
        self.get_json(&path, &params.to_query_pairs()).await
    }
}
