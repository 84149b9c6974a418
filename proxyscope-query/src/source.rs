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

//! Data sources the dashboard reads from.

use crate::error::FetchError;
use async_trait::async_trait;
use proxyscope_core::{
    FilterState, StatisticsBucket, StatisticsKind, StatisticsParams, TransactionPage,
};
use std::sync::Arc;

/// Query/transport collaborator behind every listing and chart.
///
/// Injected into the pipelines so tests can substitute deterministic data.
#[async_trait]
pub trait DashboardSource: Send + Sync {
    /// One page of transactions matching `filters`.
    async fn fetch_transactions(&self, filters: &FilterState)
        -> Result<TransactionPage, FetchError>;

    /// Date-bucketed statistics of one kind.
    async fn fetch_statistics(
        &self,
        kind: StatisticsKind,
        params: &StatisticsParams,
    ) -> Result<Vec<StatisticsBucket>, FetchError>;
}

#[async_trait]
impl<S: DashboardSource + ?Sized> DashboardSource for Arc<S> {
    async fn fetch_transactions(
        &self,
        filters: &FilterState,
    ) -> Result<TransactionPage, FetchError> {
        (**self).fetch_transactions(filters).await
    }

    async fn fetch_statistics(
        &self,
        kind: StatisticsKind,
        params: &StatisticsParams,
    ) -> Result<Vec<StatisticsBucket>, FetchError> {
        (**self).fetch_statistics(kind, params).await
    }
}
