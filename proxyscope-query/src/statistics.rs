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

//! Statistics charts
//!
//! A [`StatisticsPipeline`] ties the granularity resolver to the statistics
//! endpoint and reshapes whatever comes back into chart series.

use crate::dispatcher::{DashboardQuery, Gate, QueryDispatcher, QueryState};
use crate::error::FetchError;
use crate::source::DashboardSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use proxyscope_core::{
    FilterState, Granularity, GranularityResolver, ProxyscopeError, ReshapedSeries, Resolution,
    SeriesReshaper, StatisticsBucket, StatisticsKind, StatisticsParams,
};
use std::sync::Arc;
use tracing::debug;

/// Statistics endpoint of one kind as a dispatchable query.
pub struct StatisticsQuery {
    source: Arc<dyn DashboardSource>,
    kind: StatisticsKind,
    requires_project: bool,
}

impl StatisticsQuery {
    pub fn new(source: Arc<dyn DashboardSource>, kind: StatisticsKind) -> Self {
        Self {
            source,
            kind,
            requires_project: false,
        }
    }

    pub fn requiring_project(mut self) -> Self {
        self.requires_project = true;
        self
    }

    pub fn kind(&self) -> StatisticsKind {
        self.kind
    }
}

#[async_trait]
impl DashboardQuery for StatisticsQuery {
    type Params = StatisticsParams;
    type Output = Vec<StatisticsBucket>;

    fn gate(&self, params: &StatisticsParams) -> Gate {
        if self.requires_project && params.project_id.is_none() {
            Gate::Skip
        } else {
            Gate::Run
        }
    }

    async fn execute(&self, params: StatisticsParams) -> Result<Vec<StatisticsBucket>, FetchError> {
        self.source.fetch_statistics(self.kind, &params).await
    }
}

pub struct StatisticsPipeline {
    resolver: GranularityResolver,
    dispatcher: QueryDispatcher<StatisticsQuery>,
    reshaper: SeriesReshaper,
}

impl StatisticsPipeline {
    pub fn new(query: StatisticsQuery, initial: Granularity) -> Self {
        let kind = query.kind();
        Self {
            resolver: GranularityResolver::new(initial),
            dispatcher: QueryDispatcher::new(query),
            reshaper: SeriesReshaper::new(kind.dimension(), kind.metrics())
                .with_averaged(kind.averaged_metrics()),
        }
    }

    pub fn kind(&self) -> StatisticsKind {
        self.dispatcher.query().kind()
    }

    pub fn resolution(&self) -> Resolution {
        self.resolver.resolution()
    }

    pub fn dispatcher(&self) -> &QueryDispatcher<StatisticsQuery> {
        &self.dispatcher
    }

    pub fn state(&self) -> QueryState<Vec<StatisticsBucket>> {
        self.dispatcher.state()
    }

    /// Reshaped chart data for the last loaded buckets.
    pub fn series(&self) -> QueryState<ReshapedSeries> {
        self.state().map(|buckets| self.reshaper.reshape(&buckets))
    }

    pub async fn set_range(
        &mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> QueryState<Vec<StatisticsBucket>> {
        let resolution = self.resolver.set_range(start, end);
        if !resolution.can_aggregate() {
            debug!(kind = %self.kind(), "range cannot be aggregated, statistics disabled");
        }
        self.dispatcher.update(resolution.params).await
    }

    /// Pick a period; only periods enabled for the current range are accepted.
    pub async fn select_period(
        &mut self,
        period: Granularity,
    ) -> Result<QueryState<Vec<StatisticsBucket>>, ProxyscopeError> {
        let resolution = self.resolver.select(period)?;
        Ok(self.dispatcher.update(resolution.params).await)
    }

    /// Change the range and pick `period` in one step. The period is checked
    /// against the new range before anything is dispatched, so at most one
    /// request goes out and a rejected period leaves the pipeline untouched.
    pub async fn set_range_with_period(
        &mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        period: Granularity,
    ) -> Result<QueryState<Vec<StatisticsBucket>>, ProxyscopeError> {
        let mut resolver = self.resolver.clone();
        resolver.set_range(start, end);
        let resolution = resolver.select(period)?;
        self.resolver = resolver;
        Ok(self.dispatcher.update(resolution.params).await)
    }

    pub async fn set_project(
        &mut self,
        project_id: Option<String>,
    ) -> QueryState<Vec<StatisticsBucket>> {
        let resolution = self.resolver.set_project(project_id);
        self.dispatcher.update(resolution.params).await
    }

    /// Follow the project and date range of a listing's filters.
    pub async fn follow_filters(
        &mut self,
        filters: &FilterState,
    ) -> QueryState<Vec<StatisticsBucket>> {
        self.resolver.set_project(filters.project_id().map(str::to_string));
        self.set_range(filters.date_from(), filters.date_to()).await
    }

    pub async fn refresh(&self) -> QueryState<Vec<StatisticsBucket>> {
        self.dispatcher.reload().await
    }

    /// Current request bundle, if any.
    pub fn params(&self) -> Option<StatisticsParams> {
        self.resolver.params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySource;
    use chrono::TimeZone;
    use proxyscope_core::{FilterKey, FilterUpdate, TransactionPage, TransactionRecord};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves the same buckets for every statistics request.
    struct FixedBuckets {
        buckets: Vec<StatisticsBucket>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DashboardSource for FixedBuckets {
        async fn fetch_transactions(
            &self,
            _filters: &FilterState,
        ) -> Result<TransactionPage, FetchError> {
            Err(FetchError::bad_request("not a listing source"))
        }

        async fn fetch_statistics(
            &self,
            _kind: StatisticsKind,
            _params: &StatisticsParams,
        ) -> Result<Vec<StatisticsBucket>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.buckets.clone())
        }
    }

    fn fixed(records: serde_json::Value) -> Arc<FixedBuckets> {
        Arc::new(FixedBuckets {
            buckets: vec![StatisticsBucket {
                date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                records: serde_json::from_value(records).unwrap(),
            }],
            calls: AtomicUsize::new(0),
        })
    }

    fn record(id: &str, day: u32, model: &str) -> TransactionRecord {
        TransactionRecord {
            id: id.to_string(),
            project_id: "p1".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
            provider: None,
            model: Some(model.to_string()),
            status_code: Some(200),
            latency_ms: Some(250.0),
            prompt_tokens: Some(3),
            completion_tokens: Some(4),
            cost: Some(0.5),
            tags: vec![],
            request: None,
            response: None,
        }
    }

    fn pipeline(kind: StatisticsKind) -> StatisticsPipeline {
        let source: Arc<dyn DashboardSource> = Arc::new(MemorySource::new(vec![
            record("a", 1, "gpt"),
            record("b", 2, "claude"),
            record("c", 2, "gpt"),
        ]));
        StatisticsPipeline::new(StatisticsQuery::new(source, kind), Granularity::Daily)
    }

    fn at(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_missing_range_disables() {
        let mut p = pipeline(StatisticsKind::Count);
        let state = p.set_range(Some(at(1)), None).await;
        assert!(state.is_disabled());
        assert!(p.resolution().enabled.is_empty());
        assert_eq!(p.resolution().selected, Granularity::Daily);
    }

    #[tokio::test]
    async fn test_daily_counts_reshape() {
        let mut p = pipeline(StatisticsKind::Count);
        p.set_range(Some(at(1)), Some(at(3))).await;
        assert_eq!(p.resolution().enabled, vec![Granularity::Daily, Granularity::Hourly]);

        let series = p.series();
        let series = series.data().unwrap();
        assert_eq!(series.legend.keys(), &["gpt", "claude"]);
        assert_eq!(series.records.len(), 2);
        assert_eq!(series.records[0].value("count", "gpt"), Some(1.0));
        assert_eq!(series.records[0].value("count", "claude"), None);
        assert_eq!(series.records[1].value("count", "claude"), Some(1.0));
    }

    #[tokio::test]
    async fn test_select_disabled_period_is_rejected() {
        let mut p = pipeline(StatisticsKind::Cost);
        p.set_range(Some(at(1)), Some(at(3))).await;
        let err = p.select_period(Granularity::Monthly).await.unwrap_err();
        assert!(matches!(err, ProxyscopeError::GranularityDisabled(Granularity::Monthly)));

        let state = p.select_period(Granularity::Hourly).await.unwrap();
        assert_eq!(state.data().map(Vec::len), Some(2));
        assert_eq!(p.params().unwrap().period, Granularity::Hourly);
    }

    #[tokio::test]
    async fn test_project_required() {
        let source: Arc<dyn DashboardSource> = Arc::new(MemorySource::default());
        let mut p = StatisticsPipeline::new(
            StatisticsQuery::new(source, StatisticsKind::Speed).requiring_project(),
            Granularity::Daily,
        );
        assert!(p.set_range(Some(at(1)), Some(at(3))).await.is_disabled());

        let mut filters = FilterState::new();
        filters
            .apply(
                &FilterUpdate::new()
                    .set(FilterKey::ProjectId, "p1")
                    .set(FilterKey::DateFrom, "2024-01-01")
                    .set(FilterKey::DateTo, "2024-01-03"),
            )
            .unwrap();
        let state = p.follow_filters(&filters).await;
        assert_eq!(state.data().map(Vec::len), Some(0));
        assert_eq!(p.params().unwrap().project_id.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn test_speed_duplicates_are_averaged() {
        let source = fixed(json!([
            {"model": "y", "latency": 100.0},
            {"model": "y", "latency": 300.0}
        ]));
        let mut p = StatisticsPipeline::new(
            StatisticsQuery::new(source, StatisticsKind::Speed),
            Granularity::Daily,
        );
        p.set_range(Some(at(1)), Some(at(3))).await;
        let series = p.series();
        assert_eq!(series.data().unwrap().records[0].value("latency", "y"), Some(200.0));
    }

    #[tokio::test]
    async fn test_range_with_period_dispatches_once() {
        let source = fixed(json!([{"model": "gpt", "count": 2}]));
        let mut p = StatisticsPipeline::new(
            StatisticsQuery::new(source.clone(), StatisticsKind::Count),
            Granularity::Daily,
        );

        let state = p
            .set_range_with_period(Some(at(1)), Some(at(3)), Granularity::Hourly)
            .await
            .unwrap();
        assert!(state.data().is_some());
        assert_eq!(p.params().unwrap().period, Granularity::Hourly);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        let err = p
            .set_range_with_period(Some(at(1)), Some(at(3)), Granularity::Yearly)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyscopeError::GranularityDisabled(Granularity::Yearly)));
        assert_eq!(p.resolution().selected, Granularity::Hourly);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
