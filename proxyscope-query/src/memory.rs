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

//! In-memory data source
//!
//! Serves transactions and statistics from a local record set with the same
//! semantics the dashboard API applies server side. Used by tests and by the
//! CLI's fixture mode.

use crate::error::FetchError;
use crate::source::DashboardSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use proxyscope_core::{
    FilterState, PageInfo, SortOrder, StatisticsBucket, StatisticsKind, StatisticsParams,
    StatisticsRecord, TransactionField, TransactionPage, TransactionRecord, DEFAULT_PAGE_SIZE,
    UNKNOWN_DIMENSION,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Transactions held in memory. Records are append-only.
#[derive(Debug, Default)]
pub struct MemorySource {
    records: RwLock<Vec<TransactionRecord>>,
}

impl MemorySource {
    pub fn new(records: Vec<TransactionRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Load a JSON array of transaction records.
    pub fn from_json(json: &str) -> Result<Self, FetchError> {
        let records: Vec<TransactionRecord> =
            serde_json::from_str(json).map_err(|e| FetchError::decode(e.to_string()))?;
        Ok(Self::new(records))
    }

    pub fn from_file(path: &Path) -> Result<Self, FetchError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| FetchError::transport(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn insert(&self, record: TransactionRecord) {
        self.records.write().push(record);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn in_range(
        record: &TransactionRecord,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> bool {
        from.map_or(true, |f| record.created_at >= f) && to.map_or(true, |t| record.created_at <= t)
    }
}

#[derive(Default)]
struct ModelTotals {
    count: u64,
    cost: f64,
    tokens: u64,
    latency_sum: f64,
    latency_samples: u64,
}

impl ModelTotals {
    fn add(&mut self, record: &TransactionRecord) {
        self.count += 1;
        self.cost += record.cost.unwrap_or(0.0);
        self.tokens += record.total_tokens().unwrap_or(0);
        if let Some(latency) = record.latency_ms {
            self.latency_sum += latency;
            self.latency_samples += 1;
        }
    }

    fn to_record(&self, kind: StatisticsKind, model: &str) -> Option<StatisticsRecord> {
        let value = match kind {
            StatisticsKind::Count => json!({ "model": model, "count": self.count }),
            StatisticsKind::Cost => json!({ "model": model, "cost": self.cost, "tokens": self.tokens }),
            StatisticsKind::Speed => {
                if self.latency_samples == 0 {
                    return None;
                }
                let mean = self.latency_sum / self.latency_samples as f64;
                json!({ "model": model, "latency": mean })
            }
        };
        match value {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }
}

#[async_trait]
impl DashboardSource for MemorySource {
    async fn fetch_transactions(
        &self,
        filters: &FilterState,
    ) -> Result<TransactionPage, FetchError> {
        filters
            .validate()
            .map_err(|e| FetchError::bad_request(e.to_string()))?;
        let sort_field = match filters.sort_field() {
            Some(name) => name
                .parse::<TransactionField>()
                .map_err(FetchError::bad_request)?,
            None => TransactionField::CreatedAt,
        };

        let tags = filters.tag_list();
        let (from, to) = (filters.date_from(), filters.date_to());
        let mut matched: Vec<TransactionRecord> = self
            .records
            .read()
            .iter()
            .filter(|r| filters.project_id().map_or(true, |p| r.project_id == p))
            .filter(|r| r.has_all_tags(&tags))
            .filter(|r| Self::in_range(r, from, to))
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            let ordering = sort_field.compare(a, b).then_with(|| a.id.cmp(&b.id));
            match filters.sort_order() {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let page_size = filters.page_size().unwrap_or(DEFAULT_PAGE_SIZE);
        let info = PageInfo::compute(filters.page(), page_size, matched.len() as u64);
        let items: Vec<TransactionRecord> = matched
            .into_iter()
            .skip(info.offset() as usize)
            .take(info.page_size as usize)
            .collect();
        debug!(
            page = info.page_index,
            returned = items.len(),
            total = info.total_elements,
            "served transactions from memory"
        );

        Ok(TransactionPage {
            items,
            page_index: info.page_index,
            page_size: info.page_size,
            total_pages: info.total_pages,
            total_elements: info.total_elements,
        })
    }

    async fn fetch_statistics(
        &self,
        kind: StatisticsKind,
        params: &StatisticsParams,
    ) -> Result<Vec<StatisticsBucket>, FetchError> {
        if params.date_from > params.date_to {
            return Err(FetchError::bad_request("date_from is after date_to"));
        }

        let mut records: Vec<TransactionRecord> = self
            .records
            .read()
            .iter()
            .filter(|r| {
                params
                    .project_id
                    .as_deref()
                    .map_or(true, |p| r.project_id == p)
            })
            .filter(|r| Self::in_range(r, Some(params.date_from), Some(params.date_to)))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        // Models keep first-seen order inside each bucket.
        let mut buckets: BTreeMap<DateTime<Utc>, Vec<(String, ModelTotals)>> = BTreeMap::new();
        for record in &records {
            let model = record
                .model
                .clone()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| UNKNOWN_DIMENSION.to_string());
            let bucket = buckets
                .entry(params.period.bucket_start(record.created_at))
                .or_default();
            let position = match bucket.iter().position(|(m, _)| *m == model) {
                Some(position) => position,
                None => {
                    bucket.push((model, ModelTotals::default()));
                    bucket.len() - 1
                }
            };
            bucket[position].1.add(record);
        }

        Ok(buckets
            .into_iter()
            .map(|(date, models)| StatisticsBucket {
                date,
                records: models
                    .iter()
                    .filter_map(|(model, totals)| totals.to_record(kind, model))
                    .collect(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proxyscope_core::{FilterKey, FilterUpdate, Granularity};

    fn record(id: &str, project: &str, hour: u32, model: &str, tags: &[&str]) -> TransactionRecord {
        TransactionRecord {
            id: id.to_string(),
            project_id: project.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
            provider: None,
            model: Some(model.to_string()),
            status_code: Some(200),
            latency_ms: Some(100.0 * (hour as f64 + 1.0)),
            prompt_tokens: Some(10),
            completion_tokens: Some(5),
            cost: Some(0.01),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            request: None,
            response: None,
        }
    }

    fn source() -> MemorySource {
        MemorySource::new(vec![
            record("t1", "p1", 1, "gpt", &["chat"]),
            record("t2", "p1", 2, "claude", &["chat", "beta"]),
            record("t3", "p2", 3, "gpt", &[]),
            record("t4", "p1", 4, "gpt", &["beta"]),
        ])
    }

    fn filters(update: FilterUpdate) -> FilterState {
        let mut state = FilterState::new();
        state.apply(&update).unwrap();
        state
    }

    #[tokio::test]
    async fn test_filters_by_project_and_tags() {
        let src = source();
        let page = src
            .fetch_transactions(&filters(
                FilterUpdate::new()
                    .set(FilterKey::ProjectId, "p1")
                    .set(FilterKey::Tags, "beta"),
            ))
            .await
            .unwrap();
        let ids: Vec<_> = page.items.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["t4", "t2"]);
        assert_eq!(page.total_elements, 2);
    }

    #[tokio::test]
    async fn test_sort_and_paginate() {
        let src = source();
        let mut state = filters(
            FilterUpdate::new()
                .set(FilterKey::SortField, "latency_ms")
                .set(FilterKey::SortType, "asc")
                .page_size(3),
        );
        state.set(FilterKey::Page, "2").unwrap();
        let page = src.fetch_transactions(&state).await.unwrap();
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.page_index, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, "t4");
    }

    #[tokio::test]
    async fn test_rejects_unknown_sort_field_and_bad_range() {
        let src = source();
        let err = src
            .fetch_transactions(&filters(FilterUpdate::new().set(FilterKey::SortField, "vibes")))
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(400));

        let err = src
            .fetch_transactions(&filters(
                FilterUpdate::new()
                    .set(FilterKey::DateFrom, "2024-02-01")
                    .set(FilterKey::DateTo, "2024-01-01"),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code, "bad_request");
    }

    #[tokio::test]
    async fn test_statistics_buckets() {
        let src = source();
        let params = StatisticsParams {
            project_id: Some("p1".into()),
            date_from: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            date_to: Utc.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap(),
            period: Granularity::Hourly,
        };
        let buckets = src
            .fetch_statistics(StatisticsKind::Count, &params)
            .await
            .unwrap();
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[1].records[0]["model"], "claude");
        assert_eq!(buckets[1].records[0]["count"], 1);

        let daily = StatisticsParams {
            period: Granularity::Daily,
            ..params
        };
        let buckets = src.fetch_statistics(StatisticsKind::Cost, &daily).await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].records.len(), 2);
        assert_eq!(buckets[0].records[0]["model"], "gpt");
        assert_eq!(buckets[0].records[0]["tokens"], 30);
    }
}
