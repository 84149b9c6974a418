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

//! Chart series reshaping
//!
//! Statistics endpoints return one entry per date bucket, each holding a
//! list of open records grouped by a dynamic dimension (model, tag, ...).
//! Charts want one flat record per bucket with a numeric field per
//! dimension value, plus a legend of every dimension value seen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Dimension value used when a record does not carry the dimension field.
pub const UNKNOWN_DIMENSION: &str = "unknown";

/// One server record: dimension fields and metric fields side by side.
pub type StatisticsRecord = Map<String, Value>;

/// One date bucket as returned by a statistics endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsBucket {
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub records: Vec<StatisticsRecord>,
}

/// Key of a series field: `<metric>_<dimension value>`.
pub fn series_key(metric: &str, dimension: &str) -> String {
    format!("{}_{}", metric, dimension)
}

/// Distinct dimension values in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Legend {
    keys: Vec<String>,
    index: HashMap<String, usize>,
}

impl Legend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value and return its position; existing values keep theirs.
    pub fn observe(&mut self, key: &str) -> usize {
        if let Some(position) = self.index.get(key) {
            return *position;
        }
        let position = self.keys.len();
        self.keys.push(key.to_string());
        self.index.insert(key.to_string(), position);
        position
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Serialize for Legend {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.keys.serialize(serializer)
    }
}

/// One chart-ready row. Dimension values absent at this date have no field,
/// which charts must render as "no point" rather than zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesRecord {
    pub date: DateTime<Utc>,
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

impl SeriesRecord {
    pub fn value(&self, metric: &str, dimension: &str) -> Option<f64> {
        self.values.get(&series_key(metric, dimension)).copied()
    }
}

/// Reshaped statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReshapedSeries {
    pub legend: Legend,
    pub records: Vec<SeriesRecord>,
}

impl ReshapedSeries {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Points of one line, in bucket order.
    pub fn series(&self, metric: &str, dimension: &str) -> Vec<(DateTime<Utc>, Option<f64>)> {
        let key = series_key(metric, dimension);
        self.records
            .iter()
            .map(|r| (r.date, r.values.get(&key).copied()))
            .collect()
    }

    /// Sum of a metric per legend entry, in legend order.
    pub fn totals(&self, metric: &str) -> Vec<(String, f64)> {
        self.legend
            .keys()
            .iter()
            .map(|dimension| {
                let key = series_key(metric, dimension);
                let total = self.records.iter().filter_map(|r| r.values.get(&key)).sum();
                (dimension.clone(), total)
            })
            .collect()
    }
}

/// Turns date-bucketed statistics into [`ReshapedSeries`].
#[derive(Debug, Clone)]
pub struct SeriesReshaper {
    dimension: String,
    metrics: Vec<String>,
    averaged: Vec<String>,
}

impl SeriesReshaper {
    /// `metrics` lists the fields to extract; empty means every numeric field
    /// other than the dimension.
    pub fn new(dimension: impl Into<String>, metrics: &[&str]) -> Self {
        Self {
            dimension: dimension.into(),
            metrics: metrics.iter().map(|m| m.to_string()).collect(),
            averaged: Vec::new(),
        }
    }

    /// Metrics that are means rather than totals. Duplicate dimension
    /// values in one bucket are averaged for these instead of summed.
    pub fn with_averaged(mut self, metrics: &[&str]) -> Self {
        self.averaged = metrics.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn averaged(&self) -> &[String] {
        &self.averaged
    }

    pub fn dimension(&self) -> &str {
        &self.dimension
    }

    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    /// Rebuild the series from scratch. Bucket order is preserved; several
    /// records for the same dimension value in one bucket are summed, or
    /// averaged for metrics registered with [`SeriesReshaper::with_averaged`].
    pub fn reshape(&self, buckets: &[StatisticsBucket]) -> ReshapedSeries {
        let mut legend = Legend::new();
        let records = buckets
            .iter()
            .map(|bucket| {
                let mut sums: BTreeMap<String, (f64, u32)> = BTreeMap::new();
                let mut averaged_keys = Vec::new();
                for record in &bucket.records {
                    let dimension = dimension_value(record.get(&self.dimension));
                    legend.observe(&dimension);
                    for (metric, value) in self.metric_values(record) {
                        let key = series_key(metric, &dimension);
                        if self.averaged.iter().any(|m| m == metric) {
                            averaged_keys.push(key.clone());
                        }
                        let entry = sums.entry(key).or_insert((0.0, 0));
                        entry.0 += value;
                        entry.1 += 1;
                    }
                }
                let values = sums
                    .into_iter()
                    .map(|(key, (sum, samples))| {
                        let value = if averaged_keys.contains(&key) {
                            sum / f64::from(samples)
                        } else {
                            sum
                        };
                        (key, value)
                    })
                    .collect();
                SeriesRecord {
                    date: bucket.date,
                    values,
                }
            })
            .collect();
        ReshapedSeries { legend, records }
    }

    fn metric_values<'a>(&'a self, record: &'a StatisticsRecord) -> Vec<(&'a str, f64)> {
        if self.metrics.is_empty() {
            record
                .iter()
                .filter(|(field, _)| **field != self.dimension)
                .filter_map(|(field, value)| Some((field.as_str(), numeric(value)?)))
                .collect()
        } else {
            self.metrics
                .iter()
                .filter_map(|metric| Some((metric.as_str(), numeric(record.get(metric)?)?)))
                .collect()
        }
    }
}

fn dimension_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => UNKNOWN_DIMENSION.to_string(),
    }
}

/// Finite numbers only; `"NaN"` and `"inf"` strings are not metric values.
fn numeric(value: &Value) -> Option<f64> {
    let number: f64 = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn bucket(day: u32, records: Value) -> StatisticsBucket {
        StatisticsBucket {
            date: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            records: serde_json::from_value(records).unwrap(),
        }
    }

    #[test]
    fn test_legend_first_seen_order() {
        let input = vec![
            bucket(1, json!([{"model": "x", "count": 1}])),
            bucket(2, json!([{"model": "y", "count": 2}, {"model": "x", "count": 3}])),
        ];
        let out = SeriesReshaper::new("model", &["count"]).reshape(&input);
        assert_eq!(out.legend.keys(), &["x".to_string(), "y".to_string()]);
        assert_eq!(out.records[0].value("count", "x"), Some(1.0));
        assert_eq!(out.records[1].value("count", "y"), Some(2.0));
        assert_eq!(out.records[1].value("count", "x"), Some(3.0));
    }

    #[test]
    fn test_absent_dimension_is_not_zero() {
        let input = vec![
            bucket(1, json!([{"model": "a", "count": 4}])),
            bucket(2, json!([{"model": "b", "count": 1}])),
            bucket(3, json!([])),
        ];
        let out = SeriesReshaper::new("model", &["count"]).reshape(&input);
        assert_eq!(out.records[0].value("count", "b"), None);
        assert_eq!(out.records[1].value("count", "a"), None);
        assert!(out.records[2].values.is_empty());
        assert_eq!(
            out.series("count", "a").into_iter().map(|(_, v)| v).collect::<Vec<_>>(),
            vec![Some(4.0), None, None]
        );
    }

    #[test]
    fn test_multiple_metrics_coexist() {
        let input = vec![bucket(
            1,
            json!([{"model": "gpt", "cost": 0.5, "tokens": 1200, "note": "ignored"}]),
        )];
        let out = SeriesReshaper::new("model", &[]).reshape(&input);
        let record = &out.records[0];
        assert_eq!(record.value("cost", "gpt"), Some(0.5));
        assert_eq!(record.value("tokens", "gpt"), Some(1200.0));
        assert_eq!(record.values.len(), 2);

        let only_cost = SeriesReshaper::new("model", &["cost"]).reshape(&input);
        assert_eq!(only_cost.records[0].values.len(), 1);
    }

    #[test]
    fn test_missing_dimension_and_string_numbers() {
        let input = vec![bucket(
            1,
            json!([{"count": "7"}, {"model": 3, "count": 2}, {"model": "", "count": 1}]),
        )];
        let out = SeriesReshaper::new("model", &["count"]).reshape(&input);
        assert_eq!(out.legend.keys(), &["unknown".to_string(), "3".to_string()]);
        assert_eq!(out.records[0].value("count", "unknown"), Some(8.0));
        assert_eq!(out.records[0].value("count", "3"), Some(2.0));
    }

    #[test]
    fn test_deterministic_and_serializable() {
        let input = vec![
            bucket(1, json!([{"tag": "b", "latency": 120.0}, {"tag": "a", "latency": 80.0}])),
            bucket(2, json!([{"tag": "a", "latency": 90.0}])),
        ];
        let reshaper = SeriesReshaper::new("tag", &["latency"]);
        let first = reshaper.reshape(&input);
        assert_eq!(first, reshaper.reshape(&input));
        assert_eq!(first.totals("latency"), vec![("b".into(), 120.0), ("a".into(), 170.0)]);

        let json = serde_json::to_value(&first).unwrap();
        assert_eq!(json["legend"], json!(["b", "a"]));
        assert_eq!(json["records"][1]["latency_a"], json!(90.0));
        assert!(json["records"][1].get("latency_b").is_none());
    }

    #[test]
    fn test_non_finite_strings_are_skipped() {
        let input = vec![bucket(
            1,
            json!([
                {"model": "x", "count": "NaN"},
                {"model": "y", "count": "inf"},
                {"model": "z", "count": "-Infinity"},
                {"model": "x", "count": 2}
            ]),
        )];
        let out = SeriesReshaper::new("model", &["count"]).reshape(&input);
        assert_eq!(out.records[0].value("count", "x"), Some(2.0));
        assert_eq!(out.records[0].value("count", "y"), None);
        assert_eq!(out.records[0].value("count", "z"), None);
        assert!(out.records[0].values.values().all(|v| v.is_finite()));
    }

    #[test]
    fn test_averaged_metrics_take_the_mean_of_duplicates() {
        let input = vec![bucket(
            1,
            json!([
                {"model": "y", "latency": 100.0, "count": 1},
                {"model": "y", "latency": 300.0, "count": 3}
            ]),
        )];
        let summed = SeriesReshaper::new("model", &["latency", "count"]).reshape(&input);
        assert_eq!(summed.records[0].value("latency", "y"), Some(400.0));

        let reshaper =
            SeriesReshaper::new("model", &["latency", "count"]).with_averaged(&["latency"]);
        let out = reshaper.reshape(&input);
        assert_eq!(out.records[0].value("latency", "y"), Some(200.0));
        assert_eq!(out.records[0].value("count", "y"), Some(4.0));
    }
}
