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

//! Proxy-captured LLM transactions and the server envelopes around them.

use crate::pagination::PageInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// One request/response pair captured by the proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub project_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    /// Cost in USD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
}

impl TransactionRecord {
    pub fn total_tokens(&self) -> Option<u64> {
        match (self.prompt_tokens, self.completion_tokens) {
            (None, None) => None,
            (p, c) => Some(p.unwrap_or(0) + c.unwrap_or(0)),
        }
    }

    /// True when the record carries every tag in `tags`.
    pub fn has_all_tags(&self, tags: &[&str]) -> bool {
        tags.iter().all(|t| self.tags.iter().any(|own| own == t))
    }

    pub fn is_error(&self) -> bool {
        self.status_code.is_some_and(|s| s >= 400)
    }
}

/// Addressable transaction fields, used for sorting and table columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionField {
    Id,
    ProjectId,
    CreatedAt,
    Provider,
    Model,
    StatusCode,
    LatencyMs,
    PromptTokens,
    CompletionTokens,
    TotalTokens,
    Cost,
    Tags,
}

impl TransactionField {
    pub const ALL: [TransactionField; 12] = [
        TransactionField::Id,
        TransactionField::ProjectId,
        TransactionField::CreatedAt,
        TransactionField::Provider,
        TransactionField::Model,
        TransactionField::StatusCode,
        TransactionField::LatencyMs,
        TransactionField::PromptTokens,
        TransactionField::CompletionTokens,
        TransactionField::TotalTokens,
        TransactionField::Cost,
        TransactionField::Tags,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionField::Id => "id",
            TransactionField::ProjectId => "project_id",
            TransactionField::CreatedAt => "created_at",
            TransactionField::Provider => "provider",
            TransactionField::Model => "model",
            TransactionField::StatusCode => "status_code",
            TransactionField::LatencyMs => "latency_ms",
            TransactionField::PromptTokens => "prompt_tokens",
            TransactionField::CompletionTokens => "completion_tokens",
            TransactionField::TotalTokens => "total_tokens",
            TransactionField::Cost => "cost",
            TransactionField::Tags => "tags",
        }
    }

    /// Cell text for a table. Missing values render as an empty string.
    pub fn display(&self, record: &TransactionRecord) -> String {
        fn opt<T: ToString>(v: Option<T>) -> String {
            v.map(|v| v.to_string()).unwrap_or_default()
        }
        match self {
            TransactionField::Id => record.id.clone(),
            TransactionField::ProjectId => record.project_id.clone(),
            TransactionField::CreatedAt => crate::timestamp::format_timestamp(record.created_at),
            TransactionField::Provider => opt(record.provider.as_deref()),
            TransactionField::Model => opt(record.model.as_deref()),
            TransactionField::StatusCode => opt(record.status_code),
            TransactionField::LatencyMs => opt(record.latency_ms.map(|l| format!("{:.0}", l))),
            TransactionField::PromptTokens => opt(record.prompt_tokens),
            TransactionField::CompletionTokens => opt(record.completion_tokens),
            TransactionField::TotalTokens => opt(record.total_tokens()),
            TransactionField::Cost => opt(record.cost.map(|c| format!("{:.6}", c))),
            TransactionField::Tags => record.tags.join(","),
        }
    }

    /// Ascending order on this field; missing values sort first.
    pub fn compare(&self, a: &TransactionRecord, b: &TransactionRecord) -> Ordering {
        fn float(a: Option<f64>, b: Option<f64>) -> Ordering {
            match (a, b) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                (a, b) => a.is_some().cmp(&b.is_some()),
            }
        }
        match self {
            TransactionField::Id => a.id.cmp(&b.id),
            TransactionField::ProjectId => a.project_id.cmp(&b.project_id),
            TransactionField::CreatedAt => a.created_at.cmp(&b.created_at),
            TransactionField::Provider => a.provider.cmp(&b.provider),
            TransactionField::Model => a.model.cmp(&b.model),
            TransactionField::StatusCode => a.status_code.cmp(&b.status_code),
            TransactionField::LatencyMs => float(a.latency_ms, b.latency_ms),
            TransactionField::PromptTokens => a.prompt_tokens.cmp(&b.prompt_tokens),
            TransactionField::CompletionTokens => a.completion_tokens.cmp(&b.completion_tokens),
            TransactionField::TotalTokens => a.total_tokens().cmp(&b.total_tokens()),
            TransactionField::Cost => float(a.cost, b.cost),
            TransactionField::Tags => a.tags.cmp(&b.tags),
        }
    }
}

impl fmt::Display for TransactionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionField::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unknown transaction field: {}", s))
    }
}

/// Paginated listing envelope returned by the transactions endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionPage {
    #[serde(default)]
    pub items: Vec<TransactionRecord>,
    pub page_index: u64,
    pub page_size: u64,
    #[serde(default)]
    pub total_pages: u64,
    pub total_elements: u64,
}

impl TransactionPage {
    /// Pagination derived from the envelope; the server's `total_pages` is
    /// recomputed rather than trusted.
    pub fn page_info(&self) -> PageInfo {
        PageInfo::compute(self.page_index, self.page_size, self.total_elements)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Statistics endpoint families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatisticsKind {
    Count,
    Cost,
    Speed,
}

impl StatisticsKind {
    pub const ALL: [StatisticsKind; 3] =
        [StatisticsKind::Count, StatisticsKind::Cost, StatisticsKind::Speed];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatisticsKind::Count => "count",
            StatisticsKind::Cost => "cost",
            StatisticsKind::Speed => "speed",
        }
    }

    /// Field the records are grouped by.
    pub fn dimension(&self) -> &'static str {
        "model"
    }

    /// Metric fields carried by each record, primary metric first.
    pub fn metrics(&self) -> &'static [&'static str] {
        match self {
            StatisticsKind::Count => &["count"],
            StatisticsKind::Cost => &["cost", "tokens"],
            StatisticsKind::Speed => &["latency"],
        }
    }

    /// Metrics reported as per-bucket means.
    pub fn averaged_metrics(&self) -> &'static [&'static str] {
        match self {
            StatisticsKind::Speed => &["latency"],
            StatisticsKind::Count | StatisticsKind::Cost => &[],
        }
    }
}

impl fmt::Display for StatisticsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatisticsKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatisticsKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown statistics kind: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: &str, latency: Option<f64>) -> TransactionRecord {
        TransactionRecord {
            id: id.to_string(),
            project_id: "p1".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
            provider: Some("openai".to_string()),
            model: Some("gpt-4o".to_string()),
            status_code: Some(200),
            latency_ms: latency,
            prompt_tokens: Some(10),
            completion_tokens: None,
            cost: Some(0.0015),
            tags: vec!["beta".to_string(), "chat".to_string()],
            request: None,
            response: None,
        }
    }

    #[test]
    fn test_display_and_tokens() {
        let r = record("t1", Some(812.4));
        assert_eq!(TransactionField::LatencyMs.display(&r), "812");
        assert_eq!(TransactionField::Cost.display(&r), "0.001500");
        assert_eq!(TransactionField::TotalTokens.display(&r), "10");
        assert_eq!(TransactionField::CreatedAt.display(&r), "2024-01-01T08:00:00Z");
        assert_eq!(TransactionField::Tags.display(&r), "beta,chat");
    }

    #[test]
    fn test_tag_matching() {
        let r = record("t1", None);
        assert!(r.has_all_tags(&["chat"]));
        assert!(r.has_all_tags(&["chat", "beta"]));
        assert!(!r.has_all_tags(&["chat", "prod"]));
        assert!(r.has_all_tags(&[]));
    }

    #[test]
    fn test_compare_missing_first() {
        let a = record("a", None);
        let b = record("b", Some(5.0));
        assert_eq!(TransactionField::LatencyMs.compare(&a, &b), Ordering::Less);
        assert_eq!(TransactionField::Id.compare(&b, &a), Ordering::Greater);
    }

    #[test]
    fn test_page_envelope() {
        let page: TransactionPage = serde_json::from_str(
            r#"{"items": [], "page_index": 4, "page_size": 2, "total_pages": 9, "total_elements": 5}"#,
        )
        .unwrap();
        let info = page.page_info();
        assert_eq!(info.total_pages, 3);
        assert_eq!(info.page_index, 3);
        assert!(page.is_empty());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!("speed".parse::<StatisticsKind>().unwrap(), StatisticsKind::Speed);
        assert_eq!(StatisticsKind::Cost.metrics(), &["cost", "tokens"]);
        assert!("latency".parse::<StatisticsKind>().is_err());
    }
}
