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

//! Aggregation granularity resolution
//!
//! Not every bucket width is meaningful for every date range: a five-year
//! range cannot be charted hourly and a two-hour range has no monthly
//! buckets. This module decides which granularities are enabled for a range,
//! which one stays selected when the range changes, and produces the
//! statistics query bundle for the selection.

use crate::error::{ProxyscopeError, Result};
use crate::timestamp::{format_timestamp, truncate_to_seconds};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Time-bucket width used to aggregate statistics.
///
/// Declaration order (coarsest first) is the fallback selection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Yearly,
    Monthly,
    Weekly,
    Daily,
    Hourly,
    #[serde(rename = "5minute")]
    FiveMinute,
}

impl Granularity {
    /// All granularities in declaration order.
    pub const ALL: [Granularity; 6] = [
        Granularity::Yearly,
        Granularity::Monthly,
        Granularity::Weekly,
        Granularity::Daily,
        Granularity::Hourly,
        Granularity::FiveMinute,
    ];

    /// Absolute default when no granularity is enabled.
    pub const FALLBACK: Granularity = Granularity::Daily;

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Yearly => "yearly",
            Granularity::Monthly => "monthly",
            Granularity::Weekly => "weekly",
            Granularity::Daily => "daily",
            Granularity::Hourly => "hourly",
            Granularity::FiveMinute => "5minute",
        }
    }

    /// Whether this granularity is meaningful for a range of the given span.
    pub fn is_enabled_for(&self, span: &RangeSpan) -> bool {
        match self {
            Granularity::Yearly => span.years >= 1,
            Granularity::Monthly => span.months >= 1 && span.years <= 2,
            Granularity::Weekly => span.weeks >= 1 && span.months <= 12,
            Granularity::Daily => span.days >= 1 && span.months <= 2,
            Granularity::Hourly => span.hours >= 1 && span.hours <= 60,
            Granularity::FiveMinute => span.hours <= 5,
        }
    }

    /// Start of the bucket containing `ts`.
    ///
    /// Weeks start on Monday.
    pub fn bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let date = ts.date_naive();
        let midnight = |d| NaiveDateTime::new(d, NaiveTime::MIN).and_utc();
        match self {
            Granularity::Yearly => midnight(date.with_ordinal(1).unwrap_or(date)),
            Granularity::Monthly => midnight(date.with_day(1).unwrap_or(date)),
            Granularity::Weekly => {
                let back = date.weekday().num_days_from_monday() as i64;
                midnight(date - Duration::days(back))
            }
            Granularity::Daily => midnight(date),
            Granularity::Hourly => floor_to(ts, 3_600),
            Granularity::FiveMinute => floor_to(ts, 300),
        }
    }
}

fn floor_to(ts: DateTime<Utc>, step_secs: i64) -> DateTime<Utc> {
    let secs = ts.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(step_secs), 0).unwrap_or(ts)
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = ProxyscopeError;

    fn from_str(s: &str) -> Result<Self> {
        Granularity::ALL
            .iter()
            .copied()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| ProxyscopeError::UnknownGranularity(s.to_string()))
    }
}

/// Whole calendar units elapsed between two instants, truncated toward zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpan {
    pub years: i64,
    pub months: i64,
    pub weeks: i64,
    pub days: i64,
    pub hours: i64,
}

impl RangeSpan {
    /// Returns `None` when `end` is before `start`.
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        if end < start {
            return None;
        }
        let elapsed = end - start;
        let months = whole_months_between(start, end);
        let days = elapsed.num_days();
        Some(Self {
            years: months / 12,
            months,
            weeks: days / 7,
            days,
            hours: elapsed.num_hours(),
        })
    }
}

/// Calendar months between `start` and `end` (`end >= start`).
///
/// Adding months clamps to the end of shorter months, so Jan 31 → Feb 29 is
/// one whole month.
fn whole_months_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let mut months = (end.year() as i64 - start.year() as i64) * 12 + end.month() as i64
        - start.month() as i64;
    while months > 0 {
        match u32::try_from(months)
            .ok()
            .and_then(|m| start.checked_add_months(Months::new(m)))
        {
            Some(anchor) if anchor <= end => break,
            _ => months -= 1,
        }
    }
    months.max(0)
}

/// Granularities enabled for a range, in declaration order.
///
/// Empty when either bound is missing or the range is inverted; callers
/// treat that as "cannot aggregate".
pub fn enabled_granularities(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Vec<Granularity> {
    let span = match (start, end) {
        (Some(start), Some(end)) => RangeSpan::between(start, end),
        _ => None,
    };
    match span {
        Some(span) => Granularity::ALL
            .iter()
            .copied()
            .filter(|g| g.is_enabled_for(&span))
            .collect(),
        None => Vec::new(),
    }
}

/// Keep `previous` if still enabled, otherwise the first enabled entry,
/// otherwise [`Granularity::FALLBACK`].
pub fn select_granularity(previous: Option<Granularity>, enabled: &[Granularity]) -> Granularity {
    match previous {
        Some(previous) if enabled.contains(&previous) => previous,
        _ => enabled.first().copied().unwrap_or(Granularity::FALLBACK),
    }
}

/// Parameter bundle sent to the statistics endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
    pub period: Granularity,
}

impl StatisticsParams {
    /// Query-string pairs, dates in the second-truncated wire format.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(4);
        if let Some(project_id) = self.project_id.as_deref().filter(|p| !p.is_empty()) {
            pairs.push(("project_id", project_id.to_string()));
        }
        pairs.push(("date_from", format_timestamp(self.date_from)));
        pairs.push(("date_to", format_timestamp(self.date_to)));
        pairs.push(("period", self.period.as_str().to_string()));
        pairs
    }
}

/// Outcome of a range change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub enabled: Vec<Granularity>,
    pub selected: Granularity,
    /// `None` when nothing is enabled.
    pub params: Option<StatisticsParams>,
}

impl Resolution {
    pub fn can_aggregate(&self) -> bool {
        !self.enabled.is_empty()
    }
}

/// Stateful resolver backing one statistics view.
#[derive(Debug, Clone)]
pub struct GranularityResolver {
    selected: Granularity,
    enabled: Vec<Granularity>,
    range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    project_id: Option<String>,
}

impl GranularityResolver {
    pub fn new(initial: Granularity) -> Self {
        Self {
            selected: initial,
            enabled: Vec::new(),
            range: None,
            project_id: None,
        }
    }

    pub fn with_project(mut self, project_id: Option<String>) -> Self {
        self.project_id = project_id.filter(|p| !p.is_empty());
        self
    }

    pub fn selected(&self) -> Granularity {
        self.selected
    }

    pub fn enabled(&self) -> &[Granularity] {
        &self.enabled
    }

    /// Recompute the enabled set for a new range.
    pub fn set_range(
        &mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Resolution {
        let start = start.map(truncate_to_seconds);
        let end = end.map(truncate_to_seconds);
        self.enabled = enabled_granularities(start, end);
        self.range = match (start, end) {
            (Some(start), Some(end)) if !self.enabled.is_empty() => Some((start, end)),
            _ => None,
        };
        let previous = self.selected;
        self.selected = select_granularity(Some(previous), &self.enabled);
        if previous != self.selected {
            debug!(from = %previous, to = %self.selected, "granularity reselected for new range");
        }
        self.resolution()
    }

    /// Explicit user choice; only enabled granularities are accepted.
    pub fn select(&mut self, granularity: Granularity) -> Result<Resolution> {
        if !self.enabled.contains(&granularity) {
            return Err(ProxyscopeError::GranularityDisabled(granularity));
        }
        self.selected = granularity;
        Ok(self.resolution())
    }

    pub fn set_project(&mut self, project_id: Option<String>) -> Resolution {
        self.project_id = project_id.filter(|p| !p.is_empty());
        self.resolution()
    }

    /// Current statistics bundle, if the range can be aggregated.
    pub fn params(&self) -> Option<StatisticsParams> {
        self.range.map(|(date_from, date_to)| StatisticsParams {
            project_id: self.project_id.clone(),
            date_from,
            date_to,
            period: self.selected,
        })
    }

    pub fn resolution(&self) -> Resolution {
        Resolution {
            enabled: self.enabled.clone(),
            selected: self.selected,
            params: self.params(),
        }
    }
}

impl Default for GranularityResolver {
    fn default() -> Self {
        Self::new(Granularity::FALLBACK)
    }
}
