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

//! Timestamp parsing and formatting for the query layer.
//!
//! Every timestamp that leaves the core (address parameters, statistics
//! requests) is UTC, truncated to whole seconds and rendered as
//! `YYYY-MM-DDTHH:MM:SSZ`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Timelike, Utc};

/// Drop sub-second precision.
pub fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_nanosecond(0).unwrap_or(ts)
}

/// Render a timestamp in the wire format.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    truncate_to_seconds(ts).to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an ISO-8601 timestamp.
///
/// Accepts RFC 3339 with any offset, a naive `YYYY-MM-DDTHH:MM:SS` (taken as
/// UTC) and a bare `YYYY-MM-DD` (midnight UTC). The result is truncated to
/// whole seconds.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(truncate_to_seconds(ts.with_timezone(&Utc)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(truncate_to_seconds(naive.and_utc()));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|date| NaiveDateTime::new(date, NaiveTime::MIN).and_utc())
}

/// Re-render a timestamp string in the wire format, if it parses.
pub fn normalize_timestamp(value: &str) -> Option<String> {
    parse_timestamp(value).map(format_timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_truncates_subseconds() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 15).unwrap()
            + chrono::Duration::milliseconds(789);
        assert_eq!(format_timestamp(ts), "2024-03-01T12:30:15Z");
    }

    #[test]
    fn test_parse_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T00:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T00:00:00.250Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T02:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T00:00:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize_timestamp("2024-03-01T10:00:00.999+00:00").as_deref(),
            Some("2024-03-01T10:00:00Z")
        );
    }
}
