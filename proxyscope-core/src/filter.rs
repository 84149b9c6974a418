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

//! Filter state shared by every listing and chart view.
//!
//! All values are kept in their wire form (strings) so that the state maps
//! one-to-one onto the address representation. An absent value means "no
//! filter on this dimension"; empty strings are never stored.

use crate::error::{ProxyscopeError, Result};
use crate::timestamp::{normalize_timestamp, parse_timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default number of rows per listing page.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Filter fields, named as they appear in the address representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKey {
    ProjectId,
    Tags,
    DateFrom,
    DateTo,
    Page,
    PageSize,
    SortField,
    SortType,
}

impl FilterKey {
    pub const ALL: [FilterKey; 8] = [
        FilterKey::ProjectId,
        FilterKey::Tags,
        FilterKey::DateFrom,
        FilterKey::DateTo,
        FilterKey::Page,
        FilterKey::PageSize,
        FilterKey::SortField,
        FilterKey::SortType,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKey::ProjectId => "project_id",
            FilterKey::Tags => "tags",
            FilterKey::DateFrom => "date_from",
            FilterKey::DateTo => "date_to",
            FilterKey::Page => "page",
            FilterKey::PageSize => "page_size",
            FilterKey::SortField => "sort_field",
            FilterKey::SortType => "sort_type",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        FilterKey::ALL.iter().copied().find(|k| k.as_str() == name)
    }

    /// Normalize a raw value for this key. `Ok(None)` clears the field.
    pub fn normalize(&self, raw: &str) -> Result<Option<String>> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        match self {
            FilterKey::ProjectId | FilterKey::SortField => Ok(Some(trimmed.to_string())),
            FilterKey::Tags => Ok(normalize_tags(trimmed)),
            FilterKey::DateFrom | FilterKey::DateTo => normalize_timestamp(trimmed)
                .map(Some)
                .ok_or_else(|| ProxyscopeError::InvalidTimestamp {
                    key: *self,
                    value: raw.to_string(),
                }),
            FilterKey::Page | FilterKey::PageSize => match trimmed.parse::<u64>() {
                Ok(n) if n > 0 => Ok(Some(n.to_string())),
                _ => Err(ProxyscopeError::InvalidPositiveInteger {
                    key: *self,
                    value: raw.to_string(),
                }),
            },
            FilterKey::SortType => match SortOrder::parse(trimmed) {
                Some(SortOrder::Asc) => Ok(Some("asc".to_string())),
                Some(SortOrder::Desc) => Ok(None),
                None => Err(ProxyscopeError::InvalidSortType(raw.to_string())),
            },
        }
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction. An absent `sort_type` means descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

/// Comma-join tags with surrounding whitespace and empty entries removed.
pub fn normalize_tags(raw: &str) -> Option<String> {
    let joined = raw
        .split(',')
        .map(|t| t.split_whitespace().collect::<String>())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(",");
    (!joined.is_empty()).then_some(joined)
}

/// A batch of field changes applied atomically.
///
/// Setting the same key twice keeps the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterUpdate {
    entries: Vec<(FilterKey, String)>,
}

impl FilterUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: FilterKey, value: impl Into<String>) -> Self {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    pub fn clear(self, key: FilterKey) -> Self {
        self.set(key, "")
    }

    pub fn page(self, page: u64) -> Self {
        self.set(FilterKey::Page, page.to_string())
    }

    pub fn page_size(self, page_size: u64) -> Self {
        self.set(FilterKey::PageSize, page_size.to_string())
    }

    pub fn entries(&self) -> &[(FilterKey, String)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touches(&self, key: FilterKey) -> bool {
        self.entries.iter().any(|(k, _)| *k == key)
    }
}

/// The canonical set of active query parameters for one view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterState {
    #[serde(skip_serializing_if = "Option::is_none")]
    project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort_type: Option<String>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: FilterKey) -> Option<&str> {
        match key {
            FilterKey::ProjectId => self.project_id.as_deref(),
            FilterKey::Tags => self.tags.as_deref(),
            FilterKey::DateFrom => self.date_from.as_deref(),
            FilterKey::DateTo => self.date_to.as_deref(),
            FilterKey::Page => self.page.as_deref(),
            FilterKey::PageSize => self.page_size.as_deref(),
            FilterKey::SortField => self.sort_field.as_deref(),
            FilterKey::SortType => self.sort_type.as_deref(),
        }
    }

    fn slot_mut(&mut self, key: FilterKey) -> &mut Option<String> {
        match key {
            FilterKey::ProjectId => &mut self.project_id,
            FilterKey::Tags => &mut self.tags,
            FilterKey::DateFrom => &mut self.date_from,
            FilterKey::DateTo => &mut self.date_to,
            FilterKey::Page => &mut self.page,
            FilterKey::PageSize => &mut self.page_size,
            FilterKey::SortField => &mut self.sort_field,
            FilterKey::SortType => &mut self.sort_type,
        }
    }

    /// Store an already-normalized value.
    pub(crate) fn put(&mut self, key: FilterKey, value: Option<String>) {
        *self.slot_mut(key) = value.filter(|v| !v.is_empty());
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn tags(&self) -> Option<&str> {
        self.tags.as_deref()
    }

    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .as_deref()
            .map(|t| t.split(',').collect())
            .unwrap_or_default()
    }

    pub fn date_from(&self) -> Option<DateTime<Utc>> {
        self.date_from.as_deref().and_then(parse_timestamp)
    }

    pub fn date_to(&self) -> Option<DateTime<Utc>> {
        self.date_to.as_deref().and_then(parse_timestamp)
    }

    /// 1-based page, 1 when absent.
    pub fn page(&self) -> u64 {
        self.page
            .as_deref()
            .and_then(|p| p.parse().ok())
            .unwrap_or(1)
    }

    pub fn page_size(&self) -> Option<u64> {
        self.page_size.as_deref().and_then(|p| p.parse().ok())
    }

    pub fn sort_field(&self) -> Option<&str> {
        self.sort_field.as_deref()
    }

    pub fn sort_order(&self) -> SortOrder {
        match self.sort_type.as_deref() {
            Some("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }

    /// Present fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (FilterKey, &str)> {
        FilterKey::ALL
            .into_iter()
            .filter_map(move |key| self.get(key).map(|v| (key, v)))
    }

    /// Checks that must pass before the state is sent to a server.
    pub fn validate(&self) -> Result<()> {
        if let (Some(from), Some(to)) = (self.date_from(), self.date_to()) {
            if from > to {
                return Err(ProxyscopeError::InvalidDateRange {
                    from: self.date_from.clone().unwrap_or_default(),
                    to: self.date_to.clone().unwrap_or_default(),
                });
            }
        }
        Ok(())
    }

    /// Apply a batch of changes and return the keys whose value changed.
    ///
    /// Every value is validated before anything is written, so a rejected
    /// batch leaves the state untouched. Changing any field other than
    /// `page` resets `page` to 1 unless the batch sets it explicitly;
    /// changing `page_size` always resets it.
    pub fn apply(&mut self, update: &FilterUpdate) -> Result<Vec<FilterKey>> {
        let mut normalized = Vec::with_capacity(update.entries().len());
        for (key, raw) in update.entries() {
            normalized.push((*key, key.normalize(raw)?));
        }

        let mut changed: Vec<FilterKey> = Vec::new();
        for (key, value) in normalized {
            if self.get(key) != value.as_deref() {
                self.put(key, value);
                changed.push(key);
            }
        }

        let filter_changed = changed.iter().any(|k| *k != FilterKey::Page);
        let must_reset = changed.contains(&FilterKey::PageSize)
            || (filter_changed && !update.touches(FilterKey::Page));
        if must_reset && self.page.as_deref() != Some("1") {
            self.page = Some("1".to_string());
            if !changed.contains(&FilterKey::Page) {
                changed.push(FilterKey::Page);
            }
        }

        changed.sort();
        Ok(changed)
    }

    /// Single-field shorthand for [`FilterState::apply`].
    pub fn set(&mut self, key: FilterKey, value: impl Into<String>) -> Result<Vec<FilterKey>> {
        self.apply(&FilterUpdate::new().set(key, value))
    }
}

/// Per-view initial values used for keys absent from the address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDefaults {
    values: FilterState,
}

impl FilterDefaults {
    /// No defaults at all.
    pub fn empty() -> Self {
        Self {
            values: FilterState::default(),
        }
    }

    /// Page 1 with the given page size.
    pub fn listing(page_size: u64) -> Self {
        let mut values = FilterState::default();
        values.put(FilterKey::Page, Some("1".to_string()));
        values.put(FilterKey::PageSize, Some(page_size.max(1).to_string()));
        Self { values }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        let project_id = project_id.into();
        self.values.put(FilterKey::ProjectId, Some(project_id.trim().to_string()));
        self
    }

    pub fn with_sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        let field = field.into();
        self.values.put(FilterKey::SortField, Some(field.trim().to_string()));
        let sort_type = (order == SortOrder::Asc).then(|| "asc".to_string());
        self.values.put(FilterKey::SortType, sort_type);
        self
    }

    pub fn get(&self, key: FilterKey) -> Option<&str> {
        self.values.get(key)
    }

    pub fn state(&self) -> &FilterState {
        &self.values
    }
}

impl Default for FilterDefaults {
    fn default() -> Self {
        Self::listing(DEFAULT_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing_state() -> FilterState {
        FilterDefaults::default().state().clone()
    }

    #[test]
    fn test_empty_value_clears_field() {
        let mut state = listing_state();
        state.set(FilterKey::Tags, "a,b").unwrap();
        assert_eq!(state.tags(), Some("a,b"));
        state.set(FilterKey::Tags, "").unwrap();
        assert_eq!(state.tags(), None);
        state.set(FilterKey::Tags, " , ,").unwrap();
        assert_eq!(state.tags(), None);
    }

    #[test]
    fn test_tags_normalized() {
        assert_eq!(normalize_tags(" a, b ,,c").as_deref(), Some("a,b,c"));
        assert_eq!(normalize_tags("prod env,beta").as_deref(), Some("prodenv,beta"));
        assert_eq!(normalize_tags(""), None);
    }

    #[test]
    fn test_page_size_change_resets_page() {
        let mut state = listing_state();
        state.set(FilterKey::Page, "5").unwrap();
        let changed = state.set(FilterKey::PageSize, "20").unwrap();
        assert_eq!(state.get(FilterKey::Page), Some("1"));
        assert_eq!(state.get(FilterKey::PageSize), Some("20"));
        assert_eq!(changed, vec![FilterKey::Page, FilterKey::PageSize]);

        state.set(FilterKey::Page, "4").unwrap();
        state
            .apply(&FilterUpdate::new().page(3).page_size(50))
            .unwrap();
        assert_eq!(state.page(), 1);
    }

    #[test]
    fn test_filter_change_resets_page_unless_explicit() {
        let mut state = listing_state();
        state.set(FilterKey::Page, "3").unwrap();
        state.set(FilterKey::ProjectId, "p1").unwrap();
        assert_eq!(state.page(), 1);

        state.set(FilterKey::Page, "3").unwrap();
        state
            .apply(&FilterUpdate::new().set(FilterKey::Tags, "x").page(2))
            .unwrap();
        assert_eq!(state.page(), 2);
    }

    #[test]
    fn test_unchanged_value_keeps_page() {
        let mut state = listing_state();
        state.set(FilterKey::ProjectId, "p1").unwrap();
        state.set(FilterKey::Page, "3").unwrap();
        let changed = state.set(FilterKey::ProjectId, "p1").unwrap();
        assert!(changed.is_empty());
        assert_eq!(state.page(), 3);
    }

    #[test]
    fn test_invalid_batch_is_atomic() {
        let mut state = listing_state();
        let before = state.clone();
        let err = state
            .apply(
                &FilterUpdate::new()
                    .set(FilterKey::Tags, "x")
                    .set(FilterKey::Page, "0"),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ProxyscopeError::InvalidPositiveInteger { key: FilterKey::Page, .. }
        ));
        assert_eq!(state, before);

        assert!(state.set(FilterKey::DateFrom, "last tuesday").is_err());
        assert!(state.set(FilterKey::SortType, "sideways").is_err());
    }

    #[test]
    fn test_dates_normalized_and_validated() {
        let mut state = listing_state();
        state
            .apply(
                &FilterUpdate::new()
                    .set(FilterKey::DateFrom, "2024-02-01T10:00:00.500Z")
                    .set(FilterKey::DateTo, "2024-01-01"),
            )
            .unwrap();
        assert_eq!(state.get(FilterKey::DateFrom), Some("2024-02-01T10:00:00Z"));
        assert_eq!(state.get(FilterKey::DateTo), Some("2024-01-01T00:00:00Z"));
        assert!(matches!(
            state.validate(),
            Err(ProxyscopeError::InvalidDateRange { .. })
        ));

        state.set(FilterKey::DateTo, "2024-03-01").unwrap();
        assert!(state.validate().is_ok());
    }

    #[test]
    fn test_sort_type() {
        let mut state = listing_state();
        assert_eq!(state.sort_order(), SortOrder::Desc);
        state.set(FilterKey::SortType, "ASC").unwrap();
        assert_eq!(state.get(FilterKey::SortType), Some("asc"));
        assert_eq!(state.sort_order(), SortOrder::Asc);
        state.set(FilterKey::SortType, "desc").unwrap();
        assert_eq!(state.get(FilterKey::SortType), None);
    }

    #[test]
    fn test_update_last_write_wins() {
        let update = FilterUpdate::new()
            .set(FilterKey::Tags, "a")
            .set(FilterKey::Tags, "b");
        assert_eq!(update.entries(), &[(FilterKey::Tags, "b".to_string())]);
    }

    #[test]
    fn test_key_names() {
        for key in FilterKey::ALL {
            assert_eq!(FilterKey::from_name(key.as_str()), Some(key));
        }
        assert_eq!(FilterKey::from_name("offset"), None);
    }
}
