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

//! Address synchronization
//!
//! Mirrors a [`FilterState`] into a shareable query string so that reloading
//! or sharing a link rebuilds the same view. The query string is only ever
//! patched key by key: parameters owned by other panels survive untouched.

use crate::error::Result;
use crate::filter::{FilterDefaults, FilterKey, FilterState, FilterUpdate};
use std::fmt;
use tracing::{debug, warn};
use url::form_urlencoded;

/// Ordered key/value pairs of an address query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressParams {
    pairs: Vec<(String, String)>,
}

impl AddressParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a query string, with or without the leading `?`.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self {
            pairs: form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replace the first occurrence in place (dropping duplicates) or append.
    pub fn set(&mut self, key: &str, value: &str) {
        let mut seen = false;
        self.pairs.retain_mut(|(k, v)| {
            if k != key {
                return true;
            }
            if seen {
                return false;
            }
            seen = true;
            *v = value.to_string();
            true
        });
        if !seen {
            self.pairs.push((key.to_string(), value.to_string()));
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.pairs.len();
        self.pairs.retain(|(k, _)| k != key);
        before != self.pairs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }
}

impl fmt::Display for AddressParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

/// Build the initial state from the address, falling back to `defaults` for
/// absent keys and for values that do not validate.
pub fn read_filter_state(address: &AddressParams, defaults: &FilterDefaults) -> FilterState {
    let mut state = defaults.state().clone();
    for key in FilterKey::ALL {
        let Some(raw) = address.get(key.as_str()).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        match key.normalize(raw) {
            Ok(value) => state.put(key, value),
            Err(e) => warn!(key = %key, error = %e, "ignoring malformed address parameter"),
        }
    }
    state
}

/// Patch the given keys into the address: set when non-empty, remove
/// otherwise.
pub fn patch_address(address: &mut AddressParams, state: &FilterState, keys: &[FilterKey]) {
    for key in keys {
        match state.get(*key) {
            Some(value) => address.set(key.as_str(), value),
            None => {
                address.remove(key.as_str());
            }
        }
    }
}

/// Patch every filter key.
pub fn write_filter_state(address: &mut AddressParams, state: &FilterState) {
    patch_address(address, state, &FilterKey::ALL);
}

/// One filter state bound to its address representation.
///
/// Updates are applied to both synchronously; the latest update wins.
#[derive(Debug, Clone)]
pub struct FilterStore {
    state: FilterState,
    address: AddressParams,
    defaults: FilterDefaults,
}

impl FilterStore {
    pub fn load(mut address: AddressParams, defaults: FilterDefaults) -> Self {
        let state = read_filter_state(&address, &defaults);
        // Empty filter parameters never survive in the address, and rejected
        // ones are rewritten to the value the state fell back to.
        let mut rejected = Vec::new();
        for key in FilterKey::ALL {
            let raw = address.get(key.as_str()).map(str::to_string);
            match raw.as_deref() {
                Some(raw) if raw.trim().is_empty() => {
                    address.remove(key.as_str());
                }
                Some(raw) if key.normalize(raw).is_err() => rejected.push(key),
                _ => {}
            }
        }
        if !rejected.is_empty() {
            patch_address(&mut address, &state, &rejected);
            debug!(keys = ?rejected, query = %address, "rewrote rejected address parameters");
        }
        Self {
            state,
            address,
            defaults,
        }
    }

    pub fn from_query(query: &str, defaults: FilterDefaults) -> Self {
        Self::load(AddressParams::parse(query), defaults)
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn address(&self) -> &AddressParams {
        &self.address
    }

    pub fn defaults(&self) -> &FilterDefaults {
        &self.defaults
    }

    pub fn query_string(&self) -> String {
        self.address.to_query_string()
    }

    /// Apply an update and patch the changed keys into the address.
    pub fn update(&mut self, update: &FilterUpdate) -> Result<Vec<FilterKey>> {
        let changed = self.state.apply(update)?;
        if !changed.is_empty() {
            patch_address(&mut self.address, &self.state, &changed);
            debug!(changed = ?changed, query = %self.address, "filter state updated");
        }
        Ok(changed)
    }

    pub fn set(&mut self, key: FilterKey, value: impl Into<String>) -> Result<Vec<FilterKey>> {
        self.update(&FilterUpdate::new().set(key, value))
    }

    pub fn set_page(&mut self, page: u64) -> Result<Vec<FilterKey>> {
        self.update(&FilterUpdate::new().page(page))
    }

    pub fn set_page_size(&mut self, page_size: u64) -> Result<Vec<FilterKey>> {
        self.update(&FilterUpdate::new().page_size(page_size))
    }

    /// Write the full state into the address (e.g. to make defaults explicit
    /// in a shared link).
    pub fn sync_address(&mut self) {
        write_filter_state(&mut self.address, &self.state);
    }

    /// Return every filter to its default.
    pub fn reset(&mut self) -> Vec<FilterKey> {
        let defaults = self.defaults.state().clone();
        let changed: Vec<FilterKey> = FilterKey::ALL
            .into_iter()
            .filter(|k| self.state.get(*k) != defaults.get(*k))
            .collect();
        self.state = defaults;
        patch_address(&mut self.address, &self.state, &changed);
        changed
    }
}
