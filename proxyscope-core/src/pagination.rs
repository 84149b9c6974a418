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

//! Page arithmetic for server-paginated listings.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Derived pagination state. Never edited by hand: build it with
/// [`PageInfo::compute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    /// 1-based page index, clamped into `[1, max(total_pages, 1)]`
    pub page_index: u64,
    pub page_size: u64,
    pub total_pages: u64,
    pub total_elements: u64,
}

/// Number of pages needed for `total_elements` rows.
pub fn total_pages(total_elements: u64, page_size: u64) -> u64 {
    total_elements.div_ceil(page_size.max(1))
}

impl PageInfo {
    /// Clamp a requested page against the known totals.
    ///
    /// A zero page size is clamped to 1. Out-of-range pages clamp silently.
    pub fn compute(requested_page: u64, page_size: u64, total_elements: u64) -> Self {
        let page_size = if page_size == 0 {
            warn!("page_size 0 requested, clamping to 1");
            1
        } else {
            page_size
        };
        let total_pages = total_pages(total_elements, page_size);
        Self {
            page_index: requested_page.clamp(1, total_pages.max(1)),
            page_size,
            total_pages,
            total_elements,
        }
    }

    /// Rows skipped before this page.
    pub fn offset(&self) -> u64 {
        (self.page_index - 1).saturating_mul(self.page_size)
    }

    pub fn can_previous(&self) -> bool {
        self.page_index > 1
    }

    pub fn can_next(&self) -> bool {
        self.page_index < self.total_pages
    }

    pub fn previous(&self) -> Option<u64> {
        self.can_previous().then(|| self.page_index - 1)
    }

    pub fn next(&self) -> Option<u64> {
        self.can_next().then(|| self.page_index + 1)
    }

    /// `None` when already on the first page.
    pub fn first(&self) -> Option<u64> {
        (self.page_index != 1).then_some(1)
    }

    /// `None` when already on the last page (or there are no pages).
    pub fn last(&self) -> Option<u64> {
        (self.total_pages > 0 && self.page_index != self.total_pages).then_some(self.total_pages)
    }

    /// Target page for an arbitrary jump, clamped; `None` if it is the
    /// current page.
    pub fn jump_to(&self, page: u64) -> Option<u64> {
        let target = page.clamp(1, self.total_pages.max(1));
        (target != self.page_index).then_some(target)
    }

    /// Page sizes are not comparable, so a new size starts at page 1.
    pub fn with_page_size(&self, page_size: u64) -> Self {
        Self::compute(1, page_size, self.total_elements)
    }

    pub fn is_empty(&self) -> bool {
        self.total_elements == 0
    }
}
