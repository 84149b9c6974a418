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

//! Parameterized transaction listings
//!
//! Every table in the dashboard (the full transactions table, the
//! per-project latest panel) is the same pipeline: a [`FilterStore`] bound to
//! the address, a dispatcher for the transactions endpoint, and a
//! [`ListingDescriptor`] describing columns and defaults.

use crate::dispatcher::{DashboardQuery, Gate, QueryDispatcher, QueryState, Ticket};
use crate::error::FetchError;
use crate::source::DashboardSource;
use async_trait::async_trait;
use proxyscope_core::{
    AddressParams, FilterDefaults, FilterKey, FilterState, FilterStore, FilterUpdate,
    ListingConfig, PageInfo, ProxyscopeError, SortOrder, TransactionField, TransactionPage,
    TransactionRecord,
};
use std::sync::Arc;
use tracing::debug;

/// One table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub title: String,
    pub field: TransactionField,
    pub sortable: bool,
}

impl ColumnDescriptor {
    pub fn new(title: impl Into<String>, field: TransactionField) -> Self {
        Self {
            title: title.into(),
            field,
            sortable: false,
        }
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }
}

/// Declarative description of a listing view.
#[derive(Debug, Clone)]
pub struct ListingDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub defaults: FilterDefaults,
    /// Disable the query until a project is chosen.
    pub requires_project: bool,
}

impl ListingDescriptor {
    /// The main transactions table.
    pub fn transactions(config: &ListingConfig) -> Self {
        Self {
            name: "transactions".to_string(),
            columns: vec![
                ColumnDescriptor::new("Time", TransactionField::CreatedAt).sortable(),
                ColumnDescriptor::new("Project", TransactionField::ProjectId),
                ColumnDescriptor::new("Provider", TransactionField::Provider),
                ColumnDescriptor::new("Model", TransactionField::Model).sortable(),
                ColumnDescriptor::new("Status", TransactionField::StatusCode).sortable(),
                ColumnDescriptor::new("Latency (ms)", TransactionField::LatencyMs).sortable(),
                ColumnDescriptor::new("Tokens", TransactionField::TotalTokens),
                ColumnDescriptor::new("Cost ($)", TransactionField::Cost).sortable(),
                ColumnDescriptor::new("Tags", TransactionField::Tags),
            ],
            defaults: FilterDefaults::listing(config.default_page_size),
            requires_project: false,
        }
    }

    /// Latest transactions of one project, newest first.
    pub fn latest_for_project(project_id: &str, config: &ListingConfig) -> Self {
        Self {
            name: "latest".to_string(),
            columns: vec![
                ColumnDescriptor::new("Time", TransactionField::CreatedAt),
                ColumnDescriptor::new("Model", TransactionField::Model),
                ColumnDescriptor::new("Status", TransactionField::StatusCode),
                ColumnDescriptor::new("Latency (ms)", TransactionField::LatencyMs),
                ColumnDescriptor::new("Cost ($)", TransactionField::Cost),
            ],
            defaults: FilterDefaults::listing(config.latest_page_size)
                .with_project(project_id)
                .with_sort(TransactionField::CreatedAt.as_str(), SortOrder::Desc),
            requires_project: true,
        }
    }

    pub fn header(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.title.as_str()).collect()
    }

    pub fn row(&self, record: &TransactionRecord) -> Vec<String> {
        self.columns.iter().map(|c| c.field.display(record)).collect()
    }

    pub fn is_sortable(&self, field: TransactionField) -> bool {
        self.columns.iter().any(|c| c.field == field && c.sortable)
    }
}

/// Transactions endpoint as a dispatchable query.
pub struct TransactionsQuery {
    source: Arc<dyn DashboardSource>,
    requires_project: bool,
}

impl TransactionsQuery {
    pub fn new(source: Arc<dyn DashboardSource>, requires_project: bool) -> Self {
        Self {
            source,
            requires_project,
        }
    }
}

#[async_trait]
impl DashboardQuery for TransactionsQuery {
    type Params = FilterState;
    type Output = TransactionPage;

    fn gate(&self, filters: &FilterState) -> Gate {
        if self.requires_project && filters.project_id().is_none() {
            return Gate::Skip;
        }
        match filters.validate() {
            Ok(()) => Gate::Run,
            Err(e) => Gate::Reject(e.into()),
        }
    }

    async fn execute(&self, filters: FilterState) -> Result<TransactionPage, FetchError> {
        self.source.fetch_transactions(&filters).await
    }
}

/// Filter state, address and query of one listing view.
pub struct ListingPipeline {
    descriptor: ListingDescriptor,
    store: FilterStore,
    dispatcher: QueryDispatcher<TransactionsQuery>,
    config: ListingConfig,
}

impl ListingPipeline {
    pub fn new(
        descriptor: ListingDescriptor,
        source: Arc<dyn DashboardSource>,
        address: AddressParams,
        config: &ListingConfig,
    ) -> Self {
        let store = FilterStore::load(address, descriptor.defaults.clone());
        let dispatcher =
            QueryDispatcher::new(TransactionsQuery::new(source, descriptor.requires_project));
        Self {
            descriptor,
            store,
            dispatcher,
            config: config.clone(),
        }
    }

    pub fn descriptor(&self) -> &ListingDescriptor {
        &self.descriptor
    }

    pub fn filters(&self) -> &FilterState {
        self.store.state()
    }

    pub fn address(&self) -> &AddressParams {
        self.store.address()
    }

    pub fn query_string(&self) -> String {
        self.store.query_string()
    }

    pub fn dispatcher(&self) -> &QueryDispatcher<TransactionsQuery> {
        &self.dispatcher
    }

    pub fn state(&self) -> QueryState<TransactionPage> {
        self.dispatcher.state()
    }

    /// Pagination of the last loaded page, taken from the response envelope.
    ///
    /// The server may serve a different page size than requested (a server
    /// side cap), so the requested filters are not used here.
    pub fn page_info(&self) -> Option<PageInfo> {
        let state = self.state();
        let page = state.data()?;
        Some(PageInfo::compute(
            page.page_index,
            page.page_size,
            page.total_elements,
        ))
    }

    /// Table rows for the last loaded page.
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.state()
            .data()
            .map(|page| page.items.iter().map(|r| self.descriptor.row(r)).collect())
            .unwrap_or_default()
    }

    /// A loaded page with zero rows, as opposed to an error or no query.
    pub fn is_empty_result(&self) -> bool {
        self.state().data().is_some_and(|page| page.items.is_empty())
    }

    /// Apply an update without fetching; returns the ticket to execute when
    /// the effective filters changed.
    pub fn prepare(
        &mut self,
        update: &FilterUpdate,
    ) -> Result<Option<Ticket<FilterState>>, ProxyscopeError> {
        let update = self.clamp_page_size(update);
        self.store.update(&update)?;
        Ok(self.dispatcher.issue(Some(self.store.state().clone())))
    }

    /// Fetch for the current filters (no-op if they were already fetched).
    pub async fn load(&mut self) -> QueryState<TransactionPage> {
        if let Some(ticket) = self.dispatcher.issue(Some(self.store.state().clone())) {
            self.dispatcher.execute(ticket).await;
        }
        self.clamp_to_loaded_page().await
    }

    /// Re-fetch the current filters.
    pub async fn refresh(&mut self) -> QueryState<TransactionPage> {
        self.dispatcher.reload().await;
        self.clamp_to_loaded_page().await
    }

    pub async fn apply(
        &mut self,
        update: &FilterUpdate,
    ) -> Result<QueryState<TransactionPage>, ProxyscopeError> {
        if let Some(ticket) = self.prepare(update)? {
            self.dispatcher.execute(ticket).await;
        }
        Ok(self.clamp_to_loaded_page().await)
    }

    pub async fn set_filter(
        &mut self,
        key: FilterKey,
        value: &str,
    ) -> Result<QueryState<TransactionPage>, ProxyscopeError> {
        self.apply(&FilterUpdate::new().set(key, value)).await
    }

    /// Jump to a page, clamped against the last known totals.
    pub async fn go_to_page(
        &mut self,
        page: u64,
    ) -> Result<QueryState<TransactionPage>, ProxyscopeError> {
        let target = match self.page_info() {
            Some(info) => page.clamp(1, info.total_pages.max(1)),
            None => page.max(1),
        };
        self.apply(&FilterUpdate::new().page(target)).await
    }

    pub async fn next_page(&mut self) -> Result<QueryState<TransactionPage>, ProxyscopeError> {
        self.navigate(PageInfo::next).await
    }

    pub async fn previous_page(&mut self) -> Result<QueryState<TransactionPage>, ProxyscopeError> {
        self.navigate(PageInfo::previous).await
    }

    pub async fn first_page(&mut self) -> Result<QueryState<TransactionPage>, ProxyscopeError> {
        self.navigate(PageInfo::first).await
    }

    pub async fn last_page(&mut self) -> Result<QueryState<TransactionPage>, ProxyscopeError> {
        self.navigate(PageInfo::last).await
    }

    async fn navigate(
        &mut self,
        step: fn(&PageInfo) -> Option<u64>,
    ) -> Result<QueryState<TransactionPage>, ProxyscopeError> {
        match self.page_info().as_ref().and_then(step) {
            Some(page) => self.go_to_page(page).await,
            None => Ok(self.state()),
        }
    }

    /// Change the page size; the page goes back to 1.
    pub async fn set_page_size(
        &mut self,
        page_size: u64,
    ) -> Result<QueryState<TransactionPage>, ProxyscopeError> {
        self.apply(&FilterUpdate::new().page_size(page_size)).await
    }

    /// Sort by a sortable column; other fields are ignored.
    pub async fn sort_by(
        &mut self,
        field: TransactionField,
        order: SortOrder,
    ) -> Result<QueryState<TransactionPage>, ProxyscopeError> {
        if !self.descriptor.is_sortable(field) {
            debug!(field = %field, view = %self.descriptor.name, "ignoring sort on unsortable column");
            return Ok(self.state());
        }
        let sort_type = if order == SortOrder::Asc { "asc" } else { "" };
        self.apply(
            &FilterUpdate::new()
                .set(FilterKey::SortField, field.as_str())
                .set(FilterKey::SortType, sort_type),
        )
        .await
    }

    pub async fn reset(&mut self) -> QueryState<TransactionPage> {
        self.store.reset();
        self.load().await
    }

    fn clamp_page_size(&self, update: &FilterUpdate) -> FilterUpdate {
        let mut clamped = FilterUpdate::new();
        for (key, value) in update.entries() {
            let value = match (key, value.trim().parse::<u64>()) {
                (FilterKey::PageSize, Ok(size)) if size > self.config.max_page_size => {
                    self.config.clamp_page_size(size).to_string()
                }
                _ => value.clone(),
            };
            clamped = clamped.set(*key, value);
        }
        clamped
    }

    /// When the server reports fewer pages than the filters ask for, move
    /// the filter (and the address) onto the last real page and fetch it.
    async fn clamp_to_loaded_page(&mut self) -> QueryState<TransactionPage> {
        let Some(info) = self.page_info() else {
            return self.state();
        };
        if info.page_index == self.store.state().page() {
            return self.state();
        }
        debug!(
            requested = self.store.state().page(),
            clamped = info.page_index,
            "requested page beyond total, clamping"
        );
        match self.prepare(&FilterUpdate::new().page(info.page_index)) {
            Ok(Some(ticket)) => {
                self.dispatcher.execute(ticket).await;
            }
            Ok(None) => {}
            Err(e) => debug!(error = %e, "page clamp rejected"),
        }
        self.state()
    }
}
