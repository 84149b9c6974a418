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

//! Query dispatch with last-request-wins semantics
//!
//! A dispatcher owns the lifecycle of one view's query. Every issued request
//! is stamped with a generation; when a response arrives it is applied only
//! if no newer request has been issued since. Superseded requests are not
//! aborted, their results are simply dropped.

use crate::error::FetchError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Whether a parameter bundle may be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Run,
    /// A required parameter is missing: do not run, expose no error.
    Skip,
    /// The bundle is invalid: expose the error without sending anything.
    Reject(FetchError),
}

/// One kind of query a dispatcher can run.
#[async_trait]
pub trait DashboardQuery: Send + Sync + 'static {
    type Params: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;
    type Output: Clone + Send + Sync + 'static;

    fn gate(&self, _params: &Self::Params) -> Gate {
        Gate::Run
    }

    async fn execute(&self, params: Self::Params) -> Result<Self::Output, FetchError>;
}

/// Lifecycle exposed to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
    /// Not running because a required parameter is absent.
    Disabled,
    Pending,
    Failed(FetchError),
    Ready(T),
}

impl<T> QueryState<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, QueryState::Pending)
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, QueryState::Disabled)
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            QueryState::Ready(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            QueryState::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueryState<U> {
        match self {
            QueryState::Disabled => QueryState::Disabled,
            QueryState::Pending => QueryState::Pending,
            QueryState::Failed(e) => QueryState::Failed(e),
            QueryState::Ready(data) => QueryState::Ready(f(data)),
        }
    }
}

/// Handle for one issued request.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket<P> {
    generation: u64,
    params: P,
}

impl<P> Ticket<P> {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn params(&self) -> &P {
        &self.params
    }
}

struct DispatchState<Q: DashboardQuery> {
    generation: u64,
    params: Option<Q::Params>,
    state: QueryState<Q::Output>,
}

/// Runs one [`DashboardQuery`] and tracks its latest result.
///
/// Cloning yields another handle onto the same dispatcher.
pub struct QueryDispatcher<Q: DashboardQuery> {
    query: Arc<Q>,
    inner: Arc<Mutex<DispatchState<Q>>>,
}

impl<Q: DashboardQuery> Clone for QueryDispatcher<Q> {
    fn clone(&self) -> Self {
        Self {
            query: Arc::clone(&self.query),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Q: DashboardQuery> QueryDispatcher<Q> {
    pub fn new(query: Q) -> Self {
        Self {
            query: Arc::new(query),
            inner: Arc::new(Mutex::new(DispatchState {
                generation: 0,
                params: None,
                state: QueryState::Disabled,
            })),
        }
    }

    pub fn query(&self) -> &Q {
        &self.query
    }

    pub fn state(&self) -> QueryState<Q::Output> {
        self.inner.lock().state.clone()
    }

    pub fn params(&self) -> Option<Q::Params> {
        self.inner.lock().params.clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Register a new parameter bundle.
    ///
    /// Returns a ticket to execute when a fetch is needed. Nothing is issued
    /// when the bundle equals the current one; `None` params disable the
    /// query.
    pub fn issue(&self, params: Option<Q::Params>) -> Option<Ticket<Q::Params>> {
        let mut inner = self.inner.lock();
        if inner.params == params && inner.generation > 0 {
            return None;
        }
        self.start(&mut inner, params)
    }

    /// Re-issue the current bundle even though it has not changed.
    pub fn refresh(&self) -> Option<Ticket<Q::Params>> {
        let mut inner = self.inner.lock();
        let params = inner.params.clone();
        self.start(&mut inner, params)
    }

    fn start(
        &self,
        inner: &mut DispatchState<Q>,
        params: Option<Q::Params>,
    ) -> Option<Ticket<Q::Params>> {
        inner.generation += 1;
        inner.params = params.clone();
        let Some(params) = params else {
            inner.state = QueryState::Disabled;
            return None;
        };
        match self.query.gate(&params) {
            Gate::Run => {
                inner.state = QueryState::Pending;
                debug!(generation = inner.generation, params = ?params, "query issued");
                Some(Ticket {
                    generation: inner.generation,
                    params,
                })
            }
            Gate::Skip => {
                inner.state = QueryState::Disabled;
                debug!(params = ?params, "query disabled");
                None
            }
            Gate::Reject(e) => {
                debug!(error = %e, "query rejected before dispatch");
                inner.state = QueryState::Failed(e);
                None
            }
        }
    }

    /// Apply a result if its ticket is still the latest. Returns whether the
    /// state changed.
    pub fn resolve(
        &self,
        ticket: &Ticket<Q::Params>,
        result: Result<Q::Output, FetchError>,
    ) -> bool {
        let mut inner = self.inner.lock();
        if ticket.generation != inner.generation {
            debug!(
                stale = ticket.generation,
                current = inner.generation,
                "discarding stale query result"
            );
            return false;
        }
        inner.state = match result {
            Ok(data) => QueryState::Ready(data),
            Err(e) => QueryState::Failed(e),
        };
        true
    }

    /// Run the query for a ticket and apply its result.
    pub async fn execute(&self, ticket: Ticket<Q::Params>) -> bool {
        let result = self.query.execute(ticket.params.clone()).await;
        self.resolve(&ticket, result)
    }

    /// Issue and run in one step; returns the resulting state.
    pub async fn update(&self, params: Option<Q::Params>) -> QueryState<Q::Output> {
        if let Some(ticket) = self.issue(params) {
            self.execute(ticket).await;
        }
        self.state()
    }

    /// Refresh and run in one step.
    pub async fn reload(&self) -> QueryState<Q::Output> {
        if let Some(ticket) = self.refresh() {
            self.execute(ticket).await;
        }
        self.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    /// Resolves each parameter value only when the test releases it.
    struct GatedQuery {
        pending: Mutex<HashMap<u32, oneshot::Receiver<Result<String, FetchError>>>>,
        calls: AtomicUsize,
    }

    impl GatedQuery {
        fn new(gates: Vec<(u32, oneshot::Receiver<Result<String, FetchError>>)>) -> Self {
            Self {
                pending: Mutex::new(gates.into_iter().collect()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DashboardQuery for GatedQuery {
        type Params = u32;
        type Output = String;

        fn gate(&self, params: &u32) -> Gate {
            match params {
                0 => Gate::Skip,
                99 => Gate::Reject(FetchError::new("invalid_filter", "99 is not allowed")),
                _ => Gate::Run,
            }
        }

        async fn execute(&self, params: u32) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let rx = self.pending.lock().remove(&params);
            match rx {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(FetchError::transport("gate dropped"))),
                None => Ok(format!("value-{}", params)),
            }
        }
    }

    #[tokio::test]
    async fn test_stale_result_is_discarded() {
        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();
        let dispatcher = QueryDispatcher::new(GatedQuery::new(vec![(1, rx_a), (2, rx_b)]));

        let ticket_a = dispatcher.issue(Some(1)).unwrap();
        let first = tokio::spawn({
            let d = dispatcher.clone();
            async move { d.execute(ticket_a).await }
        });
        let ticket_b = dispatcher.issue(Some(2)).unwrap();
        let second = tokio::spawn({
            let d = dispatcher.clone();
            async move { d.execute(ticket_b).await }
        });
        assert!(dispatcher.state().is_pending());

        tx_b.send(Ok("B".to_string())).unwrap();
        assert!(second.await.unwrap());
        tx_a.send(Ok("A".to_string())).unwrap();
        assert!(!first.await.unwrap());

        assert_eq!(dispatcher.state(), QueryState::Ready("B".to_string()));
    }

    #[tokio::test]
    async fn test_stale_error_is_discarded() {
        let dispatcher = QueryDispatcher::new(GatedQuery::new(vec![]));
        let old = dispatcher.issue(Some(1)).unwrap();
        let new = dispatcher.issue(Some(2)).unwrap();
        assert!(dispatcher.resolve(&new, Ok("new".into())));
        assert!(!dispatcher.resolve(&old, Err(FetchError::transport("late failure"))));
        assert_eq!(dispatcher.state().data().map(String::as_str), Some("new"));
    }

    #[tokio::test]
    async fn test_unchanged_params_do_not_refetch() {
        let dispatcher = QueryDispatcher::new(GatedQuery::new(vec![]));
        dispatcher.update(Some(5)).await;
        dispatcher.update(Some(5)).await;
        assert_eq!(dispatcher.query().calls.load(Ordering::SeqCst), 1);

        dispatcher.reload().await;
        assert_eq!(dispatcher.query().calls.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.state(), QueryState::Ready("value-5".to_string()));
    }

    #[tokio::test]
    async fn test_disabled_is_not_an_error() {
        let dispatcher = QueryDispatcher::new(GatedQuery::new(vec![]));
        assert!(dispatcher.state().is_disabled());
        let state = dispatcher.update(Some(0)).await;
        assert!(state.is_disabled());
        assert!(state.error().is_none());
        assert!(dispatcher.update(None).await.is_disabled());
        assert_eq!(dispatcher.query().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disabling_discards_in_flight() {
        let dispatcher = QueryDispatcher::new(GatedQuery::new(vec![]));
        let ticket = dispatcher.issue(Some(3)).unwrap();
        dispatcher.issue(None);
        assert!(!dispatcher.execute(ticket).await);
        assert!(dispatcher.state().is_disabled());
    }

    #[tokio::test]
    async fn test_rejected_params_surface_error_without_fetch() {
        let dispatcher = QueryDispatcher::new(GatedQuery::new(vec![]));
        let state = dispatcher.update(Some(99)).await;
        assert_eq!(state.error().unwrap().code, "invalid_filter");
        assert_eq!(dispatcher.query().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_server_error_surfaces_verbatim() {
        let (tx, rx) = oneshot::channel();
        let dispatcher = QueryDispatcher::new(GatedQuery::new(vec![(7, rx)]));
        let ticket = dispatcher.issue(Some(7)).unwrap();
        tx.send(Err(FetchError::server(503, "upstream_unavailable", "try later")))
            .unwrap();
        dispatcher.execute(ticket).await;
        let state = dispatcher.state();
        let error = state.error().unwrap();
        assert_eq!(error.status, Some(503));
        assert_eq!(error.code, "upstream_unavailable");
        assert_eq!(dispatcher.query().calls.load(Ordering::SeqCst), 1);
    }
}
