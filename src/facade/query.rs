//! Subscription-style wrapper over a request, for UI binding.

use std::sync::Arc;

use tokio::sync::watch;

use crate::classify::RejectError;
use crate::facade::call::{BackendCall, RequestOptions};
use crate::facade::request::RequestFacade;

/// Observable state of one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    /// Last successful value, kept across later failures.
    pub data: Option<T>,
    pub is_fetching: bool,
    /// Error of the most recent fetch, cleared by the next success.
    pub error: Option<RejectError>,
    /// Whether `data` was served from cache after a failed fetch.
    pub stale: bool,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            is_fetching: false,
            error: None,
            stale: false,
        }
    }
}

/// What a screen should render for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Loading,
    NoNetwork,
    Error,
    Empty,
    Content,
}

impl<T> QueryState<T> {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Project onto a [`ViewState`]; `is_empty` decides whether data counts as empty.
    ///
    /// Data, even stale, always wins over an error.
    pub fn view_state(&self, is_empty: impl FnOnce(&T) -> bool) -> ViewState {
        match (&self.data, &self.error) {
            (Some(data), _) if is_empty(data) => ViewState::Empty,
            (Some(_), _) => ViewState::Content,
            (None, _) if self.is_fetching => ViewState::Loading,
            (None, Some(RejectError::NetworkError | RejectError::Timeout)) => ViewState::NoNetwork,
            (None, Some(_)) => ViewState::Error,
            (None, None) => ViewState::Loading,
        }
    }
}

/// A request bound to fixed parameters whose state can be watched.
pub struct Query<C: BackendCall> {
    facade: RequestFacade,
    call: Arc<C>,
    params: C::Params,
    options: RequestOptions,
    state: watch::Sender<QueryState<C::Output>>,
}

impl<C> Query<C>
where
    C: BackendCall,
    C::Params: Clone,
    C::Output: Clone,
{
    pub fn new(facade: RequestFacade, call: Arc<C>, params: C::Params, options: RequestOptions) -> Self {
        let (state, _) = watch::channel(QueryState::default());
        Self {
            facade,
            call,
            params,
            options,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<QueryState<C::Output>> {
        self.state.subscribe()
    }

    pub fn state(&self) -> QueryState<C::Output> {
        self.state.borrow().clone()
    }

    /// Run the request and publish its outcome.
    pub async fn refetch(&self) {
        self.state.send_modify(|state| state.is_fetching = true);

        let result = self
            .facade
            .request(self.call.clone(), self.params.clone(), self.options.clone())
            .await;

        self.state.send_modify(|state| {
            state.is_fetching = false;
            match result {
                Ok(fetched) => {
                    state.stale = fetched.is_stale();
                    state.data = Some(fetched.data);
                    state.error = None;
                }
                Err(err) => state.error = Some(err),
            }
        });
    }
}
