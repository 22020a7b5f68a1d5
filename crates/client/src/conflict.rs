//! Routes HTTP 409 responses into a confirm-and-refresh flow.
//!
//! When a save is rejected because someone else changed the resource, the
//! handler records the conflict instead of surfacing it as a failure. The
//! UI then either confirms (reload the fresh data) or dismisses.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;

use crate::api::{find_api_error, ApiError};

type RefreshFn = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictState {
    pub open: bool,
    pub detail: Option<String>,
}

pub struct ConflictHandler {
    state: Mutex<ConflictState>,
    on_refresh: RefreshFn,
}

impl ConflictHandler {
    /// `on_refresh` reloads the conflicted data; it runs on [`confirm`](Self::confirm).
    pub fn new<F>(on_refresh: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(ConflictState::default()),
            on_refresh: Box::new(on_refresh),
        }
    }

    fn state(&self) -> MutexGuard<'_, ConflictState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the conflict state if `err` is (or wraps) a conflict.
    pub fn handle(&self, err: &(dyn std::error::Error + 'static)) -> bool {
        let Some(api) = find_api_error(err).filter(|e| e.is_conflict()) else {
            return false;
        };
        let detail = api.conflict_detail().map(str::to_string);
        tracing::info!(detail = detail.as_deref().unwrap_or(""), "Edit conflict detected");

        let mut state = self.state();
        state.open = true;
        state.detail = detail;
        true
    }

    /// Run `op`, absorbing a conflict into the handler.
    ///
    /// Conflict -> `Ok(None)`; other errors propagate unchanged.
    pub async fn with_handling<T, Fut>(&self, op: Fut) -> Result<Option<T>, ApiError>
    where
        Fut: Future<Output = Result<T, ApiError>>,
    {
        match op.await {
            Ok(value) => Ok(Some(value)),
            Err(err) if self.handle(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Close the conflict and reload.
    pub async fn confirm(&self) {
        {
            let mut state = self.state();
            state.open = false;
            state.detail = None;
        }
        (self.on_refresh)().await;
    }

    /// Close the conflict without reloading. Local edits are kept.
    pub fn cancel(&self) {
        *self.state() = ConflictState::default();
    }

    pub fn is_open(&self) -> bool {
        self.state().open
    }

    pub fn detail(&self) -> Option<String> {
        self.state().detail.clone()
    }

    pub fn snapshot(&self) -> ConflictState {
        self.state().clone()
    }
}
