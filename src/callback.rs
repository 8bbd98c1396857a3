//! Completion-callback front end for the context store
//!
//! Hosts that drive the store from callback-style code register a
//! continuation per call. The continuation receives `(error, result)` once
//! the backend finishes. Caller mistakes (no continuation, batch `get`,
//! malformed batch `set`) come back as `Err` from the call itself and the
//! backend is never contacted.

use std::sync::Arc;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::{ContextError, Result};
use crate::query::{self, Key};
use crate::store::ContextStore;

/// Continuation for `get`: `(error, value)`
pub type GetCallback = Box<dyn FnOnce(Option<ContextError>, Option<Value>) + Send + 'static>;

/// Continuation for `set`: `(error)`
pub type SetCallback = Box<dyn FnOnce(Option<ContextError>) + Send + 'static>;

/// Continuation for `keys`: `(error, keys)`
pub type KeysCallback =
    Box<dyn FnOnce(Option<ContextError>, Option<Vec<String>>) + Send + 'static>;

fn require<T>(on_done: Option<T>) -> Result<T> {
    on_done.ok_or_else(|| {
        ContextError::Usage("context store does not support synchronous access".into())
    })
}

fn runtime() -> Result<Handle> {
    Handle::try_current()
        .map_err(|e| ContextError::Usage(format!("no async runtime available: {}", e)))
}

/// Split a result into the two completion channels
fn channels<T>(result: Result<T>) -> (Option<ContextError>, Option<T>) {
    match result {
        Ok(value) => (None, Some(value)),
        Err(e) => (Some(e), None),
    }
}

/// Callback adapter over a shared [`ContextStore`]
#[derive(Clone)]
pub struct CallbackContextStore {
    store: Arc<ContextStore>,
}

impl CallbackContextStore {
    pub fn new(store: Arc<ContextStore>) -> Self {
        Self { store }
    }

    pub async fn open(&self) -> Result<()> {
        self.store.open().await
    }

    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }

    /// Look up `key` in `scope` and hand the value to `on_done`.
    ///
    /// A miss is delivered as `(None, None)`.
    pub fn get(
        &self,
        scope: impl Into<String>,
        key: impl Into<Key>,
        on_done: Option<GetCallback>,
    ) -> Result<JoinHandle<()>> {
        let on_done = require(on_done)?;
        let scope = scope.into();
        let key = key.into();
        query::get_query(&scope, &key)?;
        let handle = runtime()?;

        let store = self.store.clone();
        Ok(handle.spawn(async move {
            let (err, value) = channels(store.get(&scope, key).await);
            on_done(err, value.flatten());
        }))
    }

    /// Store `value` under `key` in `scope`, then call `on_done`
    pub fn set(
        &self,
        scope: impl Into<String>,
        key: impl Into<Key>,
        value: Value,
        on_done: Option<SetCallback>,
    ) -> Result<JoinHandle<()>> {
        let on_done = require(on_done)?;
        let scope = scope.into();
        let key = key.into();
        if key.is_batch() {
            query::set_queries(&scope, key.clone(), value.clone())?;
        }
        let handle = runtime()?;

        let store = self.store.clone();
        Ok(handle.spawn(async move {
            let (err, _) = channels(store.set(&scope, key, value).await);
            on_done(err);
        }))
    }

    /// List the keys in `scope` and hand them to `on_done`
    pub fn keys(
        &self,
        scope: impl Into<String>,
        on_done: Option<KeysCallback>,
    ) -> Result<JoinHandle<()>> {
        let on_done = require(on_done)?;
        let handle = runtime()?;

        let store = self.store.clone();
        let scope = scope.into();
        Ok(handle.spawn(async move {
            let (err, keys) = channels(store.keys(&scope).await);
            on_done(err, keys);
        }))
    }

    /// Remove every key in `scope`
    pub async fn delete(&self, scope: &str) -> Result<u64> {
        self.store.delete(scope).await
    }

    /// Drop node-scoped records of inactive nodes
    pub async fn clean<S: AsRef<str>>(&self, active_nodes: &[S]) -> Result<u64> {
        self.store.clean(active_nodes).await
    }
}
