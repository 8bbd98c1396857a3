//! Scoped context store
//!
//! Routes each request to its partition, builds the backend query and
//! normalizes the result:
//! - a lookup miss is `Ok(None)`, never an error
//! - backend failures surface unchanged, with no retry
//! - malformed requests fail before the backend is touched

use std::sync::Arc;

use serde_json::Value;

use crate::config::{CleanMatching, DeleteRouting, StoreConfig};
use crate::connection::{ConnectionManager, Connector};
use crate::error::Result;
use crate::memory::MemoryConnector;
use crate::query::{self, Key};

/// Key-value context store over global, flow and node partitions
pub struct ContextStore {
    connection: ConnectionManager,
    delete_routing: DeleteRouting,
    clean_matching: CleanMatching,
}

impl ContextStore {
    /// Create a store that connects through the given connector
    pub fn new(config: StoreConfig, connector: Arc<dyn Connector>) -> Self {
        tracing::info!(
            uri = %config.connection.redacted_uri(),
            delete_routing = ?config.delete_routing,
            clean_matching = ?config.clean_matching,
            "context store initialized"
        );
        Self {
            connection: ConnectionManager::new(connector, config.connection),
            delete_routing: config.delete_routing,
            clean_matching: config.clean_matching,
        }
    }

    /// Create a store over a fresh in-memory backend
    pub fn in_memory(config: StoreConfig) -> Self {
        Self::new(config, Arc::new(MemoryConnector::new()))
    }

    /// Create a store persisting to a sled database at `path`
    #[cfg(feature = "persistence")]
    pub fn with_sled(config: StoreConfig, path: impl Into<std::path::PathBuf>) -> Self {
        Self::new(config, Arc::new(crate::persistence::SledConnector::new(path)))
    }

    /// Open the backend connection
    pub async fn open(&self) -> Result<()> {
        self.connection.open().await
    }

    /// Close the backend connection
    pub async fn close(&self) -> Result<()> {
        self.connection.close().await
    }

    pub async fn is_open(&self) -> bool {
        self.connection.is_open().await
    }

    /// Get the value stored under `key` in `scope`.
    ///
    /// Batch keys fail with [`ContextError::Unsupported`](crate::ContextError::Unsupported).
    pub async fn get(&self, scope: &str, key: impl Into<Key>) -> Result<Option<Value>> {
        let query = query::get_query(scope, &key.into())?;
        let backend = self.connection.backend().await?;

        tracing::debug!(
            scope,
            collection = query.collection(),
            filter = %query.filter.to_document(),
            "context get"
        );

        let record = backend
            .find_one(query.collection(), &query.filter)
            .await
            .map_err(|e| {
                tracing::debug!(scope, error = %e, "context get failed");
                e
            })?;
        Ok(record.map(|r| r.value))
    }

    /// Store `value` under `key` in `scope`, replacing any previous value.
    ///
    /// A batch key takes an array `value` with one element per key; the keys
    /// are written one after another, not atomically.
    pub async fn set(&self, scope: &str, key: impl Into<Key>, value: Value) -> Result<()> {
        let upserts = query::set_queries(scope, key.into(), value)?;
        let backend = self.connection.backend().await?;

        for op in &upserts {
            tracing::debug!(
                scope,
                collection = op.collection(),
                filter = %op.filter.to_document(),
                "context set"
            );
            backend
                .update_one(op.collection(), &op.filter, &op.update)
                .await
                .map_err(|e| {
                    tracing::debug!(scope, error = %e, "context set failed");
                    e
                })?;
        }
        Ok(())
    }

    /// List the keys stored in `scope`, in no particular order
    pub async fn keys(&self, scope: &str) -> Result<Vec<String>> {
        let query = query::keys_query(scope);
        let backend = self.connection.backend().await?;

        tracing::debug!(scope, collection = query.collection(), "context keys");

        let records = backend
            .find(query.collection(), &query.filter, query.projection)
            .await?;
        Ok(records.into_iter().map(|r| r.key).collect())
    }

    /// Remove every key in `scope`, returning how many records were removed
    pub async fn delete(&self, scope: &str) -> Result<u64> {
        let query = query::delete_query(scope, self.delete_routing);
        let backend = self.connection.backend().await?;

        let removed = backend.delete_many(query.collection(), &query.filter).await?;
        tracing::debug!(scope, collection = query.collection(), removed, "context delete");
        Ok(removed)
    }

    /// Remove node-scoped records whose scope id is not in `active_nodes`.
    ///
    /// With [`CleanMatching::NodeId`] a node scope `n:f` also survives when
    /// its node id `n` is listed.
    pub async fn clean<S: AsRef<str>>(&self, active_nodes: &[S]) -> Result<u64> {
        let query = query::clean_query(active_nodes, self.clean_matching);
        let backend = self.connection.backend().await?;

        tracing::debug!(filter = %query.filter.to_document(), "context clean");

        let removed = backend.delete_many(query.collection(), &query.filter).await?;
        tracing::info!(active = active_nodes.len(), removed, "context store cleaned");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContextError;
    use serde_json::json;

    async fn open_store() -> ContextStore {
        let store = ContextStore::in_memory(StoreConfig::default());
        store.open().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = open_store().await;

        store.set("f1", "count", json!(5)).await.unwrap();
        assert_eq!(store.get("f1", "count").await.unwrap(), Some(json!(5)));
        assert_eq!(store.get("f1", "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_operations_require_open_connection() {
        let store = ContextStore::in_memory(StoreConfig::default());

        let err = store.get("f1", "k").await.unwrap_err();
        assert!(matches!(err, ContextError::NotConnected));
        assert!(store.set("f1", "k", json!(1)).await.unwrap_err().is_connectivity_error());
        assert!(store.keys("f1").await.unwrap_err().is_connectivity_error());
        assert!(store.delete("f1").await.unwrap_err().is_connectivity_error());
        assert!(store.clean(&["n1"]).await.unwrap_err().is_connectivity_error());
    }

    #[tokio::test]
    async fn test_batch_get_checked_before_connection() {
        // Unsupported wins over NotConnected: the request is rejected first
        let store = ContextStore::in_memory(StoreConfig::default());
        let err = store.get("f1", ["a", "b"]).await.unwrap_err();
        assert!(matches!(err, ContextError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_batch_set() {
        let store = open_store().await;

        store.set("f1", ["a", "b"], json!([1, "two"])).await.unwrap();
        assert_eq!(store.get("f1", "a").await.unwrap(), Some(json!(1)));
        assert_eq!(store.get("f1", "b").await.unwrap(), Some(json!("two")));

        let err = store.set("f1", ["a", "b"], json!(1)).await.unwrap_err();
        assert!(err.is_usage_error());
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let store = open_store().await;
        store.set("global", "k", json!(true)).await.unwrap();
        store.close().await.unwrap();
        store.open().await.unwrap();
        assert_eq!(store.get("GLOBAL", "k").await.unwrap(), Some(json!(true)));
    }
}
