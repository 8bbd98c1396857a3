//! Backend connection lifecycle
//!
//! [`ConnectionManager`] owns the single backend handle shared by every store
//! operation. Opening is serialized so concurrent `open` calls never create a
//! second connection.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::backend::Backend;
use crate::config::ConnectionConfig;
use crate::error::{ContextError, Result};

/// Factory for backend connections
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a connection for the given target
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Backend>>;
}

/// Owns the open/close state of one backend connection
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    config: ConnectionConfig,
    /// Held for the whole of open/close so lifecycle changes never interleave
    lifecycle: Mutex<()>,
    handle: RwLock<Option<Arc<dyn Backend>>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, config: ConnectionConfig) -> Self {
        Self {
            connector,
            config,
            lifecycle: Mutex::new(()),
            handle: RwLock::new(None),
        }
    }

    /// Open the connection. Does nothing if already open.
    pub async fn open(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        if self.handle.read().await.is_some() {
            tracing::debug!("context store already connected");
            return Ok(());
        }

        let backend = self.connector.connect(&self.config).await.map_err(|e| {
            tracing::warn!(
                uri = %self.config.redacted_uri(),
                error = %e,
                "context store connection failed"
            );
            e
        })?;
        *self.handle.write().await = Some(backend);

        tracing::info!(
            uri = %self.config.redacted_uri(),
            database = %self.config.database,
            "context store connected"
        );
        Ok(())
    }

    /// Close the connection. Safe to call when never opened.
    pub async fn close(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let Some(backend) = self.handle.write().await.take() else {
            return Ok(());
        };

        backend.close().await?;
        tracing::info!("context store closed");
        Ok(())
    }

    pub async fn is_open(&self) -> bool {
        self.handle.read().await.is_some()
    }

    /// Shared handle to the open backend
    pub async fn backend(&self) -> Result<Arc<dyn Backend>> {
        self.handle
            .read()
            .await
            .clone()
            .ok_or(ContextError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingConnector {
        connects: AtomicUsize,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Backend>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(Arc::new(MemoryBackend::new(config.database.clone())))
        }
    }

    struct RefusingConnector;

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(&self, _config: &ConnectionConfig) -> Result<Arc<dyn Backend>> {
            Err(ContextError::Connection("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let connector = Arc::new(CountingConnector::default());
        let manager = Arc::new(ConnectionManager::new(
            connector.clone(),
            ConnectionConfig::default(),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.open().await })
            })
            .collect();
        for result in futures::future::join_all(handles).await {
            result.unwrap().unwrap();
        }
        manager.open().await.unwrap();

        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert!(manager.is_open().await);
    }

    #[tokio::test]
    async fn test_close_without_open() {
        let manager = ConnectionManager::new(
            Arc::new(CountingConnector::default()),
            ConnectionConfig::default(),
        );
        manager.close().await.unwrap();
        manager.close().await.unwrap();
        assert!(matches!(
            manager.backend().await,
            Err(ContextError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_reopen_after_close() {
        let connector = Arc::new(CountingConnector::default());
        let manager = ConnectionManager::new(connector.clone(), ConnectionConfig::default());

        manager.open().await.unwrap();
        manager.close().await.unwrap();
        assert!(!manager.is_open().await);
        manager.open().await.unwrap();

        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert!(manager.backend().await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_open_reports_connectivity_error() {
        let manager =
            ConnectionManager::new(Arc::new(RefusingConnector), ConnectionConfig::default());
        let err = manager.open().await.unwrap_err();
        assert!(err.is_connectivity_error());
        assert!(!manager.is_open().await);
    }
}
