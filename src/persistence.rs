//! Sled-backed persistent backend
//!
//! Each `<database>.<collection>` pair maps to its own sled tree. Records are
//! stored as JSON under a key derived from their `(id, key)` identity, so the
//! uniqueness of a record per scope and key falls out of the tree itself.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::backend::{Backend, Record, UpdateResult};
use crate::config::ConnectionConfig;
use crate::connection::Connector;
use crate::error::{ContextError, Result};
use crate::query::{Filter, Projection, Update};

/// Connector opening a sled database at a fixed path
///
/// The database is opened once and reused by every later connect. Sled holds
/// a file lock for as long as any handle lives, so reopening the path while a
/// backend from an earlier connect is still in use would fail.
#[derive(Clone)]
pub struct SledConnector {
    path: PathBuf,
    db: Arc<Mutex<Option<sled::Db>>>,
}

impl SledConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            db: Arc::new(Mutex::new(None)),
        }
    }

    async fn database(&self) -> Result<sled::Db> {
        let mut cached = self.db.lock().await;
        if let Some(db) = cached.as_ref() {
            return Ok(db.clone());
        }

        // Ensure directory exists
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = sled::open(&self.path).map_err(|e| {
            ContextError::Connection(format!(
                "failed to open sled database at {}: {}",
                self.path.display(),
                e
            ))
        })?;
        tracing::debug!(path = %self.path.display(), "opened sled database");

        *cached = Some(db.clone());
        Ok(db)
    }
}

impl std::fmt::Debug for SledConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledConnector")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for SledConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Backend>> {
        let db = self.database().await?;
        Ok(Arc::new(SledBackend::new(db, config.database.clone())))
    }
}

/// Backend storing records in sled trees
pub struct SledBackend {
    db: sled::Db,
    database: String,
}

impl SledBackend {
    pub fn new(db: sled::Db, database: impl Into<String>) -> Self {
        Self {
            db,
            database: database.into(),
        }
    }

    fn tree(&self, collection: &str) -> Result<sled::Tree> {
        Ok(self.db.open_tree(format!("{}.{}", self.database, collection))?)
    }

    fn record_key(id: &Option<String>, key: &str) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&(id, key))?)
    }

    fn scan(&self, tree: &sled::Tree, filter: &Filter) -> Result<Vec<(sled::IVec, Record)>> {
        let mut matched = Vec::new();
        for item in tree.iter() {
            let (k, v) = item?;
            let record: Record = serde_json::from_slice(&v)?;
            if record.matches(filter) {
                matched.push((k, record));
            }
        }
        Ok(matched)
    }
}

#[async_trait]
impl Backend for SledBackend {
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Record>> {
        let tree = self.tree(collection)?;

        if let Some((id, key)) = filter.identity() {
            if let Some(data) = tree.get(Self::record_key(&id, &key)?)? {
                return Ok(Some(serde_json::from_slice(&data)?));
            }
            if id.is_some() {
                return Ok(None);
            }
        }

        Ok(self.scan(&tree, filter)?.into_iter().next().map(|(_, r)| r))
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Projection,
    ) -> Result<Vec<Record>> {
        let tree = self.tree(collection)?;
        Ok(self
            .scan(&tree, filter)?
            .into_iter()
            .map(|(_, r)| r.project(projection))
            .collect())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult> {
        let (id, key) = filter.identity().ok_or_else(|| {
            ContextError::InvalidQuery(format!(
                "update filter must identify one record: {}",
                filter.to_document()
            ))
        })?;

        let tree = self.tree(collection)?;
        let record_key = Self::record_key(&id, &key)?;

        if !update.upsert && !tree.contains_key(&record_key)? {
            return Ok(UpdateResult::default());
        }

        let record = Record {
            id,
            key,
            value: update.value.clone(),
            updated_at: Utc::now(),
        };
        let previous = tree.insert(record_key, serde_json::to_vec(&record)?)?;
        tree.flush_async().await?;

        Ok(UpdateResult {
            matched: u64::from(previous.is_some()),
            upserted: previous.is_none(),
        })
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let tree = self.tree(collection)?;
        let matched = self.scan(&tree, filter)?;

        let mut batch = sled::Batch::default();
        for (k, _) in &matched {
            batch.remove(k.clone());
        }
        tree.apply_batch(batch)?;
        tree.flush_async().await?;

        Ok(matched.len() as u64)
    }

    async fn close(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}
