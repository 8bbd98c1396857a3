//! In-memory backend
//!
//! Collections live in a map shared between the connector and every backend
//! it hands out, so closing and reopening a store keeps its data for the
//! lifetime of the connector.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::backend::{Backend, Record, UpdateResult};
use crate::config::ConnectionConfig;
use crate::connection::Connector;
use crate::error::{ContextError, Result};
use crate::query::{Filter, Projection, Update};

type RecordKey = (Option<String>, String);
type Collection = HashMap<RecordKey, Record>;
type Collections = Arc<RwLock<HashMap<String, Collection>>>;

/// Connector producing [`MemoryBackend`]s over one shared data set
#[derive(Clone, Default)]
pub struct MemoryConnector {
    collections: Collections,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Backend>> {
        Ok(Arc::new(MemoryBackend {
            collections: self.collections.clone(),
            database: config.database.clone(),
        }))
    }
}

/// Backend keeping records in process memory
pub struct MemoryBackend {
    collections: Collections,
    database: String,
}

impl MemoryBackend {
    /// Standalone backend with its own empty data set
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            collections: Collections::default(),
            database: database.into(),
        }
    }

    fn namespace(&self, collection: &str) -> String {
        format!("{}.{}", self.database, collection)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Record>> {
        let collections = self.collections.read().await;
        let Some(records) = collections.get(&self.namespace(collection)) else {
            return Ok(None);
        };

        if let Some(identity) = filter.identity() {
            if let Some(record) = records.get(&identity) {
                return Ok(Some(record.clone()));
            }
            // a key-only filter still matches records carrying a scope id
            if identity.0.is_some() {
                return Ok(None);
            }
        }

        Ok(records.values().find(|r| r.matches(filter)).cloned())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Projection,
    ) -> Result<Vec<Record>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&self.namespace(collection))
            .map(|records| {
                records
                    .values()
                    .filter(|r| r.matches(filter))
                    .map(|r| r.clone().project(projection))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult> {
        let identity = filter.identity().ok_or_else(|| {
            ContextError::InvalidQuery(format!(
                "update filter must identify one record: {}",
                filter.to_document()
            ))
        })?;

        let mut collections = self.collections.write().await;
        let records = collections.entry(self.namespace(collection)).or_default();

        if let Some(existing) = records.get_mut(&identity) {
            existing.value = update.value.clone();
            existing.updated_at = Utc::now();
            return Ok(UpdateResult {
                matched: 1,
                upserted: false,
            });
        }

        if !update.upsert {
            return Ok(UpdateResult::default());
        }

        let record = Record::new(identity.0.clone(), identity.1.clone(), update.value.clone());
        records.insert(identity, record);
        Ok(UpdateResult {
            matched: 0,
            upserted: true,
        })
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let mut collections = self.collections.write().await;
        let Some(records) = collections.get_mut(&self.namespace(collection)) else {
            return Ok(0);
        };

        let before = records.len();
        records.retain(|_, r| !r.matches(filter));
        Ok((before - records.len()) as u64)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upsert(value: serde_json::Value) -> Update {
        Update {
            value,
            upsert: true,
        }
    }

    #[tokio::test]
    async fn test_upsert_then_find() {
        let backend = MemoryBackend::new("test");
        let filter = Filter::scope("f1").with_key("a");

        let result = backend.update_one("ctxflow", &filter, &upsert(json!(1))).await.unwrap();
        assert!(result.upserted);

        let result = backend.update_one("ctxflow", &filter, &upsert(json!(2))).await.unwrap();
        assert_eq!(result.matched, 1);
        assert!(!result.upserted);

        let record = backend.find_one("ctxflow", &filter).await.unwrap().unwrap();
        assert_eq!(record.value, json!(2));
        assert_eq!(record.id.as_deref(), Some("f1"));

        let all = backend.find("ctxflow", &Filter::all(), Projection::Full).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_update_without_upsert_creates_nothing() {
        let backend = MemoryBackend::new("test");
        let filter = Filter::all().with_key("a");
        let update = Update {
            value: json!(1),
            upsert: false,
        };

        let result = backend.update_one("ctxglobal", &filter, &update).await.unwrap();
        assert_eq!(result, UpdateResult::default());
        assert!(backend.find_one("ctxglobal", &filter).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_rejects_non_point_filter() {
        let backend = MemoryBackend::new("test");
        let err = backend
            .update_one("ctxflow", &Filter::scope("f1"), &upsert(json!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_projection_and_delete() {
        let backend = MemoryBackend::new("test");
        for key in ["a", "b"] {
            backend
                .update_one("ctxnode", &Filter::scope("n1:f1").with_key(key), &upsert(json!(key)))
                .await
                .unwrap();
        }

        let projected = backend
            .find("ctxnode", &Filter::scope("n1:f1"), Projection::ExcludeValue)
            .await
            .unwrap();
        assert!(projected.iter().all(|r| r.value.is_null()));

        let removed = backend.delete_many("ctxnode", &Filter::scope("n1:f1")).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(backend.delete_many("ctxnode", &Filter::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_databases_are_isolated() {
        let connector = MemoryConnector::new();
        let a = connector.connect(&ConnectionConfig::for_database("a")).await.unwrap();
        let b = connector.connect(&ConnectionConfig::for_database("b")).await.unwrap();
        let filter = Filter::all().with_key("k");

        a.update_one("ctxglobal", &filter, &upsert(json!(1))).await.unwrap();
        assert!(b.find_one("ctxglobal", &filter).await.unwrap().is_none());

        let a_again = connector.connect(&ConnectionConfig::for_database("a")).await.unwrap();
        assert!(a_again.find_one("ctxglobal", &filter).await.unwrap().is_some());
    }
}
