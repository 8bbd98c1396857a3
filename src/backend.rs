//! Storage backend abstraction
//!
//! A backend exposes named collections of [`Record`]s with document-store
//! style find/update/delete primitives. The store never talks to a concrete
//! engine directly; a [`Connector`](crate::connection::Connector) hands it an
//! `Arc<dyn Backend>` when the connection is opened.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::query::{Filter, Projection, Update};

/// One stored context value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Scope id; absent in the global partition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub key: String,
    /// Stored payload, `Null` when projected out
    #[serde(default)]
    pub value: Value,
    /// Time of the last write
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn new(id: Option<String>, key: impl Into<String>, value: Value) -> Self {
        Self {
            id,
            key: key.into(),
            value,
            updated_at: Utc::now(),
        }
    }

    /// Apply a projection to a fetched record
    pub fn project(mut self, projection: Projection) -> Self {
        if projection == Projection::ExcludeValue {
            self.value = Value::Null;
        }
        self
    }

    pub fn matches(&self, filter: &Filter) -> bool {
        filter.matches(self.id.as_deref(), &self.key)
    }
}

/// Outcome of an update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    /// Existing records the filter matched
    pub matched: u64,
    /// Whether a new record was created
    pub upserted: bool,
}

/// Collection-oriented storage engine
#[async_trait]
pub trait Backend: Send + Sync {
    /// First record matching the filter
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Record>>;

    /// All records matching the filter, in no particular order
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Projection,
    ) -> Result<Vec<Record>>;

    /// Replace the value of the record the filter identifies.
    ///
    /// With `update.upsert` set, a missing record is created from the
    /// filter's `(id, key)`.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult>;

    /// Remove all matching records, returning how many went away
    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Flush and release backend resources
    async fn close(&self) -> Result<()>;
}
