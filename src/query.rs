//! Query construction for context operations
//!
//! Turns a scope and key(s) into the partition-specific filter, update and
//! projection that a [`Backend`](crate::backend::Backend) executes. Nothing in
//! here touches storage, so every rejection happens before backend I/O.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::config::{CleanMatching, DeleteRouting};
use crate::error::{ContextError, Result};
use crate::scope::{node_id, resolve_partition, Partition};

/// Key addressing mode of a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    /// A single key
    Single(String),
    /// Several keys at once
    Batch(Vec<String>),
}

impl Key {
    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch(_))
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Self::Single(key.to_string())
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Self::Single(key)
    }
}

impl From<&String> for Key {
    fn from(key: &String) -> Self {
        Self::Single(key.clone())
    }
}

impl From<Vec<String>> for Key {
    fn from(keys: Vec<String>) -> Self {
        Self::Batch(keys)
    }
}

impl From<Vec<&str>> for Key {
    fn from(keys: Vec<&str>) -> Self {
        Self::Batch(keys.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Key {
    fn from(keys: [&str; N]) -> Self {
        Self::Batch(keys.iter().map(|k| k.to_string()).collect())
    }
}

/// Constraint on a record's scope id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdMatch {
    /// No constraint
    Any,
    /// Scope id equals the given value
    Eq(String),
    /// Scope id present and not in the set
    NotIn(BTreeSet<String>),
    /// Node scope that is neither listed itself nor owned by a listed node id
    InactiveNode(BTreeSet<String>),
}

/// Constraint on a record's key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMatch {
    Any,
    Eq(String),
    In(Vec<String>),
}

/// Record filter over `(id, key)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub id: IdMatch,
    pub key: KeyMatch,
}

impl Filter {
    /// Filter matching every record
    pub fn all() -> Self {
        Self {
            id: IdMatch::Any,
            key: KeyMatch::Any,
        }
    }

    /// Filter on the scope id only
    pub fn scope(id: impl Into<String>) -> Self {
        Self {
            id: IdMatch::Eq(id.into()),
            key: KeyMatch::Any,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = KeyMatch::Eq(key.into());
        self
    }

    pub fn with_keys(mut self, keys: Vec<String>) -> Self {
        self.key = KeyMatch::In(keys);
        self
    }

    /// Check whether a stored record satisfies this filter
    pub fn matches(&self, id: Option<&str>, key: &str) -> bool {
        let id_ok = match &self.id {
            IdMatch::Any => true,
            IdMatch::Eq(want) => id == Some(want.as_str()),
            IdMatch::NotIn(active) => id.is_some_and(|scope| !active.contains(scope)),
            IdMatch::InactiveNode(active) => match id {
                Some(scope) => {
                    !active.contains(scope)
                        && node_id(scope).map_or(true, |node| !active.contains(node))
                }
                None => false,
            },
        };

        id_ok
            && match &self.key {
                KeyMatch::Any => true,
                KeyMatch::Eq(want) => key == want,
                KeyMatch::In(keys) => keys.iter().any(|k| k == key),
            }
    }

    /// The single `(id, key)` this filter pins down, if any.
    ///
    /// Upserts need this to know which record to create when nothing matches.
    pub fn identity(&self) -> Option<(Option<String>, String)> {
        let id = match &self.id {
            IdMatch::Any => None,
            IdMatch::Eq(id) => Some(id.clone()),
            IdMatch::NotIn(_) | IdMatch::InactiveNode(_) => return None,
        };
        match &self.key {
            KeyMatch::Eq(key) => Some((id, key.clone())),
            _ => None,
        }
    }

    /// Render as a document-store style filter, mainly for tracing output
    pub fn to_document(&self) -> Value {
        let mut doc = Map::new();
        match &self.id {
            IdMatch::Any => {}
            IdMatch::Eq(id) => {
                doc.insert("id".into(), json!(id));
            }
            IdMatch::NotIn(active) => {
                doc.insert("id".into(), json!({ "$exists": true, "$nin": active }));
            }
            IdMatch::InactiveNode(active) => {
                let owners = active
                    .iter()
                    .map(|node| escape_regex(node))
                    .collect::<Vec<_>>()
                    .join("|");
                doc.insert(
                    "id".into(),
                    json!({
                        "$exists": true,
                        "$nin": active,
                        "$not": { "$regex": format!("^(?:{}):", owners) },
                    }),
                );
            }
        }
        match &self.key {
            KeyMatch::Any => {}
            KeyMatch::Eq(key) => {
                doc.insert("key".into(), json!(key));
            }
            KeyMatch::In(keys) => {
                doc.insert("key".into(), json!({ "$in": keys }));
            }
        }
        Value::Object(doc)
    }
}

fn escape_regex(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Fields returned by a find
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    Full,
    /// Drop the value payload, keep id and key
    ExcludeValue,
}

/// Replacement of a record's value
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub value: Value,
    /// Create the record when the filter matches nothing
    pub upsert: bool,
}

impl Update {
    pub fn to_document(&self) -> Value {
        json!({ "$set": { "value": self.value } })
    }
}

/// Read or delete request against one partition
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub partition: Partition,
    pub filter: Filter,
    pub projection: Projection,
}

impl Query {
    fn new(partition: Partition, filter: Filter) -> Self {
        Self {
            partition,
            filter,
            projection: Projection::Full,
        }
    }

    pub fn collection(&self) -> &'static str {
        self.partition.collection()
    }
}

/// Write request against one partition
#[derive(Debug, Clone, PartialEq)]
pub struct Upsert {
    pub partition: Partition,
    pub filter: Filter,
    pub update: Update,
}

impl Upsert {
    pub fn collection(&self) -> &'static str {
        self.partition.collection()
    }
}

/// Base filter for a scope: global records have no scope id
fn scope_filter(scope: &str, partition: Partition) -> Filter {
    if partition.is_scoped() {
        Filter::scope(scope)
    } else {
        Filter::all()
    }
}

/// Point lookup for `get`. Batch keys are rejected.
pub fn get_query(scope: &str, key: &Key) -> Result<Query> {
    let key = match key {
        Key::Single(key) => key,
        Key::Batch(_) => {
            return Err(ContextError::Unsupported(
                "batch key mode is not implemented for get".into(),
            ))
        }
    };
    let partition = resolve_partition(scope);
    Ok(Query::new(partition, scope_filter(scope, partition).with_key(key.clone())))
}

/// Upserts for `set`, one per addressed key.
///
/// A batch key takes a JSON array value holding one element per key.
pub fn set_queries(scope: &str, key: Key, value: Value) -> Result<Vec<Upsert>> {
    let partition = resolve_partition(scope);
    let upsert = |key: String, value: Value| Upsert {
        partition,
        filter: scope_filter(scope, partition).with_key(key),
        update: Update {
            value,
            upsert: true,
        },
    };

    match key {
        Key::Single(key) => Ok(vec![upsert(key, value)]),
        Key::Batch(keys) => {
            let values = match value {
                Value::Array(values) if values.len() == keys.len() => values,
                Value::Array(values) => {
                    return Err(ContextError::Usage(format!(
                        "batch set got {} keys but {} values",
                        keys.len(),
                        values.len()
                    )))
                }
                _ => {
                    return Err(ContextError::Usage(
                        "batch set requires an array of values".into(),
                    ))
                }
            };
            Ok(keys
                .into_iter()
                .zip(values)
                .map(|(key, value)| upsert(key, value))
                .collect())
        }
    }
}

/// Key listing for `keys`, value payload projected out
pub fn keys_query(scope: &str) -> Query {
    let partition = resolve_partition(scope);
    Query {
        projection: Projection::ExcludeValue,
        ..Query::new(partition, scope_filter(scope, partition))
    }
}

/// Scope-wide removal for `delete`
pub fn delete_query(scope: &str, routing: DeleteRouting) -> Query {
    let partition = resolve_partition(scope);
    let target = match routing {
        DeleteRouting::ByScope => partition,
        DeleteRouting::Legacy => Partition::Global,
    };
    Query::new(target, scope_filter(scope, partition))
}

/// Node-partition sweep for `clean`
pub fn clean_query<S: AsRef<str>>(active_nodes: &[S], matching: CleanMatching) -> Query {
    let active = active_nodes
        .iter()
        .map(|node| node.as_ref().to_string())
        .collect();
    let id = match matching {
        CleanMatching::ScopeId => IdMatch::NotIn(active),
        CleanMatching::NodeId => IdMatch::InactiveNode(active),
    };
    Query::new(
        Partition::Node,
        Filter {
            id,
            key: KeyMatch::Any,
        },
    )
}
