//! # Flow Context Store
//!
//! A scoped key-value context store for flow-based runtimes. Running flows
//! save and restore state under three scope tiers, each kept in its own
//! storage partition.
//!
//! ## Features
//!
//! - **Scope Routing**: `GLOBAL` (any case) → `ctxglobal`, `node:flow` → `ctxnode`,
//!   anything else → `ctxflow`
//! - **Pluggable Backends**: In-memory collections, or sled persistence (`persistence` feature)
//! - **Upsert Semantics**: One record per scope and key, last write wins
//! - **Async Contract**: Native `async` API plus a completion-callback adapter
//! - **Garbage Collection**: `clean` drops node state whose scope is no longer active
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │     Caller      │    │   ContextStore   │    │ Backend         │
//! │                 │    │                  │    │                 │
//! │ • async API     │◄──►│ • Scope Router   │◄──►│ • Memory        │
//! │ • callbacks     │    │ • Query Builder  │    │ • Sled (opt)    │
//! │                 │    │ • Connection Mgr │    │                 │
//! └─────────────────┘    └──────────────────┘    └─────────────────┘
//! ```

pub mod backend;
pub mod callback;
pub mod config;
pub mod connection;
pub mod error;
pub mod memory;
#[cfg(feature = "persistence")]
pub mod persistence;
pub mod query;
pub mod scope;
pub mod store;

pub use backend::{Backend, Record};
pub use callback::CallbackContextStore;
pub use config::{CleanMatching, ConnectionConfig, DeleteRouting, StoreConfig};
pub use connection::{ConnectionManager, Connector};
pub use error::{ContextError, Result};
pub use memory::{MemoryBackend, MemoryConnector};
#[cfg(feature = "persistence")]
pub use persistence::{SledBackend, SledConnector};
pub use query::Key;
pub use scope::{resolve_partition, Partition};
pub use store::ContextStore;
