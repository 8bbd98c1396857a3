//! Scope classification and partition routing
//!
//! Every operation resolves its scope through [`resolve_partition`] so that a
//! given scope string always lands in the same partition.

use serde::{Deserialize, Serialize};

/// Sentinel scope name for the global partition (compared case-insensitively)
pub const GLOBAL_SCOPE: &str = "GLOBAL";

/// Separator marking a node scope (`<node-id>:<flow-id>`)
pub const NODE_SEPARATOR: char = ':';

/// Storage partition a scope maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    /// Shared by every flow, keyed by key only
    Global,
    /// Per-flow state, keyed by (flow id, key)
    Flow,
    /// Per-node state, keyed by (node scope, key)
    Node,
}

impl Partition {
    /// Backend collection name holding this partition
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Global => "ctxglobal",
            Self::Flow => "ctxflow",
            Self::Node => "ctxnode",
        }
    }

    /// Whether records in this partition carry a scope id
    pub fn is_scoped(&self) -> bool {
        !matches!(self, Self::Global)
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.collection())
    }
}

/// Resolve the partition for a scope.
///
/// Precedence: the global sentinel is checked first, then the node separator.
/// Anything else is a flow scope.
pub fn resolve_partition(scope: &str) -> Partition {
    if scope.to_uppercase() == GLOBAL_SCOPE {
        Partition::Global
    } else if scope.contains(NODE_SEPARATOR) {
        Partition::Node
    } else {
        Partition::Flow
    }
}

/// Leading node-id segment of a node scope, e.g. `n1` for `n1:f1`
pub fn node_id(scope: &str) -> Option<&str> {
    scope
        .split_once(NODE_SEPARATOR)
        .map(|(node, _)| node)
}
