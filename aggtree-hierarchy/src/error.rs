//! Load-time validation errors
//!
//! Edits on a live tree never fail (invalid edits are no-ops); these errors
//! only come from importing a persisted node list.

use aggtree_core::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("hierarchy has no root node with id 0")]
    MissingRoot,

    #[error("node {0} has type root but only id 0 may be the root")]
    ExtraRoot(NodeId),

    #[error("duplicate node id {0}")]
    DuplicateId(NodeId),

    #[error("node {parent} lists unknown child {child}")]
    DanglingChild { parent: NodeId, child: NodeId },

    #[error("root node cannot be the child of node {0}")]
    RootHasParent(NodeId),

    #[error("node {child} has more than one parent ({first} and {second})")]
    MultipleParents {
        child: NodeId,
        first: NodeId,
        second: NodeId,
    },

    #[error("node {0} is part of a cycle")]
    Cycle(NodeId),

    #[error("node {0} is not reachable from the root")]
    Unreachable(NodeId),

    #[error("invalid hierarchy JSON: {0}")]
    Json(#[from] serde_json::Error),
}
