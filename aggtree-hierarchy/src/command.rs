//! Tree edit commands
//!
//! Every structural edit is a value. Applying one yields the command that
//! reverses it, which is what the operation log stores.

use crate::node::{AttributeNode, NodePatch};
use aggtree_core::NodeId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "camelCase")]
pub enum Command {
    /// Insert `node` under `parent`. Ids in `node.related` that already exist
    /// are detached from their current parents and become its children.
    AddNode {
        parent: NodeId,
        node: AttributeNode,
        /// Sibling position, appended when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },
    RemoveNode { id: NodeId },
    UpdateNode { id: NodeId, patch: NodePatch },
    #[serde(rename = "relationshipNode", alias = "moveNode")]
    MoveNode {
        source: NodeId,
        target: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },
    /// Applied in order, reverted as one step
    Batch { commands: Vec<Command> },
}

impl Command {
    pub fn add(parent: NodeId, node: AttributeNode) -> Self {
        Command::AddNode { parent, node, index: None }
    }

    pub fn remove(id: NodeId) -> Self {
        Command::RemoveNode { id }
    }

    pub fn update(id: NodeId, patch: NodePatch) -> Self {
        Command::UpdateNode { id, patch }
    }

    pub fn move_to(source: NodeId, target: NodeId) -> Self {
        Command::MoveNode { source, target, index: None }
    }

    /// Node the command is about, `None` for batches
    pub fn associated_id(&self) -> Option<NodeId> {
        match self {
            Command::AddNode { node, .. } => Some(node.id),
            Command::RemoveNode { id } | Command::UpdateNode { id, .. } => Some(*id),
            Command::MoveNode { source, .. } => Some(*source),
            Command::Batch { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Command::AddNode { .. } => "addNode",
            Command::RemoveNode { .. } => "removeNode",
            Command::UpdateNode { .. } => "updateNode",
            Command::MoveNode { .. } => "relationshipNode",
            Command::Batch { .. } => "batch",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let cmd = Command::move_to(4, 2);
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({"change": "relationshipNode", "source": 4, "target": 2})
        );
        let parsed: Command =
            serde_json::from_value(json!({"change": "removeNode", "id": 7})).unwrap();
        assert_eq!(parsed, Command::remove(7));
    }

    #[test]
    fn test_move_alias() {
        let parsed: Command =
            serde_json::from_value(json!({"change": "moveNode", "source": 1, "target": 0, "index": 2}))
                .unwrap();
        assert_eq!(parsed, Command::MoveNode { source: 1, target: 0, index: Some(2) });
    }

    #[test]
    fn test_add_from_json() {
        let parsed: Command = serde_json::from_value(json!({
            "change": "addNode",
            "parent": 0,
            "node": {"id": 5, "name": "x", "type": "attribute"}
        }))
        .unwrap();
        assert_eq!(parsed.associated_id(), Some(5));
        assert_eq!(parsed.kind(), "addNode");
    }
}
