//! Read-only projections of the tree for display

use crate::node::NodeType;
use crate::tree::Hierarchy;
use aggtree_core::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Nested tree as handed to the display layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeView {
    pub id: NodeId,
    pub name: String,
    pub children: Vec<TreeView>,
    pub is_shown: bool,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub formula: String,
}

impl TreeView {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of nodes in this subtree
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TreeView::size).sum::<usize>()
    }
}

impl Hierarchy {
    /// Nested view starting at any node
    pub fn traverse(&self, root: NodeId) -> Option<TreeView> {
        let node = self.get(root)?;
        Some(TreeView {
            id: node.id,
            name: node.name.clone(),
            children: node.related.iter().filter_map(|c| self.traverse(*c)).collect(),
            is_shown: node.is_shown,
            node_type: node.node_type,
            formula: node.formula().to_string(),
        })
    }
}

/// Columns that end up on screen, breadth-first.
///
/// A leaf or a collapsed (not shown) node contributes its own column and
/// hides its subtree. Aggregations without a formula have no column; their
/// children are still considered. The top node itself never counts.
pub fn visible_columns(tree: &TreeView) -> Vec<String> {
    let mut columns = Vec::new();
    let mut queue: VecDeque<&TreeView> = tree.children.iter().collect();

    while let Some(node) = queue.pop_front() {
        let no_formula = node.node_type == NodeType::Aggregation && node.formula.is_empty();
        if no_formula {
            queue.extend(node.children.iter());
        } else if node.is_leaf() || !node.is_shown {
            columns.push(node.name.clone());
        } else {
            queue.extend(node.children.iter());
        }
    }
    columns
}
