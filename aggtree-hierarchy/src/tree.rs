//! Hierarchy tree store
//!
//! Nodes live in an id-keyed map; each node's `related` list is the ordered
//! child list and the only persisted edge. A `child -> parent` index is kept
//! alongside so parent lookups do not scan the tree.
//!
//! Invalid edits (root removal, unknown ids, cycles) are silent no-ops logged
//! at debug level. Edits that leave an aggregation's formula stale produce
//! warnings instead of errors.

use crate::command::Command;
use crate::error::HierarchyError;
use crate::node::{AggregationInfo, AttributeNode, NodePatch, NodeType};
use aggtree_core::NodeId;
use aggtree_formula::{FormulaEngine, SimplifiedFormula};
use std::collections::{BTreeMap, HashMap, VecDeque};

pub const ROOT_ID: NodeId = 0;

/// Result of applying one command
#[derive(Debug, Clone, Default)]
pub struct Applied {
    /// Command that undoes this one, `None` when nothing changed
    pub inverse: Option<Command>,
    pub warnings: Vec<String>,
    /// An `attribute` node was removed
    pub removed_attribute: bool,
}

impl Applied {
    pub fn changed(&self) -> bool {
        self.inverse.is_some()
    }

    fn noop(change: &str, id: NodeId, reason: &str) -> Self {
        tracing::debug!(change, id, "ignored: {}", reason);
        Self::default()
    }
}

#[derive(Debug, Clone)]
pub struct Hierarchy {
    nodes: BTreeMap<NodeId, AttributeNode>,
    parents: HashMap<NodeId, NodeId>,
}

impl Default for Hierarchy {
    fn default() -> Self {
        Self::new("root")
    }
}

impl Hierarchy {
    /// Tree holding only a root
    pub fn new(root_name: impl Into<String>) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(ROOT_ID, AttributeNode::root(root_name));
        Self {
            nodes,
            parents: HashMap::new(),
        }
    }

    /// Build from persisted records, validating the tree invariants
    pub fn from_nodes(records: Vec<AttributeNode>) -> Result<Self, HierarchyError> {
        let mut nodes = BTreeMap::new();
        for node in records {
            if node.is_root() && node.id != ROOT_ID {
                return Err(HierarchyError::ExtraRoot(node.id));
            }
            if let Some(dup) = nodes.insert(node.id, node) {
                return Err(HierarchyError::DuplicateId(dup.id));
            }
        }
        let parents = validate(&nodes)?;
        Ok(Self { nodes, parents })
    }

    pub fn from_json(json: &str) -> Result<Self, HierarchyError> {
        let records: Vec<AttributeNode> = serde_json::from_str(json)?;
        Self::from_nodes(records)
    }

    /// Persisted records in id order
    pub fn to_nodes(&self) -> Vec<AttributeNode> {
        self.nodes.values().cloned().collect()
    }

    pub fn to_json(&self) -> Result<String, HierarchyError> {
        Ok(serde_json::to_string_pretty(&self.to_nodes())?)
    }

    /// Re-run load-time validation against the live tree
    pub fn check_invariants(&self) -> Result<(), HierarchyError> {
        let parents = validate(&self.nodes)?;
        if parents != self.parents {
            tracing::warn!("parent index out of sync with child lists");
        }
        Ok(())
    }

    // ========== Queries ==========

    pub fn root(&self) -> Option<&AttributeNode> {
        self.nodes.get(&ROOT_ID)
    }

    pub fn get(&self, id: NodeId) -> Option<&AttributeNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &AttributeNode> {
        self.nodes.values()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(&id).copied()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(&id).map(|n| n.related.as_slice()).unwrap_or(&[])
    }

    /// Names of the direct children, the attributes a formula on `id` may use
    pub fn child_names(&self, id: NodeId) -> Vec<String> {
        self.children(id)
            .iter()
            .filter_map(|c| self.nodes.get(c))
            .map(|n| n.name.clone())
            .collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&AttributeNode> {
        self.nodes.values().find(|n| n.name == name)
    }

    /// Smallest id above every id in use
    pub fn next_id(&self) -> NodeId {
        self.nodes.keys().next_back().map_or(1, |max| max + 1)
    }

    /// True when `id` is `ancestor` or lies below it
    pub fn is_within(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.parent(c);
        }
        false
    }

    // ========== Edits ==========

    pub fn apply(&mut self, engine: &FormulaEngine, command: Command) -> Applied {
        match command {
            Command::AddNode { parent, node, index } => self.add_node(parent, node, index),
            Command::RemoveNode { id } => self.remove_node(engine, id),
            Command::UpdateNode { id, patch } => self.update_node(id, patch),
            Command::MoveNode { source, target, index } => self.move_node(source, target, index),
            Command::Batch { commands } => {
                let mut out = Applied::default();
                let mut inverses = Vec::new();
                for cmd in commands {
                    let step = self.apply(engine, cmd);
                    out.warnings.extend(step.warnings);
                    out.removed_attribute |= step.removed_attribute;
                    inverses.extend(step.inverse);
                }
                if !inverses.is_empty() {
                    inverses.reverse();
                    out.inverse = Some(Command::Batch { commands: inverses });
                }
                out
            }
        }
    }

    fn add_node(&mut self, parent: NodeId, mut node: AttributeNode, index: Option<usize>) -> Applied {
        let id = node.id;
        if !self.nodes.contains_key(&parent) {
            return Applied::noop("addNode", id, "parent does not exist");
        }
        if id == ROOT_ID || node.is_root() || self.nodes.contains_key(&id) {
            return Applied::noop("addNode", id, "id already taken or root");
        }
        if node.is_aggregation() && node.info.is_none() {
            node.info = Some(AggregationInfo::default());
        }

        // Adopt listed children, skipping unknown ids and any that would
        // close a cycle through the new parent
        let requested = std::mem::take(&mut node.related);
        for child in requested {
            if child == ROOT_ID || !self.nodes.contains_key(&child) || self.is_within(parent, child) {
                continue;
            }
            if node.related.contains(&child) {
                continue;
            }
            self.detach(child);
            self.parents.insert(child, id);
            node.related.push(child);
        }

        if let Some(p) = self.nodes.get_mut(&parent) {
            let at = index.map_or(p.related.len(), |i| i.min(p.related.len()));
            p.related.insert(at, id);
        }
        self.parents.insert(id, parent);
        self.nodes.insert(id, node);

        Applied {
            inverse: Some(Command::remove(id)),
            ..Applied::default()
        }
    }

    fn remove_node(&mut self, engine: &FormulaEngine, id: NodeId) -> Applied {
        if id == ROOT_ID {
            return Applied::noop("removeNode", id, "root cannot be removed");
        }
        let Some(parent) = self.parent(id) else {
            return Applied::noop("removeNode", id, "unknown node");
        };
        let Some(removed) = self.nodes.remove(&id) else {
            return Applied::noop("removeNode", id, "unknown node");
        };
        self.parents.remove(&id);

        // Splice the removed node's children into its slot
        let mut index = 0;
        if let Some(p) = self.nodes.get_mut(&parent) {
            index = p.related.iter().position(|c| *c == id).unwrap_or(p.related.len());
            let tail = p.related.split_off(index);
            p.related.extend(removed.related.iter().copied());
            p.related.extend(tail.into_iter().skip(1));
        }
        for child in &removed.related {
            self.parents.insert(*child, parent);
        }

        let mut warnings = Vec::new();
        let mut restore_parent = None;
        if let Some(p) = self.nodes.get_mut(&parent) {
            if let Some(info) = p.info.as_mut().filter(|_| p.node_type == NodeType::Aggregation) {
                let before = info.clone();
                sync_after_removal(engine, &p.name, info, &removed, &mut warnings);
                if *info != before {
                    restore_parent = Some(before);
                }
            }
        }
        for w in &warnings {
            tracing::warn!(node = id, parent, "{}", w);
        }

        let readd = Command::AddNode {
            parent,
            node: removed.clone(),
            index: Some(index),
        };
        let inverse = match restore_parent {
            Some(info) => Command::Batch {
                commands: vec![readd, Command::update(parent, NodePatch::info(Some(info)))],
            },
            None => readd,
        };

        Applied {
            inverse: Some(inverse),
            warnings,
            removed_attribute: removed.node_type == NodeType::Attribute,
        }
    }

    fn update_node(&mut self, id: NodeId, mut patch: NodePatch) -> Applied {
        let Some(node) = self.nodes.get_mut(&id) else {
            return Applied::noop("updateNode", id, "unknown node");
        };
        if node.is_root() && patch.node_type.is_some_and(|t| t != NodeType::Root) {
            tracing::debug!(id, "root type is immutable");
            patch.node_type = None;
        }
        if node.id != ROOT_ID && patch.node_type == Some(NodeType::Root) {
            tracing::debug!(id, "only node 0 may be the root");
            patch.node_type = None;
        }
        if patch.is_empty() {
            return Applied::noop("updateNode", id, "empty patch");
        }
        let before = patch.capture(node);
        patch.apply_to(node);
        Applied {
            inverse: Some(Command::update(id, before)),
            ..Applied::default()
        }
    }

    fn move_node(&mut self, source: NodeId, target: NodeId, index: Option<usize>) -> Applied {
        const CHANGE: &str = "relationshipNode";
        if source == ROOT_ID {
            return Applied::noop(CHANGE, source, "root cannot be moved");
        }
        if !self.nodes.contains_key(&target) {
            return Applied::noop(CHANGE, target, "unknown target");
        }
        let Some(old_parent) = self.parent(source) else {
            return Applied::noop(CHANGE, source, "unknown source");
        };
        if self.is_within(target, source) {
            return Applied::noop(CHANGE, target, "target lies inside the moved subtree");
        }

        let old_index = self.detach(source).unwrap_or(0);
        if let Some(t) = self.nodes.get_mut(&target) {
            let at = index.map_or(t.related.len(), |i| i.min(t.related.len()));
            t.related.insert(at, source);
        }
        self.parents.insert(source, target);

        let back = Command::MoveNode {
            source,
            target: old_parent,
            index: Some(old_index),
        };

        // A moved aggregation drops any usage entry pointing at itself
        let mut restore_info = None;
        if let Some(info) = self.nodes.get_mut(&source).and_then(|n| n.info.as_mut()) {
            if info.used_attributes.iter().any(|a| a.id == source) {
                restore_info = Some(info.clone());
                info.used_attributes.retain(|a| a.id != source);
            }
        }

        let inverse = match restore_info {
            Some(info) => Command::Batch {
                commands: vec![Command::update(source, NodePatch::info(Some(info))), back],
            },
            None => back,
        };
        Applied {
            inverse: Some(inverse),
            ..Applied::default()
        }
    }

    /// Unlink `id` from its parent's child list, returning its former index
    fn detach(&mut self, id: NodeId) -> Option<usize> {
        let parent = self.parents.remove(&id)?;
        let p = self.nodes.get_mut(&parent)?;
        let at = p.related.iter().position(|c| *c == id)?;
        p.related.remove(at);
        Some(at)
    }
}

/// Bring an aggregation's formula in line after one of its children left
fn sync_after_removal(
    engine: &FormulaEngine,
    aggregation: &str,
    info: &mut AggregationInfo,
    removed: &AttributeNode,
    warnings: &mut Vec<String>,
) {
    let was_used = info.used_attributes.iter().any(|a| a.id == removed.id);
    info.used_attributes.retain(|a| a.id != removed.id);

    if !info.used_attributes.iter().any(|a| a.used) {
        info.clear_formula();
        warnings.push(format!(
            "aggregation '{}' has no attributes left; its formula was cleared",
            aggregation
        ));
        return;
    }
    if info.operation.is_custom() {
        if was_used || info.formula.contains(&format!("$({})", removed.name)) {
            warnings.push(format!(
                "custom formula of '{}' still references removed attribute '{}'",
                aggregation, removed.name
            ));
        }
        return;
    }
    match engine.generate(info.operation, &info.used_attributes) {
        SimplifiedFormula::Valid { formula, compiled } => {
            info.exec = compiled.exec_source();
            info.formula = formula;
        }
        SimplifiedFormula::Invalid { msg } => {
            info.clear_formula();
            warnings.push(format!("formula of '{}' could not be regenerated: {}", aggregation, msg));
        }
        SimplifiedFormula::Unchanged => {}
    }
}

/// Check the tree invariants and derive the `child -> parent` index
fn validate(nodes: &BTreeMap<NodeId, AttributeNode>) -> Result<HashMap<NodeId, NodeId>, HierarchyError> {
    match nodes.get(&ROOT_ID) {
        Some(root) if root.is_root() => {}
        _ => return Err(HierarchyError::MissingRoot),
    }

    let mut parents: HashMap<NodeId, NodeId> = HashMap::new();
    for node in nodes.values() {
        for &child in &node.related {
            if !nodes.contains_key(&child) {
                return Err(HierarchyError::DanglingChild { parent: node.id, child });
            }
            if child == ROOT_ID {
                return Err(HierarchyError::RootHasParent(node.id));
            }
            if let Some(first) = parents.insert(child, node.id) {
                return Err(HierarchyError::MultipleParents { child, first, second: node.id });
            }
        }
    }

    let mut seen = 0usize;
    let mut queue = VecDeque::from([ROOT_ID]);
    while let Some(id) = queue.pop_front() {
        seen += 1;
        queue.extend(nodes.get(&id).map(|n| n.related.iter().copied()).into_iter().flatten());
    }
    if seen != nodes.len() {
        // Every node has at most one parent here, so reaching the root from
        // a parented node can only fail inside a cycle
        for id in nodes.keys().copied().filter(|id| *id != ROOT_ID) {
            let mut current = id;
            let mut steps = 0;
            while let Some(&p) = parents.get(&current) {
                current = p;
                steps += 1;
                if steps > nodes.len() {
                    return Err(HierarchyError::Cycle(id));
                }
            }
            if current != ROOT_ID {
                return Err(HierarchyError::Unreachable(id));
            }
        }
    }
    Ok(parents)
}
