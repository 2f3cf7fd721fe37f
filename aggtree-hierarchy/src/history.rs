//! Recoverable operation log
//!
//! A single LIFO stack of (forward, inverse) command pairs. Undo pops one
//! pair and applies its inverse without recording it; there is no redo.

use crate::command::Command;
use crate::node::NodePatch;
use crate::tree::{Applied, Hierarchy};
use aggtree_core::{FormulaError, NodeId};
use aggtree_formula::{CompiledFormula, FormulaEngine, Operation, UsedAttribute};
use serde::Serialize;

/// One recorded edit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub forward: Command,
    pub inverse: Command,
}

#[derive(Debug, Clone, Default)]
pub struct OperationLog {
    entries: Vec<LogEntry>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, forward: Command, inverse: Command) {
        self.entries.push(LogEntry { forward, inverse });
    }

    pub fn pop(&mut self) -> Option<LogEntry> {
        self.entries.pop()
    }

    pub fn peek(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }
}

/// Owns a hierarchy and its history; the single writer for both
pub struct Editor {
    tree: Hierarchy,
    log: OperationLog,
    engine: FormulaEngine,
}

impl Editor {
    pub fn new(tree: Hierarchy) -> Self {
        Self::with_engine(tree, FormulaEngine::with_standard_library())
    }

    pub fn with_engine(tree: Hierarchy, engine: FormulaEngine) -> Self {
        Self {
            tree,
            log: OperationLog::new(),
            engine,
        }
    }

    pub fn tree(&self) -> &Hierarchy {
        &self.tree
    }

    pub fn log(&self) -> &OperationLog {
        &self.log
    }

    pub fn engine(&self) -> &FormulaEngine {
        &self.engine
    }

    /// Swap in a freshly loaded tree; history does not carry over
    pub fn replace_tree(&mut self, tree: Hierarchy) {
        self.tree = tree;
        self.log.clear();
    }

    /// Apply and record. Returns the warnings raised by the edit.
    pub fn apply(&mut self, command: Command) -> Vec<String> {
        let forward = command.clone();
        let Applied { inverse, warnings, removed_attribute } = self.tree.apply(&self.engine, command);

        if removed_attribute {
            // Base attributes are not recoverable
            tracing::info!(discarded = self.log.len(), "attribute removed, history cleared");
            self.log.clear();
        } else if let Some(inverse) = inverse {
            self.log.push(forward, inverse);
        }
        warnings
    }

    /// Apply without recording, as undo does
    pub fn replay(&mut self, command: Command) -> Vec<String> {
        self.tree.apply(&self.engine, command).warnings
    }

    /// Revert the most recent recorded edit. `false` when history is empty.
    pub fn undo(&mut self) -> bool {
        let Some(entry) = self.log.pop() else {
            return false;
        };
        tracing::debug!(change = entry.forward.kind(), id = ?entry.forward.associated_id(), "undo");
        self.replay(entry.inverse);
        true
    }

    /// Compile a formula against the children of aggregation `id`
    pub fn compile_for(&self, id: NodeId, text: &str) -> Result<CompiledFormula, FormulaError> {
        match self.tree.get(id) {
            Some(node) if node.is_aggregation() => {
                self.engine.compile_scoped(text, &self.tree.child_names(id))
            }
            Some(_) => Err(FormulaError::structural(format!("node {} is not an aggregation", id))),
            None => Err(FormulaError::structural(format!("node {} does not exist", id))),
        }
    }

    /// Store a hand-written formula on an aggregation as one recorded edit.
    ///
    /// The aggregation becomes `custom` so later membership changes warn
    /// instead of regenerating over the text, and `usedAttributes` is rebuilt
    /// from the children the formula references.
    pub fn set_formula(&mut self, id: NodeId, text: &str) -> Result<Vec<String>, FormulaError> {
        let compiled = self.compile_for(id, text)?;
        let mut info = self
            .tree
            .get(id)
            .and_then(|n| n.info.clone())
            .unwrap_or_default();

        let mut used: Vec<UsedAttribute> = Vec::new();
        for child in self.tree.children(id).iter().filter_map(|c| self.tree.get(*c)) {
            if !compiled.nodes.contains(&child.name) {
                continue;
            }
            let previous = info.used_attributes.iter().find(|a| a.id == child.id);
            used.push(match previous {
                Some(a) => UsedAttribute { name: child.name.clone(), used: true, ..a.clone() },
                None => UsedAttribute::new(child.id, child.name.clone()),
            });
        }

        info.operation = Operation::Custom;
        info.used_attributes = used;
        info.formula = text.to_string();
        info.exec = compiled.exec_source();
        Ok(self.apply(Command::update(id, NodePatch::info(Some(info)))))
    }
}
