//! Plugin traits

use aggtree_core::Value;
use serde::Serialize;

/// Metadata for a function plugin
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FunctionMeta {
    pub name: &'static str,
    pub description: &'static str,
    pub usage: &'static str,
    /// Accepted argument counts
    pub arity: &'static [usize],
    pub category: &'static str,
}

impl FunctionMeta {
    pub fn accepts(&self, argc: usize) -> bool {
        self.arity.contains(&argc)
    }
}

/// Pure function callable from compiled formulas
pub trait FunctionPlugin: Send + Sync {
    fn meta(&self) -> FunctionMeta;
    fn call(&self, args: &[Value]) -> Value;
}
