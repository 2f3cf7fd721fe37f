//! aggtree Formula - the aggregation formula language
//!
//! Text like `$(price) * (1 + $(tax))` is parsed to an AST, compiled to a
//! native row transform, and kept alongside a canonical rendering of that
//! transform for display and persistence.

mod ast;
mod compiler;
mod parser;
mod simplified;

pub use ast::{Ast, Node, Tag};
pub use compiler::{derive_column, CompiledFormula, Compiler, RowTransform};
pub use parser::parse;
pub use simplified::{
    formula_source, Operation, SimplifiedFormula, SimplifiedFormulaResult, UsedAttribute,
};

use aggtree_core::FormulaError;
use aggtree_plugin::PluginRegistry;
use std::sync::Arc;

/// Main formula engine
pub struct FormulaEngine {
    registry: Arc<PluginRegistry>,
    compiler: Compiler,
}

impl FormulaEngine {
    pub fn new(registry: PluginRegistry) -> Self {
        let registry = Arc::new(registry);
        Self {
            compiler: Compiler::new(registry.clone()),
            registry,
        }
    }

    pub fn with_standard_library() -> Self {
        Self::new(aggtree_std::standard_registry())
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn parse(&self, text: &str) -> Result<Ast, FormulaError> {
        parser::parse(text)
    }

    pub fn compile_ast(&self, ast: &Ast) -> Result<CompiledFormula, FormulaError> {
        self.compiler.compile(ast)
    }

    /// Parse and compile formula text
    pub fn compile(&self, text: &str) -> Result<CompiledFormula, FormulaError> {
        let ast = self.parse(text)?;
        let compiled = self.compile_ast(&ast)?;
        tracing::debug!(formula = text, nodes = ?compiled.nodes, "compiled formula");
        Ok(compiled)
    }

    /// Compile a formula for an aggregation whose children are `allowed`;
    /// any other attribute reference fails with `AttributeNotFound`
    pub fn compile_scoped<S: AsRef<str>>(
        &self,
        text: &str,
        allowed: &[S],
    ) -> Result<CompiledFormula, FormulaError> {
        let compiled = self.compile(text)?;
        let missing: Vec<String> = compiled
            .distinct_nodes()
            .into_iter()
            .filter(|name| !allowed.iter().any(|a| a.as_ref() == *name))
            .map(String::from)
            .collect();
        if missing.is_empty() {
            Ok(compiled)
        } else {
            let allowed: Vec<String> = allowed.iter().map(|a| a.as_ref().to_string()).collect();
            Err(FormulaError::attribute_not_found(&missing, &allowed))
        }
    }

    pub fn generate(&self, operation: Operation, attributes: &[UsedAttribute]) -> SimplifiedFormula {
        let generated = simplified::generate(&self.compiler, operation, attributes);
        if let SimplifiedFormula::Invalid { msg } = &generated {
            tracing::debug!(?operation, msg = msg.as_str(), "generated formula rejected");
        }
        generated
    }
}

impl Default for FormulaEngine {
    fn default() -> Self {
        Self::with_standard_library()
    }
}
