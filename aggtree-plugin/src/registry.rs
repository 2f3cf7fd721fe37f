//! Function Registry
//!
//! The registry is the formula allow-list: a call to any name not registered
//! here fails compilation with `VariableNotDeclared`.

use crate::{FunctionMeta, FunctionPlugin};
use aggtree_core::{FormulaError, ErrorKind, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Central function registry
#[derive(Clone, Default)]
pub struct PluginRegistry {
    functions: BTreeMap<String, Arc<dyn FunctionPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            functions: BTreeMap::new(),
        }
    }

    pub fn with_function<F: FunctionPlugin + 'static>(mut self, f: F) -> Self {
        let name = f.meta().name.to_string();
        self.functions.insert(name, Arc::new(f));
        self
    }

    pub fn get_function(&self, name: &str) -> Option<Arc<dyn FunctionPlugin>> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.functions.keys().map(|k| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Resolve a function for a call site, failing with `VariableNotDeclared`
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn FunctionPlugin>, FormulaError> {
        match self.get_function(name) {
            Some(f) => Ok(f),
            None => {
                let mut err = FormulaError::variable_not_declared(name, &self.names());
                let similar = self.find_similar_functions(name);
                if !similar.is_empty() {
                    let suggestions: Vec<&str> = similar.iter().take(5).map(|s| s.as_str()).collect();
                    err = err.with_suggestion(format!("Similar: {}", suggestions.join(", ")));
                }
                Err(err)
            }
        }
    }

    /// Strict arity check. The compiler does not call this; hosts that want
    /// over-arity calls rejected can run it themselves.
    pub fn check_arity(&self, name: &str, argc: usize) -> Result<(), FormulaError> {
        let f = self.resolve(name)?;
        let meta = f.meta();
        if meta.accepts(argc) {
            Ok(())
        } else {
            Err(FormulaError::new(
                ErrorKind::VariableNotDeclared,
                format!(
                    "{}() expects {} arguments, got {}",
                    name,
                    meta.arity.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(" or "),
                    argc
                ),
            )
            .with_suggestion(format!("Usage: {}", meta.usage)))
        }
    }

    pub fn call_function(&self, name: &str, args: &[Value]) -> Result<Value, FormulaError> {
        Ok(self.resolve(name)?.call(args))
    }

    /// Find function names similar to the given name (for error suggestions)
    fn find_similar_functions(&self, name: &str) -> Vec<String> {
        let name_lower = name.to_lowercase();
        let mut matches: Vec<(String, usize)> = self.functions.keys()
            .filter_map(|func_name| {
                let score = Self::similarity_score(&name_lower, func_name);
                if score > 0 {
                    Some((func_name.clone(), score))
                } else {
                    None
                }
            })
            .collect();

        matches.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        matches.into_iter().map(|(name, _)| name).collect()
    }

    fn similarity_score(query: &str, candidate: &str) -> usize {
        let mut score = 0;

        if candidate.starts_with(query) {
            score += 100;
        } else if candidate.contains(query) {
            score += 50;
        } else if query.contains(candidate) {
            score += 30;
        }

        let query_chars: HashSet<char> = query.chars().collect();
        let candidate_chars: HashSet<char> = candidate.chars().collect();
        let common = query_chars.intersection(&candidate_chars).count();
        // Sharing one or two letters is noise
        if common * 2 > query_chars.len() {
            score += common * 2;
        }

        let len_diff = (query.len() as i32 - candidate.len() as i32).unsigned_abs() as usize;
        if len_diff < 5 && score > 0 {
            score += 5 - len_diff;
        }

        score
    }

    pub fn list_functions(&self, category: Option<&str>) -> Vec<FunctionMeta> {
        self.functions.values()
            .map(|f| f.meta())
            .filter(|meta| category.map_or(true, |c| meta.category == c))
            .collect()
    }

    pub fn help(&self, name: &str) -> Option<FunctionMeta> {
        self.functions.get(name).map(|f| f.meta())
    }
}
