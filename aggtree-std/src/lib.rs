//! aggtree Standard Library
//!
//! The fixed function allow-list available to aggregation formulas:
//! date, math and string helpers.

pub mod functions;

use aggtree_plugin::PluginRegistry;

/// Load standard library into registry
pub fn load_standard_library(registry: PluginRegistry) -> PluginRegistry {
    functions::MATH_FUNCTIONS.iter()
        .chain(functions::STRING_FUNCTIONS)
        .chain(functions::DATE_FUNCTIONS)
        .fold(registry, |registry, builtin| registry.with_function(*builtin))
}

/// Create registry with standard library
pub fn standard_registry() -> PluginRegistry {
    load_standard_library(PluginRegistry::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aggtree_core::Value;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique() {
        let mut seen = HashSet::new();
        for f in functions::MATH_FUNCTIONS.iter()
            .chain(functions::STRING_FUNCTIONS)
            .chain(functions::DATE_FUNCTIONS)
        {
            assert!(seen.insert(f.meta.name), "duplicate function {}", f.meta.name);
        }
    }

    #[test]
    fn test_standard_registry_size() {
        let registry = standard_registry();
        assert!(registry.len() >= 75, "only {} functions", registry.len());
        assert!(registry.contains("string"));
        assert!(registry.contains("year"));
        assert!(!registry.contains("madeup"));
    }

    #[test]
    fn test_every_function_declares_arity() {
        for meta in standard_registry().list_functions(None) {
            assert!(!meta.arity.is_empty(), "{} has no arity", meta.name);
            assert!(["date", "math", "string"].contains(&meta.category));
        }
    }

    #[test]
    fn test_call_through_registry() {
        let registry = standard_registry();
        let v = registry.call_function("upper", &[Value::from("abc")]).unwrap();
        assert_eq!(v, Value::from("ABC"));
    }
}
