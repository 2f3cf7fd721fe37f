//! aggtree Plugin System
//!
//! Provides the trait for formula functions and the registry that doubles as
//! the formula allow-list.

mod traits;
mod registry;

pub use traits::{FunctionPlugin, FunctionMeta};
pub use registry::PluginRegistry;

/// Re-export core types for plugin authors
pub mod prelude {
    pub use crate::{FunctionPlugin, FunctionMeta, PluginRegistry};
    pub use aggtree_core::prelude::*;
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    struct Double;

    impl FunctionPlugin for Double {
        fn meta(&self) -> FunctionMeta {
            FunctionMeta {
                name: "double",
                description: "Twice the input",
                usage: "double(x)",
                arity: &[1],
                category: "math",
            }
        }

        fn call(&self, args: &[Value]) -> Value {
            Value::Number(args.first().map(Value::to_number).unwrap_or(f64::NAN) * 2.0)
        }
    }

    struct Dummy(&'static str);

    impl FunctionPlugin for Dummy {
        fn meta(&self) -> FunctionMeta {
            FunctionMeta {
                name: self.0,
                description: "",
                usage: "",
                arity: &[0],
                category: "string",
            }
        }

        fn call(&self, _args: &[Value]) -> Value {
            Value::Null
        }
    }

    fn registry() -> PluginRegistry {
        PluginRegistry::new()
            .with_function(Double)
            .with_function(Dummy("upper"))
    }

    #[test]
    fn test_call_registered_function() {
        let value = registry().call_function("double", &[Value::from(21.0)]).unwrap();
        assert_eq!(value, Value::Number(42.0));
    }

    #[test]
    fn test_unknown_function_is_variable_not_declared() {
        let err = registry().call_function("madeup", &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::VariableNotDeclared);
        assert!(err.message.contains("madeup"));
        assert!(err.message.contains("double, upper"));
    }

    #[test]
    fn test_unknown_function_suggests_similar() {
        let err = registry().resolve("doubel").err().unwrap();
        assert!(err.suggestion.unwrap().contains("double"));
    }

    #[test]
    fn test_check_arity() {
        let reg = registry();
        assert!(reg.check_arity("double", 1).is_ok());
        let err = reg.check_arity("double", 3).unwrap_err();
        assert!(err.message.contains("expects 1 arguments, got 3"));
    }

    #[test]
    fn test_list_functions_by_category() {
        let reg = registry();
        assert_eq!(reg.list_functions(None).len(), 2);
        let strings = reg.list_functions(Some("string"));
        assert_eq!(strings.len(), 1);
        assert_eq!(strings[0].name, "upper");
    }
}
