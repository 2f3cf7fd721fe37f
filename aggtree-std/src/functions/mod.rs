//! Built-in formula functions

mod math;
mod string;
mod date;

use aggtree_plugin::prelude::*;
use chrono::NaiveDateTime;

pub use math::MATH_FUNCTIONS;
pub use string::STRING_FUNCTIONS;
pub use date::DATE_FUNCTIONS;

/// A table-defined function: static metadata plus a plain function pointer
#[derive(Clone, Copy)]
pub struct Builtin {
    pub meta: FunctionMeta,
    pub func: fn(&[Value]) -> Value,
}

impl FunctionPlugin for Builtin {
    fn meta(&self) -> FunctionMeta {
        self.meta
    }

    fn call(&self, args: &[Value]) -> Value {
        (self.func)(args)
    }
}

/// Declare a `Builtin` table entry
macro_rules! builtin {
    ($category:expr, $name:literal, [$($arity:literal),+], $usage:literal, $description:literal, $func:expr) => {
        $crate::functions::Builtin {
            meta: aggtree_plugin::FunctionMeta {
                name: $name,
                description: $description,
                usage: $usage,
                arity: &[$($arity),+],
                category: $category,
            },
            func: $func,
        }
    };
}

pub(crate) use builtin;

// ========== Argument helpers ==========
//
// Missing arguments read as Null, so every function is total.

pub(crate) fn arg(args: &[Value], index: usize) -> &Value {
    const NULL: &Value = &Value::Null;
    args.get(index).unwrap_or(NULL)
}

pub(crate) fn num(args: &[Value], index: usize) -> f64 {
    arg(args, index).to_number()
}

pub(crate) fn num_or(args: &[Value], index: usize, default: f64) -> f64 {
    match args.get(index) {
        None | Some(Value::Null) => default,
        Some(v) => v.to_number(),
    }
}

pub(crate) fn text(args: &[Value], index: usize) -> String {
    arg(args, index).to_text()
}

pub(crate) fn date(args: &[Value], index: usize) -> Option<NaiveDateTime> {
    arg(args, index).to_date()
}

/// Integer view of a numeric argument, `None` for NaN/infinite input
pub(crate) fn int(args: &[Value], index: usize) -> Option<i64> {
    let n = num(args, index);
    if n.is_finite() {
        Some(n.trunc() as i64)
    } else {
        None
    }
}
