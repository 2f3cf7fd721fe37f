//! aggtree Core - Fundamental types
//!
//! This crate provides the core types used throughout aggtree:
//! - `Value`: loosely typed row cell values and their operators
//! - `Row`: read access to a dataset row by column name
//! - `FormulaError`: tagged formula errors with an explicit `ErrorKind`

mod value;
mod error;

pub use value::{Value, Row, format_number, DATE_FORMAT};
pub use error::{FormulaError, ErrorKind};

/// Stable node identifier; the root is always `0`
pub type NodeId = u64;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{Value, Row, FormulaError, ErrorKind, NodeId};
}
