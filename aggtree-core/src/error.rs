//! Structured formula errors
//!
//! Errors are values: the editing boundary receives them as `{error, msg}`
//! records and turns them into form-level validation messages.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Machine-readable error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Formula text rejected by the parser
    SyntaxError,
    /// Formula references a name that is not a child of the edited aggregation
    AttributeNotFound,
    /// Formula calls a function outside the allow-list
    VariableNotDeclared,
    /// Tree edit targeting the root or a missing node
    StructuralError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::AttributeNotFound => "AttributeNotFound",
            ErrorKind::VariableNotDeclared => "VariableNotDeclared",
            ErrorKind::StructuralError => "StructuralError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged formula failure, serialised as `{ "error": kind, "msg": message }`
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct FormulaError {
    #[serde(rename = "error")]
    pub kind: ErrorKind,

    #[serde(rename = "msg")]
    pub message: String,

    /// Suggestion for fixing the formula
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl FormulaError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            suggestion: None,
        }
    }

    /// Builder: add suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    // ========== Common Error Constructors ==========

    pub fn syntax(details: impl Into<String>) -> Self {
        Self::new(ErrorKind::SyntaxError, details)
            .with_suggestion("Check formula syntax")
    }

    pub fn attribute_not_found(missing: &[String], allowed: &[String]) -> Self {
        Self::new(
            ErrorKind::AttributeNotFound,
            format!(
                "Attributes {} are not children of this aggregation. Allowed: {}",
                quoted_list(missing),
                quoted_list(allowed)
            ),
        )
        .with_suggestion("Reference child attributes with $(name)")
    }

    pub fn variable_not_declared<S: AsRef<str>>(func: &str, allowed: &[S]) -> Self {
        Self::new(
            ErrorKind::VariableNotDeclared,
            format!(
                "Function '{}' is not declared. Allowed functions: {}",
                func,
                allowed.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(", ")
            ),
        )
    }

    pub fn structural(details: impl Into<String>) -> Self {
        Self::new(ErrorKind::StructuralError, details)
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

fn quoted_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("'{}'", n))
        .collect::<Vec<_>>()
        .join(", ")
}
