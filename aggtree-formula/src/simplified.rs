//! Simplified formula generator
//!
//! Standard aggregation kinds (sum, mean, concat) are not written by hand:
//! their formula is regenerated from the aggregation's used attributes every
//! time membership changes, then run through the parser and compiler like
//! any user formula.

use crate::compiler::{CompiledFormula, Compiler};
use crate::parser;
use aggtree_core::{format_number, NodeId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Sum,
    Mean,
    #[default]
    Concat,
    Custom,
}

impl Operation {
    pub fn is_custom(&self) -> bool {
        matches!(self, Operation::Custom)
    }
}

fn default_weight() -> f64 {
    1.0
}

fn default_used() -> bool {
    true
}

/// One child attribute taking part in an aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsedAttribute {
    pub id: NodeId,
    pub name: String,
    /// Only meaningful for `mean`
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_used")]
    pub used: bool,
}

impl UsedAttribute {
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            weight: 1.0,
            used: true,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// Outcome of regenerating a formula
#[derive(Debug, Clone)]
pub enum SimplifiedFormula {
    /// `custom` aggregations keep whatever the user wrote
    Unchanged,
    Valid {
        formula: String,
        compiled: CompiledFormula,
    },
    Invalid {
        msg: String,
    },
}

impl SimplifiedFormula {
    pub fn is_valid(&self) -> bool {
        !matches!(self, SimplifiedFormula::Invalid { .. })
    }

    pub fn to_result(&self) -> SimplifiedFormulaResult {
        match self {
            SimplifiedFormula::Unchanged => SimplifiedFormulaResult {
                valid: true,
                formula: None,
                exec: None,
                msg: None,
            },
            SimplifiedFormula::Valid { formula, compiled } => SimplifiedFormulaResult {
                valid: true,
                formula: Some(formula.clone()),
                exec: Some(compiled.exec_source()),
                msg: None,
            },
            SimplifiedFormula::Invalid { msg } => SimplifiedFormulaResult {
                valid: false,
                formula: None,
                exec: None,
                msg: Some(msg.clone()),
            },
        }
    }
}

/// Wire shape: `{valid, formula, exec}` or `{valid: false, msg}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplifiedFormulaResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

/// Formula source for a standard operation, `None` for `custom`
pub fn formula_source(operation: Operation, attributes: &[UsedAttribute]) -> Option<String> {
    let used = attributes.iter().filter(|a| a.used);
    let source = match operation {
        Operation::Custom => return None,
        Operation::Sum => used
            .map(|a| format!("$({})", a.name))
            .collect::<Vec<_>>()
            .join(" + "),
        Operation::Concat => used
            .map(|a| format!("string($({}))", a.name))
            .collect::<Vec<_>>()
            .join(" + "),
        Operation::Mean => {
            let used: Vec<&UsedAttribute> = used.collect();
            // A zero weight still contributes its term with multiplier 1
            let terms: Vec<String> = used
                .iter()
                .map(|a| {
                    let w = if a.weight == 0.0 || a.weight.is_nan() { 1.0 } else { a.weight };
                    format!("{}*$({})", format_number(w), a.name)
                })
                .collect();
            let total: f64 = used.iter().map(|a| a.weight).sum();
            format!("({}) / {}", terms.join(" + "), format_number(total))
        }
    };
    Some(source)
}

pub fn generate(compiler: &Compiler, operation: Operation, attributes: &[UsedAttribute]) -> SimplifiedFormula {
    let Some(formula) = formula_source(operation, attributes) else {
        return SimplifiedFormula::Unchanged;
    };
    let ast = match parser::parse(&formula) {
        Ok(ast) => ast,
        Err(_) => {
            return SimplifiedFormula::Invalid {
                msg: "syntax error".to_string(),
            }
        }
    };
    match compiler.compile(&ast) {
        Ok(compiled) => SimplifiedFormula::Valid { formula, compiled },
        Err(e) => SimplifiedFormula::Invalid { msg: e.to_string() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs() -> Vec<UsedAttribute> {
        vec![
            UsedAttribute::new(1, "a").with_weight(2.0),
            UsedAttribute::new(2, "b"),
        ]
    }

    #[test]
    fn test_sum_source() {
        assert_eq!(formula_source(Operation::Sum, &attrs()).unwrap(), "$(a) + $(b)");
    }

    #[test]
    fn test_concat_source() {
        assert_eq!(
            formula_source(Operation::Concat, &attrs()).unwrap(),
            "string($(a)) + string($(b))"
        );
    }

    #[test]
    fn test_mean_source() {
        assert_eq!(
            formula_source(Operation::Mean, &attrs()).unwrap(),
            "(2*$(a) + 1*$(b)) / 3"
        );
    }

    #[test]
    fn test_mean_zero_weight_term() {
        let list = vec![
            UsedAttribute::new(1, "a").with_weight(0.0),
            UsedAttribute::new(2, "b").with_weight(2.0),
        ];
        assert_eq!(
            formula_source(Operation::Mean, &list).unwrap(),
            "(1*$(a) + 2*$(b)) / 2"
        );
    }

    #[test]
    fn test_unused_are_skipped() {
        let mut list = attrs();
        list[0].used = false;
        assert_eq!(formula_source(Operation::Sum, &list).unwrap(), "$(b)");
    }

    #[test]
    fn test_custom_has_no_source() {
        assert!(formula_source(Operation::Custom, &attrs()).is_none());
    }

    #[test]
    fn test_used_attribute_defaults() {
        let a: UsedAttribute = serde_json::from_str(r#"{"id": 4, "name": "x"}"#).unwrap();
        assert_eq!(a.weight, 1.0);
        assert!(a.used);
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(serde_json::to_string(&Operation::Mean).unwrap(), "\"mean\"");
        assert_eq!(Operation::default(), Operation::Concat);
    }

    #[test]
    fn test_result_shape() {
        let invalid = SimplifiedFormula::Invalid { msg: "syntax error".to_string() };
        let json = serde_json::to_value(invalid.to_result()).unwrap();
        assert_eq!(json, serde_json::json!({"valid": false, "msg": "syntax error"}));
    }
}
