//! Formula compiler
//!
//! Walks an AST once and produces two things side by side: a native closure
//! over rows, and a canonical text rendering of that closure (`r => ...`)
//! that is stored on aggregation nodes and shown to users.

use crate::ast::{Ast, Node, Tag};
use aggtree_core::{FormulaError, Row, Value};
use aggtree_plugin::{FunctionPlugin, PluginRegistry};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

type Eval = Arc<dyn Fn(&dyn Row) -> Value + Send + Sync>;

/// Compiled row transform
#[derive(Clone)]
pub struct RowTransform(Eval);

impl RowTransform {
    pub fn apply(&self, row: &dyn Row) -> Value {
        (self.0)(row)
    }
}

impl fmt::Debug for RowTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RowTransform")
    }
}

/// Result of compiling one formula
#[derive(Debug, Clone, Serialize)]
pub struct CompiledFormula {
    /// Rendered transform body, e.g. `r["a"] + r["b"]`
    pub formula: String,
    /// Attribute names in traversal order, duplicates kept
    pub nodes: Vec<String>,
    #[serde(skip)]
    pub transform: RowTransform,
}

impl CompiledFormula {
    /// Full transform source as stored in `exec`
    pub fn exec_source(&self) -> String {
        format!("r => {}", self.formula)
    }

    pub fn evaluate(&self, row: &dyn Row) -> Value {
        self.transform.apply(row)
    }

    /// Distinct referenced names, first occurrence order
    pub fn distinct_nodes(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for name in &self.nodes {
            if !out.contains(&name.as_str()) {
                out.push(name);
            }
        }
        out
    }
}

/// Materialize a derived column over a row set
pub fn derive_column<R: Row>(rows: &[R], compiled: &CompiledFormula) -> Vec<Value> {
    rows.iter().map(|row| compiled.evaluate(row)).collect()
}

pub struct Compiler {
    registry: Arc<PluginRegistry>,
}

impl Compiler {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    pub fn compile(&self, ast: &Ast) -> Result<CompiledFormula, FormulaError> {
        let mut nodes = Vec::new();
        let (formula, eval) = self.emit(ast, &mut nodes)?;
        Ok(CompiledFormula {
            formula,
            nodes,
            transform: RowTransform(eval),
        })
    }

    fn emit(&self, ast: &Ast, nodes: &mut Vec<String>) -> Result<(String, Eval), FormulaError> {
        let node = match ast {
            Ast::Node(n) => n,
            Ast::Token(t) => return Err(malformed(format!("bare token '{}' in expression position", t))),
        };

        match node.data {
            Tag::Suma => self.binary(node, nodes, "+", |a, b| a.add(b)),
            Tag::Resta => self.binary(node, nodes, "-", |a, b| a.sub(b)),
            Tag::Producto => self.binary(node, nodes, "*", |a, b| a.mul(b)),
            Tag::Division => self.binary(node, nodes, "/", |a, b| a.div(b)),
            Tag::Potencia => self.binary(node, nodes, "**", |a, b| a.pow(b)),
            Tag::Le => self.binary(node, nodes, "<=", |a, b| {
                Value::Bool(matches!(a.compare(b), Some(Ordering::Less | Ordering::Equal)))
            }),
            Tag::Lt => self.binary(node, nodes, "<", |a, b| {
                Value::Bool(a.compare(b) == Some(Ordering::Less))
            }),
            Tag::Ge => self.binary(node, nodes, ">=", |a, b| {
                Value::Bool(matches!(a.compare(b), Some(Ordering::Greater | Ordering::Equal)))
            }),
            Tag::Gt => self.binary(node, nodes, ">", |a, b| {
                Value::Bool(a.compare(b) == Some(Ordering::Greater))
            }),
            Tag::Equality => self.binary(node, nodes, "==", |a, b| Value::Bool(a.loose_eq(b))),
            Tag::Inequality => self.binary(node, nodes, "!=", |a, b| Value::Bool(!a.loose_eq(b))),
            Tag::Or | Tag::And => {
                let (l, r) = two_children(node)?;
                let (ls, lf) = self.emit(l, nodes)?;
                let (rs, rf) = self.emit(r, nodes)?;
                // Short-circuit, yielding the deciding operand
                if node.data == Tag::Or {
                    let eval: Eval = Arc::new(move |row: &dyn Row| {
                        let left = lf(row);
                        if left.truthy() { left } else { rf(row) }
                    });
                    Ok((format!("{} || {}", ls, rs), eval))
                } else {
                    let eval: Eval = Arc::new(move |row: &dyn Row| {
                        let left = lf(row);
                        if left.truthy() { rf(row) } else { left }
                    });
                    Ok((format!("{} && {}", ls, rs), eval))
                }
            }
            Tag::Negacion => {
                let (s, f) = self.emit(one_child(node)?, nodes)?;
                let eval: Eval = Arc::new(move |row: &dyn Row| f(row).neg());
                Ok((format!("-{}", s), eval))
            }
            Tag::Parentesis => {
                let (s, f) = self.emit(one_child(node)?, nodes)?;
                Ok((format!("({})", s), f))
            }
            Tag::Value => self.emit(one_child(node)?, nodes),
            Tag::Function => self.function(node, nodes),
            Tag::True => Ok(("true".to_string(), constant(Value::Bool(true)))),
            Tag::False => Ok(("false".to_string(), constant(Value::Bool(false)))),
            Tag::Texto => {
                let text = token_child(node)?;
                let rendered = serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text));
                Ok((rendered, constant(Value::Text(text.to_string()))))
            }
            Tag::Numero => {
                let raw = token_child(node)?;
                let n: f64 = raw.trim().parse()
                    .map_err(|_| malformed(format!("invalid number literal '{}'", raw)))?;
                Ok((raw.trim().to_string(), constant(Value::Number(n))))
            }
            Tag::Natural => Ok((
                format!("{}", std::f64::consts::E),
                constant(Value::Number(std::f64::consts::E)),
            )),
            Tag::Attribute => {
                let name = token_child(node)?.to_string();
                let rendered = format!(
                    "r[{}]",
                    serde_json::to_string(&name).unwrap_or_else(|_| format!("\"{}\"", name))
                );
                nodes.push(name.clone());
                let eval: Eval = Arc::new(move |row: &dyn Row| row.get(&name));
                Ok((rendered, eval))
            }
            Tag::Indexing | Tag::Indexing2 => {
                let (target, index) = two_children(node)?;
                let (ts, tf) = self.emit(target, nodes)?;
                let (is, idx) = self.emit(index, nodes)?;
                let eval: Eval = Arc::new(move |row: &dyn Row| tf(row).index(&idx(row)));
                Ok((format!("{}[{}]", ts, is), eval))
            }
        }
    }

    fn binary(
        &self,
        node: &Node,
        nodes: &mut Vec<String>,
        op: &str,
        apply: fn(&Value, &Value) -> Value,
    ) -> Result<(String, Eval), FormulaError> {
        let (l, r) = two_children(node)?;
        let (ls, lf) = self.emit(l, nodes)?;
        let (rs, rf) = self.emit(r, nodes)?;
        let eval: Eval = Arc::new(move |row: &dyn Row| apply(&lf(row), &rf(row)));
        Ok((format!("{} {} {}", ls, op, rs), eval))
    }

    /// Arity is declared in the registry but deliberately not enforced here
    fn function(&self, node: &Node, nodes: &mut Vec<String>) -> Result<(String, Eval), FormulaError> {
        let name = node.children.first()
            .and_then(Ast::token)
            .ok_or_else(|| malformed("function call without a name".to_string()))?;
        let plugin: Arc<dyn FunctionPlugin> = self.registry.resolve(name)?;

        let mut rendered_args = Vec::new();
        let mut arg_fns = Vec::new();
        for arg in &node.children[1..] {
            let (s, f) = self.emit(arg, nodes)?;
            rendered_args.push(s);
            arg_fns.push(f);
        }

        let eval: Eval = Arc::new(move |row: &dyn Row| {
            let args: Vec<Value> = arg_fns.iter().map(|f| f(row)).collect();
            plugin.call(&args)
        });
        Ok((format!("{}({})", name, rendered_args.join(", ")), eval))
    }
}

fn constant(value: Value) -> Eval {
    Arc::new(move |_: &dyn Row| value.clone())
}

fn malformed(details: String) -> FormulaError {
    FormulaError::syntax(format!("Malformed AST: {}", details))
}

fn one_child(node: &Node) -> Result<&Ast, FormulaError> {
    match node.children.as_slice() {
        [only] => Ok(only),
        other => Err(malformed(format!("{:?} expects 1 child, got {}", node.data, other.len()))),
    }
}

fn two_children(node: &Node) -> Result<(&Ast, &Ast), FormulaError> {
    match node.children.as_slice() {
        [l, r] => Ok((l, r)),
        other => Err(malformed(format!("{:?} expects 2 children, got {}", node.data, other.len()))),
    }
}

fn token_child(node: &Node) -> Result<&str, FormulaError> {
    one_child(node)?
        .token()
        .ok_or_else(|| malformed(format!("{:?} expects a token child", node.data)))
}
