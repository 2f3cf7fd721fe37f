//! Abstract Syntax Tree
//!
//! Shape is `{ "data": tag, "children": [...] }` where a child is either a
//! nested node or a raw token string (function name, literal text, number,
//! attribute name).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    Suma,
    Resta,
    Producto,
    Division,
    Potencia,
    Or,
    And,
    Le,
    Lt,
    Ge,
    Gt,
    Equality,
    Inequality,
    Negacion,
    Parentesis,
    Function,
    True,
    False,
    Texto,
    Numero,
    Natural,
    Attribute,
    Value,
    Indexing,
    Indexing2,
}

impl Tag {
    /// Source operator for binary tags
    pub fn binary_operator(&self) -> Option<&'static str> {
        Some(match self {
            Tag::Suma => "+",
            Tag::Resta => "-",
            Tag::Producto => "*",
            Tag::Division => "/",
            Tag::Potencia => "**",
            Tag::Or => "or",
            Tag::And => "and",
            Tag::Le => "<=",
            Tag::Lt => "<",
            Tag::Ge => ">=",
            Tag::Gt => ">",
            Tag::Equality => "==",
            Tag::Inequality => "!=",
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ast {
    Node(Node),
    Token(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub data: Tag,
    #[serde(default)]
    pub children: Vec<Ast>,
}

impl Ast {
    pub fn node(data: Tag, children: Vec<Ast>) -> Self {
        Ast::Node(Node { data, children })
    }

    pub fn leaf(data: Tag, token: impl Into<String>) -> Self {
        Ast::Node(Node { data, children: vec![Ast::Token(token.into())] })
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Ast::Token(t) => Some(t),
            Ast::Node(_) => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Ast::Node(n) => Some(n),
            Ast::Token(_) => None,
        }
    }

    /// Attribute names in left-to-right order, duplicates kept
    pub fn attributes(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_attributes(&mut out);
        out
    }

    fn collect_attributes<'a>(&'a self, out: &mut Vec<&'a str>) {
        if let Ast::Node(node) = self {
            if node.data == Tag::Attribute {
                if let Some(name) = node.children.first().and_then(Ast::token) {
                    out.push(name);
                }
                return;
            }
            for child in &node.children {
                child.collect_attributes(out);
            }
        }
    }
}

impl fmt::Display for Ast {
    /// Render back to formula source
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = match self {
            Ast::Token(t) => return write!(f, "{}", t),
            Ast::Node(n) => n,
        };
        let child = |i: usize| node.children.get(i);
        if let Some(op) = node.data.binary_operator() {
            if let (Some(l), Some(r)) = (child(0), child(1)) {
                return write!(f, "{} {} {}", l, op, r);
            }
        }
        match node.data {
            Tag::Negacion => match child(0) {
                Some(c) => write!(f, "-{}", c),
                None => Ok(()),
            },
            Tag::Parentesis => match child(0) {
                Some(c) => write!(f, "({})", c),
                None => write!(f, "()"),
            },
            Tag::Function => {
                let name = child(0).map(|c| c.to_string()).unwrap_or_default();
                let args: Vec<String> = node.children.iter().skip(1).map(|c| c.to_string()).collect();
                write!(f, "{}({})", name, args.join(", "))
            }
            Tag::True => write!(f, "true"),
            Tag::False => write!(f, "false"),
            Tag::Texto => {
                let text = child(0).and_then(Ast::token).unwrap_or_default();
                write!(f, "\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
            }
            Tag::Natural => write!(f, "e"),
            Tag::Attribute => {
                let name = child(0).and_then(Ast::token).unwrap_or_default();
                write!(f, "$({})", name)
            }
            Tag::Indexing | Tag::Indexing2 => match (child(0), child(1)) {
                (Some(a), Some(b)) => write!(f, "{}[{}]", a, b),
                _ => Ok(()),
            },
            _ => {
                for c in &node.children {
                    write!(f, "{}", c)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let ast = Ast::node(Tag::Suma, vec![
            Ast::leaf(Tag::Attribute, "a"),
            Ast::leaf(Tag::Numero, "1"),
        ]);
        let json = serde_json::to_value(&ast).unwrap();
        assert_eq!(json, serde_json::json!({
            "data": "suma",
            "children": [
                {"data": "attribute", "children": ["a"]},
                {"data": "numero", "children": ["1"]}
            ]
        }));
        let back: Ast = serde_json::from_value(json).unwrap();
        assert_eq!(back, ast);
    }

    #[test]
    fn test_tag_names() {
        assert_eq!(serde_json::to_string(&Tag::Indexing2).unwrap(), "\"indexing2\"");
        assert_eq!(serde_json::to_string(&Tag::Negacion).unwrap(), "\"negacion\"");
    }

    #[test]
    fn test_leaf_without_children_deserialises() {
        let ast: Ast = serde_json::from_str(r#"{"data": "natural"}"#).unwrap();
        assert_eq!(ast, Ast::node(Tag::Natural, vec![]));
    }

    #[test]
    fn test_attributes_keep_duplicates() {
        let ast = Ast::node(Tag::Producto, vec![
            Ast::leaf(Tag::Attribute, "x"),
            Ast::node(Tag::Parentesis, vec![Ast::node(Tag::Suma, vec![
                Ast::leaf(Tag::Attribute, "y"),
                Ast::leaf(Tag::Attribute, "x"),
            ])]),
        ]);
        assert_eq!(ast.attributes(), vec!["x", "y", "x"]);
        assert_eq!(ast.to_string(), "$(x) * ($(y) + $(x))");
    }
}
