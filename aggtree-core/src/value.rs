//! Runtime row values
//!
//! Cells in a row are loosely typed. Arithmetic coerces its operands to
//! numbers, `+` concatenates as soon as one side is text, and comparisons
//! fall back to numeric ordering unless both sides are text.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Date(NaiveDateTime),
    List(Vec<Value>),
}

impl Value {
    // ========== Type Checking ==========

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&NaiveDateTime> {
        match self {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Number(_) => "Number",
            Value::Text(_) => "Text",
            Value::Date(_) => "Date",
            Value::List(_) => "List",
        }
    }

    // ========== Coercion ==========

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty(),
            Value::Date(_) | Value::List(_) => true,
        }
    }

    /// Numeric view; `NaN` when there is no sensible number
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => f64::NAN,
            Value::Bool(b) => if *b { 1.0 } else { 0.0 },
            Value::Number(n) => *n,
            Value::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    0.0
                } else {
                    s.parse().unwrap_or(f64::NAN)
                }
            }
            Value::Date(d) => d.and_utc().timestamp_millis() as f64,
            Value::List(_) => f64::NAN,
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
            Value::Date(d) => d.format(DATE_FORMAT).to_string(),
            Value::List(items) => items.iter().map(|v| v.to_text()).collect::<Vec<_>>().join(","),
        }
    }

    /// Date view: dates pass through, numbers are epoch milliseconds,
    /// text is parsed as ISO-8601 date or date-time
    pub fn to_date(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Number(n) if n.is_finite() => {
                DateTime::from_timestamp_millis(*n as i64).map(|d| d.naive_utc())
            }
            Value::Text(s) => parse_date_text(s.trim()),
            _ => None,
        }
    }

    // ========== Operators ==========

    /// `+`: concatenation when either side is text, numeric addition otherwise
    pub fn add(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Text(_), _) | (_, Value::Text(_)) => {
                Value::Text(format!("{}{}", self.to_text(), other.to_text()))
            }
            _ => Value::Number(self.to_number() + other.to_number()),
        }
    }

    pub fn sub(&self, other: &Value) -> Value {
        Value::Number(self.to_number() - other.to_number())
    }

    pub fn mul(&self, other: &Value) -> Value {
        Value::Number(self.to_number() * other.to_number())
    }

    /// Division follows IEEE semantics: `x / 0` is infinite, `0 / 0` is NaN
    pub fn div(&self, other: &Value) -> Value {
        Value::Number(self.to_number() / other.to_number())
    }

    pub fn pow(&self, other: &Value) -> Value {
        Value::Number(self.to_number().powf(other.to_number()))
    }

    pub fn neg(&self) -> Value {
        Value::Number(-self.to_number())
    }

    /// Loose equality
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            _ => self.to_number() == other.to_number(),
        }
    }

    /// Ordering used by `<`, `<=`, `>`, `>=`; `None` when incomparable
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            _ => self.to_number().partial_cmp(&other.to_number()),
        }
    }

    /// `a[b]`: list element, character of text; anything else is Null
    pub fn index(&self, key: &Value) -> Value {
        let idx = key.to_number();
        if !idx.is_finite() || idx < 0.0 || idx.fract() != 0.0 {
            return Value::Null;
        }
        let idx = idx as usize;
        match self {
            Value::List(items) => items.get(idx).cloned().unwrap_or(Value::Null),
            Value::Text(s) => s
                .chars()
                .nth(idx)
                .map(|c| Value::Text(c.to_string()))
                .unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

/// Render a number the way formulas and concatenations show it:
/// integral values without a fractional part
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn parse_date_text(s: &str) -> Option<NaiveDateTime> {
    if let Ok(d) = NaiveDateTime::parse_from_str(s, DATE_FORMAT) {
        return Some(d);
    }
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.naive_utc());
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::List(items) => {
                let contents: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", contents.join(", "))
            }
            other => write!(f, "{}", other.to_text()),
        }
    }
}

// From implementations for convenience
impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(d: NaiveDateTime) -> Self {
        Value::Date(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from).collect()),
            serde_json::Value::Object(_) => Value::Null,
        }
    }
}

/// Read access to one row of a dataset, by column name
pub trait Row {
    /// Value of column `name`; `Value::Null` when absent
    fn get(&self, name: &str) -> Value;
}

impl Row for HashMap<String, Value> {
    fn get(&self, name: &str) -> Value {
        HashMap::get(self, name).cloned().unwrap_or(Value::Null)
    }
}

impl Row for serde_json::Map<String, serde_json::Value> {
    fn get(&self, name: &str) -> Value {
        serde_json::Map::get(self, name).map(Value::from).unwrap_or(Value::Null)
    }
}
