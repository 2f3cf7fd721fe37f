//! String helpers

use super::{arg, builtin, int, num_or, text, Builtin};
use aggtree_core::Value;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

const CATEGORY: &str = "string";

/// Compiled patterns are cached across rows; `None` marks an invalid pattern
fn cached_regex(pattern: &str) -> Option<Regex> {
    static CACHE: OnceLock<Mutex<HashMap<String, Option<Regex>>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = match cache.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard
        .entry(pattern.to_string())
        .or_insert_with(|| Regex::new(pattern).ok())
        .clone()
}

fn string(args: &[Value]) -> Value {
    Value::Text(text(args, 0))
}

fn parse_float(args: &[Value]) -> Value {
    // Longest numeric prefix, like a lenient float reader
    let s = text(args, 0);
    let s = s.trim_start();
    let mut end = 0;
    for i in (1..=s.len()).rev() {
        if s.is_char_boundary(i) && s[..i].parse::<f64>().is_ok() {
            end = i;
            break;
        }
    }
    if end == 0 {
        Value::Number(f64::NAN)
    } else {
        Value::Number(s[..end].parse().unwrap_or(f64::NAN))
    }
}

fn parse_int(args: &[Value]) -> Value {
    let s = text(args, 0);
    let s = s.trim();
    let radix = num_or(args, 1, 10.0) as u32;
    if !(2..=36).contains(&radix) {
        return Value::Number(f64::NAN);
    }
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let valid: String = digits.chars().take_while(|c| c.is_digit(radix)).collect();
    match i64::from_str_radix(&valid, radix) {
        Ok(n) => Value::Number(if negative { -(n as f64) } else { n as f64 }),
        Err(_) => Value::Number(f64::NAN),
    }
}

fn length(args: &[Value]) -> Value {
    match arg(args, 0) {
        Value::List(items) => Value::Number(items.len() as f64),
        Value::Null => Value::Null,
        other => Value::Number(other.to_text().chars().count() as f64),
    }
}

/// Character slice with clamped bounds; swapped bounds are reordered
fn substring(args: &[Value]) -> Value {
    let s = text(args, 0);
    let len = s.chars().count() as i64;
    let start = int(args, 1).unwrap_or(0).clamp(0, len);
    let end = match args.get(2) {
        None | Some(Value::Null) => len,
        Some(_) => int(args, 2).unwrap_or(0).clamp(0, len),
    };
    let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
    Value::Text(s.chars().skip(lo as usize).take((hi - lo) as usize).collect())
}

fn index_of(args: &[Value]) -> Value {
    let s = text(args, 0);
    let needle = text(args, 1);
    match s.find(&needle) {
        Some(byte_pos) => Value::Number(s[..byte_pos].chars().count() as f64),
        None => Value::Number(-1.0),
    }
}

fn pad(args: &[Value], at_start: bool) -> Value {
    let s = text(args, 0);
    let width = int(args, 1).unwrap_or(0).max(0) as usize;
    let fill = match args.get(2) {
        None | Some(Value::Null) => " ".to_string(),
        Some(v) => v.to_text(),
    };
    let current = s.chars().count();
    if current >= width || fill.is_empty() {
        return Value::Text(s);
    }
    let padding: String = fill.chars().cycle().take(width - current).collect();
    Value::Text(if at_start { padding + &s } else { s + &padding })
}

fn repeat(args: &[Value]) -> Value {
    let count = int(args, 1).unwrap_or(0).max(0) as usize;
    Value::Text(text(args, 0).repeat(count))
}

/// Replaces the first occurrence only
fn replace(args: &[Value]) -> Value {
    let s = text(args, 0);
    let from = text(args, 1);
    let to = text(args, 2);
    Value::Text(s.replacen(&from, &to, 1))
}

fn regexp_replace(args: &[Value]) -> Value {
    let s = text(args, 0);
    match cached_regex(&text(args, 1)) {
        Some(re) => Value::Text(re.replace_all(&s, text(args, 2).as_str()).into_owned()),
        None => Value::Null,
    }
}

/// Capture groups of the first match, whole match first; Null when no match
fn regex_match(args: &[Value]) -> Value {
    let s = text(args, 0);
    let Some(re) = cached_regex(&text(args, 1)) else {
        return Value::Null;
    };
    match re.captures(&s) {
        Some(caps) => Value::List(
            caps.iter()
                .map(|m| m.map(|m| Value::Text(m.as_str().to_string())).unwrap_or(Value::Null))
                .collect(),
        ),
        None => Value::Null,
    }
}

fn split(args: &[Value]) -> Value {
    let s = text(args, 0);
    let sep = text(args, 1);
    let parts: Vec<Value> = if sep.is_empty() {
        s.chars().map(|c| Value::Text(c.to_string())).collect()
    } else {
        s.split(sep.as_str()).map(Value::from).collect()
    };
    let limit = match args.get(2) {
        None | Some(Value::Null) => parts.len(),
        Some(_) => int(args, 2).unwrap_or(0).max(0) as usize,
    };
    Value::List(parts.into_iter().take(limit).collect())
}

fn join(args: &[Value]) -> Value {
    let sep = match args.get(1) {
        None | Some(Value::Null) => ",".to_string(),
        Some(v) => v.to_text(),
    };
    match arg(args, 0) {
        Value::List(items) => Value::Text(items.iter().map(Value::to_text).collect::<Vec<_>>().join(&sep)),
        other => Value::Text(other.to_text()),
    }
}

fn capitalize(args: &[Value]) -> Value {
    let s = text(args, 0);
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => Value::Text(first.to_uppercase().chain(chars).collect()),
        None => Value::Text(String::new()),
    }
}

pub static STRING_FUNCTIONS: &[Builtin] = &[
    builtin!(CATEGORY, "capitalize", [1], "capitalize(s)", "Upper-case the first character", capitalize),
    builtin!(CATEGORY, "endswith", [2], "endswith(s, suffix)", "True when s ends with suffix", |a| Value::Bool(text(a, 0).ends_with(text(a, 1).as_str()))),
    builtin!(CATEGORY, "includes", [2], "includes(s, needle)", "True when s contains needle", |a| Value::Bool(text(a, 0).contains(text(a, 1).as_str()))),
    builtin!(CATEGORY, "index_of", [2], "index_of(s, needle)", "Character position of needle in s, -1 when absent", index_of),
    builtin!(CATEGORY, "join", [1, 2], "join(list, sep?)", "Join list items with a separator (default ',')", join),
    builtin!(CATEGORY, "length", [1], "length(s)", "Number of characters (or list items)", length),
    builtin!(CATEGORY, "lower", [1], "lower(s)", "Lower-case text", |a| Value::Text(text(a, 0).to_lowercase())),
    builtin!(CATEGORY, "match", [2], "match(s, pattern)", "Regex capture groups of the first match", regex_match),
    builtin!(CATEGORY, "padend", [2, 3], "padend(s, width, fill?)", "Pad s on the right to width", |a| pad(a, false)),
    builtin!(CATEGORY, "padstart", [2, 3], "padstart(s, width, fill?)", "Pad s on the left to width", |a| pad(a, true)),
    builtin!(CATEGORY, "parse_float", [1], "parse_float(s)", "Leading floating point number of s", parse_float),
    builtin!(CATEGORY, "parse_int", [1, 2], "parse_int(s, radix?)", "Leading integer of s in the given radix", parse_int),
    builtin!(CATEGORY, "regexp_replace", [3], "regexp_replace(s, pattern, replacement)", "Replace every regex match", regexp_replace),
    builtin!(CATEGORY, "repeat", [2], "repeat(s, count)", "s repeated count times", repeat),
    builtin!(CATEGORY, "replace", [3], "replace(s, from, to)", "Replace the first occurrence of from", replace),
    builtin!(CATEGORY, "reverse", [1], "reverse(s)", "Characters of s in reverse order", |a| Value::Text(text(a, 0).chars().rev().collect())),
    builtin!(CATEGORY, "split", [2, 3], "split(s, sep, limit?)", "Split s into a list", split),
    builtin!(CATEGORY, "startswith", [2], "startswith(s, prefix)", "True when s starts with prefix", |a| Value::Bool(text(a, 0).starts_with(text(a, 1).as_str()))),
    builtin!(CATEGORY, "string", [1], "string(x)", "Text form of any value", string),
    builtin!(CATEGORY, "substring", [2, 3], "substring(s, start, end?)", "Characters from start up to end", substring),
    builtin!(CATEGORY, "trim", [1], "trim(s)", "Strip surrounding whitespace", |a| Value::Text(text(a, 0).trim().to_string())),
    builtin!(CATEGORY, "upper", [1], "upper(s)", "Upper-case text", |a| Value::Text(text(a, 0).to_uppercase())),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Value {
        let f = STRING_FUNCTIONS.iter().find(|b| b.meta.name == name).unwrap();
        (f.func)(args)
    }

    fn t(s: &str) -> Value {
        Value::from(s)
    }

    #[test]
    fn test_string_coerces_numbers() {
        assert_eq!(call("string", &[Value::from(3.0)]), t("3"));
        assert_eq!(call("string", &[Value::from(true)]), t("true"));
    }

    #[test]
    fn test_parse_float_reads_prefix() {
        assert_eq!(call("parse_float", &[t("3.5kg")]), Value::Number(3.5));
        assert!(call("parse_float", &[t("kg")]).as_number().unwrap().is_nan());
    }

    #[test]
    fn test_parse_int_radix() {
        assert_eq!(call("parse_int", &[t("42px")]), Value::Number(42.0));
        assert_eq!(call("parse_int", &[t("ff"), Value::from(16.0)]), Value::Number(255.0));
        assert_eq!(call("parse_int", &[t("-12")]), Value::Number(-12.0));
    }

    #[test]
    fn test_substring_swaps_bounds() {
        assert_eq!(call("substring", &[t("hello"), Value::from(3.0), Value::from(1.0)]), t("el"));
        assert_eq!(call("substring", &[t("hello"), Value::from(2.0)]), t("llo"));
    }

    #[test]
    fn test_pad() {
        assert_eq!(call("padstart", &[t("7"), Value::from(3.0), t("0")]), t("007"));
        assert_eq!(call("padend", &[t("ab"), Value::from(4.0)]), t("ab  "));
    }

    #[test]
    fn test_replace_first_only() {
        assert_eq!(call("replace", &[t("a-b-c"), t("-"), t("+")]), t("a+b-c"));
        assert_eq!(call("regexp_replace", &[t("a-b-c"), t("-"), t("+")]), t("a+b+c"));
    }

    #[test]
    fn test_match_returns_groups() {
        let m = call("match", &[t("id-42"), t(r"(\w+)-(\d+)")]);
        assert_eq!(m, Value::List(vec![t("id-42"), t("id"), t("42")]));
        assert_eq!(call("match", &[t("nothing"), t(r"\d")]), Value::Null);
    }

    #[test]
    fn test_split_and_join() {
        let parts = call("split", &[t("a,b,c"), t(",")]);
        assert_eq!(parts, Value::List(vec![t("a"), t("b"), t("c")]));
        assert_eq!(call("join", &[parts, t("|")]), t("a|b|c"));
    }

    #[test]
    fn test_length() {
        assert_eq!(call("length", &[t("héllo")]), Value::Number(5.0));
        assert_eq!(call("length", &[Value::Null]), Value::Null);
    }
}
