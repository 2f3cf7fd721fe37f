//! Formula parser
//!
//! Recursive descent over the raw text: every level looks for its operator
//! at nesting depth zero (outside parentheses, brackets and string literals)
//! and splits there. Precedence, lowest first:
//! `or`, `and`, comparisons, `+ -`, `* /`, unary `-`, `**`, postfix `[i]`.

use crate::ast::{Ast, Tag};
use aggtree_core::FormulaError;

/// Parse formula source to AST
pub fn parse(input: &str) -> Result<Ast, FormulaError> {
    parse_expr(input)
}

/// One character of the input with its byte offset and whether it sits at
/// nesting depth zero outside quotes. The text between `$(` and its matching
/// `)` is an opaque attribute name: quotes and operators there are not syntax.
#[derive(Debug, Clone, Copy)]
struct Scanned {
    pos: usize,
    ch: char,
    top: bool,
}

fn scan(input: &str) -> Result<Vec<Scanned>, FormulaError> {
    let mut out = Vec::with_capacity(input.len());
    let mut stack: Vec<char> = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut attr_depth = 0usize;
    let mut after_dollar = false;

    for (pos, ch) in input.char_indices() {
        if attr_depth > 0 {
            match ch {
                '(' => attr_depth += 1,
                ')' => attr_depth -= 1,
                _ => {}
            }
            out.push(Scanned { pos, ch, top: attr_depth == 0 && stack.is_empty() });
            continue;
        }
        if let Some(q) = quote {
            out.push(Scanned { pos, ch, top: false });
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        if after_dollar && ch == '(' {
            after_dollar = false;
            attr_depth = 1;
            out.push(Scanned { pos, ch, top: stack.is_empty() });
            continue;
        }
        after_dollar = ch == '$';
        let top = match ch {
            '"' | '\'' => {
                quote = Some(ch);
                false
            }
            '(' | '[' => {
                stack.push(ch);
                stack.len() == 1
            }
            ')' | ']' => {
                let expected = if ch == ')' { '(' } else { '[' };
                if stack.pop() != Some(expected) {
                    return Err(FormulaError::syntax(format!("Unbalanced '{}' at offset {}", ch, pos)));
                }
                stack.is_empty()
            }
            _ => stack.is_empty(),
        };
        out.push(Scanned { pos, ch, top });
    }

    if attr_depth > 0 {
        return Err(FormulaError::syntax("Unclosed attribute reference"));
    }
    if quote.is_some() {
        return Err(FormulaError::syntax("Unterminated string literal"));
    }
    if let Some(open) = stack.last() {
        return Err(FormulaError::syntax(format!("Unclosed '{}'", open)));
    }
    Ok(out)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn parse_expr(input: &str) -> Result<Ast, FormulaError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(FormulaError::syntax("Empty expression"));
    }
    parse_or(input)
}

/// Offset of the last depth-zero occurrence of keyword `word`
fn find_keyword(input: &str, scanned: &[Scanned], word: &str) -> Option<usize> {
    let mut found = None;
    for (i, s) in scanned.iter().enumerate() {
        if !s.top || !input[s.pos..].starts_with(word) {
            continue;
        }
        let before_ok = i == 0 || !is_ident_char(scanned[i - 1].ch);
        let after = input[s.pos + word.len()..].chars().next();
        let after_ok = after.map_or(true, |c| !is_ident_char(c));
        if before_ok && after_ok {
            found = Some(s.pos);
        }
    }
    found
}

fn parse_keyword_level(
    input: &str,
    word: &str,
    tag: Tag,
    this_level: fn(&str) -> Result<Ast, FormulaError>,
    next_level: fn(&str) -> Result<Ast, FormulaError>,
) -> Result<Ast, FormulaError> {
    let scanned = scan(input)?;
    if let Some(pos) = find_keyword(input, &scanned, word) {
        let left = input[..pos].trim();
        let right = input[pos + word.len()..].trim();
        if left.is_empty() || right.is_empty() {
            return Err(FormulaError::syntax(format!("'{}' needs two operands", word)));
        }
        return Ok(Ast::node(tag, vec![this_level(left)?, next_level(right)?]));
    }
    next_level(input)
}

fn parse_or(input: &str) -> Result<Ast, FormulaError> {
    parse_keyword_level(input, "or", Tag::Or, parse_or, parse_and)
}

fn parse_and(input: &str) -> Result<Ast, FormulaError> {
    parse_keyword_level(input, "and", Tag::And, parse_and, parse_comparison)
}

/// Comparisons do not chain: `a < b < c` is a syntax error
fn parse_comparison(input: &str) -> Result<Ast, FormulaError> {
    let scanned = scan(input)?;

    for (i, s) in scanned.iter().enumerate() {
        if !s.top || !matches!(s.ch, '<' | '>' | '=' | '!') {
            continue;
        }
        let next = scanned.get(i + 1).map(|n| n.ch);
        let (tag, op_len) = match (s.ch, next) {
            ('<', Some('=')) => (Tag::Le, 2),
            ('>', Some('=')) => (Tag::Ge, 2),
            ('=', Some('=')) => (Tag::Equality, 2),
            ('!', Some('=')) => (Tag::Inequality, 2),
            ('<', _) => (Tag::Lt, 1),
            ('>', _) => (Tag::Gt, 1),
            _ => return Err(FormulaError::syntax(format!("Unexpected '{}' at offset {}", s.ch, s.pos))),
        };
        let left = input[..s.pos].trim();
        let right = input[s.pos + op_len..].trim();
        if left.is_empty() || right.is_empty() {
            return Err(FormulaError::syntax("Comparison needs two operands"));
        }
        return Ok(Ast::node(tag, vec![parse_additive(left)?, parse_additive(right)?]));
    }

    parse_additive(input)
}

/// Previous depth-zero, non-space character before index `i`
fn previous_significant(scanned: &[Scanned], i: usize) -> Option<(usize, char)> {
    scanned[..i].iter().enumerate().rev()
        .find(|(_, s)| !s.ch.is_whitespace())
        .map(|(j, s)| (j, s.ch))
}

/// `1e-5` style exponent sign
fn is_exponent_sign(scanned: &[Scanned], i: usize) -> bool {
    match i.checked_sub(2) {
        Some(j) => matches!(scanned[i - 1].ch, 'e' | 'E') && scanned[j].ch.is_ascii_digit(),
        None => false,
    }
}

fn parse_additive(input: &str) -> Result<Ast, FormulaError> {
    let scanned = scan(input)?;

    for i in (0..scanned.len()).rev() {
        let s = scanned[i];
        if !s.top || !matches!(s.ch, '+' | '-') {
            continue;
        }
        // A sign after an operator, or at the start, is unary
        let binary = match previous_significant(&scanned, i) {
            None => false,
            Some((_, prev)) => !matches!(prev, '+' | '-' | '*' | '/' | '<' | '>' | '=' | '!' | ','),
        };
        if !binary || is_exponent_sign(&scanned, i) {
            continue;
        }
        let left = input[..s.pos].trim();
        let right = input[s.pos + 1..].trim();
        if right.is_empty() {
            return Err(FormulaError::syntax(format!("Missing operand after '{}'", s.ch)));
        }
        let tag = if s.ch == '+' { Tag::Suma } else { Tag::Resta };
        return Ok(Ast::node(tag, vec![parse_additive(left)?, parse_multiplicative(right)?]));
    }

    parse_multiplicative(input)
}

fn parse_multiplicative(input: &str) -> Result<Ast, FormulaError> {
    let scanned = scan(input)?;

    for i in (0..scanned.len()).rev() {
        let s = scanned[i];
        if !s.top || !matches!(s.ch, '*' | '/') {
            continue;
        }
        if s.ch == '*' {
            let prev_star = i > 0 && scanned[i - 1].ch == '*';
            let next_star = scanned.get(i + 1).map_or(false, |n| n.ch == '*');
            if prev_star || next_star {
                continue;
            }
        }
        let left = input[..s.pos].trim();
        let right = input[s.pos + 1..].trim();
        if left.is_empty() || right.is_empty() {
            return Err(FormulaError::syntax(format!("'{}' needs two operands", s.ch)));
        }
        let tag = if s.ch == '*' { Tag::Producto } else { Tag::Division };
        return Ok(Ast::node(tag, vec![parse_multiplicative(left)?, parse_unary(right)?]));
    }

    parse_unary(input)
}

fn parse_unary(input: &str) -> Result<Ast, FormulaError> {
    let input = input.trim();
    if let Some(rest) = input.strip_prefix('-') {
        if rest.trim().is_empty() {
            return Err(FormulaError::syntax("Missing operand after '-'"));
        }
        return Ok(Ast::node(Tag::Negacion, vec![parse_unary(rest)?]));
    }
    if let Some(rest) = input.strip_prefix('+') {
        return parse_unary(rest);
    }
    parse_power(input)
}

/// `**` is right associative and binds tighter than unary minus on its left
fn parse_power(input: &str) -> Result<Ast, FormulaError> {
    let scanned = scan(input)?;

    for i in 0..scanned.len().saturating_sub(1) {
        let s = scanned[i];
        if s.top && s.ch == '*' && scanned[i + 1].ch == '*' {
            let left = input[..s.pos].trim();
            let right = input[s.pos + 2..].trim();
            if left.is_empty() || right.is_empty() {
                return Err(FormulaError::syntax("'**' needs two operands"));
            }
            return Ok(Ast::node(Tag::Potencia, vec![parse_postfix(left)?, parse_unary(right)?]));
        }
    }

    parse_postfix(input)
}

/// Trailing `[index]`
fn parse_postfix(input: &str) -> Result<Ast, FormulaError> {
    let input = input.trim();
    if !input.ends_with(']') {
        return parse_primary(input);
    }
    let scanned = scan(input)?;
    // The opening bracket matching the final ']' is the last depth-zero '['
    let open = scanned.iter().rev().find(|s| s.top && s.ch == '[').map(|s| s.pos);
    let Some(open) = open else {
        return parse_primary(input);
    };
    let target = input[..open].trim();
    if target.is_empty() {
        return Err(FormulaError::syntax("List literals are not supported"));
    }
    let index = parse_expr(&input[open + 1..input.len() - 1])?;

    if is_wrapped(target, '(', ')')? {
        Ok(Ast::node(Tag::Indexing2, vec![parse_primary(target)?, index]))
    } else {
        Ok(Ast::node(Tag::Indexing, vec![parse_postfix(target)?, index]))
    }
}

/// True when `input` is one `open ... close` group spanning the whole text
fn is_wrapped(input: &str, open: char, close: char) -> Result<bool, FormulaError> {
    if !input.starts_with(open) || !input.ends_with(close) {
        return Ok(false);
    }
    let scanned = scan(input)?;
    let top_count = scanned.iter().filter(|s| s.top).count();
    // Only the opening and the closing character sit at depth zero
    Ok(top_count == 2)
}

fn parse_primary(input: &str) -> Result<Ast, FormulaError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(FormulaError::syntax("Missing operand"));
    }

    // Attribute reference $(name)
    if input.starts_with('$') {
        let scanned = scan(input)?;
        let close = scanned.iter().skip(2).find(|s| s.top && s.ch == ')').map(|s| s.pos);
        if input[1..].starts_with('(') && close == Some(input.len() - 1) {
            let name = input[2..input.len() - 1].trim();
            if name.is_empty() {
                return Err(FormulaError::syntax("Empty attribute reference"));
            }
            return Ok(Ast::leaf(Tag::Attribute, name));
        }
        return Err(FormulaError::syntax(format!("Malformed attribute reference '{}'", input)));
    }

    // Parentheses
    if is_wrapped(input, '(', ')')? {
        return Ok(Ast::node(Tag::Parentesis, vec![parse_expr(&input[1..input.len() - 1])?]));
    }

    // String literal
    if let Some(quote) = input.chars().next().filter(|c| *c == '"' || *c == '\'') {
        let scanned = scan(input)?;
        let closes_at_end = scanned.iter().skip(1)
            .position(|s| s.ch == quote && !is_escaped(&scanned, s))
            .map(|p| p + 2 == scanned.len())
            .unwrap_or(false);
        if closes_at_end {
            return Ok(Ast::leaf(Tag::Texto, unescape(&input[1..input.len() - 1])));
        }
        return Err(FormulaError::syntax(format!("Unexpected text after string literal in '{}'", input)));
    }

    match input {
        "true" => return Ok(Ast::node(Tag::True, vec![])),
        "false" => return Ok(Ast::node(Tag::False, vec![])),
        "e" | "E" => return Ok(Ast::node(Tag::Natural, vec![])),
        _ => {}
    }

    // Number
    if input.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        if input.parse::<f64>().is_ok() {
            return Ok(Ast::leaf(Tag::Numero, input));
        }
        return Err(FormulaError::syntax(format!("Invalid number '{}'", input)));
    }

    // Function call name(args)
    if let Some(paren_pos) = input.find('(') {
        let name = input[..paren_pos].trim();
        let call = &input[paren_pos..];
        let valid_name = name.starts_with(|c: char| c.is_alphabetic() || c == '_')
            && name.chars().all(is_ident_char);
        if valid_name && is_wrapped(call, '(', ')')? {
            let mut children = vec![Ast::Token(name.to_string())];
            children.extend(parse_args(&call[1..call.len() - 1])?);
            return Ok(Ast::node(Tag::Function, children));
        }
    }

    Err(FormulaError::syntax(format!("Unexpected token '{}'", input)))
}

fn is_escaped(scanned: &[Scanned], target: &Scanned) -> bool {
    let idx = scanned.iter().position(|s| s.pos == target.pos).unwrap_or(0);
    let backslashes = scanned[..idx].iter().rev().take_while(|s| s.ch == '\\').count();
    backslashes % 2 == 1
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_args(input: &str) -> Result<Vec<Ast>, FormulaError> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }

    let scanned = scan(input)?;
    let mut args = Vec::new();
    let mut current_start = 0;
    for s in scanned.iter().filter(|s| s.top && s.ch == ',') {
        args.push(parse_expr(&input[current_start..s.pos])?);
        current_start = s.pos + 1;
    }
    args.push(parse_expr(&input[current_start..])?);
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_of(ast: &Ast) -> Tag {
        ast.as_node().unwrap().data
    }

    fn children(ast: &Ast) -> &[Ast] {
        &ast.as_node().unwrap().children
    }

    #[test]
    fn test_attribute_sum() {
        let ast = parse("$(a) + $(b)").unwrap();
        assert_eq!(tag_of(&ast), Tag::Suma);
        assert_eq!(ast.attributes(), vec!["a", "b"]);
    }

    #[test]
    fn test_attribute_names_with_spaces_and_operators() {
        let ast = parse("$(total - net) * 2").unwrap();
        assert_eq!(tag_of(&ast), Tag::Producto);
        assert_eq!(ast.attributes(), vec!["total - net"]);
    }

    #[test]
    fn test_attribute_names_with_quotes_and_keywords() {
        let ast = parse("$(patient's age) + $(say \"hi\")").unwrap();
        assert_eq!(tag_of(&ast), Tag::Suma);
        assert_eq!(ast.attributes(), vec!["patient's age", "say \"hi\""]);

        let ast = parse("$(brand and model) == 'x'").unwrap();
        assert_eq!(tag_of(&ast), Tag::Equality);
        assert_eq!(ast.attributes(), vec!["brand and model"]);

        let ast = parse("($(f(x)))[0]").unwrap();
        assert_eq!(tag_of(&ast), Tag::Indexing2);
        assert_eq!(ast.attributes(), vec!["f(x)"]);

        assert!(parse("$(it's").is_err());
    }

    #[test]
    fn test_left_associative_subtraction() {
        let ast = parse("10 - 4 - 3").unwrap();
        assert_eq!(ast.to_string(), "10 - 4 - 3");
        assert_eq!(tag_of(&children(&ast)[0]), Tag::Resta);
    }

    #[test]
    fn test_precedence() {
        let ast = parse("1 + 2 * 3 ** 2").unwrap();
        assert_eq!(tag_of(&ast), Tag::Suma);
        let product = &children(&ast)[1];
        assert_eq!(tag_of(product), Tag::Producto);
        assert_eq!(tag_of(&children(product)[1]), Tag::Potencia);
    }

    #[test]
    fn test_power_is_right_associative() {
        let ast = parse("2 ** 3 ** 2").unwrap();
        assert_eq!(tag_of(&children(&ast)[1]), Tag::Potencia);
    }

    #[test]
    fn test_unary_minus() {
        let ast = parse("2 * -$(a)").unwrap();
        assert_eq!(tag_of(&children(&ast)[1]), Tag::Negacion);
        let ast = parse("-3 + 1").unwrap();
        assert_eq!(tag_of(&ast), Tag::Suma);
        assert_eq!(tag_of(&children(&ast)[0]), Tag::Negacion);
    }

    #[test]
    fn test_scientific_notation() {
        let ast = parse("1e-3 + 1").unwrap();
        assert_eq!(tag_of(&ast), Tag::Suma);
        assert_eq!(children(&ast)[0], Ast::leaf(Tag::Numero, "1e-3"));
    }

    #[test]
    fn test_boolean_keywords() {
        let ast = parse("$(a) > 1 and $(b) < 2 or floor($(c)) == 3").unwrap();
        assert_eq!(tag_of(&ast), Tag::Or);
        assert_eq!(tag_of(&children(&ast)[0]), Tag::And);
        assert_eq!(tag_of(&children(&ast)[1]), Tag::Equality);
    }

    #[test]
    fn test_comparisons() {
        for (src, tag) in [
            ("1 <= 2", Tag::Le), ("1 < 2", Tag::Lt), ("1 >= 2", Tag::Ge),
            ("1 > 2", Tag::Gt), ("1 == 2", Tag::Equality), ("1 != 2", Tag::Inequality),
        ] {
            assert_eq!(tag_of(&parse(src).unwrap()), tag, "{}", src);
        }
    }

    #[test]
    fn test_function_call_args() {
        let ast = parse("substring($(name), 0, length(\"a,b\"))").unwrap();
        assert_eq!(tag_of(&ast), Tag::Function);
        let kids = children(&ast);
        assert_eq!(kids[0], Ast::Token("substring".to_string()));
        assert_eq!(kids.len(), 4);
        assert_eq!(tag_of(&kids[3]), Tag::Function);
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse("'it''s'").is_err(), true);
        assert_eq!(parse("\"a \\\"b\\\"\"").unwrap(), Ast::leaf(Tag::Texto, "a \"b\""));
        assert_eq!(tag_of(&parse("true").unwrap()), Tag::True);
        assert_eq!(tag_of(&parse("e").unwrap()), Tag::Natural);
    }

    #[test]
    fn test_indexing_forms() {
        let ast = parse("split($(tags), \",\")[0]").unwrap();
        assert_eq!(tag_of(&ast), Tag::Indexing);
        let ast = parse("($(a) + \"x\")[1]").unwrap();
        assert_eq!(tag_of(&ast), Tag::Indexing2);
        assert_eq!(tag_of(&children(&ast)[0]), Tag::Parentesis);
        let ast = parse("$(m)[0][1]").unwrap();
        assert_eq!(tag_of(&children(&ast)[0]), Tag::Indexing);
    }

    #[test]
    fn test_syntax_errors() {
        for src in ["", "$(a) +", "(1 + 2", "1 + 2)", "$()", "1 < 2 < 3", "foo", "\"open", "1 = 2", "3 $(a)"] {
            let err = parse(src).unwrap_err();
            assert_eq!(err.kind, aggtree_core::ErrorKind::SyntaxError, "{}", src);
        }
    }
}
