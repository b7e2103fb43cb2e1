use crate::cursor::{Cursor, Segment};
use crate::error::Error;
use crate::node::Scalar;

use super::ast::Expression;
use super::lexer::{tokenize, Token, TokenKind};

/// Operator names that are part of the expression language itself and are
/// always recognized as prefix-call heads, independent of whatever is
/// registered in the [crate::operator::Registry]. `defer` is handled before
/// any of this dispatch (see [parse]); it is listed here only so
/// `looks_like_prefix_head` treats it consistently. Keep this list in sync
/// with [crate::operator::Registry::with_builtins] - a name listed here with
/// no matching `Operator` would be parsed as a real call and then fail at
/// dispatch with "unknown operator", instead of passing through unchanged as
/// spec.md §4.B requires for names the registry doesn't actually know.
const CORE_PREFIX_OPS: &[&str] = &["grab", "concat", "defer", "param"];

fn is_core_or_registered(name: &str, is_registered: &dyn Fn(&str) -> bool) -> bool {
    CORE_PREFIX_OPS.contains(&name) || is_registered(name)
}

fn parse_err(source: &str, position: usize, message: &str) -> Error {
    Error::Parse {
        source: source.to_string(),
        position,
        message: message.to_string(),
    }
}

/// Strip the `(( ... ))` delimiters, returning the trimmed inner content.
fn strip_delimiters(source: &str) -> Result<&str, Error> {
    let trimmed = source.trim();
    let inner = trimmed
        .strip_prefix("((")
        .and_then(|s| s.strip_suffix("))"))
        .ok_or_else(|| parse_err(source, 0, "not an operator expression (( ... )) shape"))?;
    Ok(inner.trim())
}

fn starts_primary(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Ident(_)
            | TokenKind::Int(_)
            | TokenKind::Float(_)
            | TokenKind::Str(_)
            | TokenKind::Dollar(_)
            | TokenKind::LParen
            | TokenKind::Bang
            | TokenKind::Minus
    )
}

fn pass_through(source: &str) -> Expression {
    Expression::call(
        "__passthrough__",
        vec![Expression::Literal(Scalar::String(source.trim().to_string()))],
    )
}

/// Parse the operator expression inside `source` (which includes the
/// `(( ... ))` delimiters). `is_registered` reports whether a name is a
/// known registry operator; it is consulted read-only (spec.md §4.C: "the
/// registry is read-only during a phase").
pub fn parse(source: &str, is_registered: &dyn Fn(&str) -> bool) -> Result<Expression, Error> {
    let content = strip_delimiters(source)?;
    if content.is_empty() {
        return Err(parse_err(source, 0, "empty expression"));
    }
    let tokens = tokenize(content)?;
    if tokens.is_empty() {
        return Err(parse_err(source, 0, "empty expression"));
    }

    if let TokenKind::Ident(name) = &tokens[0].kind {
        if name == "defer" {
            let rest_pos = tokens.get(1).map(|t| t.pos).unwrap_or(content.len());
            let rest = content[rest_pos..].trim();
            let reconstructed = if rest.is_empty() {
                "(()".to_string()
            } else {
                format!("(( {} ))", rest)
            };
            return Ok(Expression::call(
                "defer",
                vec![Expression::Literal(Scalar::String(reconstructed))],
            ));
        }

        let is_function_call = tokens.len() >= 2
            && matches!(tokens[1].kind, TokenKind::LParen)
            && !tokens[1].preceded_by_space;
        if is_function_call {
            return parse_function_call_form(source, &tokens, name.clone(), is_registered);
        }

        let has_following_primary = tokens.len() >= 2 && starts_primary(&tokens[1].kind);
        let dash_no_args = name.contains('-') && tokens.len() == 1;
        if has_following_primary || dash_no_args {
            return if is_core_or_registered(name, is_registered) {
                parse_prefix_form(source, &tokens, name.clone(), is_registered)
            } else {
                Ok(pass_through(source))
            };
        }
    }

    let mut idx = 0usize;
    let expr = parse_ternary(source, &tokens, &mut idx, is_registered)?;
    if idx != tokens.len() {
        return Err(parse_err(
            source,
            tokens[idx].pos,
            "unexpected trailing tokens",
        ));
    }
    Ok(expr)
}

fn parse_function_call_form(
    source: &str,
    tokens: &[Token],
    name: String,
    is_registered: &dyn Fn(&str) -> bool,
) -> Result<Expression, Error> {
    if !is_core_or_registered(&name, is_registered) {
        return Ok(pass_through(source));
    }
    let mut idx = 2; // past ident + '('
    let mut args = Vec::new();
    if !matches!(tokens.get(idx).map(|t| &t.kind), Some(TokenKind::RParen)) {
        loop {
            let arg = parse_ternary(source, tokens, &mut idx, is_registered)?;
            args.push(arg);
            match tokens.get(idx).map(|t| &t.kind) {
                Some(TokenKind::Comma) => {
                    idx += 1;
                }
                Some(TokenKind::RParen) => break,
                _ => {
                    return Err(parse_err(
                        source,
                        tokens.get(idx).map(|t| t.pos).unwrap_or(source.len()),
                        "expected `,` or `)`",
                    ))
                }
            }
        }
    }
    match tokens.get(idx).map(|t| &t.kind) {
        Some(TokenKind::RParen) => idx += 1,
        _ => {
            return Err(parse_err(
                source,
                tokens.get(idx).map(|t| t.pos).unwrap_or(source.len()),
                "unbalanced parentheses",
            ))
        }
    }
    if idx != tokens.len() {
        return Err(parse_err(
            source,
            tokens[idx].pos,
            "unexpected trailing tokens after function call",
        ));
    }
    Ok(Expression::call(name, args))
}

fn parse_prefix_form(
    source: &str,
    tokens: &[Token],
    name: String,
    is_registered: &dyn Fn(&str) -> bool,
) -> Result<Expression, Error> {
    let mut idx = 1usize;
    let mut args = Vec::new();
    while idx < tokens.len() {
        let mut arg = parse_arg_primary(source, tokens, &mut idx, is_registered)?;
        while matches!(tokens.get(idx).map(|t| &t.kind), Some(TokenKind::OrOr)) {
            idx += 1;
            if idx >= tokens.len() {
                return Err(parse_err(
                    source,
                    tokens.last().map(|t| t.pos).unwrap_or(0),
                    "trailing `||` with no right operand",
                ));
            }
            let rhs = parse_arg_primary(source, tokens, &mut idx, is_registered)?;
            arg = Expression::LogicalOr(Box::new(arg), Box::new(rhs));
        }
        args.push(arg);
    }
    Ok(Expression::call(name, args))
}

/// One prefix-form argument atom: literal, env-var, cursor reference, or a
/// parenthesized nested call/group (spec.md §4.B argument bullet list).
fn parse_arg_primary(
    source: &str,
    tokens: &[Token],
    idx: &mut usize,
    is_registered: &dyn Fn(&str) -> bool,
) -> Result<Expression, Error> {
    parse_primary(source, tokens, idx, is_registered)
}

fn parse_ternary(
    source: &str,
    tokens: &[Token],
    idx: &mut usize,
    is_registered: &dyn Fn(&str) -> bool,
) -> Result<Expression, Error> {
    let cond = parse_or(source, tokens, idx, is_registered)?;
    if matches!(tokens.get(*idx).map(|t| &t.kind), Some(TokenKind::Question)) {
        *idx += 1;
        let then_branch = parse_ternary(source, tokens, idx, is_registered)?;
        match tokens.get(*idx).map(|t| &t.kind) {
            Some(TokenKind::Colon) => *idx += 1,
            _ => {
                return Err(parse_err(
                    source,
                    tokens.get(*idx).map(|t| t.pos).unwrap_or(source.len()),
                    "`?` without matching `:`",
                ))
            }
        }
        let else_branch = parse_ternary(source, tokens, idx, is_registered)?;
        return Ok(Expression::call(
            "?:",
            vec![cond, then_branch, else_branch],
        ));
    }
    Ok(cond)
}

fn parse_or(
    source: &str,
    tokens: &[Token],
    idx: &mut usize,
    is_registered: &dyn Fn(&str) -> bool,
) -> Result<Expression, Error> {
    let mut left = parse_and(source, tokens, idx, is_registered)?;
    while matches!(tokens.get(*idx).map(|t| &t.kind), Some(TokenKind::OrOr)) {
        *idx += 1;
        if *idx >= tokens.len() {
            return Err(parse_err(
                source,
                tokens.last().map(|t| t.pos).unwrap_or(0),
                "trailing `||` with no right operand",
            ));
        }
        let right = parse_and(source, tokens, idx, is_registered)?;
        left = Expression::LogicalOr(Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_and(
    source: &str,
    tokens: &[Token],
    idx: &mut usize,
    is_registered: &dyn Fn(&str) -> bool,
) -> Result<Expression, Error> {
    let mut left = parse_equality(source, tokens, idx, is_registered)?;
    while matches!(tokens.get(*idx).map(|t| &t.kind), Some(TokenKind::AndAnd)) {
        *idx += 1;
        let right = parse_equality(source, tokens, idx, is_registered)?;
        left = Expression::call("&&", vec![left, right]);
    }
    Ok(left)
}

fn parse_equality(
    source: &str,
    tokens: &[Token],
    idx: &mut usize,
    is_registered: &dyn Fn(&str) -> bool,
) -> Result<Expression, Error> {
    let mut left = parse_relational(source, tokens, idx, is_registered)?;
    loop {
        let name = match tokens.get(*idx).map(|t| &t.kind) {
            Some(TokenKind::EqEq) => "==",
            Some(TokenKind::NotEq) => "!=",
            _ => break,
        };
        *idx += 1;
        let right = parse_relational(source, tokens, idx, is_registered)?;
        left = Expression::call(name, vec![left, right]);
    }
    Ok(left)
}

fn parse_relational(
    source: &str,
    tokens: &[Token],
    idx: &mut usize,
    is_registered: &dyn Fn(&str) -> bool,
) -> Result<Expression, Error> {
    let mut left = parse_additive(source, tokens, idx, is_registered)?;
    loop {
        let name = match tokens.get(*idx).map(|t| &t.kind) {
            Some(TokenKind::Lt) => "<",
            Some(TokenKind::Gt) => ">",
            Some(TokenKind::Le) => "<=",
            Some(TokenKind::Ge) => ">=",
            _ => break,
        };
        *idx += 1;
        let right = parse_additive(source, tokens, idx, is_registered)?;
        left = Expression::call(name, vec![left, right]);
    }
    Ok(left)
}

fn parse_additive(
    source: &str,
    tokens: &[Token],
    idx: &mut usize,
    is_registered: &dyn Fn(&str) -> bool,
) -> Result<Expression, Error> {
    let mut left = parse_multiplicative(source, tokens, idx, is_registered)?;
    loop {
        let name = match tokens.get(*idx).map(|t| &t.kind) {
            Some(TokenKind::Plus) => "+",
            Some(TokenKind::Minus) => "-",
            _ => break,
        };
        *idx += 1;
        let right = parse_multiplicative(source, tokens, idx, is_registered)?;
        left = Expression::call(name, vec![left, right]);
    }
    Ok(left)
}

fn parse_multiplicative(
    source: &str,
    tokens: &[Token],
    idx: &mut usize,
    is_registered: &dyn Fn(&str) -> bool,
) -> Result<Expression, Error> {
    let mut left = parse_unary(source, tokens, idx, is_registered)?;
    loop {
        let name = match tokens.get(*idx).map(|t| &t.kind) {
            Some(TokenKind::Star) => "*",
            Some(TokenKind::Slash) => "/",
            Some(TokenKind::Percent) => "%",
            _ => break,
        };
        *idx += 1;
        let right = parse_unary(source, tokens, idx, is_registered)?;
        left = Expression::call(name, vec![left, right]);
    }
    Ok(left)
}

fn parse_unary(
    source: &str,
    tokens: &[Token],
    idx: &mut usize,
    is_registered: &dyn Fn(&str) -> bool,
) -> Result<Expression, Error> {
    match tokens.get(*idx).map(|t| &t.kind) {
        Some(TokenKind::Bang) => {
            *idx += 1;
            let operand = parse_unary(source, tokens, idx, is_registered)?;
            Ok(Expression::call("!", vec![operand]))
        }
        Some(TokenKind::Minus) => {
            *idx += 1;
            let operand = parse_unary(source, tokens, idx, is_registered)?;
            Ok(Expression::call("neg", vec![operand]))
        }
        _ => parse_primary(source, tokens, idx, is_registered),
    }
}

fn parse_primary(
    source: &str,
    tokens: &[Token],
    idx: &mut usize,
    is_registered: &dyn Fn(&str) -> bool,
) -> Result<Expression, Error> {
    let tok = tokens.get(*idx).ok_or_else(|| {
        parse_err(
            source,
            tokens.last().map(|t| t.pos + 1).unwrap_or(0),
            "expected an expression",
        )
    })?;
    match &tok.kind {
        TokenKind::Int(n) => {
            *idx += 1;
            Ok(Expression::Literal(Scalar::Int(*n)))
        }
        TokenKind::Float(n) => {
            *idx += 1;
            Ok(Expression::Literal(Scalar::Float(*n)))
        }
        TokenKind::Str(s) => {
            *idx += 1;
            Ok(Expression::Literal(Scalar::String(s.clone())))
        }
        TokenKind::Dollar(name) => {
            *idx += 1;
            Ok(Expression::EnvVar(name.clone()))
        }
        TokenKind::Ident(name) if name == "true" => {
            *idx += 1;
            Ok(Expression::Literal(Scalar::Bool(true)))
        }
        TokenKind::Ident(name) if name == "false" => {
            *idx += 1;
            Ok(Expression::Literal(Scalar::Bool(false)))
        }
        TokenKind::Ident(name) if name == "nil" || name == "null" || name == "~" => {
            *idx += 1;
            Ok(Expression::Literal(Scalar::Null))
        }
        TokenKind::Ident(_) => parse_reference(source, tokens, idx),
        TokenKind::LParen => {
            *idx += 1;
            // Nested prefix call: `(op a b)` when the next token is a known
            // prefix-operator head (spec.md §4.B).
            if let Some(TokenKind::Ident(name)) = tokens.get(*idx).map(|t| &t.kind) {
                let next_is_primary_or_dash = tokens
                    .get(*idx + 1)
                    .map(|t| starts_primary(&t.kind))
                    .unwrap_or(false);
                if is_core_or_registered(name, is_registered)
                    && (next_is_primary_or_dash
                        || matches!(tokens.get(*idx + 1).map(|t| &t.kind), Some(TokenKind::RParen)))
                {
                    let name = name.clone();
                    *idx += 1;
                    let mut args = Vec::new();
                    while !matches!(tokens.get(*idx).map(|t| &t.kind), Some(TokenKind::RParen) | None)
                    {
                        let mut arg = parse_arg_primary(source, tokens, idx, is_registered)?;
                        while matches!(tokens.get(*idx).map(|t| &t.kind), Some(TokenKind::OrOr)) {
                            *idx += 1;
                            let rhs = parse_arg_primary(source, tokens, idx, is_registered)?;
                            arg = Expression::LogicalOr(Box::new(arg), Box::new(rhs));
                        }
                        args.push(arg);
                    }
                    match tokens.get(*idx).map(|t| &t.kind) {
                        Some(TokenKind::RParen) => *idx += 1,
                        _ => {
                            return Err(parse_err(
                                source,
                                tokens.get(*idx).map(|t| t.pos).unwrap_or(source.len()),
                                "unbalanced parentheses",
                            ))
                        }
                    }
                    return Ok(Expression::call(name, args));
                }
            }
            let inner = parse_ternary(source, tokens, idx, is_registered)?;
            match tokens.get(*idx).map(|t| &t.kind) {
                Some(TokenKind::RParen) => *idx += 1,
                _ => {
                    return Err(parse_err(
                        source,
                        tokens.get(*idx).map(|t| t.pos).unwrap_or(source.len()),
                        "unbalanced parentheses",
                    ))
                }
            }
            Ok(inner)
        }
        other => Err(parse_err(
            source,
            tok.pos,
            &format!("unexpected token {:?}", other),
        )),
    }
}

/// A dotted cursor reference: `a.b.2.c`. Numeric segments are recorded as
/// `Segment::Index`; others as `Segment::Name` (array-by-name vs. mapping key
/// ambiguity resolved later by `Cursor::canonical`).
fn parse_reference(source: &str, tokens: &[Token], idx: &mut usize) -> Result<Expression, Error> {
    let mut segments = Vec::new();
    match &tokens[*idx].kind {
        TokenKind::Ident(name) => segments.push(segment_from_str(name)),
        _ => unreachable!("parse_reference called on non-ident token"),
    }
    *idx += 1;
    while matches!(tokens.get(*idx).map(|t| &t.kind), Some(TokenKind::Dot)) {
        *idx += 1;
        match tokens.get(*idx).map(|t| &t.kind) {
            Some(TokenKind::Ident(name)) => {
                segments.push(segment_from_str(name));
                *idx += 1;
            }
            Some(TokenKind::Int(n)) if *n >= 0 => {
                segments.push(Segment::Index(*n as usize));
                *idx += 1;
            }
            _ => {
                return Err(parse_err(
                    source,
                    tokens.get(*idx).map(|t| t.pos).unwrap_or(source.len()),
                    "invalid reference syntax: expected a segment after `.`",
                ))
            }
        }
    }
    Ok(Expression::Reference(Cursor::from_segments(segments)))
}

fn segment_from_str(s: &str) -> Segment {
    match s.parse::<usize>() {
        Ok(i) => Segment::Index(i),
        Err(_) => Segment::Name(s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered(names: &'static [&'static str]) -> impl Fn(&str) -> bool {
        move |n: &str| names.contains(&n)
    }

    #[test]
    fn parses_prefix_form_concat() {
        let is_reg = registered(&["concat"]);
        let expr = parse(r#"(( concat meta.base "-" meta.ver ))"#, &is_reg).unwrap();
        match expr {
            Expression::Call(c) => {
                assert_eq!(c.name, "concat");
                assert_eq!(c.args.len(), 3);
            }
            _ => panic!("expected call"),
        }
    }

    #[test]
    fn parses_fallback_chain() {
        let is_reg = registered(&["grab"]);
        let expr = parse(r#"(( grab secrets.db || "default" ))"#, &is_reg).unwrap();
        match expr {
            Expression::Call(c) => {
                assert_eq!(c.name, "grab");
                assert_eq!(c.args.len(), 1);
                assert!(matches!(c.args[0], Expression::LogicalOr(_, _)));
            }
            _ => panic!("expected call"),
        }
    }

    #[test]
    fn parses_function_call_form() {
        let is_reg = registered(&["concat"]);
        let expr = parse(r#"(( concat(a, "-", b) ))"#, &is_reg).unwrap();
        match expr {
            Expression::Call(c) => {
                assert_eq!(c.name, "concat");
                assert_eq!(c.args.len(), 3);
            }
            _ => panic!("expected call"),
        }
    }

    #[test]
    fn unknown_operator_passes_through() {
        let is_reg = registered(&[]);
        let expr = parse(r#"(( something-weird here ))"#, &is_reg).unwrap();
        match expr {
            Expression::Call(c) => assert_eq!(c.name, "__passthrough__"),
            _ => panic!("expected pass-through call"),
        }
    }

    #[test]
    fn defer_reemits_inner_source() {
        let is_reg = registered(&[]);
        let expr = parse("(( defer concat a b ))", &is_reg).unwrap();
        match expr {
            Expression::Call(c) => {
                assert_eq!(c.name, "defer");
                match &c.args[0] {
                    Expression::Literal(Scalar::String(s)) => {
                        assert_eq!(s, "(( concat a b ))")
                    }
                    _ => panic!("expected literal"),
                }
            }
            _ => panic!("expected call"),
        }
    }

    #[test]
    fn parses_ternary_and_equality() {
        let is_reg = registered(&[]);
        let expr = parse(r#"(( a.b == "x" ? "yes" : "no" ))"#, &is_reg).unwrap();
        match expr {
            Expression::Call(c) => {
                assert_eq!(c.name, "?:");
                assert_eq!(c.args.len(), 3);
            }
            _ => panic!("expected ternary call"),
        }
    }

    #[test]
    fn rejects_ternary_missing_colon() {
        let is_reg = registered(&[]);
        assert!(parse(r#"(( a ? "yes" ))"#, &is_reg).is_err());
    }

    #[test]
    fn dash_name_no_args_passes_through_when_unregistered() {
        let is_reg = registered(&[]);
        let expr = parse("(( host-name ))", &is_reg).unwrap();
        match expr {
            Expression::Call(c) => assert_eq!(c.name, "__passthrough__"),
            _ => panic!("expected pass-through"),
        }
    }

    #[test]
    fn bare_reference_parses_without_operator() {
        let is_reg = registered(&[]);
        let expr = parse("(( meta.base ))", &is_reg).unwrap();
        assert!(matches!(expr, Expression::Reference(_)));
    }
}
