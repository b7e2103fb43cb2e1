mod ast;
mod lexer;
mod parser;

pub use ast::{Call, Expression};

use crate::error::Error;

/// Does `text` look like an operator expression at all? Used by the
/// dataflow scanner (spec.md §4.D) to decide whether a scalar needs parsing.
pub fn is_operator_expr(text: &str) -> bool {
    let t = text.trim();
    match t.strip_prefix("((").and_then(|s| s.strip_suffix("))")) {
        Some(inner) => !inner.trim().is_empty(),
        None => false,
    }
}

/// Parse the `(( ... ))` expression in `source`. `is_registered` is consulted
/// read-only to resolve the prefix-form/pass-through ambiguity (spec.md
/// §4.B).
pub fn parse(source: &str, is_registered: &dyn Fn(&str) -> bool) -> Result<Expression, Error> {
    parser::parse(source, is_registered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_operator_shape() {
        assert!(is_operator_expr("(( grab a.b ))"));
        assert!(!is_operator_expr("plain string"));
        assert!(!is_operator_expr("(( ))"));
    }
}
