use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Error;

/// A lexical token produced while splitting the inner content of an
/// `(( ... ))` expression. Positions are byte offsets into the trimmed inner
/// content, for error messages (spec.md §4.B error cases).
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    /// `$NAME` environment-variable token.
    Dollar(String),
    LParen,
    RParen,
    Comma,
    Dot,
    Question,
    Colon,
    OrOr,
    AndAnd,
    EqEq,
    NotEq,
    Le,
    Ge,
    Lt,
    Gt,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
    /// Whether whitespace immediately preceded this token - used to
    /// distinguish `op(a, b)` (function-call form, no space before `(`)
    /// from `op (a b)` (prefix form with a parenthesized argument).
    pub preceded_by_space: bool,
}

static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*").unwrap());
static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?").unwrap());

pub fn tokenize(content: &str) -> Result<Vec<Token>, Error> {
    let bytes = content.as_bytes();
    let mut i = 0usize;
    let mut tokens = Vec::new();
    let mut preceded_by_space = false;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_whitespace() {
            i += 1;
            preceded_by_space = true;
            continue;
        }
        let start = i;
        let kind = match c {
            '(' => {
                i += 1;
                TokenKind::LParen
            }
            ')' => {
                i += 1;
                TokenKind::RParen
            }
            ',' => {
                i += 1;
                TokenKind::Comma
            }
            '?' => {
                i += 1;
                TokenKind::Question
            }
            ':' => {
                i += 1;
                TokenKind::Colon
            }
            '+' => {
                i += 1;
                TokenKind::Plus
            }
            '*' => {
                i += 1;
                TokenKind::Star
            }
            '/' => {
                i += 1;
                TokenKind::Slash
            }
            '%' => {
                i += 1;
                TokenKind::Percent
            }
            '.' => {
                // A standalone dot is punctuation only when it is not part of
                // a leading numeric literal (handled below); as a cursor
                // separator it is consumed inside the reference scanner in
                // the parser, so here it is emitted as a lone token.
                i += 1;
                TokenKind::Dot
            }
            '|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    i += 2;
                    TokenKind::OrOr
                } else {
                    return Err(Error::Parse {
                        source: content.to_string(),
                        position: i,
                        message: "trailing `|` with no matching `||`".into(),
                    });
                }
            }
            '&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    i += 2;
                    TokenKind::AndAnd
                } else {
                    return Err(Error::Parse {
                        source: content.to_string(),
                        position: i,
                        message: "unexpected `&`".into(),
                    });
                }
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    TokenKind::EqEq
                } else {
                    return Err(Error::Parse {
                        source: content.to_string(),
                        position: i,
                        message: "unexpected `=`, did you mean `==`?".into(),
                    });
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    TokenKind::NotEq
                } else {
                    i += 1;
                    TokenKind::Bang
                }
            }
            '<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    TokenKind::Le
                } else {
                    i += 1;
                    TokenKind::Lt
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    TokenKind::Ge
                } else {
                    i += 1;
                    TokenKind::Gt
                }
            }
            '-' => {
                // A `-` that immediately precedes a digit with no identifier
                // before it reads as a negative number; otherwise it is the
                // subtraction operator, disambiguated by the parser from
                // context (a leading `-` at the start of a primary is always
                // a negative literal).
                i += 1;
                TokenKind::Minus
            }
            '$' => {
                let rest = &content[i + 1..];
                match IDENT_RE.find(rest) {
                    Some(m) => {
                        let name = m.as_str().to_string();
                        i += 1 + m.end();
                        TokenKind::Dollar(name)
                    }
                    None => {
                        return Err(Error::Parse {
                            source: content.to_string(),
                            position: i,
                            message: "expected environment variable name after `$`".into(),
                        })
                    }
                }
            }
            '"' | '\'' => {
                let quote = c;
                let mut j = i + 1;
                let mut value = String::new();
                let mut closed = false;
                while j < bytes.len() {
                    let ch = bytes[j] as char;
                    if ch == '\\' && j + 1 < bytes.len() {
                        let esc = bytes[j + 1] as char;
                        value.push(match esc {
                            'n' => '\n',
                            'r' => '\r',
                            't' => '\t',
                            '\\' => '\\',
                            '"' => '"',
                            '\'' => '\'',
                            other => other,
                        });
                        j += 2;
                    } else if ch == quote {
                        closed = true;
                        j += 1;
                        break;
                    } else {
                        value.push(ch);
                        j += 1;
                    }
                }
                if !closed {
                    return Err(Error::Parse {
                        source: content.to_string(),
                        position: i,
                        message: "unclosed quoted string".into(),
                    });
                }
                i = j;
                TokenKind::Str(value)
            }
            c if c.is_ascii_digit() => {
                let rest = &content[i..];
                let m = NUMBER_RE.find(rest).unwrap();
                let text = m.as_str();
                i += m.end();
                if text.contains('.') || text.contains('e') || text.contains('E') {
                    TokenKind::Float(text.parse().map_err(|_| Error::Parse {
                        source: content.to_string(),
                        position: start,
                        message: format!("invalid numeric literal `{}`", text),
                    })?)
                } else {
                    TokenKind::Int(text.parse().map_err(|_| Error::Parse {
                        source: content.to_string(),
                        position: start,
                        message: format!("invalid numeric literal `{}`", text),
                    })?)
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let rest = &content[i..];
                let m = IDENT_RE.find(rest).unwrap();
                let text = m.as_str().to_string();
                i += m.end();
                TokenKind::Ident(text)
            }
            other => {
                return Err(Error::Parse {
                    source: content.to_string(),
                    position: i,
                    message: format!("unexpected character `{}`", other),
                })
            }
        };
        tokens.push(Token {
            kind,
            pos: start,
            preceded_by_space,
        });
        preceded_by_space = false;
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_prefix_call() {
        let tokens = tokenize(r#"grab meta.base "-" meta.ver"#).unwrap();
        assert!(matches!(tokens[0].kind, TokenKind::Ident(ref s) if s == "grab"));
        assert!(tokens.iter().any(|t| matches!(t.kind, TokenKind::Str(_))));
    }

    #[test]
    fn rejects_unclosed_string() {
        assert!(tokenize(r#"concat "a"#).is_err());
    }

    #[test]
    fn rejects_trailing_pipe() {
        assert!(tokenize("grab a |").is_err());
    }
}
