use std::fmt::{self, Display, Formatter};

use crate::cursor::Cursor;
use crate::node::Scalar;

/// A tagged expression value, as named by spec.md §3. `LogicalOr` is kept as
/// its own variant (rather than compiled into an ordinary operator call)
/// because it is the one construct the infix grammar treats as a
/// fallback-chain primitive available inside *any* argument list, prefix or
/// infix (spec.md §4.B: "`||` inside an argument list combines adjacent
/// expressions into a LogicalOr chain").
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Scalar),
    Reference(Cursor),
    EnvVar(String),
    LogicalOr(Box<Expression>, Box<Expression>),
    /// A named operator call, either the registry-backed kind (`grab`,
    /// `concat`, ...) or one of the built-in infix operators the parser
    /// compiles precedence-climbed expressions into (`+`, `==`, `?:`, ...).
    Call(Call),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Expression>,
}

impl Expression {
    pub fn call<S: Into<String>>(name: S, args: Vec<Expression>) -> Self {
        Expression::Call(Call {
            name: name.into(),
            args,
        })
    }

    /// Every `Reference` cursor reachable from this expression, in
    /// left-to-right order. This is the "auto" dependency set spec.md §3
    /// passes to `Operator::dependencies`.
    pub fn collect_references(&self, out: &mut Vec<Cursor>) {
        match self {
            Expression::Reference(c) => out.push(c.clone()),
            Expression::LogicalOr(l, r) => {
                l.collect_references(out);
                r.collect_references(out);
            }
            Expression::Call(call) => {
                for a in &call.args {
                    a.collect_references(out);
                }
            }
            Expression::Literal(_) | Expression::EnvVar(_) => {}
        }
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(s) => write!(f, "{}", s),
            Expression::Reference(c) => write!(f, "{}", c),
            Expression::EnvVar(name) => write!(f, "${}", name),
            Expression::LogicalOr(l, r) => write!(f, "{} || {}", l, r),
            Expression::Call(call) => {
                write!(f, "{}", call.name)?;
                for a in &call.args {
                    write!(f, " {}", a)?;
                }
                Ok(())
            }
        }
    }
}
