mod builtins;
mod registry;

pub use registry::Registry;

use crate::context::EvalContext;
use crate::cursor::Cursor;
use crate::error::Error;
use crate::expr::{Call, Expression};
use crate::node::{Node, Scalar};

/// Which pass an operator runs in (spec.md §4.G). Merge is reserved for a
/// future host-defined tree-combination operator set and currently has no
/// built-in members; Param operators always fail (required-value
/// placeholders); Eval is everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Merge,
    Param,
    Eval,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Merge => write!(f, "merge"),
            Phase::Param => write!(f, "param"),
            Phase::Eval => write!(f, "eval"),
        }
    }
}

/// What running an opcall does to the tree (spec.md §4.C).
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Replace the scalar at the opcall's location with this node.
    Replace(Node),
    /// Splice this node in at the opcall's location, growing the tree
    /// (e.g. a future `inject` operator merging a subtree in place).
    Inject(Node),
    /// Remove the opcall's location from the tree entirely.
    Prune,
}

/// An operator contract (spec.md §4.C): a name, the phase it runs in, the
/// extra dependencies it needs beyond the auto-collected references in its
/// own arguments, and the run behavior itself.
pub trait Operator: Send + Sync {
    fn name(&self) -> &str;

    fn phase(&self) -> Phase {
        Phase::Eval
    }

    /// Dependencies beyond `call.args`' auto-collected references. Most
    /// operators need none; this exists for operators whose dependency set
    /// isn't fully described by their literal argument expressions.
    fn extra_dependencies(&self, _call: &Call, _ctx: &EvalContext) -> Vec<Cursor> {
        Vec::new()
    }

    fn run(&self, call: &Call, ctx: &EvalContext, registry: &Registry) -> Result<Response, Error>;
}

/// Operator names compiled directly by the expression parser from infix
/// syntax. These are evaluated inline by [eval] rather than dispatched
/// through the registry - they are part of the expression language itself,
/// not pluggable capabilities (spec.md §4.B).
const ARITHMETIC_NAMES: &[&str] = &[
    "+", "-", "*", "/", "%", "==", "!=", "<", ">", "<=", ">=", "&&", "!", "neg", "?:",
];

pub fn is_arithmetic(name: &str) -> bool {
    ARITHMETIC_NAMES.contains(&name)
}

/// Evaluate an [Expression] to a concrete [Node], recursing into nested
/// operator calls through `registry`. This is the one evaluator every
/// built-in operator (and the arithmetic/logical compiled forms) shares;
/// `grab` is, at its core, just this function applied to a reference.
pub fn eval(expr: &Expression, ctx: &EvalContext, registry: &Registry) -> Result<Node, Error> {
    match expr {
        Expression::Literal(s) => Ok(Node::Scalar(s.clone())),
        Expression::Reference(cursor) => ctx.resolve(cursor).cloned().ok_or_else(|| {
            Error::Reference {
                cursor: ctx.canonical(cursor).to_string(),
                message: "no such path in the document".into(),
            }
        }),
        Expression::EnvVar(name) => match std::env::var(name) {
            Ok(v) => Ok(Node::string(v)),
            Err(_) => Ok(Node::null()),
        },
        Expression::LogicalOr(l, r) => match eval(l, ctx, registry) {
            Ok(n) => Ok(n),
            Err(_) => eval(r, ctx, registry),
        },
        Expression::Call(call) => eval_call(call, ctx, registry),
    }
}

fn eval_call(call: &Call, ctx: &EvalContext, registry: &Registry) -> Result<Node, Error> {
    if is_arithmetic(&call.name) {
        return eval_arithmetic(call, ctx, registry);
    }
    match registry.get(&call.name) {
        Some(op) => match op.run(call, ctx, registry)? {
            Response::Replace(n) | Response::Inject(n) => Ok(n),
            Response::Prune => Ok(Node::null()),
        },
        None => Err(Error::Operator {
            operator: call.name.clone(),
            cursor: ctx.where_().to_string(),
            message: "unknown operator".into(),
        }),
    }
}

fn eval_arithmetic(call: &Call, ctx: &EvalContext, registry: &Registry) -> Result<Node, Error> {
    let op_err = |message: &str| Error::Operator {
        operator: call.name.clone(),
        cursor: ctx.where_().to_string(),
        message: message.to_string(),
    };

    match call.name.as_str() {
        "?:" => {
            let cond = eval(&call.args[0], ctx, registry)?;
            if cond.is_truthy() {
                eval(&call.args[1], ctx, registry)
            } else {
                eval(&call.args[2], ctx, registry)
            }
        }
        "!" => {
            let v = eval(&call.args[0], ctx, registry)?;
            Ok(Node::Scalar(Scalar::Bool(!v.is_truthy())))
        }
        "neg" => {
            let v = eval(&call.args[0], ctx, registry)?;
            match as_number(&v) {
                Some(Number::Int(i)) => Ok(Node::Scalar(Scalar::Int(-i))),
                Some(Number::Float(f)) => Ok(Node::Scalar(Scalar::Float(-f))),
                None => Err(mismatch(ctx, "number", &v)),
            }
        }
        "&&" => {
            let l = eval(&call.args[0], ctx, registry)?;
            let r = eval(&call.args[1], ctx, registry)?;
            Ok(Node::Scalar(Scalar::Bool(l.is_truthy() && r.is_truthy())))
        }
        "==" | "!=" => {
            let l = eval(&call.args[0], ctx, registry)?;
            let r = eval(&call.args[1], ctx, registry)?;
            let eq = l == r;
            Ok(Node::Scalar(Scalar::Bool(if call.name == "==" { eq } else { !eq })))
        }
        "<" | ">" | "<=" | ">=" => {
            let l = eval(&call.args[0], ctx, registry)?;
            let r = eval(&call.args[1], ctx, registry)?;
            let ord = compare(&l, &r).ok_or_else(|| op_err("cannot compare these values"))?;
            let result = match call.name.as_str() {
                "<" => ord == std::cmp::Ordering::Less,
                ">" => ord == std::cmp::Ordering::Greater,
                "<=" => ord != std::cmp::Ordering::Greater,
                ">=" => ord != std::cmp::Ordering::Less,
                _ => unreachable!(),
            };
            Ok(Node::Scalar(Scalar::Bool(result)))
        }
        "+" => {
            let l = eval(&call.args[0], ctx, registry)?;
            let r = eval(&call.args[1], ctx, registry)?;
            add(&l, &r).ok_or_else(|| mismatch(ctx, "number or string", &l))
        }
        "-" | "*" | "/" | "%" => {
            let l = eval(&call.args[0], ctx, registry)?;
            let r = eval(&call.args[1], ctx, registry)?;
            let (a, b) = match (as_number(&l), as_number(&r)) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(mismatch(ctx, "number", &l)),
            };
            arith(call.name.as_str(), a, b).map_err(|msg| op_err(&msg))
        }
        other => Err(op_err(&format!("unknown built-in operator `{}`", other))),
    }
}

fn mismatch(ctx: &EvalContext, expected: &str, found: &Node) -> Error {
    Error::TypeMismatch {
        cursor: ctx.where_().to_string(),
        expected: expected.into(),
        found: found.type_name().into(),
    }
}

enum Number {
    Int(i64),
    Float(f64),
}

fn as_number(n: &Node) -> Option<Number> {
    match n {
        Node::Scalar(Scalar::Int(i)) => Some(Number::Int(*i)),
        Node::Scalar(Scalar::Float(f)) => Some(Number::Float(*f)),
        _ => None,
    }
}

fn add(l: &Node, r: &Node) -> Option<Node> {
    match (as_number(l), as_number(r)) {
        (Some(a), Some(b)) => arith("+", a, b).ok().map(Node::Scalar),
        _ => match (l.as_str(), r.as_str()) {
            (Some(a), Some(b)) => Some(Node::string(format!("{}{}", a, b))),
            _ => None,
        },
    }
}

fn arith(op: &str, a: Number, b: Number) -> Result<Scalar, String> {
    match (a, b) {
        (Number::Int(a), Number::Int(b)) => match op {
            "+" => Ok(Scalar::Int(a + b)),
            "-" => Ok(Scalar::Int(a - b)),
            "*" => Ok(Scalar::Int(a * b)),
            "/" => {
                if b == 0 {
                    Err("division by zero".into())
                } else {
                    Ok(Scalar::Int(a / b))
                }
            }
            "%" => {
                if b == 0 {
                    Err("division by zero".into())
                } else {
                    Ok(Scalar::Int(a % b))
                }
            }
            _ => unreachable!(),
        },
        (a, b) => {
            let (a, b) = (to_f64(a), to_f64(b));
            match op {
                "+" => Ok(Scalar::Float(a + b)),
                "-" => Ok(Scalar::Float(a - b)),
                "*" => Ok(Scalar::Float(a * b)),
                "/" => {
                    if b == 0.0 {
                        Err("division by zero".into())
                    } else {
                        Ok(Scalar::Float(a / b))
                    }
                }
                "%" => {
                    if b == 0.0 {
                        Err("division by zero".into())
                    } else {
                        Ok(Scalar::Float(a % b))
                    }
                }
                _ => unreachable!(),
            }
        }
    }
}

fn to_f64(n: Number) -> f64 {
    match n {
        Number::Int(i) => i as f64,
        Number::Float(f) => f,
    }
}

fn compare(l: &Node, r: &Node) -> Option<std::cmp::Ordering> {
    match (as_number(l), as_number(r)) {
        (Some(a), Some(b)) => to_f64(a).partial_cmp(&to_f64(b)),
        _ => match (l.as_str(), r.as_str()) {
            (Some(a), Some(b)) => Some(a.cmp(b)),
            _ => None,
        },
    }
}

/// One dependency-flow node: the `(( ... ))` site, its parsed expression,
/// where it lives in the tree, and the canonical form of that location
/// (spec.md §4.D - the dataflow builder's unit of work).
#[derive(Debug, Clone)]
pub struct OpCall {
    pub source: String,
    pub expr: Expression,
    pub where_: Cursor,
    pub canonical: Cursor,
}
