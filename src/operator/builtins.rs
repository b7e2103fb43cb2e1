use crate::context::EvalContext;
use crate::error::Error;
use crate::expr::Call;
use crate::node::Node;

use super::{eval, Operator, Phase, Registry, Response};

/// `grab a.b.c` / `grab a || b || "default"` - resolve one or more
/// expressions against the tree, returning the first fallback-chain value
/// that succeeds. With exactly one argument, `grab` is the auto-dependency
/// evaluator applied directly: it *is* `eval(args[0])`. With more than one
/// argument it collects every value into a sequence.
pub struct GrabOp;

impl Operator for GrabOp {
    fn name(&self) -> &str {
        "grab"
    }

    fn run(&self, call: &Call, ctx: &EvalContext, registry: &Registry) -> Result<Response, Error> {
        if call.args.is_empty() {
            return Err(Error::Operator {
                operator: "grab".into(),
                cursor: ctx.where_().to_string(),
                message: "grab requires at least one argument".into(),
            });
        }
        if call.args.len() == 1 {
            return Ok(Response::Replace(eval(&call.args[0], ctx, registry)?));
        }
        let mut values = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            values.push(eval(arg, ctx, registry)?);
        }
        Ok(Response::Replace(Node::Sequence(values)))
    }
}

/// `concat a "-" b` - evaluate every argument and join their scalar string
/// renderings. Non-scalar arguments (a map or list resolved by reference)
/// are a type error: there is no well-defined string form for them.
pub struct ConcatOp;

impl Operator for ConcatOp {
    fn name(&self) -> &str {
        "concat"
    }

    fn run(&self, call: &Call, ctx: &EvalContext, registry: &Registry) -> Result<Response, Error> {
        let mut out = String::new();
        for arg in &call.args {
            let value = eval(arg, ctx, registry)?;
            match &value {
                Node::Scalar(s) => out.push_str(&s.to_string()),
                _ => {
                    return Err(Error::TypeMismatch {
                        cursor: ctx.where_().to_string(),
                        expected: "scalar".into(),
                        found: value.type_name().into(),
                    })
                }
            }
        }
        Ok(Response::Replace(Node::string(out)))
    }
}

/// `defer <anything>` - the parser reconstructs the deferred expression's
/// original `(( ... ))` source as this operator's sole literal argument;
/// running it just re-emits that source as a string, untouched by this
/// evaluation pass (spec.md's "host-specific templating" escape hatch).
pub struct DeferOp;

impl Operator for DeferOp {
    fn name(&self) -> &str {
        "defer"
    }

    fn run(&self, call: &Call, ctx: &EvalContext, _registry: &Registry) -> Result<Response, Error> {
        match call.args.first() {
            Some(crate::expr::Expression::Literal(crate::node::Scalar::String(s))) => {
                Ok(Response::Replace(Node::string(s.clone())))
            }
            _ => Err(Error::Operator {
                operator: "defer".into(),
                cursor: ctx.where_().to_string(),
                message: "malformed defer expression".into(),
            }),
        }
    }
}

/// `param "a human explanation"` - a required-value placeholder. It always
/// fails; its entire job is to stop a document that still has unfilled
/// parameters from reaching the Eval phase (spec.md §4.G: Param errors
/// short-circuit before Eval runs at all).
pub struct ParamOp;

impl Operator for ParamOp {
    fn name(&self) -> &str {
        "param"
    }

    fn phase(&self) -> Phase {
        Phase::Param
    }

    fn run(&self, call: &Call, ctx: &EvalContext, registry: &Registry) -> Result<Response, Error> {
        let message = match call.args.first() {
            Some(expr) => match eval(expr, ctx, registry) {
                Ok(Node::Scalar(s)) => s.to_string(),
                _ => "parameter was not provided".to_string(),
            },
            None => "parameter was not provided".to_string(),
        };
        Err(Error::Operator {
            operator: "param".into(),
            cursor: ctx.where_().to_string(),
            message,
        })
    }
}

/// The internal handler for expressions whose head is not a known operator:
/// the parser never treats this as an error, it just re-emits the original
/// text (spec.md §4.B unknown-operator policy). Not user-registrable under
/// its real name; nothing in the parser ever produces a call with a
/// different name that reaches here.
pub struct PassThroughOp;

impl Operator for PassThroughOp {
    fn name(&self) -> &str {
        "__passthrough__"
    }

    fn run(&self, call: &Call, ctx: &EvalContext, _registry: &Registry) -> Result<Response, Error> {
        match call.args.first() {
            Some(crate::expr::Expression::Literal(crate::node::Scalar::String(s))) => {
                Ok(Response::Replace(Node::string(s.clone())))
            }
            _ => Err(Error::Operator {
                operator: "__passthrough__".into(),
                cursor: ctx.where_().to_string(),
                message: "malformed pass-through expression".into(),
            }),
        }
    }
}
