use std::collections::HashMap;

use super::builtins::{ConcatOp, DeferOp, GrabOp, ParamOp, PassThroughOp};
use super::Operator;

/// The operator registry (spec.md §4.C): read-only during a phase, and
/// idempotent on re-registration - registering a name a second time simply
/// replaces the previous handler, matching a host that wants to override one
/// built-in without rebuilding the whole set.
pub struct Registry {
    operators: HashMap<String, Box<dyn Operator>>,
}

impl Registry {
    /// An empty registry with none of the language's own built-ins. Mostly
    /// useful for tests that only exercise the arithmetic/logical forms,
    /// which bypass the registry entirely.
    pub fn new() -> Self {
        Registry {
            operators: HashMap::new(),
        }
    }

    /// The registry an orchestrator actually runs with: the core built-in
    /// operators plus whatever a host has layered on with [Registry::register].
    pub fn with_builtins() -> Self {
        let mut r = Registry::new();
        r.register(Box::new(GrabOp));
        r.register(Box::new(ConcatOp));
        r.register(Box::new(DeferOp));
        r.register(Box::new(ParamOp));
        r.register(Box::new(PassThroughOp));
        r
    }

    pub fn register(&mut self, op: Box<dyn Operator>) {
        self.operators.insert(op.name().to_string(), op);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Operator> {
        self.operators.get(name).map(|b| b.as_ref())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operators.keys().map(|s| s.as_str())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::with_builtins()
    }
}
