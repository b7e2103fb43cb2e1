use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::Options;
use crate::cursor::Cursor;
use crate::node::Node;

/// A cooperative cancellation flag shared across a single orchestrator run.
/// Nothing in this crate spawns threads on its own (spec.md §5: sequential by
/// contract), but a host embedding the scheduler across an async boundary can
/// flip this from outside to stop a run between opcall dispatches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The read-only view an [crate::operator::Operator] sees while running:
/// the merged tree as of the start of its phase, the active [Options], and
/// the cursor of the opcall currently being evaluated (for error context).
pub struct EvalContext<'a> {
    tree: &'a Node,
    options: &'a Options,
    where_: Cursor,
    cancel: CancelToken,
}

impl<'a> EvalContext<'a> {
    pub fn new(tree: &'a Node, options: &'a Options, where_: Cursor, cancel: CancelToken) -> Self {
        EvalContext {
            tree,
            options,
            where_,
            cancel,
        }
    }

    pub fn tree(&self) -> &'a Node {
        self.tree
    }

    pub fn options(&self) -> &'a Options {
        self.options
    }

    pub fn where_(&self) -> &Cursor {
        &self.where_
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn resolve(&self, cursor: &Cursor) -> Option<&'a Node> {
        cursor.resolve_with(self.tree, &self.options.name_fields)
    }

    pub fn canonical(&self, cursor: &Cursor) -> Cursor {
        cursor.canonical_with(self.tree, &self.options.name_fields)
    }

    /// A context identical to this one but pointed at a different opcall
    /// location, for recursive evaluation of nested expressions.
    pub fn with_where(&self, where_: Cursor) -> EvalContext<'a> {
        EvalContext {
            tree: self.tree,
            options: self.options,
            where_,
            cancel: self.cancel.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_round_trips() {
        let tok = CancelToken::new();
        assert!(!tok.is_cancelled());
        tok.cancel();
        assert!(tok.is_cancelled());
        assert!(tok.clone().is_cancelled());
    }
}
