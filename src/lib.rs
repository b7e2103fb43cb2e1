//! cfgraph is a library for evaluating declarative configuration documents:
//! hierarchical trees of mappings, sequences, and scalars whose scalar
//! leaves may embed `(( operator args ))` expressions that compute a value
//! by referencing other parts of the tree, reading an environment variable,
//! or combining other values.
//!
//! # Overview
//!
//! A document is represented as a [Node] tree. Evaluating a tree means: scan
//! it for operator expressions, build a dependency graph from the
//! references each expression makes, topologically execute that graph in
//! deterministic order, and apply each operator's response back into the
//! tree. [Orchestrator] drives this end to end across its three phases
//! (Merge, Param, Eval) and the post-processing step (prune, sort,
//! cherry-pick) that follows them.
//!
//! # Design
//!
//! The engine is split the way the underlying problem is split: a tree and
//! cursor model ([node], [cursor]) that knows nothing about expressions; an
//! expression parser ([expr]) that turns a source string into an
//! [expr::Expression] and knows nothing about the tree; an operator contract
//! ([operator]) that a handful of built-ins ([operator::Registry::with_builtins])
//! implement and a host can extend; a dependency-flow builder ([dataflow])
//! that turns a scanned tree into an opcall graph; and a scheduler
//! ([scheduler]) that walks that graph in waves, mutating the tree as it
//! goes. [postprocess] and [merge] are the two small pieces of tree surgery
//! everything else leans on.
//!
//! # Example
//!
//! ```
//! use cfgraph::{Node, Options, Orchestrator, Scalar};
//! use std::collections::BTreeMap;
//!
//! let mut meta = BTreeMap::new();
//! meta.insert("base".to_string(), Node::string("app"));
//! meta.insert("ver".to_string(), Node::string("1.0"));
//!
//! let mut root = BTreeMap::new();
//! root.insert("meta".to_string(), Node::Mapping(meta));
//! root.insert("name".to_string(), Node::string(r#"(( concat meta.base "-" meta.ver ))"#));
//!
//! let orchestrator = Orchestrator::new(Options::default()).unwrap();
//! let result = orchestrator.evaluate(Node::Mapping(root)).unwrap();
//! assert_eq!(
//!     result.as_mapping().unwrap().get("name").unwrap(),
//!     &Node::Scalar(Scalar::String("app-1.0".to_string()))
//! );
//! ```

mod config;
mod context;
mod cursor;
mod dataflow;
mod error;
mod expr;
mod merge;
mod node;
mod operator;
mod orchestrator;
mod postprocess;
mod scheduler;
mod trace;

pub use config::{Options, TieBreak};
pub use context::{CancelToken, EvalContext};
pub use cursor::{Cursor, Segment};
pub use error::{Error, MultiError};
pub use expr::{Call, Expression};
pub use merge::{merge, ArrayStrategy};
pub use node::{Node, Scalar, DEFAULT_NAME_FIELDS};
pub use operator::{eval, OpCall, Operator, Phase, Registry, Response};
pub use orchestrator::Orchestrator;
pub use trace::Trace;

pub mod postprocess_api {
    //! Direct access to the prune/sort/cherry-pick primitives [Orchestrator]
    //! runs internally, for hosts that want to apply post-processing to a
    //! tree without going through a full Merge/Param/Eval run (e.g. after
    //! `skip_eval`).
    pub use crate::postprocess::{cherry_pick, cycle_guard, prune, sort};
}
