use std::collections::{HashMap, HashSet};

use crate::config::Options;
use crate::context::{CancelToken, EvalContext};
use crate::cursor::{Cursor, Segment};
use crate::error::{Error, MultiError};
use crate::expr::{self, Expression};
use crate::node::{Node, Scalar};
use crate::operator::{is_arithmetic, OpCall, Operator, Phase, Registry};
use crate::trace::Trace;

/// The result of one phase's dependency-flow scan: the opcall set keyed by
/// canonical cursor string, its insertion order (for the `insertion`
/// tie-break), and the dependency edges `dep_key -> dependent_key`
/// (spec.md §4.D).
#[derive(Debug, Default)]
pub struct Flow {
    pub opcalls: HashMap<String, OpCall>,
    pub order: Vec<String>,
    pub edges: Vec<(String, String)>,
}

/// Which phase a parsed expression belongs to: the phase of its head
/// operator, or `Eval` for everything that isn't dispatched through the
/// registry (bare references/literals, and the compiled arithmetic forms,
/// which are language primitives rather than pluggable operators).
fn expression_phase(expr: &Expression, registry: &Registry) -> Phase {
    match expr {
        Expression::Call(call) if !is_arithmetic(&call.name) => {
            registry.get(&call.name).map(|op| op.phase()).unwrap_or(Phase::Eval)
        }
        _ => Phase::Eval,
    }
}

/// Recurse the tree, recording one opcall per scalar matching the `(( ... ))`
/// shape whose expression belongs to `phase`. Mapping keys are visited in
/// sorted order (BTreeMap's natural iteration order already guarantees this
/// - spec.md §4.D.2) and sequences in index order. Parse errors are
/// collected, not fatal: scanning continues (spec.md §7 propagation policy).
pub fn scan(
    tree: &Node,
    phase: Phase,
    registry: &Registry,
    options: &Options,
    trace: &Trace,
) -> (Flow, MultiError) {
    let mut flow = Flow::default();
    let mut errors = MultiError::new();
    let max_depth = options.max_cycle_depth;
    if let Err(depth) = scan_node(
        tree, &Cursor::root(), tree, phase, registry, options, &mut flow, &mut errors, 0, max_depth,
    ) {
        errors.push(Error::Cycle {
            remaining: vec![format!("max scan depth {} exceeded", depth)],
        });
    }
    trace.wave(0, flow.opcalls.len(), phase);
    (flow, errors)
}

#[allow(clippy::too_many_arguments)]
fn scan_node(
    node: &Node,
    cursor: &Cursor,
    tree: &Node,
    phase: Phase,
    registry: &Registry,
    options: &Options,
    flow: &mut Flow,
    errors: &mut MultiError,
    depth: usize,
    max_depth: usize,
) -> Result<(), usize> {
    if depth > max_depth {
        return Err(depth);
    }
    match node {
        Node::Mapping(m) => {
            for (k, v) in m {
                let mut child = cursor.clone();
                child.push(Segment::Key(k.clone()));
                scan_node(
                    v, &child, tree, phase, registry, options, flow, errors, depth + 1, max_depth,
                )?;
            }
        }
        Node::Sequence(s) => {
            for (i, v) in s.iter().enumerate() {
                let mut child = cursor.clone();
                child.push(Segment::Index(i));
                scan_node(
                    v, &child, tree, phase, registry, options, flow, errors, depth + 1, max_depth,
                )?;
            }
        }
        Node::Scalar(Scalar::String(s)) => {
            if expr::is_operator_expr(s) {
                let is_registered = |name: &str| registry.is_registered(name);
                match expr::parse(s, &is_registered) {
                    Ok(parsed) => {
                        if expression_phase(&parsed, registry) == phase {
                            let canonical = cursor.canonical_with(tree, &options.name_fields);
                            let key = canonical.to_string();
                            if !flow.opcalls.contains_key(&key) {
                                flow.order.push(key.clone());
                            }
                            flow.opcalls.insert(
                                key,
                                OpCall {
                                    source: s.clone(),
                                    expr: parsed,
                                    where_: cursor.clone(),
                                    canonical,
                                },
                            );
                        }
                    }
                    Err(e) => errors.push(e),
                }
            }
        }
        Node::Scalar(_) => {}
    }
    Ok(())
}

/// Resolve `dep` to the canonical key of the opcall that produces it: try
/// its own canonical cursor, then each ancestor in turn, until an opcall is
/// found or root is reached (spec.md §4.D.4).
fn resolve_dependency(
    dep: &Cursor,
    tree: &Node,
    options: &Options,
    opcalls: &HashMap<String, OpCall>,
) -> Option<String> {
    let mut current = Some(dep.canonical_with(tree, &options.name_fields));
    while let Some(c) = current {
        let key = c.to_string();
        if opcalls.contains_key(&key) {
            return Some(key);
        }
        current = c.parent();
    }
    None
}

/// Build the dependency edges for every opcall in `flow` (spec.md §4.D.4).
/// Self-referential dependencies (an opcall depending on its own call site)
/// are dropped rather than turned into a guaranteed-cycle edge; a genuinely
/// self-referential expression is nonsensical input, not a schedulable one.
pub fn build_edges(
    flow: &mut Flow,
    tree: &Node,
    registry: &Registry,
    options: &Options,
    cancel: &CancelToken,
) {
    let mut edges = Vec::new();
    for key in &flow.order {
        let opcall = match flow.opcalls.get(key) {
            Some(o) => o,
            None => continue,
        };
        let mut refs = Vec::new();
        opcall.expr.collect_references(&mut refs);
        if let Expression::Call(call) = &opcall.expr {
            if !is_arithmetic(&call.name) {
                if let Some(op) = registry.get(&call.name) {
                    let ctx = EvalContext::new(tree, options, opcall.where_.clone(), cancel.clone());
                    refs.extend(op.extra_dependencies(call, &ctx));
                }
            }
        }
        for dep in refs {
            if let Some(dep_key) = resolve_dependency(&dep, tree, options, &flow.opcalls) {
                if dep_key != *key {
                    edges.push((dep_key, key.clone()));
                }
            }
        }
    }
    flow.edges = edges;
}

fn is_prefix(prefix: &Cursor, full: &Cursor) -> bool {
    let p = prefix.segments();
    let f = full.segments();
    p.len() <= f.len() && p == &f[..p.len()]
}

/// Filter `flow` down to the transitive closure (under dependencies) of
/// every opcall directly under a cherry-pick path, or leave it untouched if
/// no opcalls qualify (spec.md §4.D.5, and the "empty closure evaluates
/// everything" policy from spec.md §9).
pub fn cherry_pick_filter(flow: &mut Flow, tree: &Node, options: &Options) {
    if options.cherry_pick_paths.is_empty() {
        return;
    }
    let picks: Vec<Cursor> = options
        .cherry_pick_paths
        .iter()
        .map(|p| p.canonical_with(tree, &options.name_fields))
        .collect();

    let mut needed: HashSet<String> = flow
        .order
        .iter()
        .filter(|key| {
            let opcall = &flow.opcalls[*key];
            picks.iter().any(|p| is_prefix(p, &opcall.canonical))
        })
        .cloned()
        .collect();

    if needed.is_empty() {
        return;
    }

    let mut changed = true;
    let mut iterations = 0usize;
    while changed && iterations < 1_000_000 {
        changed = false;
        iterations += 1;
        for (dep, dependent) in &flow.edges {
            if needed.contains(dependent) && !needed.contains(dep) {
                needed.insert(dep.clone());
                changed = true;
            }
        }
    }

    flow.opcalls.retain(|k, _| needed.contains(k));
    flow.order.retain(|k| needed.contains(k));
    flow.edges.retain(|(a, b)| needed.contains(a) && needed.contains(b));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_tree() -> Node {
        let mut root = BTreeMap::new();
        root.insert("a".to_string(), Node::string("(( grab b ))"));
        root.insert("b".to_string(), Node::string("hi"));
        root.insert("bad".to_string(), Node::string("(( grab nonexistent ))"));
        Node::Mapping(root)
    }

    #[test]
    fn scan_records_opcalls_for_matching_phase() {
        let tree = sample_tree();
        let registry = Registry::with_builtins();
        let options = Options::default();
        let (flow, errors) = scan(&tree, Phase::Eval, &registry, &options, &Trace::None);
        assert!(errors.is_empty());
        assert_eq!(flow.opcalls.len(), 2);
        assert!(flow.opcalls.contains_key("a"));
        assert!(flow.opcalls.contains_key("bad"));
    }

    #[test]
    fn cherry_pick_without_matches_evaluates_everything() {
        let tree = sample_tree();
        let registry = Registry::with_builtins();
        let mut options = Options::default();
        options.cherry_pick_paths = vec![Cursor::parse("nowhere")];
        let (mut flow, _) = scan(&tree, Phase::Eval, &registry, &options, &Trace::None);
        build_edges(&mut flow, &tree, &registry, &options, &CancelToken::new());
        cherry_pick_filter(&mut flow, &tree, &options);
        assert_eq!(flow.opcalls.len(), 2);
    }

    #[test]
    fn cherry_pick_prunes_unrelated_opcalls() {
        let tree = sample_tree();
        let registry = Registry::with_builtins();
        let mut options = Options::default();
        options.cherry_pick_paths = vec![Cursor::parse("a")];
        let (mut flow, _) = scan(&tree, Phase::Eval, &registry, &options, &Trace::None);
        build_edges(&mut flow, &tree, &registry, &options, &CancelToken::new());
        cherry_pick_filter(&mut flow, &tree, &options);
        assert_eq!(flow.opcalls.len(), 1);
        assert!(flow.opcalls.contains_key("a"));
    }
}
