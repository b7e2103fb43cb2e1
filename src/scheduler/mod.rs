use std::collections::{HashMap, HashSet};

use crate::config::{Options, TieBreak};
use crate::context::{CancelToken, EvalContext};
use crate::cursor::{Cursor, Segment};
use crate::dataflow::{self, Flow};
use crate::error::{Error, MultiError};
use crate::expr::Expression;
use crate::merge::{self, ArrayStrategy};
use crate::node::Node;
use crate::operator::{eval, is_arithmetic, Operator, OpCall, Phase, Registry, Response};
use crate::trace::Trace;

fn default_array_strategy(options: &Options) -> ArrayStrategy {
    if options.fallback_append {
        ArrayStrategy::Append
    } else {
        ArrayStrategy::Replace
    }
}

fn operator_label(expr: &Expression) -> String {
    match expr {
        Expression::Call(c) => c.name.clone(),
        _ => "eval".to_string(),
    }
}

/// Dispatch one opcall's top-level expression to a [Response]. Only the
/// head of a top-level expression can produce `Inject`/`Prune` - nested
/// argument expressions are always flattened to a plain value by [eval]
/// (spec.md §3: Inject/Prune are responses to the call site itself).
fn dispatch(expr: &Expression, ctx: &EvalContext, registry: &Registry) -> Result<Response, Error> {
    match expr {
        Expression::Call(call) if !is_arithmetic(&call.name) => match registry.get(&call.name) {
            Some(op) => op.run(call, ctx, registry),
            None => Err(Error::Operator {
                operator: call.name.clone(),
                cursor: ctx.where_().to_string(),
                message: "unknown operator".into(),
            }),
        },
        other => Ok(Response::Replace(eval(other, ctx, registry)?)),
    }
}

fn set_at(tree: &mut Node, where_: &Cursor, value: Node, options: &Options) -> Result<(), Error> {
    if where_.is_root() {
        *tree = value;
        return Ok(());
    }
    let parent_cursor = where_.parent().unwrap();
    let last = where_.last().cloned().unwrap();
    let parent = parent_cursor
        .resolve_mut_with(tree, &options.name_fields)
        .ok_or_else(|| Error::Reference {
            cursor: where_.to_string(),
            message: "call-site parent not found".into(),
        })?;
    match (parent, last) {
        (Node::Mapping(m), Segment::Key(k)) => {
            m.insert(k, value);
            Ok(())
        }
        (Node::Sequence(s), Segment::Index(i)) => {
            if i < s.len() {
                s[i] = value;
                Ok(())
            } else {
                Err(Error::Reference {
                    cursor: where_.to_string(),
                    message: "sequence index out of bounds".into(),
                })
            }
        }
        (parent_node, _) => Err(Error::TypeMismatch {
            cursor: where_.to_string(),
            expected: "map or list parent".into(),
            found: parent_node.type_name().into(),
        }),
    }
}

fn inject_at(tree: &mut Node, where_: &Cursor, value: Node, options: &Options) -> Result<(), Error> {
    let mapping_value = match value {
        Node::Mapping(m) => m,
        other => {
            return Err(Error::TypeMismatch {
                cursor: where_.to_string(),
                expected: "map".into(),
                found: other.type_name().into(),
            })
        }
    };
    let parent_cursor = where_.parent().unwrap_or_else(Cursor::root);
    let last = where_.last().cloned();
    let parent = parent_cursor
        .resolve_mut_with(tree, &options.name_fields)
        .ok_or_else(|| Error::Reference {
            cursor: where_.to_string(),
            message: "call-site parent not found".into(),
        })?;
    let parent_map = match parent {
        Node::Mapping(m) => m,
        other => {
            return Err(Error::TypeMismatch {
                cursor: where_.to_string(),
                expected: "map".into(),
                found: other.type_name().into(),
            })
        }
    };
    if let Some(Segment::Key(k)) = last {
        parent_map.remove(&k);
    }
    let strategy = default_array_strategy(options);
    for (k, v) in mapping_value {
        match parent_map.get(&k) {
            Some(existing) => {
                let merged = merge::merge(existing, &v, strategy, &options.name_fields);
                parent_map.insert(k, merged);
            }
            None => {
                parent_map.insert(k, v);
            }
        }
    }
    Ok(())
}

fn prune_at(tree: &mut Node, where_: &Cursor, options: &Options) -> Result<(), Error> {
    if where_.is_root() {
        *tree = Node::null();
        return Ok(());
    }
    let parent_cursor = where_.parent().unwrap();
    let last = where_.last().cloned().unwrap();
    let parent = parent_cursor
        .resolve_mut_with(tree, &options.name_fields)
        .ok_or_else(|| Error::Reference {
            cursor: where_.to_string(),
            message: "call-site parent not found".into(),
        })?;
    match (parent, last) {
        (Node::Mapping(m), Segment::Key(k)) => {
            m.remove(&k);
        }
        (Node::Sequence(s), Segment::Index(i)) => {
            if i < s.len() {
                s.remove(i);
            }
        }
        _ => {}
    }
    Ok(())
}

fn apply_response(
    tree: &mut Node,
    where_: &Cursor,
    response: Response,
    options: &Options,
) -> Result<(), Error> {
    match response {
        Response::Replace(value) => set_at(tree, where_, value, options),
        Response::Inject(value) => inject_at(tree, where_, value, options),
        Response::Prune => prune_at(tree, where_, options),
    }
}

fn sort_free_set(free: &mut Vec<String>, flow: &Flow, tie: TieBreak) {
    match tie {
        TieBreak::Alphabetical => free.sort(),
        TieBreak::Insertion => {
            free.sort_by_key(|k| flow.order.iter().position(|o| o == k).unwrap_or(usize::MAX))
        }
    }
}

/// Run one phase end to end: scan, build edges, cherry-pick filter, then
/// drive the Kahn-style wave loop, applying each opcall's Response as it
/// completes (spec.md §4.D, §4.E).
pub fn run_phase(
    tree: &mut Node,
    phase: Phase,
    registry: &Registry,
    options: &Options,
    trace: &Trace,
    cancel: &CancelToken,
) -> MultiError {
    let mut errors = MultiError::new();

    let (mut flow, scan_errors) = dataflow::scan(tree, phase, registry, options, trace);
    errors.extend(scan_errors);
    dataflow::build_edges(&mut flow, tree, registry, options, cancel);
    dataflow::cherry_pick_filter(&mut flow, tree, options);

    let mut remaining: HashSet<String> = flow.opcalls.keys().cloned().collect();
    let mut incoming: HashMap<String, usize> = remaining.iter().map(|k| (k.clone(), 0)).collect();
    for (_, dependent) in &flow.edges {
        if let Some(c) = incoming.get_mut(dependent) {
            *c += 1;
        }
    }
    let mut edges = flow.edges.clone();
    let mut wave = 0usize;

    while !remaining.is_empty() {
        if cancel.is_cancelled() {
            errors.push(Error::Cancelled {
                cursor: Cursor::root().to_string(),
            });
            break;
        }

        let mut free: Vec<String> = remaining
            .iter()
            .filter(|k| *incoming.get(*k).unwrap_or(&0) == 0)
            .cloned()
            .collect();

        if free.is_empty() {
            let mut stuck: Vec<String> = remaining.iter().cloned().collect();
            stuck.sort();
            errors.push(Error::Cycle { remaining: stuck });
            break;
        }

        sort_free_set(&mut free, &flow, options.dataflow_order);
        trace.wave(wave, free.len(), phase);
        wave += 1;

        for key in &free {
            remaining.remove(key);
            let opcall: OpCall = flow.opcalls.get(key).expect("scanned opcall").clone();
            trace.dispatch(opcall.canonical.to_string(), operator_label(&opcall.expr));
            let ctx = EvalContext::new(tree, options, opcall.where_.clone(), cancel.clone());
            let result = dispatch(&opcall.expr, &ctx, registry)
                .and_then(|response| apply_response(tree, &opcall.where_, response, options));
            if let Err(e) = result {
                errors.push(e);
            }
        }

        for (dep, dependent) in &edges {
            if free.contains(dep) {
                if let Some(c) = incoming.get_mut(dependent) {
                    *c = c.saturating_sub(1);
                }
            }
        }
        edges.retain(|(dep, _)| !free.contains(dep));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn tree_with(pairs: Vec<(&str, Node)>) -> Node {
        let mut m = BTreeMap::new();
        for (k, v) in pairs {
            m.insert(k.to_string(), v);
        }
        Node::Mapping(m)
    }

    #[test]
    fn simple_grab_and_concat() {
        let mut meta = BTreeMap::new();
        meta.insert("base".to_string(), Node::string("app"));
        meta.insert("ver".to_string(), Node::string("1.0"));
        let mut tree = tree_with(vec![
            ("meta", Node::Mapping(meta)),
            ("name", Node::string(r#"(( concat meta.base "-" meta.ver ))"#)),
            ("full", Node::string("(( grab name ))")),
        ]);
        let registry = Registry::with_builtins();
        let options = Options::default();
        let errors = run_phase(
            &mut tree,
            Phase::Eval,
            &registry,
            &options,
            &Trace::None,
            &CancelToken::new(),
        );
        assert!(errors.is_empty(), "{}", errors);
        let m = tree.as_mapping().unwrap();
        assert_eq!(m.get("name").unwrap().as_str(), Some("app-1.0"));
        assert_eq!(m.get("full").unwrap().as_str(), Some("app-1.0"));
    }

    #[test]
    fn fallback_chain_uses_default() {
        let mut tree = tree_with(vec![(
            "password",
            Node::string(r#"(( grab secrets.db || "default" ))"#),
        )]);
        let registry = Registry::with_builtins();
        let options = Options::default();
        let errors = run_phase(
            &mut tree,
            Phase::Eval,
            &registry,
            &options,
            &Trace::None,
            &CancelToken::new(),
        );
        assert!(errors.is_empty());
        assert_eq!(
            tree.as_mapping().unwrap().get("password").unwrap().as_str(),
            Some("default")
        );
    }

    #[test]
    fn cycle_is_reported() {
        let mut tree = tree_with(vec![
            ("a", Node::string("(( grab b ))")),
            ("b", Node::string("(( grab a ))")),
        ]);
        let registry = Registry::with_builtins();
        let options = Options::default();
        let errors = run_phase(
            &mut tree,
            Phase::Eval,
            &registry,
            &options,
            &Trace::None,
            &CancelToken::new(),
        );
        assert!(errors.errors().iter().any(|e| matches!(e, Error::Cycle { .. })));
    }

    #[test]
    fn defer_reemits_source_untouched() {
        let mut tree = tree_with(vec![("t", Node::string("(( defer concat a b ))"))]);
        let registry = Registry::with_builtins();
        let options = Options::default();
        let errors = run_phase(
            &mut tree,
            Phase::Eval,
            &registry,
            &options,
            &Trace::None,
            &CancelToken::new(),
        );
        assert!(errors.is_empty());
        assert_eq!(
            tree.as_mapping().unwrap().get("t").unwrap().as_str(),
            Some("(( concat a b ))")
        );
    }
}
