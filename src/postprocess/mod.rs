use std::collections::BTreeMap;

use crate::config::Options;
use crate::cursor::{Cursor, Segment};
use crate::error::Error;
use crate::merge::{self, ArrayStrategy};
use crate::node::{Node, Scalar};

fn default_array_strategy(options: &Options) -> ArrayStrategy {
    if options.fallback_append {
        ArrayStrategy::Append
    } else {
        ArrayStrategy::Replace
    }
}

/// Walk the tree with a depth cap, reporting a Cycle error if exceeded
/// (spec.md §4.F "cycle guard", run before prune/sort/pick).
pub fn cycle_guard(tree: &Node, options: &Options) -> Result<(), Error> {
    tree.walk_depth_guard(options.max_cycle_depth, |_, _| {})
        .map_err(|depth| Error::Cycle {
            remaining: vec![format!("tree depth {} exceeds max_cycle_depth", depth)],
        })
}

/// Remove each configured path. Non-existent paths are ignored silently
/// (spec.md §4.F "Prune").
pub fn prune(tree: &mut Node, paths: &[Cursor], options: &Options) {
    for path in paths {
        remove_path(tree, path, options);
    }
}

fn remove_path(tree: &mut Node, path: &Cursor, options: &Options) -> Option<()> {
    let parent_cursor = path.parent()?;
    let last = path.last()?.clone();
    let parent = parent_cursor.resolve_mut_with(tree, &options.name_fields)?;
    match (parent, last) {
        (Node::Mapping(m), Segment::Key(k)) | (Node::Mapping(m), Segment::Name(k)) => {
            m.remove(&k);
        }
        (Node::Sequence(s), Segment::Index(i)) => {
            if i < s.len() {
                s.remove(i);
            }
        }
        (Node::Sequence(s), Segment::Name(n)) => {
            if let Ok(i) = n.parse::<usize>() {
                if i < s.len() {
                    s.remove(i);
                }
            } else if let Some(pos) = s
                .iter()
                .position(|e| e.name_key(&options.name_fields).as_deref() == Some(n.as_str()))
            {
                s.remove(pos);
            }
        }
        _ => {}
    }
    Some(())
}

fn field_value(node: &Node, field: &str) -> Option<Scalar> {
    match node.as_mapping()?.get(field)? {
        Node::Scalar(s) => Some(s.clone()),
        _ => None,
    }
}

/// Sort each configured sequence by its named field. Elements missing the
/// field, or whose field isn't a scalar, are a Type-mismatch error
/// (spec.md §4.F "Sort").
pub fn sort(tree: &mut Node, sort_paths: &[(Cursor, String)], options: &Options) -> Result<(), Error> {
    for (path, field) in sort_paths {
        let node =
            path.resolve_mut_with(tree, &options.name_fields)
                .ok_or_else(|| Error::Reference {
                    cursor: path.to_string(),
                    message: "sort path not found".into(),
                })?;
        let seq = match node {
            Node::Sequence(s) => s,
            other => {
                return Err(Error::TypeMismatch {
                    cursor: path.to_string(),
                    expected: "list".into(),
                    found: other.type_name().into(),
                })
            }
        };
        let mut mismatch = false;
        seq.sort_by(|a, b| match (field_value(a, field), field_value(b, field)) {
            (Some(av), Some(bv)) => av.cmp(&bv),
            _ => {
                mismatch = true;
                std::cmp::Ordering::Equal
            }
        });
        if mismatch {
            return Err(Error::TypeMismatch {
                cursor: path.to_string(),
                expected: format!("every element to carry scalar field `{}`", field),
                found: "an element missing or mistyping that field".into(),
            });
        }
    }
    Ok(())
}

fn build_ancestor_tree(segments: &[Segment], value: Node) -> Node {
    let mut node = value;
    for seg in segments.iter().rev() {
        node = match seg {
            Segment::Key(k) | Segment::Name(k) => {
                let mut m = BTreeMap::new();
                m.insert(k.clone(), node);
                Node::Mapping(m)
            }
            Segment::Index(i) => {
                let mut v: Vec<Node> = std::iter::repeat_with(Node::null).take(*i + 1).collect();
                v[*i] = node;
                Node::Sequence(v)
            }
        };
    }
    node
}

/// Build a fresh tree containing only the selected paths, preserving their
/// ancestor map/sequence structure, merging multiple picks with the ambient
/// array strategy (spec.md §4.F "Cherry-pick").
pub fn cherry_pick(tree: &Node, paths: &[Cursor], options: &Options) -> Node {
    if paths.is_empty() {
        return tree.clone();
    }
    let strategy = default_array_strategy(options);
    let mut result = Node::Mapping(BTreeMap::new());
    for path in paths {
        let canonical = path.canonical_with(tree, &options.name_fields);
        if let Some(value) = canonical.resolve(tree) {
            let projected = build_ancestor_tree(canonical.segments(), value.clone());
            result = merge::merge(&result, &projected, strategy, &options.name_fields);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn prune_removes_mapping_key() {
        let mut m = BTreeMap::new();
        m.insert("a".to_string(), Node::string("1"));
        m.insert("b".to_string(), Node::string("2"));
        let mut tree = Node::Mapping(m);
        prune(&mut tree, &[Cursor::parse("a")], &Options::default());
        assert!(tree.as_mapping().unwrap().get("a").is_none());
    }

    #[test]
    fn prune_missing_path_is_silent() {
        let mut tree = Node::Mapping(BTreeMap::new());
        prune(&mut tree, &[Cursor::parse("nope.deeper")], &Options::default());
    }

    #[test]
    fn sort_orders_by_field() {
        let mk = |name: &str, port: i64| {
            let mut m = BTreeMap::new();
            m.insert("name".to_string(), Node::string(name));
            m.insert("port".to_string(), Node::Scalar(Scalar::Int(port)));
            Node::Mapping(m)
        };
        let mut root = BTreeMap::new();
        root.insert(
            "jobs".to_string(),
            Node::Sequence(vec![mk("b", 2), mk("a", 1)]),
        );
        let mut tree = Node::Mapping(root);
        sort(
            &mut tree,
            &[(Cursor::parse("jobs"), "name".to_string())],
            &Options::default(),
        )
        .unwrap();
        let seq = tree.as_mapping().unwrap().get("jobs").unwrap().as_sequence().unwrap();
        assert_eq!(seq[0].as_mapping().unwrap().get("name").unwrap().as_str(), Some("a"));
    }

    #[test]
    fn cherry_pick_preserves_array_by_name_ancestor_shape() {
        let mut job = BTreeMap::new();
        job.insert("name".to_string(), Node::string("web"));
        job.insert("port".to_string(), Node::Scalar(Scalar::Int(8080)));
        let mut root = BTreeMap::new();
        root.insert("jobs".to_string(), Node::Sequence(vec![Node::Mapping(job)]));
        let tree = Node::Mapping(root);
        let picked = cherry_pick(&tree, &[Cursor::parse("jobs.web")], &Options::default());
        let jobs = picked.as_mapping().unwrap().get("jobs").unwrap().as_sequence().unwrap();
        assert_eq!(
            jobs[0].as_mapping().unwrap().get("port").unwrap(),
            &Node::Scalar(Scalar::Int(8080))
        );
    }
}
