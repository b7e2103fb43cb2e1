use crate::node::{Node, Scalar};

/// How two sequences combine during a merge (spec.md §6 Merger sketch,
/// spec_full §4.K). `SmartByName` matches sequence elements by the
/// configured name-field set, merging matched elements and appending
/// unmatched ones - the strategy `(( name: ... ))`-keyed arrays use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayStrategy {
    Replace,
    Append,
    Prepend,
    SmartByName,
}

/// Recognize a leading sentinel scalar in an overlay sequence as a
/// per-array override of the ambient strategy (spec.md §6: `(( append ))`,
/// `(( prepend ))`, `(( replace ))`). Returns the overriding strategy and how
/// many leading elements to skip.
fn sentinel_strategy(overlay: &[Node]) -> Option<ArrayStrategy> {
    match overlay.first() {
        Some(Node::Scalar(Scalar::String(s))) => match s.trim() {
            "(( append ))" => Some(ArrayStrategy::Append),
            "(( prepend ))" => Some(ArrayStrategy::Prepend),
            "(( replace ))" => Some(ArrayStrategy::Replace),
            _ => None,
        },
        _ => None,
    }
}

/// Merge `overlay` onto `base`. Mapping/Mapping recurses key-wise; anything
/// else, the overlay wins (spec_full §4.K).
pub fn merge(base: &Node, overlay: &Node, strategy: ArrayStrategy, name_fields: &[String]) -> Node {
    match (base, overlay) {
        (Node::Mapping(b), Node::Mapping(o)) => {
            let mut out = b.clone();
            for (k, v) in o {
                match out.get(k) {
                    Some(existing) => {
                        out.insert(k.clone(), merge(existing, v, strategy, name_fields));
                    }
                    None => {
                        out.insert(k.clone(), v.clone());
                    }
                }
            }
            Node::Mapping(out)
        }
        (Node::Sequence(b), Node::Sequence(o)) => merge_sequences(b, o, strategy, name_fields),
        (_, overlay) => overlay.clone(),
    }
}

fn merge_sequences(
    base: &[Node],
    overlay: &[Node],
    ambient: ArrayStrategy,
    name_fields: &[String],
) -> Node {
    let (strategy, skip) = match sentinel_strategy(overlay) {
        Some(s) => (s, 1),
        None => (ambient, 0),
    };
    let rest = &overlay[skip..];
    match strategy {
        ArrayStrategy::Replace => Node::Sequence(rest.to_vec()),
        ArrayStrategy::Append => {
            let mut out = base.to_vec();
            out.extend(rest.iter().cloned());
            Node::Sequence(out)
        }
        ArrayStrategy::Prepend => {
            let mut out = rest.to_vec();
            out.extend(base.iter().cloned());
            Node::Sequence(out)
        }
        ArrayStrategy::SmartByName => {
            let mut out = base.to_vec();
            for item in rest {
                let key = item.name_key(name_fields);
                let existing_pos = key.as_ref().and_then(|k| {
                    out.iter()
                        .position(|e| e.name_key(name_fields).as_deref() == Some(k.as_str()))
                });
                match existing_pos {
                    Some(pos) => out[pos] = merge(&out[pos], item, strategy, name_fields),
                    None => out.push(item.clone()),
                }
            }
            Node::Sequence(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn seq(values: Vec<Node>) -> Node {
        Node::Sequence(values)
    }

    #[test]
    fn mapping_recurses_keywise() {
        let mut b = BTreeMap::new();
        b.insert("a".to_string(), Node::string("1"));
        b.insert("b".to_string(), Node::string("2"));
        let mut o = BTreeMap::new();
        o.insert("b".to_string(), Node::string("3"));
        o.insert("c".to_string(), Node::string("4"));
        let merged = merge(
            &Node::Mapping(b),
            &Node::Mapping(o),
            ArrayStrategy::Append,
            &[],
        );
        let m = merged.as_mapping().unwrap();
        assert_eq!(m.get("a").unwrap().as_str(), Some("1"));
        assert_eq!(m.get("b").unwrap().as_str(), Some("3"));
        assert_eq!(m.get("c").unwrap().as_str(), Some("4"));
    }

    #[test]
    fn append_strategy_concatenates() {
        let base = seq(vec![Node::string("a")]);
        let overlay = seq(vec![Node::string("b")]);
        let merged = merge(&base, &overlay, ArrayStrategy::Append, &[]);
        assert_eq!(merged.as_sequence().unwrap().len(), 2);
    }

    #[test]
    fn sentinel_overrides_ambient_strategy() {
        let base = seq(vec![Node::string("a")]);
        let overlay = seq(vec![Node::string("(( replace ))"), Node::string("b")]);
        let merged = merge(&base, &overlay, ArrayStrategy::Append, &[]);
        let s = merged.as_sequence().unwrap();
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].as_str(), Some("b"));
    }

    #[test]
    fn idempotent_on_value_with_no_operators() {
        let mut m = BTreeMap::new();
        m.insert("a".to_string(), Node::string("x"));
        let a = Node::Mapping(m);
        let merged = merge(&a, &a, ArrayStrategy::Append, &[]);
        assert_eq!(merged, a);
    }
}
