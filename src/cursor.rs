use std::fmt::{self, Display, Formatter};

use crate::node::Node;

/// A single path segment: either a mapping key or a sequence index (which may
/// itself originally have been written as a name-keyed lookup; see
/// [Segment::Name]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
    /// A non-numeric sequence segment not yet resolved against a tree.
    /// `canonical()` rewrites these to `Index` using the configured
    /// name-field set.
    Name(String),
}

impl Display for Segment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) | Segment::Name(k) => write!(f, "{}", k),
            Segment::Index(i) => write!(f, "{}", i),
        }
    }
}

/// An ordered list of path segments identifying a location in a [Node] tree.
///
/// A `Cursor` built directly from a dotted string (`Cursor::parse`) carries
/// `Segment::Name` ambiguity (mapping key vs. name-keyed sequence lookup)
/// until it is resolved or canonicalized against a concrete tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Cursor {
    segments: Vec<Segment>,
}

fn default_name_fields() -> Vec<String> {
    crate::node::DEFAULT_NAME_FIELDS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn find_by_name<'t>(
    seq: &'t [Node],
    name: &str,
    name_fields: &[String],
) -> Option<(usize, &'t Node)> {
    let owned;
    let fields: &[String] = if name_fields.is_empty() {
        owned = default_name_fields();
        &owned
    } else {
        name_fields
    };
    seq.iter()
        .enumerate()
        .find(|(_, el)| el.name_key(fields).as_deref() == Some(name))
}

impl Cursor {
    pub fn root() -> Self {
        Cursor { segments: vec![] }
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Cursor { segments }
    }

    /// Parse a dotted path string (`a.b.2.c`) into a cursor. Numeric
    /// components become `Segment::Index`; everything else becomes
    /// `Segment::Name` (ambiguous between a mapping key and a name-keyed
    /// sequence lookup until resolved).
    pub fn parse(path: &str) -> Self {
        let segments = path
            .split('.')
            .filter(|s| !s.is_empty())
            .map(|s| match s.parse::<usize>() {
                Ok(i) => Segment::Index(i),
                Err(_) => Segment::Name(s.to_string()),
            })
            .collect();
        Cursor { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn push(&mut self, seg: Segment) {
        self.segments.push(seg);
    }

    pub fn pop(&mut self) -> Option<Segment> {
        self.segments.pop()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    pub fn parent(&self) -> Option<Cursor> {
        if self.segments.is_empty() {
            None
        } else {
            Some(Cursor {
                segments: self.segments[..self.segments.len() - 1].to_vec(),
            })
        }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Prefix containment after canonicalization: `self` contains `other` if
    /// `other`'s canonical segments start with `self`'s canonical segments.
    pub fn contains(&self, other: &Cursor, tree: &Node) -> bool {
        let a = self.canonical(tree);
        let b = other.canonical(tree);
        a.segments.len() <= b.segments.len() && a.segments == b.segments[..a.segments.len()]
    }

    /// Rewrite name-keyed segments to their numeric index, producing a stable
    /// identity for a node, using the default name-field set. Idempotent.
    pub fn canonical(&self, tree: &Node) -> Cursor {
        self.canonical_with(tree, &default_name_fields())
    }

    /// Canonicalize using an explicit name-field set (first match wins), as
    /// configured by `Options::name_fields`. Unresolvable segments (and
    /// everything after them) are kept verbatim: canonicalization is
    /// best-effort identity, not a resolution guarantee.
    pub fn canonical_with(&self, tree: &Node, name_fields: &[String]) -> Cursor {
        let mut out: Vec<Segment> = Vec::with_capacity(self.segments.len());
        let mut current = tree;
        for (i, seg) in self.segments.iter().enumerate() {
            let next = match (seg, current) {
                (Segment::Index(idx), Node::Sequence(s)) => {
                    out.push(Segment::Index(*idx));
                    s.get(*idx)
                }
                (Segment::Key(k), Node::Mapping(m)) => {
                    out.push(Segment::Key(k.clone()));
                    m.get(k)
                }
                (Segment::Name(n), Node::Sequence(s)) => {
                    if let Ok(idx) = n.parse::<usize>() {
                        out.push(Segment::Index(idx));
                        s.get(idx)
                    } else if let Some((idx, node)) = find_by_name(s, n, name_fields) {
                        out.push(Segment::Index(idx));
                        Some(node)
                    } else {
                        out.push(Segment::Name(n.clone()));
                        None
                    }
                }
                (Segment::Name(n), Node::Mapping(m)) => {
                    out.push(Segment::Key(n.clone()));
                    m.get(n)
                }
                _ => {
                    out.push(seg.clone());
                    None
                }
            };
            match next {
                Some(n) => current = n,
                None => {
                    out.extend(self.segments[i + 1..].iter().cloned());
                    return Cursor { segments: out };
                }
            }
        }
        Cursor { segments: out }
    }

    /// Resolve the cursor against `tree`, returning the node it points to,
    /// using the default name-field set.
    pub fn resolve<'t>(&self, tree: &'t Node) -> Option<&'t Node> {
        self.resolve_with(tree, &default_name_fields())
    }

    pub fn resolve_with<'t>(&self, tree: &'t Node, name_fields: &[String]) -> Option<&'t Node> {
        let mut current = tree;
        for seg in &self.segments {
            current = match (seg, current) {
                (Segment::Index(i), Node::Sequence(s)) => s.get(*i)?,
                (Segment::Key(k), Node::Mapping(m)) => m.get(k)?,
                (Segment::Name(n), Node::Sequence(s)) => {
                    if let Ok(idx) = n.parse::<usize>() {
                        s.get(idx)?
                    } else {
                        find_by_name(s, n, name_fields).map(|(_, node)| node)?
                    }
                }
                (Segment::Name(n), Node::Mapping(m)) => m.get(n)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn resolve_mut<'t>(&self, tree: &'t mut Node) -> Option<&'t mut Node> {
        self.resolve_mut_with(tree, &default_name_fields())
    }

    pub fn resolve_mut_with<'t>(
        &self,
        tree: &'t mut Node,
        name_fields: &[String],
    ) -> Option<&'t mut Node> {
        let mut current = tree;
        for seg in &self.segments {
            current = match (seg, current) {
                (Segment::Index(i), Node::Sequence(s)) => s.get_mut(*i)?,
                (Segment::Key(k), Node::Mapping(m)) => m.get_mut(k)?,
                (Segment::Name(n), Node::Sequence(s)) => {
                    if let Ok(idx) = n.parse::<usize>() {
                        s.get_mut(idx)?
                    } else {
                        let idx = find_by_name(s, n, name_fields).map(|(i, _)| i)?;
                        s.get_mut(idx)?
                    }
                }
                (Segment::Name(n), Node::Mapping(m)) => m.get_mut(n)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl Display for Cursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.segments.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", rendered.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn tree() -> Node {
        let mut job = BTreeMap::new();
        job.insert("name".to_string(), Node::string("web"));
        job.insert(
            "port".to_string(),
            Node::Scalar(crate::node::Scalar::Int(80)),
        );
        let mut root = BTreeMap::new();
        root.insert(
            "jobs".to_string(),
            Node::Sequence(vec![Node::Mapping(job)]),
        );
        Node::Mapping(root)
    }

    #[test]
    fn resolve_by_name() {
        let t = tree();
        let cursor = Cursor::parse("jobs.web.port");
        let resolved = cursor.resolve(&t).unwrap();
        assert_eq!(resolved, &Node::Scalar(crate::node::Scalar::Int(80)));
    }

    #[test]
    fn canonical_rewrites_name_to_index() {
        let t = tree();
        let cursor = Cursor::parse("jobs.web.port");
        let canonical = cursor.canonical(&t);
        assert_eq!(canonical.to_string(), "jobs.0.port");
    }

    #[test]
    fn canonical_is_idempotent() {
        let t = tree();
        let cursor = Cursor::parse("jobs.web.port");
        let once = cursor.canonical(&t);
        let twice = once.canonical(&t);
        assert_eq!(once, twice);
    }

    #[test]
    fn contains_prefix_after_canonicalization() {
        let t = tree();
        let parent = Cursor::parse("jobs.web");
        let child = Cursor::parse("jobs.0.port");
        assert!(parent.contains(&child, &t));
    }

    #[test]
    fn unknown_segment_is_not_found() {
        let t = tree();
        let cursor = Cursor::parse("jobs.missing");
        assert!(cursor.resolve(&t).is_none());
    }
}
