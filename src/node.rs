use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Default set of fields used for array-by-name addressing, in first-match-wins
/// order. A sequence element which is a [Mapping](Node::Mapping) carrying one
/// of these keys is addressable both by numeric index and by the value of
/// that key.
pub const DEFAULT_NAME_FIELDS: &[&str] = &["name", "id", "key"];

/// A scalar leaf value. Mirrors the YAML/JSON scalar set spec.md §3 names.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Display for Scalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::String(s) => write!(f, "{}", s),
        }
    }
}

impl Scalar {
    /// Truthiness used by the `&&`/`||`/`!`/ternary operator forms: every
    /// scalar is truthy except `false` and `null`.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Scalar::Null | Scalar::Bool(false))
    }
}

/// The recursive document node: Mapping, Sequence, or Scalar. The tree is a
/// tree, not a DAG - shared subtrees are forbidden (spec.md §9).
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Mapping(BTreeMap<String, Node>),
    Sequence(Vec<Node>),
    Scalar(Scalar),
}

impl Node {
    pub fn null() -> Self {
        Node::Scalar(Scalar::Null)
    }

    pub fn string<S: Into<String>>(s: S) -> Self {
        Node::Scalar(Scalar::String(s.into()))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Scalar(Scalar::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, Node>> {
        match self {
            Node::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut BTreeMap<String, Node>> {
        match self {
            Node::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Vec<Node>> {
        match self {
            Node::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Node::Scalar(s) => s.is_truthy(),
            Node::Mapping(m) => !m.is_empty(),
            Node::Sequence(s) => !s.is_empty(),
        }
    }

    /// Look up `name` among `name_fields` (first match wins) on a mapping
    /// element, returning the scalar rendered as a string for comparison
    /// against a non-numeric path segment.
    pub(crate) fn name_key(&self, name_fields: &[String]) -> Option<String> {
        let m = self.as_mapping()?;
        for field in name_fields {
            if let Some(v) = m.get(field) {
                return Some(match v {
                    Node::Scalar(s) => s.to_string(),
                    _ => return None,
                });
            }
        }
        None
    }

    /// Render a short type name for Type-mismatch error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Node::Mapping(_) => "map",
            Node::Sequence(_) => "list",
            Node::Scalar(Scalar::Null) => "nil",
            Node::Scalar(Scalar::Bool(_)) => "bool",
            Node::Scalar(Scalar::Int(_)) => "int",
            Node::Scalar(Scalar::Float(_)) => "float",
            Node::Scalar(Scalar::String(_)) => "string",
        }
    }

    /// Depth-first traversal used by cycle guards (spec.md §4.F, §3 invariant 5).
    /// Since `Node` has no back-references this can never actually cycle, but
    /// deeply nested documents could still overflow the native stack; the cap
    /// turns that into a reported error instead of a crash.
    pub(crate) fn walk_depth_guard<F: FnMut(&Node, usize)>(
        &self,
        max_depth: usize,
        mut visit: F,
    ) -> Result<(), usize> {
        fn go<F: FnMut(&Node, usize)>(
            node: &Node,
            depth: usize,
            max_depth: usize,
            visit: &mut F,
        ) -> Result<(), usize> {
            if depth > max_depth {
                return Err(depth);
            }
            visit(node, depth);
            match node {
                Node::Mapping(m) => {
                    for v in m.values() {
                        go(v, depth + 1, max_depth, visit)?;
                    }
                }
                Node::Sequence(s) => {
                    for v in s {
                        go(v, depth + 1, max_depth, visit)?;
                    }
                }
                Node::Scalar(_) => {}
            }
            Ok(())
        }
        go(self, 0, max_depth, &mut visit)
    }
}

/// Flattened child list used only for [ptree]'s debug tree printer - each
/// entry pairs a rendered label (the mapping key or sequence index) with the
/// child node itself.
struct Labelled(String, Node);

impl ptree::TreeItem for Labelled {
    type Child = Labelled;

    fn write_self<W: std::io::Write>(&self, f: &mut W, _: &ptree::Style) -> std::io::Result<()> {
        match &self.1 {
            Node::Scalar(s) => write!(f, "{}: {}", self.0, s),
            Node::Mapping(_) => write!(f, "{}: {{}}", self.0),
            Node::Sequence(_) => write!(f, "{}: []", self.0),
        }
    }

    fn children(&self) -> std::borrow::Cow<[Self::Child]> {
        std::borrow::Cow::from(self.1.labelled_children())
    }
}

impl Node {
    fn labelled_children(&self) -> Vec<Labelled> {
        match self {
            Node::Mapping(m) => m
                .iter()
                .map(|(k, v)| Labelled(k.clone(), v.clone()))
                .collect(),
            Node::Sequence(s) => s
                .iter()
                .enumerate()
                .map(|(i, v)| Labelled(i.to_string(), v.clone()))
                .collect(),
            Node::Scalar(_) => Vec::new(),
        }
    }

    /// Print the tree to stdout for debugging, in the same shape as the
    /// teacher's `ASTNode::print` - never called from evaluation code itself.
    #[cfg(debug_assertions)]
    pub fn print_tree(&self) -> std::io::Result<()> {
        ptree::print_tree(&Labelled("root".to_string(), self.clone()))
    }
}

impl Ord for Scalar {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }
}
impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Eq for Scalar {}
