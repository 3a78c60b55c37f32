use std::slice;
use std::sync::Arc;

use serde::Serialize;
use serde::Serializer;

use crate::span::Span;

/// Parsed body of a template region.
///
/// Node lists are shared handles: cloning one is cheap, and every
/// clone observes the same nodes. A parsed template is never mutated,
/// so a handle stays valid for as long as any holder keeps it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeList {
    nodes: Arc<Vec<Node>>,
}

impl NodeList {
    #[must_use]
    pub fn new(nodes: Vec<Node>) -> Self {
        NodeList {
            nodes: Arc::new(nodes),
        }
    }

    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    /// Depth-first walk over this list and every nested body it can
    /// reach, in document order. Visits only the branches a node
    /// exposes; see [`Node::child_nodelists`].
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: vec![self.iter()],
        }
    }
}

impl<'a> IntoIterator for &'a NodeList {
    type Item = &'a Node;
    type IntoIter = slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Serialize for NodeList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// Iterator returned by [`NodeList::descendants`].
pub struct Descendants<'a> {
    stack: Vec<slice::Iter<'a, Node>>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let iter = self.stack.last_mut()?;
            match iter.next() {
                Some(node) => {
                    for list in node.child_nodelists().into_iter().rev() {
                        self.stack.push(list.iter());
                    }
                    return Some(node);
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Node {
    Text {
        span: Span,
    },
    Comment {
        span: Span,
    },
    Variable {
        expr: String,
        span: Span,
    },
    Block {
        name: String,
        body: NodeList,
        span: Span,
    },
    Extends {
        parent: ParentRef,
        /// Everything that followed the `extends` tag in its template.
        nodelist: NodeList,
        span: Span,
    },
    Include {
        /// `None` when the target is a variable expression that cannot
        /// be resolved without a rendering context.
        target: Option<IncludeTarget>,
        span: Span,
    },
    Tag {
        name: String,
        bits: Vec<String>,
        branches: Vec<TagBranch>,
        /// Branch labels this tag exposes to searches; `None` exposes
        /// every branch.
        scannable: Option<Vec<String>>,
        span: Span,
    },
}

impl Node {
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Text { .. } => NodeKind::Text,
            Node::Comment { .. } => NodeKind::Comment,
            Node::Variable { .. } => NodeKind::Variable,
            Node::Block { .. } => NodeKind::Block,
            Node::Extends { .. } => NodeKind::Extends,
            Node::Include { .. } => NodeKind::Include,
            Node::Tag { .. } => NodeKind::Tag,
        }
    }

    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Node::Text { span }
            | Node::Comment { span }
            | Node::Variable { span, .. }
            | Node::Block { span, .. }
            | Node::Extends { span, .. }
            | Node::Include { span, .. }
            | Node::Tag { span, .. } => *span,
        }
    }

    /// Nested bodies this node exposes, in document order.
    ///
    /// A `Tag` with a `scannable` declaration exposes only the branches
    /// those labels name, in declaration order; an undeclared tag
    /// exposes all of its branches.
    #[must_use]
    pub fn child_nodelists(&self) -> Vec<&NodeList> {
        match self {
            Node::Block { body, .. } => vec![body],
            Node::Extends { nodelist, .. } => vec![nodelist],
            Node::Tag {
                branches,
                scannable,
                ..
            } => match scannable {
                Some(labels) => labels
                    .iter()
                    .filter_map(|label| branches.iter().find(|branch| &branch.label == label))
                    .map(|branch| &branch.nodes)
                    .collect(),
                None => branches.iter().map(|branch| &branch.nodes).collect(),
            },
            Node::Text { .. }
            | Node::Comment { .. }
            | Node::Variable { .. }
            | Node::Include { .. } => Vec::new(),
        }
    }
}

/// Discriminant of a [`Node`], used to select nodes by shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum NodeKind {
    Text,
    Comment,
    Variable,
    Block,
    Extends,
    Include,
    Tag,
}

/// Target of an `extends` tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ParentRef {
    /// Quoted template name, resolvable without a rendering context.
    Literal(String),
    /// Variable expression. `default` carries the name from a
    /// `default:"..."` filter when the expression has one.
    Dynamic {
        expr: String,
        default: Option<String>,
    },
}

impl ParentRef {
    /// The template name this reference resolves to statically, if any.
    #[must_use]
    pub fn literal(&self) -> Option<&str> {
        match self {
            ParentRef::Literal(name) => Some(name),
            ParentRef::Dynamic { default, .. } => default.as_deref(),
        }
    }
}

/// Target of an `include` tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IncludeTarget {
    /// Quoted template name, loaded on demand.
    Name(String),
    /// Already-parsed template attached in place of a name.
    Inline(Arc<Template>),
}

impl Serialize for IncludeTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            IncludeTarget::Name(name) => serializer.serialize_str(name),
            IncludeTarget::Inline(template) => {
                serializer.serialize_str(template.name().unwrap_or("<inline>"))
            }
        }
    }
}

/// One labeled segment of a paired tag's body.
///
/// The segment before the first intermediate tag is labeled
/// `nodelist`; each intermediate opens a segment labeled
/// `nodelist_<tag>`, with `2`, `3`, ... suffixes when an intermediate
/// repeats.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TagBranch {
    pub label: String,
    pub nodes: NodeList,
}

/// A parsed template together with the name it was loaded under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Template {
    name: Option<String>,
    nodelist: NodeList,
}

impl Template {
    #[must_use]
    pub fn new(name: Option<String>, nodelist: NodeList) -> Self {
        Template { name, nodelist }
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn nodelist(&self) -> &NodeList {
        &self.nodelist
    }
}
