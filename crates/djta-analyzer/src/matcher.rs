use djta_templates::Node;
use djta_templates::NodeKind;

/// One shape a node can be matched against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodePattern {
    /// Any node of the given kind.
    Kind(NodeKind),
    /// A tag node with the given name.
    TagName(String),
}

impl NodePattern {
    #[must_use]
    pub fn matches(&self, node: &Node) -> bool {
        match self {
            NodePattern::Kind(kind) => node.kind() == *kind,
            NodePattern::TagName(name) => {
                matches!(node, Node::Tag { name: tag, .. } if tag == name)
            }
        }
    }
}

/// Selects the nodes a scan collects. Holds one or more patterns and
/// matches a node when any of them does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeMatcher {
    patterns: Vec<NodePattern>,
}

impl NodeMatcher {
    /// Matcher for every node of one kind.
    #[must_use]
    pub fn kind(kind: NodeKind) -> Self {
        NodeMatcher {
            patterns: vec![NodePattern::Kind(kind)],
        }
    }

    /// Matcher for tag nodes with the given name.
    #[must_use]
    pub fn tag(name: impl Into<String>) -> Self {
        NodeMatcher {
            patterns: vec![NodePattern::TagName(name.into())],
        }
    }

    /// Matcher over an explicit pattern list.
    #[must_use]
    pub fn any(patterns: impl IntoIterator<Item = NodePattern>) -> Self {
        NodeMatcher {
            patterns: patterns.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn or_kind(mut self, kind: NodeKind) -> Self {
        self.patterns.push(NodePattern::Kind(kind));
        self
    }

    #[must_use]
    pub fn or_tag(mut self, name: impl Into<String>) -> Self {
        self.patterns.push(NodePattern::TagName(name.into()));
        self
    }

    #[must_use]
    pub fn matches(&self, node: &Node) -> bool {
        self.patterns.iter().any(|pattern| pattern.matches(node))
    }
}
