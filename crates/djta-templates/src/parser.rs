use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use serde::Serialize;
use thiserror::Error;

use crate::nodelist::IncludeTarget;
use crate::nodelist::Node;
use crate::nodelist::NodeList;
use crate::nodelist::ParentRef;
use crate::nodelist::TagBranch;
use crate::quotes;
use crate::span::Span;
use crate::tagspecs::EndTag;
use crate::tagspecs::TagSpec;
use crate::tagspecs::TagSpecs;
use crate::tokens::Token;

/// Recursive-descent parser over a token stream.
///
/// `extends`, `include`, and `block` are parsed structurally. Every
/// other tag is shaped by the [`TagSpecs`] registry: tags with an end
/// tag collect labeled branches, unknown tags become childless leaves.
pub struct Parser<'s> {
    tokens: Vec<Token>,
    specs: &'s TagSpecs,
    current: usize,
    seen_blocks: FxHashSet<String>,
    seen_extends: bool,
}

struct Frame<'a> {
    closer: &'a str,
    intermediates: &'a [String],
}

enum Stop {
    Closer { bits: Vec<String> },
    Intermediate { name: String },
}

impl<'s> Parser<'s> {
    #[must_use]
    pub fn new(tokens: Vec<Token>, specs: &'s TagSpecs) -> Self {
        Parser {
            tokens,
            specs,
            current: 0,
            seen_blocks: FxHashSet::default(),
            seen_extends: false,
        }
    }

    pub fn parse(mut self) -> Result<NodeList, ParseError> {
        let (nodes, _) = self.parse_until(None)?;
        Ok(NodeList::new(nodes))
    }

    /// Parse nodes until end of input or, when a frame is given, until
    /// one of the frame's stop tags is reached.
    fn parse_until(
        &mut self,
        frame: Option<&Frame<'_>>,
    ) -> Result<(Vec<Node>, Option<Stop>), ParseError> {
        let mut nodes = Vec::new();

        while let Some(token) = self.next_token() {
            match token {
                Token::Text { span } => nodes.push(Node::Text { span }),
                Token::Comment { span } => nodes.push(Node::Comment { span }),
                Token::Variable { content, span } => nodes.push(Node::Variable {
                    expr: content,
                    span,
                }),
                Token::Tag { content, span } => {
                    let mut bits = quotes::split_on_whitespace(&content);
                    if bits.is_empty() {
                        return Err(ParseError::EmptyTag);
                    }
                    let name = bits.remove(0);

                    if let Some(frame) = frame {
                        if name == frame.closer {
                            return Ok((nodes, Some(Stop::Closer { bits })));
                        }
                        if frame.intermediates.iter().any(|tag| tag == &name) {
                            return Ok((nodes, Some(Stop::Intermediate { name })));
                        }
                    }

                    let node = self.parse_tag(name, bits, span)?;
                    nodes.push(node);
                }
            }
        }

        Ok((nodes, None))
    }

    fn parse_tag(&mut self, name: String, bits: Vec<String>, span: Span) -> Result<Node, ParseError> {
        match name.as_str() {
            "extends" => self.parse_extends(&bits, span),
            "include" => Self::parse_include(&bits, span),
            "block" => self.parse_block(bits, span),
            _ => {
                if let Some(spec) = self.specs.get(&name) {
                    return self.parse_specced(name, bits, spec, span);
                }
                if self.specs.is_closer(&name) {
                    return Err(ParseError::UnexpectedClosingTag { tag: name });
                }
                if self.specs.is_intermediate(&name) {
                    return Err(ParseError::OrphanedTag { tag: name });
                }
                Ok(Node::Tag {
                    name,
                    bits,
                    branches: Vec::new(),
                    scannable: None,
                    span,
                })
            }
        }
    }

    /// An `extends` tag captures everything that follows it in the
    /// template as its own nodelist.
    fn parse_extends(&mut self, bits: &[String], span: Span) -> Result<Node, ParseError> {
        if self.seen_extends {
            return Err(ParseError::MultipleExtends);
        }
        self.seen_extends = true;

        let Some(arg) = bits.first() else {
            return Err(ParseError::MissingArgument {
                tag: "extends".to_string(),
            });
        };
        let parent = parent_ref_from_expr(arg);

        let (nodes, _) = self.parse_until(None)?;
        Ok(Node::Extends {
            parent,
            nodelist: NodeList::new(nodes),
            span,
        })
    }

    fn parse_include(bits: &[String], span: Span) -> Result<Node, ParseError> {
        let Some(arg) = bits.first() else {
            return Err(ParseError::MissingArgument {
                tag: "include".to_string(),
            });
        };
        let target = quotes::unquote(arg).map(|name| IncludeTarget::Name(name.to_string()));
        Ok(Node::Include { target, span })
    }

    fn parse_block(&mut self, bits: Vec<String>, span: Span) -> Result<Node, ParseError> {
        let Some(name) = bits.into_iter().next() else {
            return Err(ParseError::MissingArgument {
                tag: "block".to_string(),
            });
        };
        if !self.seen_blocks.insert(name.clone()) {
            return Err(ParseError::DuplicateBlockName { name });
        }

        let frame = Frame {
            closer: "endblock",
            intermediates: &[],
        };
        let (nodes, stop) = self.parse_until(Some(&frame))?;

        match stop {
            Some(Stop::Closer { bits: closer_bits }) => {
                if let Some(end_name) = closer_bits.first() {
                    if end_name != &name {
                        return Err(ParseError::UnmatchedBlockName {
                            name: end_name.clone(),
                            open: name,
                        });
                    }
                }
                Ok(Node::Block {
                    name,
                    body: NodeList::new(nodes),
                    span,
                })
            }
            Some(Stop::Intermediate { name: tag }) => Err(ParseError::OrphanedTag { tag }),
            None => Err(ParseError::UnclosedTag {
                tag: "block".to_string(),
                expected_closer: "endblock".to_string(),
            }),
        }
    }

    fn parse_specced(
        &mut self,
        name: String,
        bits: Vec<String>,
        spec: &TagSpec,
        span: Span,
    ) -> Result<Node, ParseError> {
        let Some(end) = spec.end.clone() else {
            return Ok(Node::Tag {
                name,
                bits,
                branches: Vec::new(),
                scannable: spec.scannable.clone(),
                span,
            });
        };

        if spec.opaque {
            return self.parse_opaque(name, bits, &end, spec.scannable.clone(), span);
        }

        let frame = Frame {
            closer: &end.tag,
            intermediates: &spec.intermediates,
        };
        let mut branches = Vec::new();
        let mut label = String::from("nodelist");
        let mut label_counts: FxHashMap<String, u32> = FxHashMap::default();

        loop {
            let (nodes, stop) = self.parse_until(Some(&frame))?;
            branches.push(TagBranch {
                label: label.clone(),
                nodes: NodeList::new(nodes),
            });
            match stop {
                Some(Stop::Closer { .. }) => break,
                Some(Stop::Intermediate { name: intermediate }) => {
                    label = branch_label(&intermediate, &mut label_counts);
                }
                None => {
                    if end.optional {
                        break;
                    }
                    return Err(ParseError::UnclosedTag {
                        tag: name,
                        expected_closer: end.tag.clone(),
                    });
                }
            }
        }

        Ok(Node::Tag {
            name,
            bits,
            branches,
            scannable: spec.scannable.clone(),
            span,
        })
    }

    /// Consume tokens up to the closer without parsing them. Opaque
    /// bodies contribute no nodes at all.
    fn parse_opaque(
        &mut self,
        name: String,
        bits: Vec<String>,
        end: &EndTag,
        scannable: Option<Vec<String>>,
        span: Span,
    ) -> Result<Node, ParseError> {
        loop {
            match self.next_token() {
                Some(Token::Tag { content, .. }) => {
                    if content.split_whitespace().next() == Some(end.tag.as_str()) {
                        break;
                    }
                }
                Some(_) => {}
                None => {
                    if end.optional {
                        break;
                    }
                    return Err(ParseError::UnclosedTag {
                        tag: name,
                        expected_closer: end.tag.clone(),
                    });
                }
            }
        }

        Ok(Node::Tag {
            name,
            bits,
            branches: Vec::new(),
            scannable,
            span,
        })
    }

    fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.current).cloned()?;
        self.current += 1;
        Some(token)
    }
}

/// Classify an `extends` argument. A quoted string is a literal parent
/// name; anything else is a variable expression, with a static
/// fallback when its first `default:` filter carries a quoted name.
fn parent_ref_from_expr(expr: &str) -> ParentRef {
    if let Some(name) = quotes::unquote(expr) {
        return ParentRef::Literal(name.to_string());
    }

    let default = quotes::split_filters(expr)
        .into_iter()
        .skip(1)
        .find_map(|segment| segment.trim().strip_prefix("default:"))
        .and_then(quotes::unquote)
        .map(ToString::to_string);

    ParentRef::Dynamic {
        expr: expr.to_string(),
        default,
    }
}

fn branch_label(intermediate: &str, counts: &mut FxHashMap<String, u32>) -> String {
    let count = counts.entry(intermediate.to_string()).or_insert(0);
    *count += 1;
    if *count == 1 {
        format!("nodelist_{intermediate}")
    } else {
        format!("nodelist_{intermediate}{count}")
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
pub enum ParseError {
    #[error("Empty tag")]
    EmptyTag,

    #[error("'{tag}' tag requires an argument")]
    MissingArgument { tag: String },

    #[error("Unclosed tag '{tag}': expected '{expected_closer}'")]
    UnclosedTag { tag: String, expected_closer: String },

    #[error("Unexpected closing tag '{tag}'")]
    UnexpectedClosingTag { tag: String },

    #[error("'{tag}' must appear inside a tag that accepts it")]
    OrphanedTag { tag: String },

    #[error("'extends' cannot appear more than once in the same template")]
    MultipleExtends,

    #[error("Block tag with name '{name}' appears more than once")]
    DuplicateBlockName { name: String },

    #[error("'endblock {name}' does not match open block '{open}'")]
    UnmatchedBlockName { name: String, open: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(source: &str) -> Result<NodeList, ParseError> {
        let specs = TagSpecs::builtin();
        parse_with(source, &specs)
    }

    fn parse_with(source: &str, specs: &TagSpecs) -> Result<NodeList, ParseError> {
        let tokens = Lexer::new(source).tokenize();
        Parser::new(tokens, specs).parse()
    }

    fn branch_labels(node: &Node) -> Vec<&str> {
        match node {
            Node::Tag { branches, .. } => {
                branches.iter().map(|branch| branch.label.as_str()).collect()
            }
            _ => panic!("expected tag node, got {node:?}"),
        }
    }

    mod structure {
        use super::*;
        use crate::nodelist::NodeKind;

        #[test]
        fn text_variables_comments() {
            let nodelist = parse("Hello {{ name }}{# note #}").unwrap();
            let kinds: Vec<NodeKind> = nodelist.iter().map(Node::kind).collect();
            assert_eq!(
                kinds,
                vec![NodeKind::Text, NodeKind::Variable, NodeKind::Comment]
            );
            assert!(matches!(
                &nodelist.nodes()[1],
                Node::Variable { expr, .. } if expr == "name"
            ));
        }

        #[test]
        fn if_else_collects_branches() {
            let nodelist = parse("{% if x %}a{% else %}b{% endif %}").unwrap();
            assert_eq!(nodelist.len(), 1);

            let tag = &nodelist.nodes()[0];
            assert_eq!(branch_labels(tag), vec!["nodelist", "nodelist_else"]);
            assert!(matches!(
                tag,
                Node::Tag { name, bits, .. } if name == "if" && bits == &["x"]
            ));
        }

        #[test]
        fn for_empty_branches() {
            let nodelist = parse("{% for item in items %}x{% empty %}none{% endfor %}").unwrap();
            let tag = &nodelist.nodes()[0];
            assert_eq!(branch_labels(tag), vec!["nodelist", "nodelist_empty"]);
        }

        #[test]
        fn repeated_intermediates_get_numbered_labels() {
            let nodelist =
                parse("{% if a %}1{% elif b %}2{% elif c %}3{% else %}4{% endif %}").unwrap();
            let tag = &nodelist.nodes()[0];
            assert_eq!(
                branch_labels(tag),
                vec!["nodelist", "nodelist_elif", "nodelist_elif2", "nodelist_else"]
            );
        }

        #[test]
        fn unknown_tag_is_childless_leaf() {
            let nodelist = parse("{% placeholder 'main' %}").unwrap();
            assert!(matches!(
                &nodelist.nodes()[0],
                Node::Tag { name, bits, branches, scannable, .. }
                    if name == "placeholder"
                        && bits == &["'main'"]
                        && branches.is_empty()
                        && scannable.is_none()
            ));
        }

        #[test]
        fn nested_paired_tags() {
            let nodelist = parse("{% if x %}{% for i in y %}{{ i }}{% endfor %}{% endif %}").unwrap();
            let Node::Tag { branches, .. } = &nodelist.nodes()[0] else {
                panic!("expected if tag");
            };
            assert!(matches!(
                &branches[0].nodes.nodes()[0],
                Node::Tag { name, .. } if name == "for"
            ));
        }

        #[test]
        fn opaque_comment_swallows_body() {
            let nodelist = parse("{% comment %}{% placeholder 'x' %}{{ y }}{% endcomment %}").unwrap();
            assert_eq!(nodelist.len(), 1);
            assert!(matches!(
                &nodelist.nodes()[0],
                Node::Tag { name, branches, .. } if name == "comment" && branches.is_empty()
            ));
        }

        #[test]
        fn opaque_verbatim_swallows_constructs() {
            let nodelist = parse("{% verbatim %}{{ x }}{% if y %}{% endverbatim %}").unwrap();
            assert_eq!(nodelist.len(), 1);
            assert!(matches!(
                &nodelist.nodes()[0],
                Node::Tag { name, .. } if name == "verbatim"
            ));
        }

        #[test]
        fn optional_end_tolerates_missing_closer() {
            let mut specs = TagSpecs::builtin();
            specs.insert("widget", TagSpec::paired("endwidget").optional_end());
            let nodelist = parse_with("{% widget %}tail {{ x }}", &specs).unwrap();
            assert_eq!(nodelist.len(), 1);

            let tag = &nodelist.nodes()[0];
            assert_eq!(branch_labels(tag), vec!["nodelist"]);
            let Node::Tag { branches, .. } = tag else {
                panic!("expected widget tag");
            };
            assert_eq!(branches[0].nodes.len(), 2);
        }

        #[test]
        fn opaque_optional_end_swallows_to_eof() {
            let mut specs = TagSpecs::builtin();
            specs.insert("raw", TagSpec::paired("endraw").opaque().optional_end());
            let nodelist = parse_with("{% raw %}{{ x }}{% if y %}", &specs).unwrap();
            assert_eq!(nodelist.len(), 1);
            assert!(matches!(
                &nodelist.nodes()[0],
                Node::Tag { name, branches, .. } if name == "raw" && branches.is_empty()
            ));
        }

        #[test]
        fn declared_scannable_attaches_to_node() {
            let mut specs = TagSpecs::builtin();
            specs.insert(
                "panel",
                TagSpec::paired("endpanel")
                    .intermediates(&["fallback"])
                    .scannable(&["nodelist"]),
            );
            let nodelist =
                parse_with("{% panel %}a{% fallback %}b{% endpanel %}", &specs).unwrap();
            assert!(matches!(
                &nodelist.nodes()[0],
                Node::Tag { scannable: Some(labels), .. } if labels == &["nodelist"]
            ));
        }
    }

    mod inheritance {
        use super::*;

        #[test]
        fn extends_captures_rest_of_template() {
            let nodelist =
                parse("{% extends \"base.html\" %}x{% block a %}{% endblock %}").unwrap();
            assert_eq!(nodelist.len(), 1);

            let Node::Extends { parent, nodelist: rest, .. } = &nodelist.nodes()[0] else {
                panic!("expected extends node");
            };
            assert_eq!(parent, &ParentRef::Literal("base.html".to_string()));
            assert_eq!(rest.len(), 2);
            assert!(matches!(
                &rest.nodes()[1],
                Node::Block { name, .. } if name == "a"
            ));
        }

        #[test]
        fn extends_dynamic_parent() {
            let nodelist = parse("{% extends somevar %}").unwrap();
            let Node::Extends { parent, .. } = &nodelist.nodes()[0] else {
                panic!("expected extends node");
            };
            assert_eq!(
                parent,
                &ParentRef::Dynamic {
                    expr: "somevar".to_string(),
                    default: None
                }
            );
            assert_eq!(parent.literal(), None);
        }

        #[test]
        fn extends_dynamic_with_default_filter() {
            let nodelist = parse("{% extends somevar|default:\"base.html\" %}").unwrap();
            let Node::Extends { parent, .. } = &nodelist.nodes()[0] else {
                panic!("expected extends node");
            };
            assert_eq!(parent.literal(), Some("base.html"));
        }

        #[test]
        fn extends_default_with_unquoted_arg_stays_dynamic() {
            let nodelist = parse("{% extends somevar|default:other_var %}").unwrap();
            let Node::Extends { parent, .. } = &nodelist.nodes()[0] else {
                panic!("expected extends node");
            };
            assert_eq!(parent.literal(), None);
        }

        #[test]
        fn include_literal_and_dynamic() {
            let nodelist = parse("{% include \"partial.html\" %}{% include somevar %}").unwrap();
            assert!(matches!(
                &nodelist.nodes()[0],
                Node::Include { target: Some(IncludeTarget::Name(name)), .. } if name == "partial.html"
            ));
            assert!(matches!(
                &nodelist.nodes()[1],
                Node::Include { target: None, .. }
            ));
        }

        #[test]
        fn include_keeps_only_target() {
            let nodelist = parse("{% include 'partial.html' with x=1 only %}").unwrap();
            assert!(matches!(
                &nodelist.nodes()[0],
                Node::Include { target: Some(IncludeTarget::Name(name)), .. } if name == "partial.html"
            ));
        }

        #[test]
        fn block_with_named_end() {
            let nodelist = parse("{% block content %}x{% endblock content %}").unwrap();
            assert!(matches!(
                &nodelist.nodes()[0],
                Node::Block { name, body, .. } if name == "content" && body.len() == 1
            ));
        }
    }

    mod errors {
        use super::*;

        #[test]
        fn multiple_extends() {
            let err = parse("{% extends \"a.html\" %}{% extends \"b.html\" %}").unwrap_err();
            assert_eq!(err, ParseError::MultipleExtends);
        }

        #[test]
        fn duplicate_block_name() {
            let err =
                parse("{% block a %}{% endblock %}{% block a %}{% endblock %}").unwrap_err();
            assert_eq!(
                err,
                ParseError::DuplicateBlockName {
                    name: "a".to_string()
                }
            );
            insta::assert_snapshot!(err, @"Block tag with name 'a' appears more than once");
        }

        #[test]
        fn unclosed_block() {
            let err = parse("{% block a %}").unwrap_err();
            assert_eq!(
                err,
                ParseError::UnclosedTag {
                    tag: "block".to_string(),
                    expected_closer: "endblock".to_string()
                }
            );
        }

        #[test]
        fn unclosed_if() {
            let err = parse("{% if x %}a").unwrap_err();
            insta::assert_snapshot!(err, @"Unclosed tag 'if': expected 'endif'");
        }

        #[test]
        fn stray_closers() {
            assert_eq!(
                parse("{% endif %}").unwrap_err(),
                ParseError::UnexpectedClosingTag {
                    tag: "endif".to_string()
                }
            );
            assert_eq!(
                parse("{% endblock %}").unwrap_err(),
                ParseError::UnexpectedClosingTag {
                    tag: "endblock".to_string()
                }
            );
        }

        #[test]
        fn closer_for_wrong_frame() {
            let err = parse("{% if x %}{% endfor %}").unwrap_err();
            assert_eq!(
                err,
                ParseError::UnexpectedClosingTag {
                    tag: "endfor".to_string()
                }
            );
        }

        #[test]
        fn orphaned_intermediate() {
            let err = parse("{% else %}").unwrap_err();
            assert_eq!(
                err,
                ParseError::OrphanedTag {
                    tag: "else".to_string()
                }
            );
        }

        #[test]
        fn mismatched_endblock_name() {
            let err = parse("{% block a %}{% endblock b %}").unwrap_err();
            insta::assert_snapshot!(err, @"'endblock b' does not match open block 'a'");
        }

        #[test]
        fn missing_arguments() {
            for source in ["{% extends %}", "{% include %}", "{% block %}"] {
                assert!(matches!(
                    parse(source).unwrap_err(),
                    ParseError::MissingArgument { .. }
                ));
            }
        }

        #[test]
        fn empty_tag() {
            assert_eq!(parse("{%  %}").unwrap_err(), ParseError::EmptyTag);
        }

        #[test]
        fn extends_inside_block_is_rejected() {
            let err = parse("{% block a %}{% extends \"b.html\" %}{% endblock %}").unwrap_err();
            assert_eq!(
                err,
                ParseError::UnexpectedClosingTag {
                    tag: "endblock".to_string()
                }
            );
        }
    }
}
