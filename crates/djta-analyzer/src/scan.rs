//! The node walk behind `find_all`.
//!
//! Nodes are visited in document order. Each node is handled by the
//! first applicable rule: a matcher hit collects the node and nothing
//! beneath it, `include` splices the included tree in place,
//! `extends` walks the merged block bodies and then the root
//! ancestor, `{{ block.super }}` jumps to the recorded ancestor
//! definition, and blocks already covered by a merge are suppressed
//! where they occur in ancestor bodies.

use djta_templates::IncludeTarget;
use djta_templates::Node;
use djta_templates::NodeList;
use rustc_hash::FxHashSet;

use crate::errors::AnalyzerError;
use crate::inheritance::BlockKey;
use crate::inheritance::Session;
use crate::inheritance::TreeId;
use crate::matcher::NodeMatcher;

/// Variable expression that reads the ancestor definition of the
/// enclosing block.
const BLOCK_SUPER: &str = "block.super";

impl Session<'_> {
    /// Walk `nodelist`, collecting every node `matcher` accepts into
    /// `out`.
    ///
    /// `tree` is the interned tree the nodelist belongs to, `current`
    /// the block whose body is being walked, and `suppressed` the
    /// block names an earlier merge already covered.
    pub(crate) fn scan(
        &mut self,
        nodelist: &NodeList,
        tree: TreeId,
        current: Option<&BlockKey>,
        suppressed: &FxHashSet<String>,
        matcher: &NodeMatcher,
        out: &mut Vec<Node>,
    ) -> Result<(), AnalyzerError> {
        let fresh = FxHashSet::default();
        for node in nodelist {
            if matcher.matches(node) {
                out.push(node.clone());
                continue;
            }
            match node {
                Node::Include { target, .. } => match target {
                    Some(IncludeTarget::Name(name)) => {
                        let included = self.load(name)?;
                        let body = self.nodelist(included);
                        self.scan(&body, included, current, &fresh, matcher, out)?;
                    }
                    Some(IncludeTarget::Inline(handle)) => {
                        let included = self.intern_template(handle);
                        let body = self.nodelist(included);
                        self.scan(&body, included, current, &fresh, matcher, out)?;
                    }
                    None => {
                        tracing::debug!("Skipping include without a resolvable target");
                    }
                },
                Node::Extends {
                    parent,
                    nodelist: extending,
                    ..
                } => {
                    let Some(blocks) = self.merge_blocks(parent, extending, tree)? else {
                        continue;
                    };
                    let covered: FxHashSet<String> = blocks.keys().cloned().collect();
                    for key in blocks.values() {
                        let body = self
                            .block_body(key)
                            .expect("merged block exists in its tree");
                        self.scan(&body, key.tree, Some(key), &covered, matcher, out)?;
                    }
                    if let Some(topmost) = self.resolve_topmost(parent)? {
                        let body = self.nodelist(topmost);
                        self.scan(&body, topmost, None, &covered, matcher, out)?;
                    }
                }
                Node::Variable { expr, .. } if expr == BLOCK_SUPER => {
                    let Some(current) = current else {
                        continue;
                    };
                    let Some(ancestor) = self.super_of(current) else {
                        return Err(AnalyzerError::MissingSuperBlock {
                            name: current.name.clone(),
                        });
                    };
                    let body = self
                        .block_body(&ancestor)
                        .expect("linked ancestor block exists in its tree");
                    self.scan(&body, ancestor.tree, Some(&ancestor), &fresh, matcher, out)?;
                }
                Node::Block { name, body, .. } => {
                    if suppressed.contains(name) {
                        continue;
                    }
                    let key = BlockKey {
                        tree,
                        name: name.clone(),
                    };
                    self.scan(body, tree, Some(&key), &fresh, matcher, out)?;
                }
                Node::Tag { .. } => {
                    for branch in node.child_nodelists() {
                        self.scan(branch, tree, current, &fresh, matcher, out)?;
                    }
                }
                Node::Text { .. } | Node::Comment { .. } | Node::Variable { .. } => {}
            }
        }
        Ok(())
    }
}
