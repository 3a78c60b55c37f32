//! Block-override resolution across `extends` chains.
//!
//! A scan opens a session, interns every template tree it touches, and
//! records override edges between blocks in an append-only table keyed
//! by tree and block name. Parsed trees are shared handles and never
//! mutated; all inheritance state lives here and is dropped with the
//! session.

use std::collections::BTreeMap;
use std::sync::Arc;

use djta_templates::Node;
use djta_templates::NodeList;
use djta_templates::ParentRef;
use djta_templates::Template;
use rustc_hash::FxHashMap;

use crate::errors::AnalyzerError;
use crate::loaders::TemplateLoader;

/// Identity of one interned template tree within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct TreeId(usize);

/// A block, identified by the tree that defines it and its name.
/// Block names are unique within a template, so the pair is a complete
/// identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct BlockKey {
    pub(crate) tree: TreeId,
    pub(crate) name: String,
}

struct SessionTree {
    nodelist: NodeList,
    handle: Option<Arc<Template>>,
}

/// Per-scan state: interned trees, name lookups, and override edges.
pub(crate) struct Session<'a> {
    loader: &'a dyn TemplateLoader,
    trees: Vec<SessionTree>,
    by_name: FxHashMap<String, TreeId>,
    overrides: FxHashMap<BlockKey, BlockKey>,
}

impl<'a> Session<'a> {
    pub(crate) fn new(loader: &'a dyn TemplateLoader) -> Self {
        Session {
            loader,
            trees: Vec::new(),
            by_name: FxHashMap::default(),
            overrides: FxHashMap::default(),
        }
    }

    /// Intern a bare nodelist with no template identity.
    pub(crate) fn intern_nodelist(&mut self, nodelist: NodeList) -> TreeId {
        let id = TreeId(self.trees.len());
        self.trees.push(SessionTree {
            nodelist,
            handle: None,
        });
        id
    }

    /// Intern a template handle, reusing the existing tree when the
    /// same handle was interned before.
    pub(crate) fn intern_template(&mut self, handle: &Arc<Template>) -> TreeId {
        let existing = self.trees.iter().position(|tree| {
            tree.handle
                .as_ref()
                .is_some_and(|interned| Arc::ptr_eq(interned, handle))
        });
        if let Some(index) = existing {
            return TreeId(index);
        }
        let id = TreeId(self.trees.len());
        self.trees.push(SessionTree {
            nodelist: handle.nodelist().clone(),
            handle: Some(Arc::clone(handle)),
        });
        if let Some(name) = handle.name() {
            self.by_name.entry(name.to_string()).or_insert(id);
        }
        id
    }

    /// Load a template through the session, reusing the interned tree
    /// when the name was seen before.
    pub(crate) fn load(&mut self, name: &str) -> Result<TreeId, AnalyzerError> {
        if let Some(&id) = self.by_name.get(name) {
            return Ok(id);
        }
        let handle = self.loader.load(name)?;
        let id = self.intern_template(&handle);
        self.by_name.entry(name.to_string()).or_insert(id);
        Ok(id)
    }

    /// Shared handle to the tree's nodes. Cloning is cheap, so callers
    /// can walk while the session keeps loading.
    pub(crate) fn nodelist(&self, tree: TreeId) -> NodeList {
        self.trees[tree.0].nodelist.clone()
    }

    /// The recorded ancestor definition for a block, if any.
    pub(crate) fn super_of(&self, block: &BlockKey) -> Option<BlockKey> {
        self.overrides.get(block).cloned()
    }

    /// Body of the keyed block, found structurally within its tree.
    pub(crate) fn block_body(&self, key: &BlockKey) -> Option<NodeList> {
        self.trees
            .get(key.tree.0)?
            .nodelist
            .descendants()
            .find_map(|node| match node {
                Node::Block { name, body, .. } if *name == key.name => Some(body.clone()),
                _ => None,
            })
    }

    /// Follow an `extends` chain to its root ancestor. `Ok(None)` when
    /// any link is dynamic without a static fallback.
    pub(crate) fn resolve_topmost(
        &mut self,
        parent: &ParentRef,
    ) -> Result<Option<TreeId>, AnalyzerError> {
        let Some(parent_id) = self.resolve_parent(parent)? else {
            return Ok(None);
        };
        let parent_nodelist = self.nodelist(parent_id);
        match find_extends(&parent_nodelist) {
            Some(next) => {
                let next = next.clone();
                self.resolve_topmost(&next)
            }
            None => Ok(Some(parent_id)),
        }
    }

    /// Collect the effective block map for an `extends` node: the
    /// extending template's own blocks, then each ancestor's, linking
    /// an override edge whenever a name is already mapped.
    ///
    /// `Ok(None)` means some link of the chain is dynamic without a
    /// static fallback; such a chain contributes nothing to a scan.
    pub(crate) fn merge_blocks(
        &mut self,
        parent: &ParentRef,
        nodelist: &NodeList,
        tree: TreeId,
    ) -> Result<Option<BTreeMap<String, BlockKey>>, AnalyzerError> {
        let mut blocks: BTreeMap<String, BlockKey> = nodelist
            .descendants()
            .filter_map(|node| match node {
                Node::Block { name, .. } => Some((
                    name.clone(),
                    BlockKey {
                        tree,
                        name: name.clone(),
                    },
                )),
                _ => None,
            })
            .collect();

        if self.extend_blocks(parent, &mut blocks)? {
            tracing::debug!("Merged {} blocks across extends chain", blocks.len());
            Ok(Some(blocks))
        } else {
            Ok(None)
        }
    }

    fn extend_blocks(
        &mut self,
        parent: &ParentRef,
        blocks: &mut BTreeMap<String, BlockKey>,
    ) -> Result<bool, AnalyzerError> {
        let Some(parent_id) = self.resolve_parent(parent)? else {
            return Ok(false);
        };
        let parent_nodelist = self.nodelist(parent_id);

        for node in parent_nodelist.descendants() {
            let Node::Block { name, .. } = node else {
                continue;
            };
            let parent_key = BlockKey {
                tree: parent_id,
                name: name.clone(),
            };
            match blocks.get(name) {
                Some(head) => {
                    let head = head.clone();
                    self.link_override(&head, parent_key);
                }
                None => {
                    blocks.insert(name.clone(), parent_key);
                }
            }
        }

        match find_extends(&parent_nodelist) {
            Some(next) => {
                let next = next.clone();
                self.extend_blocks(&next, blocks)
            }
            None => Ok(true),
        }
    }

    /// Attach `candidate` at the end of the override chain starting at
    /// `head`. A candidate already in the chain is refused, so chains
    /// stay acyclic and re-merging a chain changes nothing.
    fn link_override(&mut self, head: &BlockKey, candidate: BlockKey) {
        let mut end = head.clone();
        let mut chain = vec![end.clone()];
        while let Some(next) = self.overrides.get(&end) {
            end = next.clone();
            chain.push(end.clone());
        }
        if chain.contains(&candidate) {
            tracing::debug!("Refusing override cycle for block '{}'", candidate.name);
            return;
        }
        self.overrides.insert(end, candidate);
    }

    /// Resolve an `extends` target to an interned tree. `Ok(None)`
    /// when the reference is dynamic with no static fallback.
    fn resolve_parent(&mut self, parent: &ParentRef) -> Result<Option<TreeId>, AnalyzerError> {
        match parent.literal() {
            Some(name) => {
                let name = name.to_string();
                Ok(Some(self.load(&name)?))
            }
            None => {
                tracing::debug!("Skipping dynamic extends without a literal default");
                Ok(None)
            }
        }
    }
}

/// First `extends` node in the tree, by structural search.
pub(crate) fn find_extends(nodelist: &NodeList) -> Option<&ParentRef> {
    nodelist.descendants().find_map(|node| match node {
        Node::Extends { parent, .. } => Some(parent),
        _ => None,
    })
}
