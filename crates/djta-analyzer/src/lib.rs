//! Find nodes across a template's whole composition graph.
//!
//! A Django-style template rarely stands alone: it extends a parent,
//! overrides blocks, and splices other templates in with `include`.
//! [`TemplateAnalyzer::find_all`] walks all of that as one document,
//! following `extends` chains, `include` edges, and `{{ block.super }}`
//! hops, and returns every node a [`NodeMatcher`] accepts, in the
//! order the composed template would render them.
//!
//! ```
//! use djta_analyzer::MemoryLoader;
//! use djta_analyzer::NodeMatcher;
//! use djta_analyzer::TemplateAnalyzer;
//! use djta_analyzer::TemplateLoader;
//!
//! # fn main() -> Result<(), djta_analyzer::AnalyzerError> {
//! let loader = MemoryLoader::new();
//! loader.insert(
//!     "base.html",
//!     "{% block content %}{% placeholder 'main' %}{% endblock %}",
//! );
//! loader.insert(
//!     "page.html",
//!     "{% extends \"base.html\" %}{% block content %}{% placeholder 'hero' %}{% endblock %}",
//! );
//!
//! let analyzer = TemplateAnalyzer::new(loader);
//! let template = analyzer.loader().load("page.html")?;
//! let found = analyzer.find_all(&template, &NodeMatcher::tag("placeholder"))?;
//! assert_eq!(found.len(), 1);
//! # Ok(())
//! # }
//! ```

mod errors;
mod inheritance;
mod loaders;
mod matcher;
mod scan;

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::inheritance::Session;

pub use crate::errors::AnalyzerError;
pub use crate::loaders::FsLoader;
pub use crate::loaders::MemoryLoader;
pub use crate::loaders::TemplateLoader;
pub use crate::matcher::NodeMatcher;
pub use crate::matcher::NodePattern;
pub use djta_templates::Node;
pub use djta_templates::NodeKind;
pub use djta_templates::NodeList;
pub use djta_templates::TagSpecs;
pub use djta_templates::Template;

/// Scans templates through a [`TemplateLoader`].
///
/// The analyzer itself is stateless between calls; each scan opens a
/// fresh session over the loader's cache, so repeated scans of the
/// same template see the same parsed trees and return the same nodes.
pub struct TemplateAnalyzer<L> {
    loader: L,
}

impl<L: TemplateLoader> TemplateAnalyzer<L> {
    #[must_use]
    pub fn new(loader: L) -> Self {
        TemplateAnalyzer { loader }
    }

    #[must_use]
    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Find every matching node reachable from `template`, in document
    /// order of first encounter.
    pub fn find_all(
        &self,
        template: &Arc<Template>,
        matcher: &NodeMatcher,
    ) -> Result<Vec<Node>, AnalyzerError> {
        let mut session = Session::new(&self.loader);
        let root = session.intern_template(template);
        let nodelist = session.nodelist(root);
        let mut out = Vec::new();
        session.scan(&nodelist, root, None, &FxHashSet::default(), matcher, &mut out)?;
        tracing::debug!("Scan finished with {} matches", out.len());
        Ok(out)
    }

    /// Like [`Self::find_all`] for a bare nodelist with no template
    /// identity of its own.
    pub fn find_all_in(
        &self,
        nodelist: &NodeList,
        matcher: &NodeMatcher,
    ) -> Result<Vec<Node>, AnalyzerError> {
        let mut session = Session::new(&self.loader);
        let root = session.intern_nodelist(nodelist.clone());
        let mut out = Vec::new();
        session.scan(nodelist, root, None, &FxHashSet::default(), matcher, &mut out)?;
        Ok(out)
    }

    /// Load `name` through the loader, then scan it.
    pub fn find_all_named(
        &self,
        name: &str,
        matcher: &NodeMatcher,
    ) -> Result<Vec<Node>, AnalyzerError> {
        let template = self.loader.load(name)?;
        self.find_all(&template, matcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_all_named_goes_through_the_loader() {
        let loader = MemoryLoader::new();
        loader.insert("page.html", "{% placeholder 'main' %}");
        let analyzer = TemplateAnalyzer::new(loader);
        let found = analyzer
            .find_all_named("page.html", &NodeMatcher::tag("placeholder"))
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn find_all_in_scans_a_bare_nodelist() {
        let specs = TagSpecs::builtin();
        let nodelist =
            djta_templates::parse_template("{{ a }}{% if x %}{{ b }}{% endif %}", &specs).unwrap();
        let analyzer = TemplateAnalyzer::new(MemoryLoader::new());
        let found = analyzer
            .find_all_in(&nodelist, &NodeMatcher::kind(NodeKind::Variable))
            .unwrap();
        assert_eq!(found.len(), 2);
    }
}
