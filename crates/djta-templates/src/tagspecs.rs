//! Shapes of block-style template tags.
//!
//! The parser only knows three tags structurally: `extends`, `include`,
//! and `block`. Everything else is looked up here to decide whether a
//! tag opens a region, which intermediate tags split it, and which of
//! its branches are visible to node searches.
//!
//! Specs come from two places: the built-in table covering Django's
//! standard paired tags, and user tables loaded from a project's
//! `djta.toml`, `.djta.toml`, or `pyproject.toml` under a `tagspecs`
//! table.

use std::fs;

use camino::Utf8Path;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use toml::Value;

#[derive(Debug, Error)]
pub enum TagSpecError {
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid spec for tag '{tag}': {reason}")]
    Invalid { tag: String, reason: String },
}

/// Registry of tag shapes keyed by opening tag name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TagSpecs(FxHashMap<String, TagSpec>);

impl TagSpecs {
    /// Specs for Django's standard library of paired tags.
    ///
    /// `block`, `extends`, and `include` are absent on purpose; the
    /// parser handles those structurally.
    #[must_use]
    pub fn builtin() -> Self {
        let mut specs = TagSpecs::default();
        specs.insert("autoescape", TagSpec::paired("endautoescape"));
        specs.insert("blocktranslate", TagSpec::paired("endblocktranslate").intermediates(&["plural"]));
        specs.insert("cache", TagSpec::paired("endcache"));
        specs.insert("comment", TagSpec::paired("endcomment").opaque());
        specs.insert("filter", TagSpec::paired("endfilter"));
        specs.insert("for", TagSpec::paired("endfor").intermediates(&["empty"]));
        specs.insert("if", TagSpec::paired("endif").intermediates(&["elif", "else"]));
        specs.insert("ifchanged", TagSpec::paired("endifchanged").intermediates(&["else"]));
        specs.insert("localize", TagSpec::paired("endlocalize"));
        specs.insert("localtime", TagSpec::paired("endlocaltime"));
        specs.insert("spaceless", TagSpec::paired("endspaceless"));
        specs.insert("timezone", TagSpec::paired("endtimezone"));
        specs.insert("verbatim", TagSpec::paired("endverbatim").opaque());
        specs.insert("with", TagSpec::paired("endwith"));
        specs
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TagSpec> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, spec: TagSpec) {
        self.0.insert(name.into(), spec);
    }

    #[must_use]
    pub fn is_closer(&self, name: &str) -> bool {
        name == "endblock"
            || self
                .0
                .values()
                .any(|spec| spec.end.as_ref().is_some_and(|end| end.tag == name))
    }

    #[must_use]
    pub fn is_intermediate(&self, name: &str) -> bool {
        self.0
            .values()
            .any(|spec| spec.intermediates.iter().any(|tag| tag == name))
    }

    /// Merge another registry into this one, with the other taking
    /// precedence.
    pub fn merge(&mut self, other: TagSpecs) -> &mut Self {
        self.0.extend(other.0);
        self
    }

    /// Parse specs out of a TOML document, looking under the given
    /// table path. Each direct child of that table is one tag spec.
    pub fn from_toml(content: &str, table_path: &[&str]) -> Result<Self, TagSpecError> {
        let value: Value = toml::from_str(content)?;

        let start_node = table_path
            .iter()
            .try_fold(&value, |current, &key| current.get(key));

        let mut specs = FxHashMap::default();

        if let Some(table) = start_node.and_then(Value::as_table) {
            for (name, spec_value) in table {
                let spec =
                    TagSpec::deserialize(spec_value.clone()).map_err(|err| TagSpecError::Invalid {
                        tag: name.clone(),
                        reason: err.to_string(),
                    })?;
                specs.insert(name.clone(), spec);
            }
        }

        Ok(TagSpecs(specs))
    }

    /// Load user specs from a project directory. The first config file
    /// found wins: `djta.toml`, then `.djta.toml`, then
    /// `pyproject.toml` under `[tool.djta.tagspecs]`.
    pub fn load_user_specs(project_root: &Utf8Path) -> Result<Self, TagSpecError> {
        let config_files = ["djta.toml", ".djta.toml", "pyproject.toml"];

        for &file in &config_files {
            let path = project_root.join(file);
            if path.exists() {
                let content = fs::read_to_string(&path)?;
                return match file {
                    "pyproject.toml" => Self::from_toml(&content, &["tool", "djta", "tagspecs"]),
                    _ => Self::from_toml(&content, &["tagspecs"]),
                };
            }
        }
        Ok(Self::default())
    }

    /// Built-in specs with any user specs layered on top.
    pub fn load_all(project_root: &Utf8Path) -> Result<Self, TagSpecError> {
        let mut specs = Self::builtin();
        let user_specs = Self::load_user_specs(project_root)?;
        specs.merge(user_specs);
        Ok(specs)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagSpec {
    pub end: Option<EndTag>,
    pub intermediates: Vec<String>,
    /// Branch labels exposed to node searches. `None` means every
    /// branch is searched.
    pub scannable: Option<Vec<String>>,
    /// Opaque tags swallow their body wholesale; nothing between the
    /// opener and its closer is parsed.
    pub opaque: bool,
}

impl TagSpec {
    #[must_use]
    pub fn paired(end: impl Into<String>) -> Self {
        TagSpec {
            end: Some(EndTag {
                tag: end.into(),
                optional: false,
            }),
            ..TagSpec::default()
        }
    }

    #[must_use]
    pub fn intermediates(mut self, tags: &[&str]) -> Self {
        self.intermediates = tags.iter().map(ToString::to_string).collect();
        self
    }

    #[must_use]
    pub fn scannable(mut self, labels: &[&str]) -> Self {
        self.scannable = Some(labels.iter().map(ToString::to_string).collect());
        self
    }

    #[must_use]
    pub fn opaque(mut self) -> Self {
        self.opaque = true;
        self
    }

    #[must_use]
    pub fn optional_end(mut self) -> Self {
        if let Some(end) = self.end.as_mut() {
            end.optional = true;
        }
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EndTag {
    pub tag: String,
    #[serde(default)]
    pub optional: bool,
}

#[cfg(test)]
mod tests {
    use std::fs;

    use camino::Utf8PathBuf;

    use super::*;

    fn utf8_root(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn builtin_covers_standard_paired_tags() {
        let specs = TagSpecs::builtin();

        for tag in ["autoescape", "comment", "filter", "for", "if", "verbatim", "with"] {
            assert!(specs.get(tag).is_some(), "{tag} should be present");
        }
        for tag in ["block", "extends", "include", "load", "url", "csrf_token"] {
            assert!(specs.get(tag).is_none(), "{tag} should not be present");
        }
    }

    #[test]
    fn builtin_branch_shapes() {
        let specs = TagSpecs::builtin();

        let if_spec = specs.get("if").unwrap();
        assert_eq!(if_spec.end.as_ref().unwrap().tag, "endif");
        assert_eq!(if_spec.intermediates, vec!["elif", "else"]);
        assert!(!if_spec.opaque);

        assert!(specs.get("comment").unwrap().opaque);
        assert!(specs.get("verbatim").unwrap().opaque);
    }

    #[test]
    fn closer_and_intermediate_lookup() {
        let specs = TagSpecs::builtin();

        assert!(specs.is_closer("endif"));
        assert!(specs.is_closer("endblock"));
        assert!(!specs.is_closer("if"));
        assert!(specs.is_intermediate("else"));
        assert!(specs.is_intermediate("empty"));
        assert!(!specs.is_intermediate("endfor"));
    }

    #[test]
    fn from_toml_custom_spec() {
        let content = r#"
[tagspecs.panel]
end = { tag = "endpanel" }
intermediates = ["fallback"]
scannable = ["nodelist"]

[tagspecs.widget]
end = { tag = "endwidget", optional = true }
"#;
        let specs = TagSpecs::from_toml(content, &["tagspecs"]).unwrap();

        let panel = specs.get("panel").unwrap();
        assert_eq!(panel.end.as_ref().unwrap().tag, "endpanel");
        assert_eq!(panel.intermediates, vec!["fallback"]);
        assert_eq!(panel.scannable, Some(vec!["nodelist".to_string()]));

        let widget = specs.get("widget").unwrap();
        assert!(widget.end.as_ref().unwrap().optional);
        assert!(widget.scannable.is_none());
    }

    #[test]
    fn from_toml_missing_table_is_empty() {
        let specs = TagSpecs::from_toml("[other]\nkey = 1\n", &["tagspecs"]).unwrap();
        assert_eq!(specs, TagSpecs::default());
    }

    #[test]
    fn load_user_specs_first_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8_root(&dir);

        fs::write(
            root.join("djta.toml"),
            "[tagspecs.mytag]\nend = { tag = \"endmytag_djta\" }\n",
        )
        .unwrap();
        fs::write(
            root.join("pyproject.toml"),
            "[tool.djta.tagspecs.mytag]\nend = { tag = \"endmytag_pyproject\" }\n\n[tool.djta.tagspecs.other]\nend = { tag = \"endother\" }\n",
        )
        .unwrap();

        let specs = TagSpecs::load_user_specs(&root).unwrap();
        assert_eq!(specs.get("mytag").unwrap().end.as_ref().unwrap().tag, "endmytag_djta");
        assert!(specs.get("other").is_none());

        fs::remove_file(root.join("djta.toml")).unwrap();
        let specs = TagSpecs::load_user_specs(&root).unwrap();
        assert_eq!(
            specs.get("mytag").unwrap().end.as_ref().unwrap().tag,
            "endmytag_pyproject"
        );
        assert!(specs.get("other").is_some());
    }

    #[test]
    fn load_all_layers_user_over_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8_root(&dir);

        fs::write(
            root.join("djta.toml"),
            "[tagspecs.if]\nend = { tag = \"endif\" }\nscannable = [\"nodelist\"]\n",
        )
        .unwrap();

        let specs = TagSpecs::load_all(&root).unwrap();
        assert!(specs.get("for").is_some());
        assert_eq!(
            specs.get("if").unwrap().scannable,
            Some(vec!["nodelist".to_string()])
        );
    }
}
