//! Template loading.
//!
//! Loaders hand out parsed templates by name. Both implementations
//! cache: asking for the same name twice returns the same handle, so
//! every `extends`/`include` edge pointing at one template shares one
//! parsed tree.

use std::sync::Arc;

use camino::Utf8Component;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use dashmap::DashMap;
use djta_conf::Settings;
use djta_templates::parse_template;
use djta_templates::TagSpecs;
use djta_templates::Template;
use walkdir::WalkDir;

use crate::errors::AnalyzerError;

/// Source of parsed templates, addressed by the names templates use to
/// refer to each other.
pub trait TemplateLoader {
    /// Load and parse the named template.
    fn load(&self, name: &str) -> Result<Arc<Template>, AnalyzerError>;
}

/// Loader over an in-memory map of template sources.
#[derive(Debug)]
pub struct MemoryLoader {
    specs: TagSpecs,
    sources: DashMap<String, String>,
    cache: DashMap<String, Arc<Template>>,
}

impl MemoryLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::with_specs(TagSpecs::builtin())
    }

    #[must_use]
    pub fn with_specs(specs: TagSpecs) -> Self {
        MemoryLoader {
            specs,
            sources: DashMap::default(),
            cache: DashMap::default(),
        }
    }

    /// Register a template source, replacing any previous registration
    /// under the same name.
    pub fn insert(&self, name: impl Into<String>, source: impl Into<String>) {
        let name = name.into();
        self.cache.remove(&name);
        self.sources.insert(name, source.into());
    }
}

impl Default for MemoryLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateLoader for MemoryLoader {
    fn load(&self, name: &str) -> Result<Arc<Template>, AnalyzerError> {
        if let Some(cached) = self.cache.get(name) {
            return Ok(Arc::clone(&cached));
        }
        let source = self
            .sources
            .get(name)
            .ok_or_else(|| AnalyzerError::TemplateNotFound {
                name: name.to_string(),
            })?;
        let nodelist =
            parse_template(source.value(), &self.specs).map_err(|err| AnalyzerError::Parse {
                name: name.to_string(),
                source: err,
            })?;
        // Release the sources shard before locking the cache; `insert`
        // takes them in the opposite order.
        drop(source);
        let template = Arc::new(Template::new(Some(name.to_string()), nodelist));
        self.cache.insert(name.to_string(), Arc::clone(&template));
        tracing::debug!("Parsed and cached template '{}'", name);
        Ok(template)
    }
}

/// Loader that reads template files from configured directories. The
/// first directory containing a name wins.
#[derive(Debug)]
pub struct FsLoader {
    specs: TagSpecs,
    dirs: Vec<Utf8PathBuf>,
    cache: DashMap<String, Arc<Template>>,
}

impl FsLoader {
    #[must_use]
    pub fn new(dirs: Vec<Utf8PathBuf>) -> Self {
        Self::with_specs(dirs, TagSpecs::builtin())
    }

    #[must_use]
    pub fn with_specs(dirs: Vec<Utf8PathBuf>, specs: TagSpecs) -> Self {
        FsLoader {
            specs,
            dirs,
            cache: DashMap::default(),
        }
    }

    /// Loader over a project's configured `template_dirs`.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.template_dirs.clone())
    }

    /// Template names discoverable under the configured directories,
    /// sorted and deduplicated.
    #[must_use]
    pub fn template_names(&self) -> Vec<String> {
        tracing::debug!("Discovering templates in {} directories", self.dirs.len());
        let mut names = Vec::new();
        for dir in &self.dirs {
            if !dir.exists() {
                tracing::warn!("Template directory does not exist: {}", dir);
                continue;
            }
            for entry in WalkDir::new(dir)
                .into_iter()
                .filter_map(std::result::Result::ok)
                .filter(|entry| entry.file_type().is_file())
            {
                let Ok(path) = Utf8PathBuf::from_path_buf(entry.path().to_path_buf()) else {
                    continue;
                };
                if let Ok(relative) = path.strip_prefix(dir) {
                    names.push(relative.to_string());
                }
            }
        }
        names.sort();
        names.dedup();
        names
    }

    fn resolve(&self, name: &str) -> Option<Utf8PathBuf> {
        if !safe_template_name(name) {
            tracing::warn!("Rejecting unsafe template name '{}'", name);
            return None;
        }
        self.dirs.iter().find_map(|dir| {
            let path = dir.join(name);
            path.is_file().then_some(path)
        })
    }
}

impl TemplateLoader for FsLoader {
    fn load(&self, name: &str) -> Result<Arc<Template>, AnalyzerError> {
        if let Some(cached) = self.cache.get(name) {
            return Ok(Arc::clone(&cached));
        }
        let path = self
            .resolve(name)
            .ok_or_else(|| AnalyzerError::TemplateNotFound {
                name: name.to_string(),
            })?;
        let source = std::fs::read_to_string(&path).map_err(|err| AnalyzerError::Io {
            path: path.clone(),
            source: err,
        })?;
        let nodelist =
            parse_template(&source, &self.specs).map_err(|err| AnalyzerError::Parse {
                name: name.to_string(),
                source: err,
            })?;
        let template = Arc::new(Template::new(Some(name.to_string()), nodelist));
        self.cache.insert(name.to_string(), Arc::clone(&template));
        tracing::debug!("Loaded template '{}' from {}", name, path);
        Ok(template)
    }
}

/// A name is safe when it stays inside the directory it is joined to:
/// relative, with no `..` or `.` components.
fn safe_template_name(name: &str) -> bool {
    let path = Utf8Path::new(name);
    !path.as_str().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Utf8Component::Normal(_)))
}
