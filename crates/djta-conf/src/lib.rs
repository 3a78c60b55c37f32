//! Project settings for template analysis.
//!
//! Settings are read from the project root with later sources taking
//! precedence: `pyproject.toml` under `[tool.djta]`, then
//! `.djta.toml`, then `djta.toml`.

use std::fs;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use config::Config;
use config::ConfigError as ExternalConfigError;
use config::File;
use config::FileFormat;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration build/deserialize error")]
    Config(#[from] ExternalConfigError),
    #[error("Failed to read pyproject.toml")]
    PyprojectIo(#[from] std::io::Error),
    #[error("Failed to parse pyproject.toml TOML")]
    PyprojectParse(#[from] toml::de::Error),
    #[error("Failed to serialize extracted pyproject data")]
    PyprojectSerialize(#[from] toml::ser::Error),
}

#[derive(Debug, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Directories searched for templates, in precedence order.
    /// Relative entries are resolved against the project root.
    pub template_dirs: Vec<Utf8PathBuf>,
    pub debug: bool,
}

impl Settings {
    pub fn new(project_root: &Utf8Path) -> Result<Self, ConfigError> {
        let mut settings = Self::load_from_root(project_root)?;
        settings.template_dirs = settings
            .template_dirs
            .into_iter()
            .map(|dir| {
                if dir.is_relative() {
                    project_root.join(dir)
                } else {
                    dir
                }
            })
            .collect();
        Ok(settings)
    }

    fn load_from_root(project_root: &Utf8Path) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let pyproject_path = project_root.join("pyproject.toml");
        if pyproject_path.exists() {
            let content = fs::read_to_string(&pyproject_path)?;
            let full_toml_value: toml::Value = toml::from_str(&content)?;

            let table_path = ["tool", "djta"];
            let djta_value_opt = table_path
                .iter()
                .try_fold(&full_toml_value, |current_val, &key| current_val.get(key));

            if let Some(djta_table) = djta_value_opt.and_then(|v| v.as_table()) {
                let djta_toml_string = toml::to_string(djta_table)?;
                builder = builder.add_source(File::from_str(&djta_toml_string, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            File::from(project_root.join(".djta.toml").as_std_path())
                .format(FileFormat::Toml)
                .required(false),
        );

        builder = builder.add_source(
            File::from(project_root.join("djta.toml").as_std_path())
                .format(FileFormat::Toml)
                .required(false),
        );

        let config = builder.build()?;
        let settings = config.try_deserialize()?;
        Ok(settings)
    }
}
