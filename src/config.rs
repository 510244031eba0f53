//! Startup configuration
//!
//! Settings come from an optional TOML file and are overridden field by
//! field by command line flags or environment variables. The merged
//! [`Settings`] are then checked and turned into an immutable
//! [`ServerConfig`].

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::functions::DEFAULT_DATE_FORMAT;
use crate::renderer::{ExecConfig, MissingKey};

/// Errors that can occur when loading or checking configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("no template directory configured: set a templates path, or both components and views")]
    MissingTemplates,
    #[error("incomplete template layout: {missing} is not set")]
    PartialLayout { missing: &'static str },
    #[error("conflicting template layout: set either a single path or components and views")]
    ConflictingLayout,
    #[error("locale languages are configured but no locales path is set")]
    MissingLocalesPath,
}

/// Raw settings as read from TOML or collected from flags
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub version: Option<String>,
    pub date_format: Option<String>,
    #[serde(default)]
    pub templates: TemplateSettings,
    #[serde(default)]
    pub locales: LocaleSettings,
    #[serde(default)]
    pub render: RenderSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateSettings {
    pub path: Option<PathBuf>,
    pub components: Option<PathBuf>,
    pub views: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocaleSettings {
    pub path: Option<PathBuf>,
    pub languages: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenderSettings {
    pub max_depth: Option<usize>,
    pub missing_key: Option<MissingKey>,
}

impl Settings {
    /// Load settings from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load settings from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay `overrides` on these settings; set fields in `overrides` win
    pub fn merge(self, overrides: Settings) -> Settings {
        Settings {
            version: overrides.version.or(self.version),
            date_format: overrides.date_format.or(self.date_format),
            templates: TemplateSettings {
                path: overrides.templates.path.or(self.templates.path),
                components: overrides.templates.components.or(self.templates.components),
                views: overrides.templates.views.or(self.templates.views),
            },
            locales: LocaleSettings {
                path: overrides.locales.path.or(self.locales.path),
                languages: overrides.locales.languages.or(self.locales.languages),
            },
            render: RenderSettings {
                max_depth: overrides.render.max_depth.or(self.render.max_depth),
                missing_key: overrides.render.missing_key.or(self.render.missing_key),
            },
        }
    }

    /// Check the settings and fill in defaults
    pub fn into_config(self) -> Result<ServerConfig, ConfigError> {
        let templates = self.templates;
        let layout = match (templates.path, templates.components, templates.views) {
            (Some(path), None, None) => TemplateLayout::Single(path),
            (None, Some(components), Some(views)) => TemplateLayout::Split { components, views },
            (Some(_), _, _) => return Err(ConfigError::ConflictingLayout),
            (None, Some(_), None) => return Err(ConfigError::PartialLayout { missing: "views" }),
            (None, None, Some(_)) => {
                return Err(ConfigError::PartialLayout {
                    missing: "components",
                })
            }
            (None, None, None) => return Err(ConfigError::MissingTemplates),
        };

        let languages = self.locales.languages.unwrap_or_default();
        let locales = match self.locales.path {
            Some(path) => Some(LocaleConfig { path, languages }),
            None if languages.is_empty() => None,
            None => return Err(ConfigError::MissingLocalesPath),
        };

        let mut exec = ExecConfig::default();
        if let Some(depth) = self.render.max_depth {
            exec = exec.with_max_depth(depth);
        }
        if let Some(missing_key) = self.render.missing_key {
            exec = exec.with_missing_key(missing_key);
        }

        Ok(ServerConfig {
            version: self
                .version
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            date_format: self
                .date_format
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string()),
            layout,
            locales,
            exec,
        })
    }
}

/// Split a comma separated language list, trimming whitespace and
/// dropping empty entries
pub fn parse_languages(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|lang| !lang.is_empty())
        .map(str::to_string)
        .collect()
}

/// Where template files live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateLayout {
    /// One root holding every template
    Single(PathBuf),
    /// Shared components and page views compiled into one set
    Split { components: PathBuf, views: PathBuf },
}

impl TemplateLayout {
    pub fn roots(&self) -> Vec<&Path> {
        match self {
            TemplateLayout::Single(path) => vec![path.as_path()],
            TemplateLayout::Split { components, views } => {
                vec![components.as_path(), views.as_path()]
            }
        }
    }
}

/// Locale files to load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleConfig {
    pub path: PathBuf,
    /// Languages to load; the first is the default
    pub languages: Vec<String>,
}

/// Immutable configuration of a template service
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Build version, logged at startup
    pub version: String,
    /// Source format of the `date` function
    pub date_format: String,
    pub layout: TemplateLayout,
    pub locales: Option<LocaleConfig>,
    pub exec: ExecConfig,
}

impl ServerConfig {
    /// Create a configuration with defaults for everything but the layout
    pub fn new(layout: TemplateLayout) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            layout,
            locales: None,
            exec: ExecConfig::default(),
        }
    }

    /// Set the version string
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the source format of the `date` function
    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    /// Load locales from `path` for `languages`
    pub fn with_locales(mut self, path: impl Into<PathBuf>, languages: Vec<String>) -> Self {
        self.locales = Some(LocaleConfig {
            path: path.into(),
            languages,
        });
        self
    }

    /// Set the execution configuration
    pub fn with_exec(mut self, exec: ExecConfig) -> Self {
        self.exec = exec;
        self
    }
}
