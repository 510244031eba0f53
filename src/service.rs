//! Transport-facing template service
//!
//! [`TemplateService`] is what a transport layer calls. Failures are logged
//! in full and replaced by the opaque [`InternalError`], so callers never see
//! template internals.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use crate::config::{ConfigError, ServerConfig};
use crate::engine::RenderEngine;
use crate::functions::FunctionRegistry;
use crate::locale::{self, LocaleError, MessageCatalog};
use crate::template::{LoadError, TemplateLoader};

/// Name the service registers under
pub const SERVICE_KEY: &str = "puzzleTemplate";

/// A request to render one template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub template_name: String,
    /// JSON object used as template data
    pub data: Vec<u8>,
}

impl RenderRequest {
    pub fn new(template_name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            template_name: template_name.into(),
            data: data.into(),
        }
    }
}

/// Rendered output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub content: Vec<u8>,
}

/// The only error surfaced to callers
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("internal service error")]
pub struct InternalError;

/// Errors that prevent the service from starting
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to load locale files: {0}")]
    Locale(#[from] LocaleError),

    #[error("failed to load templates: {0}")]
    Templates(#[from] LoadError),
}

impl StartupError {
    /// Human readable report, with source context for template parse errors
    pub fn report(&self) -> String {
        match self {
            StartupError::Templates(err) => format!("failed to load templates:\n{}", err.report()),
            other => other.to_string(),
        }
    }
}

/// Renders requests with templates and messages loaded at startup
#[derive(Debug, Clone)]
pub struct TemplateService {
    engine: RenderEngine,
    version: String,
}

impl TemplateService {
    /// Load locales and templates as described by `config`
    pub fn start(config: &ServerConfig) -> Result<Self, StartupError> {
        let catalog = match &config.locales {
            Some(locales) => locale::load(&locales.path, &locales.languages)?,
            None => MessageCatalog::new(),
        };
        let functions = FunctionRegistry::new().with_date_format(&config.date_format);
        let templates = TemplateLoader::new(functions)
            .with_config(config.exec.clone())
            .load(config.layout.roots().as_slice())?;

        info!(
            service = SERVICE_KEY,
            version = %config.version,
            templates = templates.len(),
            languages = catalog.len(),
            "template service ready"
        );
        let engine = RenderEngine::new(Arc::new(templates), Arc::new(catalog));
        Ok(Self::new(engine, config.version.clone()))
    }

    pub fn new(engine: RenderEngine, version: impl Into<String>) -> Self {
        Self {
            engine,
            version: version.into(),
        }
    }

    pub fn engine(&self) -> &RenderEngine {
        &self.engine
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Render a request; any failure is logged and reported as
    /// [`InternalError`]
    pub fn render(&self, request: &RenderRequest) -> Result<Rendered, InternalError> {
        match self.engine.render(&request.template_name, &request.data) {
            Ok(content) => Ok(Rendered { content }),
            Err(err) => {
                error!(
                    kind = ?err.kind(),
                    template = %request.template_name,
                    error = %err,
                    "render failed"
                );
                Err(InternalError)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemplateLayout;
    use std::fs;

    fn start(files: &[(&str, &str)]) -> Result<TemplateService, StartupError> {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            fs::write(dir.path().join(name), contents).unwrap();
        }
        let config = ServerConfig::new(TemplateLayout::Single(dir.path().to_path_buf()))
            .with_version("9.9.9");
        TemplateService::start(&config)
    }

    #[test]
    fn test_start_and_render() {
        let service = start(&[("home.html", r#"{{date .day "%d.%m."}}"#)]).unwrap();
        assert_eq!(service.version(), "9.9.9");
        let rendered = service
            .render(&RenderRequest::new("home", r#"{"day":"2024-12-24"}"#))
            .unwrap();
        assert_eq!(rendered.content, b"24.12.");
    }

    #[test]
    fn test_failures_are_opaque() {
        let service = start(&[("home.html", "{{.a.b}}")]).unwrap();
        for request in [
            RenderRequest::new("home", "not-json"),
            RenderRequest::new("absent", "{}"),
            RenderRequest::new("home", r#"{"a": 1}"#),
        ] {
            let err = service.render(&request).unwrap_err();
            assert_eq!(err, InternalError);
            assert_eq!(err.to_string(), "internal service error");
        }
    }

    #[test]
    fn test_start_fails_on_bad_template() {
        let err = start(&[("ok.html", "fine"), ("bad.html", "{{end}}")]).unwrap_err();
        assert!(matches!(err, StartupError::Templates(_)));
        assert!(err.report().contains("bad.html"));
    }

    #[test]
    fn test_start_fails_on_missing_locale() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::new(TemplateLayout::Single(dir.path().to_path_buf()))
            .with_locales(dir.path(), vec!["en".to_string()]);
        let err = TemplateService::start(&config).unwrap_err();
        assert!(matches!(err, StartupError::Locale(_)));
    }
}
