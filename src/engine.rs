//! Per-request rendering

use std::sync::Arc;

use thiserror::Error;
use tracing::debug_span;

use crate::locale::MessageCatalog;
use crate::renderer::ExecError;
use crate::template::TemplateSet;
use crate::value::{InputError, RenderContext};

/// Broad classification of a failed render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request payload was unusable
    Input,
    /// The template was missing or failed to execute
    Render,
}

/// Errors that can occur while rendering a request
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid request data: {0}")]
    Input(#[from] InputError),

    #[error("unknown template {0:?}")]
    UnknownTemplate(String),

    #[error("execution failed: {0}")]
    Execution(#[from] ExecError),
}

impl RenderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RenderError::Input(_) => ErrorKind::Input,
            RenderError::UnknownTemplate(_) | RenderError::Execution(_) => ErrorKind::Render,
        }
    }
}

/// Renders named templates against JSON request data
///
/// Cloning is cheap: the template set and catalog are shared.
#[derive(Debug, Clone)]
pub struct RenderEngine {
    templates: Arc<TemplateSet>,
    messages: Arc<MessageCatalog>,
}

impl RenderEngine {
    pub fn new(templates: Arc<TemplateSet>, messages: Arc<MessageCatalog>) -> Self {
        Self {
            templates,
            messages,
        }
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    pub fn messages(&self) -> &MessageCatalog {
        &self.messages
    }

    /// Render `template_name` with `data`, a JSON object
    ///
    /// The messages of the language named by the `lang` entry are made
    /// available as `.Messages`, replacing any value sent by the caller.
    pub fn render(&self, template_name: &str, data: &[u8]) -> Result<Vec<u8>, RenderError> {
        let _span = debug_span!("render", template = template_name).entered();

        let mut context = RenderContext::from_json(data)?;
        let messages = self.messages.messages_value(context.lang());
        context.set_messages(messages);

        if !self.templates.contains(template_name) {
            return Err(RenderError::UnknownTemplate(template_name.to_string()));
        }
        let output = self.templates.execute(template_name, &context.into_value())?;
        Ok(output.into_bytes())
    }
}
