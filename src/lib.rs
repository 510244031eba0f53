//! Puzzle Template - server-side HTML template rendering
//!
//! Templates are loaded from directories once at startup, compiled into an
//! immutable [`TemplateSet`] and rendered on request against JSON data. The
//! language follows Go's `text/template`: `{{.field}}` actions, pipelines,
//! `if`/`range`/`with`, `define`/`template`/`block` and a library of
//! built-in functions, plus a `date` function for reformatting dates.
//!
//! Localized messages for the request's `lang` are exposed to every template
//! as `.Messages`.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use puzzle_template::{FunctionRegistry, MessageCatalog, RenderEngine, TemplateSet};
//!
//! let functions = FunctionRegistry::new().with_date_format("%Y-%m-%d");
//! let mut builder = TemplateSet::builder(functions);
//! builder
//!     .add_source("home", "home.html", r#"{{.Messages.hello}}, {{.name}}!{{template "footer" .}}"#)
//!     .unwrap();
//! builder
//!     .add_source("footer", "footer.html", r#" ({{date .since "%Y"}})"#)
//!     .unwrap();
//!
//! let messages = MessageCatalog::new().with_language("en", [("hello", "Hello")]);
//! let engine = RenderEngine::new(Arc::new(builder.build().unwrap()), Arc::new(messages));
//!
//! let page = engine
//!     .render("home", br#"{"lang": "en", "name": "Ada", "since": "2021-04-01"}"#)
//!     .unwrap();
//! assert_eq!(page, b"Hello, Ada! (2021)");
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod functions;
pub mod locale;
pub mod parser;
pub mod renderer;
pub mod service;
pub mod template;
pub mod value;

pub use config::{ConfigError, ServerConfig, Settings, TemplateLayout};
pub use engine::{ErrorKind, RenderEngine, RenderError};
pub use error::ParseError;
pub use functions::{FunctionError, FunctionRegistry};
pub use locale::{LocaleError, MessageCatalog};
pub use parser::{parse, Document};
pub use renderer::{ExecConfig, ExecError, MissingKey};
pub use service::{InternalError, RenderRequest, Rendered, StartupError, TemplateService};
pub use template::{LoadError, TemplateError, TemplateLoader, TemplateSet};
pub use value::{RenderContext, Value};
