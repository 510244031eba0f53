//! Template compilation and storage
//!
//! Template files are parsed, checked against the function registry and
//! gathered into an immutable [`TemplateSet`]. Besides the file itself, each
//! `{{define "name"}}` and `{{block "name"}}` becomes a template of its own,
//! callable from any other template in the set.
//!
//! # Example
//!
//! ```text
//! components/card.html   {{define "card"}}<b>{{.}}</b>{{end}}
//! views/forum/view.html  {{range .posts}}{{template "card" .title}}{{end}}
//! ```
//!
//! With `components` and `views` as roots this registers `forum/view` and
//! `card`. The file `card.html` itself has a blank body, so the `define`
//! takes the name.

mod loader;
mod registry;
mod validate;

pub use loader::{load, template_name, LoadError, TemplateLoader, TEMPLATE_EXTENSION};
pub use registry::{Strength, Template, TemplateError, TemplateSet, TemplateSetBuilder};
pub use validate::validate;
