//! Template execution
//!
//! Walks a compiled template against a data value and produces the output
//! text. Execution never mutates the template set, so any number of renders
//! may run at once against the same set.

pub mod config;
mod exec;

pub use config::{ExecConfig, MissingKey, DEFAULT_MAX_DEPTH};
pub use exec::{execute, ExecError, ExecErrorKind};
