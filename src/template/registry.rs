//! Compiled template storage
//!
//! [`TemplateSetBuilder`] collects every definition found in the sources it
//! is given, then resolves duplicates in [`TemplateSetBuilder::build`] once
//! all candidates are known, so the result never depends on the order in
//! which sources were added.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::validate::validate;
use crate::error::ParseError;
use crate::functions::FunctionRegistry;
use crate::parser::{self, is_blank, Node, Spanned};
use crate::renderer::{self, ExecConfig, ExecError};
use crate::value::Value;

/// Errors that can occur while compiling templates
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Syntax or validation errors in a source
    #[error("{origin}: {}", format_parse_errors(.errors))]
    Parse {
        name: String,
        origin: String,
        text: Arc<str>,
        errors: Vec<ParseError>,
    },

    /// Two non-empty definitions of equal precedence
    #[error("template {name:?} is defined in both {first} and {second}")]
    Duplicate {
        name: String,
        first: String,
        second: String,
    },
}

impl TemplateError {
    /// Human readable report, with source context for parse errors
    pub fn report(&self) -> String {
        match self {
            TemplateError::Parse {
                origin,
                text,
                errors,
                ..
            } => errors
                .iter()
                .map(|e| e.format(text, origin))
                .collect::<Vec<_>>()
                .join("\n"),
            other => other.to_string(),
        }
    }
}

fn format_parse_errors(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Precedence of a definition when several share a name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Strength {
    /// The default body of a `{{block}}`
    Block,
    /// A file or a `{{define}}`
    Explicit,
}

/// A named, compiled template
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    origin: String,
    source: Arc<str>,
    body: Vec<Spanned<Node>>,
    strength: Strength,
}

impl Template {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the template was defined, usually a file path
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn body(&self) -> &[Spanned<Node>] {
        &self.body
    }

    pub fn strength(&self) -> Strength {
        self.strength
    }

    pub fn is_blank(&self) -> bool {
        is_blank(&self.body)
    }

    /// 1-based line of a byte offset in the defining source
    pub fn line_of(&self, offset: usize) -> usize {
        let end = offset.min(self.source.len());
        self.source.as_bytes()[..end]
            .iter()
            .filter(|b| **b == b'\n')
            .count()
            + 1
    }
}

/// Immutable set of templates sharing one function registry
#[derive(Debug, Clone)]
pub struct TemplateSet {
    templates: HashMap<String, Arc<Template>>,
    functions: Arc<FunctionRegistry>,
    config: ExecConfig,
}

impl TemplateSet {
    pub fn builder(functions: FunctionRegistry) -> TemplateSetBuilder {
        TemplateSetBuilder::new(functions)
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name).map(Arc::as_ref)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Template names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    /// Execute the template `name` with `data` as dot
    pub fn execute(&self, name: &str, data: &Value) -> Result<String, ExecError> {
        renderer::execute(self, name, data)
    }
}

/// A definition waiting for duplicate resolution
#[derive(Debug)]
struct Candidate {
    template: Template,
    blank: bool,
    /// Order of appearance within its source, for stable tie breaks
    position: usize,
}

/// Collects template sources and produces a [`TemplateSet`]
#[derive(Debug)]
pub struct TemplateSetBuilder {
    functions: FunctionRegistry,
    config: ExecConfig,
    candidates: BTreeMap<String, Vec<Candidate>>,
}

impl TemplateSetBuilder {
    pub fn new(functions: FunctionRegistry) -> Self {
        Self {
            functions,
            config: ExecConfig::default(),
            candidates: BTreeMap::new(),
        }
    }

    /// Set the execution configuration
    pub fn with_config(mut self, config: ExecConfig) -> Self {
        self.config = config;
        self
    }

    /// Parse and validate `source`, registering its body under `name`
    ///
    /// Every `{{define}}` and `{{block}}` in the source is registered under
    /// its own name. `origin` identifies the source in error messages.
    pub fn add_source(
        &mut self,
        name: &str,
        origin: &str,
        source: &str,
    ) -> Result<(), TemplateError> {
        let shared: Arc<str> = Arc::from(source);
        let parse_error = |errors| TemplateError::Parse {
            name: name.to_string(),
            origin: origin.to_string(),
            text: shared.clone(),
            errors,
        };

        let document = parser::parse(source).map_err(parse_error)?;
        let errors = validate(&document, &self.functions);
        if !errors.is_empty() {
            return Err(parse_error(errors));
        }

        let mut position = 0;
        let mut add = |this: &mut Self,
                       name: String,
                       body: Vec<Spanned<Node>>,
                       strength: Strength| {
            let mut blocks = Vec::new();
            collect_blocks(&body, &mut blocks);
            let template = Template {
                name,
                origin: origin.to_string(),
                source: shared.clone(),
                body,
                strength,
            };
            this.push(template, position);
            position += 1;
            blocks
        };

        let mut pending = add(self, name.to_string(), document.body, Strength::Explicit);
        for definition in document.definitions {
            let blocks = add(self, definition.name.node, definition.body, Strength::Explicit);
            pending.extend(blocks);
        }
        while let Some((block_name, body)) = pending.pop() {
            let nested = add(self, block_name, body, Strength::Block);
            pending.extend(nested);
        }

        debug!(template = name, origin, "compiled template");
        Ok(())
    }

    fn push(&mut self, template: Template, position: usize) {
        let blank = template.is_blank();
        self.candidates
            .entry(template.name.clone())
            .or_default()
            .push(Candidate {
                template,
                blank,
                position,
            });
    }

    /// Resolve duplicate definitions and freeze the set
    ///
    /// Blank definitions give way to non-blank ones, `{{define}}` and files
    /// take precedence over `{{block}}` defaults, and two non-blank
    /// definitions of equal precedence are an error.
    pub fn build(self) -> Result<TemplateSet, TemplateError> {
        let mut templates = HashMap::with_capacity(self.candidates.len());
        for (name, candidates) in self.candidates {
            if let Some(winner) = resolve(&name, candidates)? {
                templates.insert(name, Arc::new(winner));
            }
        }
        Ok(TemplateSet {
            templates,
            functions: Arc::new(self.functions),
            config: self.config,
        })
    }
}

fn resolve(name: &str, candidates: Vec<Candidate>) -> Result<Option<Template>, TemplateError> {
    let any_filled = candidates.iter().any(|c| !c.blank);
    let mut pool: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| !any_filled || !c.blank)
        .collect();
    let top = pool
        .iter()
        .map(|c| c.template.strength)
        .max()
        .unwrap_or(Strength::Explicit);
    pool.retain(|c| c.template.strength == top);
    pool.sort_by(|a, b| {
        (a.template.origin.as_str(), a.position).cmp(&(b.template.origin.as_str(), b.position))
    });

    let mut pool = pool.into_iter();
    let Some(first) = pool.next() else {
        return Ok(None);
    };
    if any_filled {
        if let Some(second) = pool.next() {
            return Err(TemplateError::Duplicate {
                name: name.to_string(),
                first: first.template.origin,
                second: second.template.origin,
            });
        }
    }
    Ok(Some(first.template))
}

/// Collect `{{block}}` bodies, outermost first, without descending into them
fn collect_blocks(nodes: &[Spanned<Node>], out: &mut Vec<(String, Vec<Spanned<Node>>)>) {
    for node in nodes {
        match &node.node {
            Node::Block(block) => out.push((block.name.node.clone(), block.body.clone())),
            Node::If(branch) | Node::With(branch) | Node::Range(branch) => {
                collect_blocks(&branch.body, out);
                if let Some(otherwise) = &branch.otherwise {
                    collect_blocks(otherwise, out);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(sources: &[(&str, &str)]) -> Result<TemplateSet, TemplateError> {
        let mut builder = TemplateSet::builder(FunctionRegistry::new());
        for (name, source) in sources {
            builder.add_source(name, &format!("{}.html", name), source)?;
        }
        builder.build()
    }

    fn body_text(set: &TemplateSet, name: &str) -> String {
        set.execute(name, &Value::Null).expect("Should execute")
    }

    #[test]
    fn test_file_and_defines_registered() {
        let set = build(&[("page", r#"{{define "a"}}A{{end}}{{define "b"}}B{{end}}P"#)]).unwrap();
        assert_eq!(set.names(), vec!["a", "b", "page"]);
        assert_eq!(body_text(&set, "page"), "P");
        assert_eq!(body_text(&set, "a"), "A");
    }

    #[test]
    fn test_block_registered_with_default() {
        let set = build(&[("base", r#"<{{block "content" .}}default{{end}}>"#)]).unwrap();
        assert!(set.contains("content"));
        assert_eq!(body_text(&set, "base"), "<default>");
    }

    #[test]
    fn test_define_overrides_block_in_any_order() {
        let base = ("base", r#"<{{block "content" .}}default{{end}}>"#);
        let view = ("view", r#"{{define "content"}}custom{{end}}"#);
        for sources in [[base, view], [view, base]] {
            let set = build(&sources).unwrap();
            assert_eq!(body_text(&set, "base"), "<custom>");
            assert_eq!(set.get("content").map(Template::strength), Some(Strength::Explicit));
        }
    }

    #[test]
    fn test_blank_definition_never_replaces() {
        let full = ("a", r#"{{define "x"}}full{{end}}"#);
        let blank = ("b", "{{define \"x\"}}\n  {{end}}");
        for sources in [[full, blank], [blank, full]] {
            let set = build(&sources).unwrap();
            assert_eq!(body_text(&set, "x"), "full");
        }
    }

    #[test]
    fn test_blank_defines_resolve_deterministically() {
        let set = build(&[("b", r#"{{define "x"}} {{end}}"#), ("a", r#"{{define "x"}}{{end}}"#)])
            .unwrap();
        assert_eq!(set.get("x").map(Template::origin), Some("a.html"));
    }

    #[test]
    fn test_duplicate_defines_fail() {
        let err = build(&[
            ("a", r#"{{define "x"}}one{{end}}"#),
            ("b", r#"{{define "x"}}two{{end}}"#),
        ])
        .unwrap_err();
        match err {
            TemplateError::Duplicate {
                name,
                first,
                second,
            } => {
                assert_eq!(name, "x");
                assert_eq!(first, "a.html");
                assert_eq!(second, "b.html");
            }
            other => panic!("Expected duplicate, got {:?}", other),
        }
    }

    #[test]
    fn test_define_colliding_with_file_name_fails() {
        let result = build(&[("x", "file"), ("y", r#"{{define "x"}}define{{end}}"#)]);
        assert!(matches!(result, Err(TemplateError::Duplicate { .. })));
    }

    #[test]
    fn test_parse_error_carries_origin() {
        let err = build(&[("broken", "{{if .a}}")]).unwrap_err();
        assert!(matches!(&err, TemplateError::Parse { origin, .. } if origin == "broken.html"));
        assert!(err.report().contains("broken.html"));
    }

    #[test]
    fn test_validation_error_is_parse_error() {
        let err = build(&[("v", "{{nope}}")]).unwrap_err();
        assert!(err.to_string().contains("function \"nope\" not defined"));
    }

    #[test]
    fn test_line_of() {
        let set = build(&[("lines", "a\nb\n{{.x}}")]).unwrap();
        let template = set.get("lines").unwrap();
        assert_eq!(template.line_of(0), 1);
        assert_eq!(template.line_of(4), 3);
    }
}
