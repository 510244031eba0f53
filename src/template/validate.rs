//! Load-time checks on parsed templates
//!
//! These catch the mistakes that can be decided without data: calls to
//! functions that are not registered, references to variables that were
//! never declared, `{{break}}`/`{{continue}}` outside a `{{range}}`, and
//! arguments given to something that is not a function.

use crate::error::ParseError;
use crate::functions::FunctionRegistry;
use crate::parser::ast::*;

/// Check a parsed document, returning every problem found
pub fn validate(document: &Document, functions: &FunctionRegistry) -> Vec<ParseError> {
    let mut validator = Validator::new(functions);
    validator.isolated(&document.body);
    for definition in &document.definitions {
        validator.isolated(&definition.body);
    }
    validator.errors
}

struct Validator<'a> {
    functions: &'a FunctionRegistry,
    /// Declared variable names, innermost last; `$` is the empty name
    variables: Vec<String>,
    errors: Vec<ParseError>,
}

impl<'a> Validator<'a> {
    fn new(functions: &'a FunctionRegistry) -> Self {
        Self {
            functions,
            variables: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn error(&mut self, span: &Span, message: String) {
        self.errors.push(ParseError::syntax(span.clone(), message));
    }

    /// A body executed as a template of its own, seeing only `$`
    fn isolated(&mut self, body: &[Spanned<Node>]) {
        let saved = std::mem::replace(&mut self.variables, vec![String::new()]);
        self.body(body, false);
        self.variables = saved;
    }

    fn scoped(&mut self, body: &[Spanned<Node>], in_range: bool) {
        let mark = self.variables.len();
        self.body(body, in_range);
        self.variables.truncate(mark);
    }

    fn body(&mut self, nodes: &[Spanned<Node>], in_range: bool) {
        for node in nodes {
            match &node.node {
                Node::Text(_) => {}
                Node::Action(pipeline) => self.pipeline(pipeline, false),
                Node::If(branch) | Node::With(branch) => {
                    let mark = self.variables.len();
                    self.pipeline(&branch.pipeline, false);
                    self.scoped(&branch.body, in_range);
                    if let Some(otherwise) = &branch.otherwise {
                        self.scoped(otherwise, in_range);
                    }
                    self.variables.truncate(mark);
                }
                Node::Range(branch) => {
                    let mark = self.variables.len();
                    self.pipeline(&branch.pipeline, true);
                    self.scoped(&branch.body, true);
                    if let Some(otherwise) = &branch.otherwise {
                        self.scoped(otherwise, in_range);
                    }
                    self.variables.truncate(mark);
                }
                Node::Template(call) => {
                    if let Some(pipeline) = &call.pipeline {
                        self.pipeline(pipeline, false);
                    }
                }
                Node::Block(block) => {
                    self.pipeline(&block.pipeline, false);
                    self.isolated(&block.body);
                }
                Node::Break if !in_range => {
                    self.error(&node.span, "{{break}} outside {{range}}".to_string())
                }
                Node::Continue if !in_range => {
                    self.error(&node.span, "{{continue}} outside {{range}}".to_string())
                }
                Node::Break | Node::Continue => {}
            }
        }
    }

    fn pipeline(&mut self, pipeline: &Pipeline, ranged: bool) {
        for (i, command) in pipeline.commands.iter().enumerate() {
            self.command(command, i > 0);
        }

        let Some(declaration) = &pipeline.declaration else {
            return;
        };
        if declaration.variables.len() > 1 && !ranged {
            let span = declaration.variables[1].span.clone();
            self.error(&span, "too many declarations".to_string());
        }
        for variable in &declaration.variables {
            match declaration.kind {
                DeclarationKind::Declare => self.variables.push(variable.node.clone()),
                DeclarationKind::Assign => {
                    if !self.is_declared(&variable.node) {
                        self.error(
                            &variable.span,
                            format!("undefined variable \"${}\"", variable.node),
                        );
                    }
                }
            }
        }
    }

    fn command(&mut self, command: &Spanned<Command>, piped: bool) {
        let Some(first) = command.node.operands.first() else {
            return;
        };
        if !matches!(first.node, Operand::Function(_)) {
            if let Some(second) = command.node.operands.get(1) {
                self.error(
                    &second.span,
                    format!("can't give argument to non-function {}", first.node.describe()),
                );
            } else if piped {
                self.error(
                    &first.span,
                    format!("can't pipe into non-function {}", first.node.describe()),
                );
            }
        }
        for operand in &command.node.operands {
            self.operand(operand);
        }
    }

    fn operand(&mut self, operand: &Spanned<Operand>) {
        match &operand.node {
            Operand::Function(name) => {
                if !self.functions.contains(name) {
                    self.error(&operand.span, format!("function \"{}\" not defined", name));
                }
            }
            Operand::Variable { name, .. } => {
                if !self.is_declared(name) {
                    self.error(&operand.span, format!("undefined variable \"${}\"", name));
                }
            }
            Operand::Pipeline(pipeline) => self.pipeline(pipeline, false),
            _ => {}
        }
    }

    fn is_declared(&self, name: &str) -> bool {
        self.variables.iter().rev().any(|v| v == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn check(source: &str) -> Vec<String> {
        let document = parse(source).expect("Should parse");
        validate(&document, &FunctionRegistry::new())
            .into_iter()
            .map(|e| match e {
                ParseError::Syntax { message, .. } => message,
            })
            .collect()
    }

    #[test]
    fn test_valid_template() {
        let errors = check(
            r#"{{$title := .title}}{{range $i, $e := .items}}{{$i}}{{$e}}{{$title}}{{end}}{{len .x | print}}"#,
        );
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn test_unknown_function() {
        assert_eq!(check("{{frobnicate .x}}"), vec!["function \"frobnicate\" not defined"]);
    }

    #[test]
    fn test_undeclared_variable() {
        assert_eq!(check("{{$missing}}"), vec!["undefined variable \"$missing\""]);
    }

    #[test]
    fn test_assign_requires_declaration() {
        assert_eq!(check("{{$x = 1}}"), vec!["undefined variable \"$x\""]);
        assert!(check("{{$x := 1}}{{$x = 2}}").is_empty());
    }

    #[test]
    fn test_variable_scoped_to_control_structure() {
        assert_eq!(
            check("{{if .a}}{{$x := 1}}{{end}}{{$x}}"),
            vec!["undefined variable \"$x\""]
        );
        assert_eq!(
            check("{{range $e := .items}}{{end}}{{$e}}"),
            vec!["undefined variable \"$e\""]
        );
    }

    #[test]
    fn test_define_does_not_see_outer_variables() {
        assert_eq!(
            check(r#"{{$x := 1}}{{define "inner"}}{{$x}}{{end}}"#),
            vec!["undefined variable \"$x\""]
        );
        assert!(check(r#"{{define "inner"}}{{$}}{{end}}"#).is_empty());
    }

    #[test]
    fn test_block_body_is_isolated() {
        assert_eq!(
            check(r#"{{$x := 1}}{{block "b" .}}{{$x}}{{end}}"#),
            vec!["undefined variable \"$x\""]
        );
    }

    #[test]
    fn test_break_outside_range() {
        assert_eq!(check("{{if .a}}{{break}}{{end}}"), vec!["{{break}} outside {{range}}"]);
        assert_eq!(
            check("{{range .a}}{{else}}{{continue}}{{end}}"),
            vec!["{{continue}} outside {{range}}"]
        );
        assert!(check("{{range .a}}{{if .}}{{break}}{{end}}{{end}}").is_empty());
    }

    #[test]
    fn test_two_variables_only_in_range() {
        assert_eq!(check("{{$a, $b := .x}}"), vec!["too many declarations"]);
    }

    #[test]
    fn test_arguments_to_non_function() {
        assert_eq!(
            check("{{.name .other}}"),
            vec!["can't give argument to non-function .name"]
        );
        assert_eq!(
            check("{{.name | .other}}"),
            vec!["can't pipe into non-function .other"]
        );
    }

    #[test]
    fn test_unknown_function_in_nested_pipeline() {
        assert_eq!(
            check("{{print (nope 1)}}"),
            vec!["function \"nope\" not defined"]
        );
    }
}
