//! Tree-walking execution of compiled templates

use thiserror::Error;

use super::config::MissingKey;
use crate::functions::{Function, FunctionError};
use crate::parser::ast::*;
use crate::template::{Template, TemplateSet};
use crate::value::Value;

/// Errors that can occur while executing a template
#[derive(Debug, Error, Clone, PartialEq)]
#[error("template {}: {kind}", location(.template, .line))]
pub struct ExecError {
    /// Template being executed when the error occurred
    pub template: String,
    /// Line in the template's source, when known
    pub line: Option<usize>,
    pub kind: ExecErrorKind,
}

fn location(template: &str, line: &Option<usize>) -> String {
    match line {
        Some(line) => format!("{}:{}", template, line),
        None => template.to_string(),
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecErrorKind {
    #[error("no such template {0:?}")]
    UnknownTemplate(String),

    #[error("can't evaluate field {field} in type {kind}")]
    Field { field: String, kind: &'static str },

    #[error("map has no entry for key {0:?}")]
    MissingKey(String),

    #[error("range can't iterate over {0}")]
    Range(String),

    #[error("undefined variable \"${0}\"")]
    UndefinedVariable(String),

    #[error("can't give argument to non-function {0}")]
    NotAFunction(String),

    #[error(transparent)]
    Function(#[from] FunctionError),

    #[error("exceeded maximum nesting depth ({0})")]
    DepthExceeded(usize),
}

/// Execute the template `name` from `set` with `data` as dot
pub fn execute(set: &TemplateSet, name: &str, data: &Value) -> Result<String, ExecError> {
    let template = set.get(name).ok_or_else(|| ExecError {
        template: name.to_string(),
        line: None,
        kind: ExecErrorKind::UnknownTemplate(name.to_string()),
    })?;
    let mut executor = Executor {
        set,
        output: String::new(),
        depth: 0,
        variables: vec![(String::new(), data.clone())],
    };
    executor.walk(template, template.body(), data)?;
    Ok(executor.output)
}

/// How control leaves a list of nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
}

fn fail(template: &Template, span: &Span, kind: ExecErrorKind) -> ExecError {
    ExecError {
        template: template.name().to_string(),
        line: Some(template.line_of(span.start)),
        kind,
    }
}

struct Executor<'s> {
    set: &'s TemplateSet,
    output: String,
    /// Nesting of control structures and template calls
    depth: usize,
    /// Variables visible in the current template, innermost last
    variables: Vec<(String, Value)>,
}

impl<'s> Executor<'s> {
    fn walk(
        &mut self,
        t: &'s Template,
        nodes: &'s [Spanned<Node>],
        dot: &Value,
    ) -> Result<Flow, ExecError> {
        for node in nodes {
            let flow = match &node.node {
                Node::Text(text) => {
                    self.output.push_str(text);
                    Flow::Normal
                }
                Node::Action(pipeline) => {
                    let value = self.pipeline(t, pipeline, dot)?;
                    if pipeline.declaration.is_none() {
                        self.output.push_str(&value.to_output());
                    }
                    Flow::Normal
                }
                Node::If(branch) => self.branch(t, branch, dot, &node.span, false)?,
                Node::With(branch) => self.branch(t, branch, dot, &node.span, true)?,
                Node::Range(branch) => self.range(t, branch, dot, &node.span)?,
                Node::Template(call) => {
                    let value = match &call.pipeline {
                        Some(pipeline) => self.pipeline(t, pipeline, dot)?,
                        None => Value::Null,
                    };
                    self.call_template(t, &call.name, value)?;
                    Flow::Normal
                }
                Node::Block(block) => {
                    let value = self.pipeline(t, &block.pipeline, dot)?;
                    self.call_template(t, &block.name, value)?;
                    Flow::Normal
                }
                Node::Break => Flow::Break,
                Node::Continue => Flow::Continue,
            };
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    /// Enter one level of nested execution
    ///
    /// Every `if`, `with`, `range` and template call counts, so the limit
    /// bounds native stack use regardless of how the nesting is built.
    fn enter(&mut self, t: &Template, span: &Span) -> Result<(), ExecError> {
        let max_depth = self.set.config().max_depth;
        if self.depth >= max_depth {
            return Err(fail(t, span, ExecErrorKind::DepthExceeded(max_depth)));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// `if` and `with`; `with` rebinds dot inside its body
    fn branch(
        &mut self,
        t: &'s Template,
        branch: &'s Branch,
        dot: &Value,
        span: &Span,
        rebind: bool,
    ) -> Result<Flow, ExecError> {
        let mark = self.variables.len();
        let value = self.pipeline(t, &branch.pipeline, dot)?;
        self.enter(t, span)?;
        let flow = if value.is_truthy() {
            let inner = if rebind { &value } else { dot };
            self.walk(t, &branch.body, inner)?
        } else if let Some(otherwise) = &branch.otherwise {
            self.walk(t, otherwise, dot)?
        } else {
            Flow::Normal
        };
        self.leave();
        self.variables.truncate(mark);
        Ok(flow)
    }

    fn range(
        &mut self,
        t: &'s Template,
        branch: &'s Branch,
        dot: &Value,
        span: &Span,
    ) -> Result<Flow, ExecError> {
        let mark = self.variables.len();
        let value = self.commands(t, &branch.pipeline.commands, dot)?;
        self.enter(t, span)?;

        // Items are visited in place; a break stops before the rest is touched
        let mut iterated = false;
        match &value {
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    iterated = true;
                    let key = Value::Number(i as f64);
                    if self.iteration(t, branch, mark, key, item)? == Flow::Break {
                        break;
                    }
                }
            }
            Value::Map(entries) => {
                for (key, item) in entries.iter() {
                    iterated = true;
                    let key = Value::String(key.clone());
                    if self.iteration(t, branch, mark, key, item)? == Flow::Break {
                        break;
                    }
                }
            }
            Value::Number(_) => {
                let Some(n) = value.as_integer() else {
                    return Err(fail(t, span, ExecErrorKind::Range(value.to_string())));
                };
                for i in 0..n.max(0) {
                    iterated = true;
                    let index = Value::Number(i as f64);
                    if self.iteration(t, branch, mark, index.clone(), &index)? == Flow::Break {
                        break;
                    }
                }
            }
            Value::Null => {}
            other => {
                return Err(fail(t, span, ExecErrorKind::Range(other.kind().to_string())));
            }
        }

        let flow = match &branch.otherwise {
            Some(otherwise) if !iterated => {
                self.variables.truncate(mark);
                self.walk(t, otherwise, dot)?
            }
            _ => Flow::Normal,
        };
        self.leave();
        self.variables.truncate(mark);
        Ok(flow)
    }

    /// One pass of a range body with `key` and `item` bound
    fn iteration(
        &mut self,
        t: &'s Template,
        branch: &'s Branch,
        mark: usize,
        key: Value,
        item: &Value,
    ) -> Result<Flow, ExecError> {
        self.variables.truncate(mark);
        if let Some(declaration) = &branch.pipeline.declaration {
            match declaration.variables.as_slice() {
                [element] => self.bind(declaration.kind, &element.node, item.clone()),
                [index, element] => {
                    self.bind(declaration.kind, &index.node, key);
                    self.bind(declaration.kind, &element.node, item.clone());
                }
                _ => {}
            }
        }
        self.walk(t, &branch.body, item)
    }

    fn call_template(
        &mut self,
        t: &'s Template,
        name: &Spanned<String>,
        dot: Value,
    ) -> Result<(), ExecError> {
        let set = self.set;
        let target = set.get(&name.node).ok_or_else(|| {
            fail(t, &name.span, ExecErrorKind::UnknownTemplate(name.node.clone()))
        })?;
        self.enter(t, &name.span)?;
        let saved = std::mem::replace(&mut self.variables, vec![(String::new(), dot.clone())]);
        let result = self.walk(target, target.body(), &dot);
        self.variables = saved;
        self.leave();
        result.map(|_| ())
    }

    fn bind(&mut self, kind: DeclarationKind, name: &str, value: Value) {
        if kind == DeclarationKind::Assign {
            if let Some(slot) = self.variables.iter_mut().rev().find(|(n, _)| n == name) {
                slot.1 = value;
                return;
            }
        }
        self.variables.push((name.to_string(), value));
    }

    fn pipeline(
        &mut self,
        t: &'s Template,
        pipeline: &'s Pipeline,
        dot: &Value,
    ) -> Result<Value, ExecError> {
        let value = self.commands(t, &pipeline.commands, dot)?;
        if let Some(declaration) = &pipeline.declaration {
            for variable in &declaration.variables {
                self.bind(declaration.kind, &variable.node, value.clone());
            }
        }
        Ok(value)
    }

    /// Run piped commands, each receiving the previous result as last argument
    fn commands(
        &mut self,
        t: &'s Template,
        commands: &'s [Spanned<Command>],
        dot: &Value,
    ) -> Result<Value, ExecError> {
        let mut value = None;
        for command in commands {
            value = Some(self.command(t, command, dot, value)?);
        }
        Ok(value.unwrap_or_default())
    }

    fn command(
        &mut self,
        t: &'s Template,
        command: &'s Spanned<Command>,
        dot: &Value,
        piped: Option<Value>,
    ) -> Result<Value, ExecError> {
        let operands = &command.node.operands;
        let Some(first) = operands.first() else {
            return Ok(Value::Null);
        };
        match &first.node {
            Operand::Function(name) => {
                self.call_function(t, name, &first.span, &operands[1..], dot, piped)
            }
            other => {
                if operands.len() > 1 || piped.is_some() {
                    return Err(fail(
                        t,
                        &first.span,
                        ExecErrorKind::NotAFunction(other.describe()),
                    ));
                }
                self.operand(t, first, dot)
            }
        }
    }

    fn call_function(
        &mut self,
        t: &'s Template,
        name: &str,
        span: &Span,
        operands: &'s [Spanned<Operand>],
        dot: &Value,
        piped: Option<Value>,
    ) -> Result<Value, ExecError> {
        let set = self.set;
        let function = set.functions().get(name).ok_or_else(|| {
            let error = FunctionError::Failed {
                name: name.to_string(),
                message: "function not defined".to_string(),
            };
            fail(t, span, error.into())
        })?;

        match function {
            Function::Logic(op) => {
                if operands.is_empty() && piped.is_none() {
                    let error = FunctionError::Arity {
                        name: name.to_string(),
                        expected: "at least 1".to_string(),
                        got: 0,
                    };
                    return Err(fail(t, span, error.into()));
                }
                let mut last = Value::Null;
                for operand in operands {
                    last = self.operand(t, operand, dot)?;
                    if op.decides(&last) {
                        return Ok(last);
                    }
                }
                Ok(piped.unwrap_or(last))
            }
            Function::Native(_) => {
                let mut values = Vec::with_capacity(operands.len() + 1);
                for operand in operands {
                    values.push(self.operand(t, operand, dot)?);
                }
                values.extend(piped);
                set.functions()
                    .call(name, &values)
                    .map_err(|e| fail(t, span, e.into()))
            }
        }
    }

    fn operand(
        &mut self,
        t: &'s Template,
        operand: &'s Spanned<Operand>,
        dot: &Value,
    ) -> Result<Value, ExecError> {
        let span = &operand.span;
        match &operand.node {
            Operand::Dot => Ok(dot.clone()),
            Operand::Field(fields) => self.fields(t, span, dot, fields),
            Operand::Variable { name, fields } => {
                let value = self
                    .variables
                    .iter()
                    .rev()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| {
                        fail(t, span, ExecErrorKind::UndefinedVariable(name.clone()))
                    })?;
                self.fields(t, span, &value, fields)
            }
            Operand::Function(name) => self.call_function(t, name, span, &[], dot, None),
            Operand::String(s) => Ok(Value::String(s.clone())),
            Operand::Number(n) => Ok(Value::Number(*n)),
            Operand::Bool(b) => Ok(Value::Bool(*b)),
            Operand::Nil => Ok(Value::Null),
            Operand::Pipeline(pipeline) => self.pipeline(t, pipeline, dot),
        }
    }

    /// Follow a chain of field names; lookups through `nil` stay `nil`
    fn fields(
        &self,
        t: &Template,
        span: &Span,
        value: &Value,
        fields: &[String],
    ) -> Result<Value, ExecError> {
        let mut current = value;
        for field in fields {
            current = match current {
                Value::Map(entries) => match entries.get(field) {
                    Some(found) => found,
                    None if self.set.config().missing_key == MissingKey::Error => {
                        return Err(fail(t, span, ExecErrorKind::MissingKey(field.clone())));
                    }
                    None => return Ok(Value::Null),
                },
                Value::Null => return Ok(Value::Null),
                other => {
                    return Err(fail(
                        t,
                        span,
                        ExecErrorKind::Field {
                            field: field.clone(),
                            kind: other.kind(),
                        },
                    ));
                }
            };
        }
        Ok(current.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::FunctionRegistry;
    use crate::renderer::{ExecConfig, MissingKey};
    use pretty_assertions::assert_eq;

    fn set_with(config: ExecConfig, sources: &[(&str, &str)]) -> TemplateSet {
        let mut builder = TemplateSet::builder(FunctionRegistry::new().with_date_format("%Y-%m-%d"))
            .with_config(config);
        for (name, source) in sources {
            builder
                .add_source(name, name, source)
                .unwrap_or_else(|e| panic!("{}", e.report()));
        }
        builder.build().expect("Should build")
    }

    fn render(source: &str, data: serde_json::Value) -> Result<String, ExecError> {
        let set = set_with(ExecConfig::default(), &[("t", source)]);
        set.execute("t", &Value::from(data))
    }

    fn ok(source: &str, data: serde_json::Value) -> String {
        render(source, data).expect("Should render")
    }

    #[test]
    fn test_text_and_fields() {
        assert_eq!(
            ok("Hi {{.user.name}}!", serde_json::json!({"user": {"name": "Ada"}})),
            "Hi Ada!"
        );
    }

    #[test]
    fn test_missing_field_prints_nothing() {
        assert_eq!(ok("[{{.missing}}][{{.missing.deeper}}]", serde_json::json!({})), "[][]");
    }

    #[test]
    fn test_field_on_scalar_fails() {
        let err = render("a\n{{.title.x}}", serde_json::json!({"title": "Hi"})).unwrap_err();
        assert_eq!(err.line, Some(2));
        assert_eq!(
            err.kind,
            ExecErrorKind::Field {
                field: "x".to_string(),
                kind: "string"
            }
        );
    }

    #[test]
    fn test_missing_key_error_mode() {
        let set = set_with(
            ExecConfig::new().with_missing_key(MissingKey::Error),
            &[("t", "{{.nope}}")],
        );
        let err = set.execute("t", &Value::map(Default::default())).unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::MissingKey("nope".to_string()));
    }

    #[test]
    fn test_if_else_chain() {
        let source = "{{if .a}}A{{else if .b}}B{{else}}C{{end}}";
        assert_eq!(ok(source, serde_json::json!({"a": 1})), "A");
        assert_eq!(ok(source, serde_json::json!({"b": "x"})), "B");
        assert_eq!(ok(source, serde_json::json!({"a": 0, "b": ""})), "C");
    }

    #[test]
    fn test_with_rebinds_dot() {
        let source = "{{with .user}}{{.name}}{{else}}anonymous{{end}}";
        assert_eq!(ok(source, serde_json::json!({"user": {"name": "Ada"}})), "Ada");
        assert_eq!(ok(source, serde_json::json!({})), "anonymous");
    }

    #[test]
    fn test_range_list_with_index() {
        assert_eq!(
            ok(
                "{{range $i, $e := .items}}{{$i}}={{$e}};{{end}}",
                serde_json::json!({"items": ["a", "b"]})
            ),
            "0=a;1=b;"
        );
    }

    #[test]
    fn test_range_map_in_key_order() {
        assert_eq!(
            ok(
                "{{range $k, $v := .}}{{$k}}:{{$v}} {{end}}",
                serde_json::json!({"b": 2, "a": 1})
            ),
            "a:1 b:2 "
        );
    }

    #[test]
    fn test_range_integer_and_else() {
        assert_eq!(ok("{{range 3}}{{.}}{{end}}", serde_json::json!({})), "012");
        assert_eq!(
            ok("{{range .items}}x{{else}}empty{{end}}", serde_json::json!({"items": []})),
            "empty"
        );
    }

    #[test]
    fn test_range_break_and_continue() {
        let source = "{{range .}}{{if eq . 2}}{{continue}}{{end}}{{if eq . 4}}{{break}}{{end}}{{.}}{{end}}";
        assert_eq!(ok(source, serde_json::json!([1, 2, 3, 4, 5])), "13");
    }

    #[test]
    fn test_range_breaks_early_over_huge_integer() {
        let source = "{{range $i := .n}}{{if eq $i 2}}{{break}}{{end}}{{$i}}{{end}}";
        assert_eq!(ok(source, serde_json::json!({"n": 1e11})), "01");
        assert_eq!(ok(source, serde_json::json!({"n": 1e300})), "01");
    }

    #[test]
    fn test_range_over_fraction_fails() {
        let err = render("{{range .}}{{end}}", serde_json::json!(1.5)).unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::Range("1.5".to_string()));
    }

    #[test]
    fn test_range_over_string_fails() {
        let err = render("{{range .}}{{end}}", serde_json::json!("abc")).unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::Range("string".to_string()));
    }

    #[test]
    fn test_variables_and_assignment() {
        let source = "{{$n := 0}}{{range .}}{{$n = .}}{{end}}{{$n}}";
        assert_eq!(ok(source, serde_json::json!([1, 2, 3])), "3");
        assert_eq!(
            ok("{{range .items}}{{$.title}}{{end}}", serde_json::json!({"title": "T", "items": [1, 2]})),
            "TT"
        );
    }

    #[test]
    fn test_pipes_pass_last_argument() {
        assert_eq!(
            ok(r#"{{"world" | printf "hello %s"}}"#, serde_json::json!({})),
            "hello world"
        );
        assert_eq!(ok("{{.items | len}}", serde_json::json!({"items": [1, 2]})), "2");
    }

    #[test]
    fn test_and_or_short_circuit() {
        // the second operand would fail if evaluated
        assert_eq!(ok("{{or .a (index .missing 0)}}", serde_json::json!({"a": "yes"})), "yes");
        assert_eq!(ok("{{and .a (index .missing 0)}}", serde_json::json!({"a": 0})), "0");
        assert!(render("{{and 1 (index .missing 0)}}", serde_json::json!({})).is_err());
    }

    #[test]
    fn test_date_function() {
        assert_eq!(
            ok(r#"{{date .created "%d/%m/%Y"}}"#, serde_json::json!({"created": "2024-02-29"})),
            "29/02/2024"
        );
    }

    #[test]
    fn test_function_misuse_is_error() {
        let err = render(r#"{{date .created}}"#, serde_json::json!({"created": "x"})).unwrap_err();
        assert!(matches!(err.kind, ExecErrorKind::Function(FunctionError::Arity { .. })));
    }

    #[test]
    fn test_template_call_and_define() {
        let set = set_with(
            ExecConfig::default(),
            &[
                ("components", r#"{{define "card"}}<b>{{.}}</b>{{end}}"#),
                ("page", r#"{{range .}}{{template "card" .}}{{end}}{{template "card"}}"#),
            ],
        );
        let data = Value::from(serde_json::json!(["a", "b"]));
        assert_eq!(set.execute("page", &data).unwrap(), "<b>a</b><b>b</b><b></b>");
    }

    #[test]
    fn test_unknown_template_call() {
        let err = render(r#"{{template "nowhere" .}}"#, serde_json::json!({})).unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::UnknownTemplate("nowhere".to_string()));
        assert_eq!(err.template, "t");
    }

    #[test]
    fn test_unknown_top_level_template() {
        let set = set_with(ExecConfig::default(), &[]);
        let err = set.execute("nope", &Value::Null).unwrap_err();
        assert_eq!(err.line, None);
        assert_eq!(err.to_string(), "template nope: no such template \"nope\"");
    }

    #[test]
    fn test_recursion_limit() {
        let set = set_with(
            ExecConfig::new().with_max_depth(5),
            &[("loop", r#"{{define "r"}}x{{template "r" .}}{{end}}{{template "r" .}}"#)],
        );
        let err = set.execute("loop", &Value::Null).unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::DepthExceeded(5));
    }

    #[test]
    fn test_nested_control_structures_count_toward_depth() {
        let source = "{{if true}}{{with 1}}{{range 1}}{{if true}}x{{end}}{{end}}{{end}}{{end}}";
        let set = set_with(ExecConfig::new().with_max_depth(3), &[("t", source)]);
        let err = set.execute("t", &Value::Null).unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::DepthExceeded(3));

        let set = set_with(ExecConfig::new().with_max_depth(4), &[("t", source)]);
        assert_eq!(set.execute("t", &Value::Null).unwrap(), "x");
    }

    #[test]
    fn test_default_depth_limit_fits_small_stack() {
        let sources = [
            r#"{{define "r"}}{{if true}}{{with 1}}{{range 1}}{{template "r" .}}{{end}}{{end}}{{end}}{{end}}{{template "r" .}}"#,
            r#"{{define "r"}}{{template "r" .}}{{end}}{{template "r" .}}"#,
        ];
        for source in sources {
            let set = set_with(ExecConfig::default(), &[("t", source)]);
            let result = std::thread::Builder::new()
                .stack_size(2 * 1024 * 1024)
                .spawn(move || set.execute("t", &Value::Null))
                .unwrap()
                .join()
                .unwrap();
            assert_eq!(
                result.unwrap_err().kind,
                ExecErrorKind::DepthExceeded(crate::renderer::DEFAULT_MAX_DEPTH)
            );
        }
    }

    #[test]
    fn test_bounded_recursion_succeeds() {
        let source = r#"{{define "count"}}{{if .}}{{len .}}{{template "count" slice . 1}}{{end}}{{end}}{{template "count" .}}"#;
        assert_eq!(ok(source, serde_json::json!([1, 2, 3])), "321");
    }

    #[test]
    fn test_variables_do_not_leak_into_called_template() {
        let set = set_with(
            ExecConfig::default(),
            &[("t", r#"{{define "inner"}}{{$}}{{end}}{{$x := 1}}{{template "inner" "dot"}}"#)],
        );
        assert_eq!(set.execute("t", &Value::Null).unwrap(), "dot");
    }
}
