//! Abstract Syntax Tree types for the template language

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// AST node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// A parsed template file: its top-level body plus every `{{define}}` in it
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub body: Vec<Spanned<Node>>,
    pub definitions: Vec<Definition>,
}

/// `{{define "name"}} ... {{end}}`
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub name: Spanned<String>,
    pub body: Vec<Spanned<Node>>,
}

/// A node of a template body
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Raw text copied to the output
    Text(String),
    /// `{{pipeline}}`; prints unless the pipeline declares variables
    Action(Pipeline),
    /// `{{if}} ... {{else if}} ... {{else}} ... {{end}}`
    If(Branch),
    /// `{{range}} ... {{else}} ... {{end}}`
    Range(Branch),
    /// `{{with}} ... {{else}} ... {{end}}`
    With(Branch),
    /// `{{template "name" pipeline}}`
    Template(TemplateCall),
    /// `{{block "name" pipeline}} ... {{end}}`
    Block(BlockDecl),
    /// `{{break}}`
    Break,
    /// `{{continue}}`
    Continue,
}

/// A control structure: pipeline, body and optional else body
///
/// `else if` / `else with` chains are represented as a nested branch that is
/// the only node of `otherwise`.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub pipeline: Pipeline,
    pub body: Vec<Spanned<Node>>,
    pub otherwise: Option<Vec<Spanned<Node>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateCall {
    pub name: Spanned<String>,
    pub pipeline: Option<Pipeline>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockDecl {
    pub name: Spanned<String>,
    pub pipeline: Pipeline,
    pub body: Vec<Spanned<Node>>,
}

/// Commands chained with `|`, optionally preceded by a declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub declaration: Option<Declaration>,
    pub commands: Vec<Spanned<Command>>,
}

/// `$x :=`, `$i, $e :=` or `$x =`
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub variables: Vec<Spanned<String>>,
    pub kind: DeclarationKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    /// `:=` introduces new variables
    Declare,
    /// `=` assigns to existing variables
    Assign,
}

/// A function call or a single operand
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub operands: Vec<Spanned<Operand>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `.`
    Dot,
    /// `.a.b`
    Field(Vec<String>),
    /// `$x.a.b`; the root variable has an empty name
    Variable { name: String, fields: Vec<String> },
    /// A function name
    Function(String),
    String(String),
    Number(f64),
    Bool(bool),
    Nil,
    /// `( pipeline )`
    Pipeline(Box<Pipeline>),
}

impl Operand {
    /// Source-like rendering for error messages
    pub fn describe(&self) -> String {
        match self {
            Operand::Dot => ".".to_string(),
            Operand::Field(fields) => format!(".{}", fields.join(".")),
            Operand::Variable { name, fields } => {
                let mut s = format!("${}", name);
                for field in fields {
                    s.push('.');
                    s.push_str(field);
                }
                s
            }
            Operand::Function(name) => name.clone(),
            Operand::String(s) => format!("{:?}", s),
            Operand::Number(n) => n.to_string(),
            Operand::Bool(b) => b.to_string(),
            Operand::Nil => "nil".to_string(),
            Operand::Pipeline(_) => "(...)".to_string(),
        }
    }
}

/// Whether a body produces nothing but whitespace
///
/// Such bodies never replace another definition of the same name.
pub fn is_blank(body: &[Spanned<Node>]) -> bool {
    body.iter().all(|n| match &n.node {
        Node::Text(text) => text.trim().is_empty(),
        _ => false,
    })
}
