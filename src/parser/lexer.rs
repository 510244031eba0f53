//! Lexer for the template language
//!
//! Template source is split into raw text and `{{ ... }}` actions by a small
//! scanner; the inside of every action is tokenized with logos.

use logos::Logos;

use crate::error::ParseError;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// Tokens that may appear inside an action
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum Token {
    // Control keywords
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("end")]
    End,
    #[token("range")]
    Range,
    #[token("with")]
    With,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,

    // Composition keywords
    #[token("define")]
    Define,
    #[token("template")]
    Template,
    #[token("block")]
    Block,

    // Constants
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("nil")]
    Nil,

    // Operators and delimiters
    #[token("|")]
    Pipe,
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token(",")]
    Comma,
    #[token(":=")]
    Declare,
    #[token("=")]
    Assign,
    #[token(".")]
    Dot,

    /// Field chain relative to dot: `.user.name`
    #[regex(r"(\.[a-zA-Z_][a-zA-Z0-9_]*)+", |lex| field_names(lex.slice()))]
    Field(Vec<String>),

    /// Variable with an optional field chain: `$`, `$item`, `$item.name`
    #[regex(r"\$[a-zA-Z0-9_]*(\.[a-zA-Z_][a-zA-Z0-9_]*)*", |lex| variable(lex.slice()))]
    Variable(VarRef),

    // Function names must come after keywords
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unquote(lex.slice()))]
    #[regex(r"`[^`]*`", |lex| {
        let s = lex.slice();
        s[1..s.len()-1].to_string()
    })]
    String(String),

    #[regex(r"-?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),
}

/// A variable reference; the root variable `$` has an empty name
#[derive(Debug, Clone, PartialEq)]
pub struct VarRef {
    pub name: String,
    pub fields: Vec<String>,
}

impl VarRef {
    pub fn new(name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }
}

/// A lexical item of a whole template: raw text, action delimiters, or a
/// token from inside an action.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Text(String),
    /// `{{` (with or without trim marker)
    Open,
    /// `}}` (with or without trim marker)
    Close,
    Token(Token),
}

fn field_names(slice: &str) -> Vec<String> {
    slice
        .split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn variable(slice: &str) -> VarRef {
    let mut parts = slice[1..].split('.');
    let name = parts.next().unwrap_or_default().to_string();
    VarRef::new(name, parts.map(str::to_string).collect())
}

/// Resolve escape sequences in a double-quoted string literal
fn unquote(slice: &str) -> Option<String> {
    let inner = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                if hex.len() != 4 {
                    return None;
                }
                out.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
            }
            _ => return None,
        }
    }
    Some(out)
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// Split template source into items with spans
///
/// Handles `{{- ` / ` -}}` trim markers and drops `{{/* ... */}}` comments.
pub fn scan(input: &str) -> Result<Vec<(Item, Span)>, ParseError> {
    let mut items = Vec::new();
    let mut pos = 0;
    let mut trim_next = false;

    loop {
        let Some(found) = input[pos..].find("{{") else {
            push_text(&mut items, &input[pos..], pos, trim_next, false);
            break;
        };
        let open = pos + found;
        let rest = &input[open + 2..];
        let trim_left = rest.starts_with('-') && rest[1..].starts_with(is_space);
        push_text(&mut items, &input[pos..open], pos, trim_next, trim_left);

        let mut content_start = open + 2;
        if trim_left {
            content_start += 1;
        }

        // Comments must directly follow the opening delimiter
        let after_trim = &input[content_start..];
        let comment_start =
            content_start + (after_trim.len() - after_trim.trim_start_matches(is_space).len());
        if input[comment_start..].starts_with("/*") {
            let Some(end) = input[comment_start + 2..].find("*/") else {
                return Err(ParseError::syntax(open..input.len(), "unclosed comment"));
            };
            let after = comment_start + 2 + end + 2;
            let tail = &input[after..];
            let spaces = tail.len() - tail.trim_start_matches(is_space).len();
            if tail.starts_with("}}") {
                trim_next = false;
                pos = after + 2;
            } else if spaces > 0 && tail[spaces..].starts_with("-}}") {
                trim_next = true;
                pos = after + spaces + 3;
            } else {
                return Err(ParseError::syntax(
                    open..after,
                    "comment ends before closing delimiter",
                ));
            }
            continue;
        }

        let close = find_close(input, content_start)
            .ok_or_else(|| ParseError::syntax(open..input.len(), "unclosed action"))?;
        let mut content_end = close;
        trim_next = false;
        let body = &input[content_start..close];
        if body.ends_with('-') && body[..body.len() - 1].ends_with(is_space) {
            content_end -= 1;
            trim_next = true;
        }

        items.push((Item::Open, open..content_start));
        for (token, span) in Token::lexer(&input[content_start..content_end]).spanned() {
            let span = span.start + content_start..span.end + content_start;
            match token {
                Ok(token) => items.push((Item::Token(token), span)),
                Err(()) => {
                    let found = &input[span.clone()];
                    return Err(ParseError::syntax(
                        span,
                        format!("unexpected {:?} in action", found),
                    ));
                }
            }
        }
        items.push((Item::Close, close..close + 2));
        pos = close + 2;
    }

    Ok(items)
}

fn push_text(
    items: &mut Vec<(Item, Span)>,
    text: &str,
    offset: usize,
    trim_start: bool,
    trim_end: bool,
) {
    let mut start = offset;
    let mut text = text;
    if trim_start {
        let trimmed = text.trim_start_matches(is_space);
        start += text.len() - trimmed.len();
        text = trimmed;
    }
    if trim_end {
        text = text.trim_end_matches(is_space);
    }
    if !text.is_empty() {
        items.push((Item::Text(text.to_string()), start..start + text.len()));
    }
}

/// Find the `}}` closing an action, skipping over string literals
fn find_close(input: &str, from: usize) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'`' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'`' {
                    i += 1;
                }
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}
