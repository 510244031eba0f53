//! Dynamically typed values used as template data
//!
//! Request payloads are decoded from JSON into [`Value`], a closed set of
//! variants the executor can inspect for field lookup, iteration and
//! printing. Lists and maps are reference counted so that handing a value to
//! a nested scope never deep-copies it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Key-ordered map of values
pub type Map = BTreeMap<String, Value>;

/// A template value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Arc<Vec<Value>>),
    Map(Arc<Map>),
}

impl Value {
    /// Name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "nil",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Template truth: false, 0, nil and empty strings, lists and maps are false
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The number as an integer, if it has no fractional part
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn list(values: Vec<Value>) -> Self {
        Value::List(Arc::new(values))
    }

    pub fn map(entries: Map) -> Self {
        Value::Map(Arc::new(entries))
    }

    /// Text written to the output for a `{{pipeline}}` action
    ///
    /// Missing values print as nothing; everything else uses the
    /// [`Display`](fmt::Display) form.
    pub fn to_output(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Format a number the way Go's `%v` does for a `float64`
///
/// Shortest round-trip digits, switching to exponent form when the decimal
/// exponent is below -4 or at least 6 (`1e+06`, `1.5e-05`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let scientific = format!("{:e}", n);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return scientific;
    };
    if (-4..6).contains(&exponent) {
        return format!("{}", n);
    }
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{}e{}{:02}", mantissa, sign, exponent.abs())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "<nil>"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "map[")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}:{}", key, value)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::list(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Errors decoding a request payload
#[derive(Debug, Error)]
pub enum InputError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload must be a JSON object, got {kind}")]
    NotAnObject { kind: &'static str },
}

/// Key under which localized messages are injected
pub const MESSAGES_KEY: &str = "Messages";

/// Key holding the requested language code
pub const LANG_KEY: &str = "lang";

/// Per-request data passed to template execution
///
/// Built from the request payload, mutated once to inject messages and then
/// consumed by [`RenderContext::into_value`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderContext {
    entries: Map,
}

impl RenderContext {
    /// Decode a JSON object payload
    pub fn from_json(data: &[u8]) -> Result<Self, InputError> {
        let json: serde_json::Value = serde_json::from_slice(data)?;
        match Value::from(json) {
            Value::Map(entries) => Ok(Self {
                entries: Arc::unwrap_or_clone(entries),
            }),
            other => Err(InputError::NotAnObject { kind: other.kind() }),
        }
    }

    /// The requested language; empty when absent or not a string
    pub fn lang(&self) -> &str {
        self.entries
            .get(LANG_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Set the `Messages` entry, replacing any value sent by the caller
    pub fn set_messages(&mut self, messages: Value) {
        self.entries.insert(MESSAGES_KEY.to_string(), messages);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn into_value(self) -> Value {
        Value::map(self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn json(s: &str) -> Value {
        Value::from(serde_json::from_str::<serde_json::Value>(s).unwrap())
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!json("[]").is_truthy());
        assert!(!json("{}").is_truthy());
        assert!(Value::Number(-1.0).is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(json("[0]").is_truthy());
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-2.0), "-2");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(0.0001), "0.0001");
        assert_eq!(format_number(0.00001), "1e-05");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(999999.0), "999999");
        assert_eq!(format_number(1000000.0), "1e+06");
        assert_eq!(format_number(123456789.0), "1.23456789e+08");
        assert_eq!(format_number(-2.5e-7), "-2.5e-07");
    }

    #[test]
    fn test_display_collections() {
        assert_eq!(json(r#"[1, "a", null]"#).to_string(), "[1 a <nil>]");
        assert_eq!(json(r#"{"b": 2, "a": true}"#).to_string(), "map[a:true b:2]");
    }

    #[test]
    fn test_output_of_null_is_empty() {
        assert_eq!(Value::Null.to_output(), "");
        assert_eq!(Value::from("x").to_output(), "x");
    }

    #[test]
    fn test_context_from_object() {
        let ctx = RenderContext::from_json(br#"{"lang": "en", "title": "Hi"}"#).unwrap();
        assert_eq!(ctx.lang(), "en");
        assert_eq!(ctx.get("title"), Some(&Value::from("Hi")));
    }

    #[test]
    fn test_context_lang_missing_or_not_string() {
        let ctx = RenderContext::from_json(br#"{"title": "Hi"}"#).unwrap();
        assert_eq!(ctx.lang(), "");
        let ctx = RenderContext::from_json(br#"{"lang": 42}"#).unwrap();
        assert_eq!(ctx.lang(), "");
    }

    #[test]
    fn test_context_rejects_invalid_json() {
        let err = RenderContext::from_json(b"not-json").unwrap_err();
        assert!(matches!(err, InputError::Json(_)));
    }

    #[test]
    fn test_context_rejects_non_object() {
        let err = RenderContext::from_json(b"[1, 2]").unwrap_err();
        assert!(matches!(err, InputError::NotAnObject { kind: "list" }));
    }

    #[test]
    fn test_set_messages_overwrites() {
        let mut ctx = RenderContext::from_json(br#"{"Messages": "spoofed"}"#).unwrap();
        ctx.set_messages(Value::map(Map::new()));
        assert_eq!(ctx.get(MESSAGES_KEY), Some(&Value::map(Map::new())));
    }
}
