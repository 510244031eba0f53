//! Named functions callable from template bodies
//!
//! A [`FunctionRegistry`] is assembled once before any template is compiled.
//! Template validation rejects calls to names that are not registered, and
//! execution looks functions up by name. Every function is a pure mapping
//! from its evaluated arguments to a value, so the registry is shared freely
//! between threads.

mod builtin;
mod date;
pub mod format;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::value::Value;

pub use date::{DateFormatter, DEFAULT_DATE_FORMAT};

/// Errors raised by function calls
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FunctionError {
    #[error("wrong number of arguments for {name}: expected {expected}, got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("wrong type for argument {index} of {name}: expected {expected}, got {got}")]
    ArgumentType {
        name: String,
        index: usize,
        expected: &'static str,
        got: &'static str,
    },

    #[error("error calling {name}: {message}")]
    Failed { name: String, message: String },
}

/// Signature of a native function
pub type NativeFn = dyn Fn(Args<'_>) -> Result<Value, FunctionError> + Send + Sync;

/// Short-circuiting operators; their operands are evaluated lazily
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

impl LogicOp {
    /// Whether `value` ends evaluation: the first false operand for `and`,
    /// the first true one for `or`
    pub fn decides(self, value: &Value) -> bool {
        match self {
            LogicOp::And => !value.is_truthy(),
            LogicOp::Or => value.is_truthy(),
        }
    }
}

/// A registered function
#[derive(Clone)]
pub enum Function {
    Logic(LogicOp),
    Native(Arc<NativeFn>),
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Logic(op) => write!(f, "Logic({:?})", op),
            Function::Native(_) => write!(f, "Native(..)"),
        }
    }
}

/// Evaluated arguments of a call, with checked accessors
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    name: &'a str,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    pub fn new(name: &'a str, values: &'a [Value]) -> Self {
        Self { name, values }
    }

    /// Name the function was called under
    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }

    pub fn get(&self, index: usize) -> Option<&'a Value> {
        self.values.get(index)
    }

    /// Require exactly `count` arguments
    pub fn expect_count(&self, count: usize) -> Result<(), FunctionError> {
        if self.values.len() == count {
            Ok(())
        } else {
            Err(self.arity(count.to_string()))
        }
    }

    /// Require at least `min` arguments
    pub fn expect_at_least(&self, min: usize) -> Result<(), FunctionError> {
        if self.values.len() >= min {
            Ok(())
        } else {
            Err(self.arity(format!("at least {}", min)))
        }
    }

    /// Require between `min` and `max` arguments inclusive
    pub fn expect_between(&self, min: usize, max: usize) -> Result<(), FunctionError> {
        if (min..=max).contains(&self.values.len()) {
            Ok(())
        } else {
            Err(self.arity(format!("{} to {}", min, max)))
        }
    }

    /// Argument `index` as a string
    pub fn str(&self, index: usize) -> Result<&'a str, FunctionError> {
        match self.values.get(index) {
            Some(Value::String(s)) => Ok(s),
            other => Err(self.type_error(index, "string", other)),
        }
    }

    /// Argument `index` as an integer
    pub fn integer(&self, index: usize) -> Result<i64, FunctionError> {
        let value = self.values.get(index);
        match value.and_then(Value::as_integer) {
            Some(n) => Ok(n),
            None => Err(self.type_error(index, "integer", value)),
        }
    }

    pub fn type_error(
        &self,
        index: usize,
        expected: &'static str,
        got: Option<&Value>,
    ) -> FunctionError {
        FunctionError::ArgumentType {
            name: self.name.to_string(),
            index,
            expected,
            got: got.map(Value::kind).unwrap_or("nothing"),
        }
    }

    pub fn failed(&self, message: impl Into<String>) -> FunctionError {
        FunctionError::Failed {
            name: self.name.to_string(),
            message: message.into(),
        }
    }

    fn arity(&self, expected: String) -> FunctionError {
        FunctionError::Arity {
            name: self.name.to_string(),
            expected,
            got: self.values.len(),
        }
    }
}

/// Mapping from function name to implementation
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, Function>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.functions.keys()).finish()
    }
}

impl FunctionRegistry {
    /// Create a registry without any functions
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in functions
    pub fn new() -> Self {
        let mut registry = Self::empty();
        builtin::register(&mut registry);
        registry
    }

    /// Register a function, replacing any previous one of the same name
    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(Args<'_>) -> Result<Value, FunctionError> + Send + Sync + 'static,
    {
        self.functions
            .insert(name.into(), Function::Native(Arc::new(function)));
    }

    pub(crate) fn register_logic(&mut self, name: &str, op: LogicOp) {
        self.functions.insert(name.to_string(), Function::Logic(op));
    }

    /// Add a function, builder style
    pub fn with_function<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(Args<'_>) -> Result<Value, FunctionError> + Send + Sync + 'static,
    {
        self.register(name, function);
        self
    }

    /// Register `date`, converting values written in `source_format`
    pub fn with_date_format(self, source_format: impl Into<String>) -> Self {
        let formatter = DateFormatter::new(source_format);
        self.with_function("date", move |args| formatter.call(args))
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Call a native function by name with evaluated arguments
    ///
    /// `and` and `or` take unevaluated operands and are run by the executor
    /// itself, so they cannot be called here.
    pub fn call(&self, name: &str, values: &[Value]) -> Result<Value, FunctionError> {
        let args = Args::new(name, values);
        match self.functions.get(name) {
            Some(Function::Native(f)) => f(args),
            Some(Function::Logic(_)) => Err(args.failed("needs unevaluated operands")),
            None => Err(args.failed("function not defined")),
        }
    }
}
