//! Runtime values of the calculus.
//!
//! Values are plain data: they compare structurally, serialize losslessly
//! (including non-finite numbers when a binary codec is used) and can be
//! shared between devices once published.

use std::{cmp::Ordering, collections::BTreeMap, fmt, sync::Arc};
use serde::{Deserialize, Serialize};

use crate::ast::{Expr, Lambda};
use crate::builtins::Builtin;
use crate::error::ErrorKind;
use crate::path::CodeId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Unit,
    Bool(bool),
    Number(f64),
    Text(String),
    Tuple(Vec<Value>),
    Function(Function),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Function {
    Builtin(Builtin),
    Closure(Closure),
}

/// A lambda paired with the bindings visible where it was created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Closure {
    pub code: CodeId,
    pub params: Vec<String>,
    pub body: Arc<Expr>,
    pub env: Env,
}

impl Closure {
    pub fn capture(lambda: &Lambda, env: Env) -> Self {
        Self { code: lambda.code.clone(), params: lambda.params.clone(), body: lambda.body.clone(), env }
    }
}

// Code identity stands in for the body; two closures are equal when they run
// the same code over equal captured bindings.
impl PartialEq for Closure {
    fn eq(&self, other: &Self) -> bool { self.code == other.code && self.env == other.env }
}

/// Persistent variable bindings. Extending produces a new environment and
/// leaves the original untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Env(Arc<BTreeMap<String, Value>>);

impl Env {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, name: &str) -> Option<&Value> { self.0.get(name) }

    pub fn with(&self, name: impl Into<String>, value: Value) -> Self {
        let mut map = (*self.0).clone();
        map.insert(name.into(), value);
        Self(Arc::new(map))
    }

    pub fn extend<I>(&self, bindings: I) -> Self
    where I: IntoIterator<Item = (String, Value)> {
        let mut map = (*self.0).clone();
        map.extend(bindings);
        Self(Arc::new(map))
    }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Tuple(_) => "tuple",
            Value::Function(_) => "function",
        }
    }

    pub fn as_bool(&self) -> Result<bool, ErrorKind> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(ErrorKind::mismatch("bool", other)),
        }
    }

    pub fn as_number(&self) -> Result<f64, ErrorKind> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(ErrorKind::mismatch("number", other)),
        }
    }

    pub fn as_text(&self) -> Result<&str, ErrorKind> {
        match self {
            Value::Text(t) => Ok(t),
            other => Err(ErrorKind::mismatch("text", other)),
        }
    }

    pub fn as_tuple(&self) -> Result<&[Value], ErrorKind> {
        match self {
            Value::Tuple(items) => Ok(items),
            other => Err(ErrorKind::mismatch("tuple", other)),
        }
    }

    /// Total order over comparable variants. Tuples compare lexicographically,
    /// numbers by IEEE total order so infinities sort as expected.
    pub fn compare(&self, other: &Value) -> Result<Ordering, ErrorKind> {
        match (self, other) {
            (Value::Unit, Value::Unit) => Ok(Ordering::Equal),
            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            (Value::Number(a), Value::Number(b)) => Ok(a.total_cmp(b)),
            (Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
            (Value::Tuple(a), Value::Tuple(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        unequal => return Ok(unequal),
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            (Value::Function(_), _) => Err(ErrorKind::mismatch("comparable value", self)),
            (_, found) => Err(ErrorKind::TypeMismatch { expected: self.type_name(), found: found.type_name() }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(t) => write!(f, "{t:?}"),
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Value::Function(Function::Builtin(b)) => write!(f, "<builtin {}>", b.name()),
            Value::Function(Function::Closure(c)) => write!(f, "<closure {}>", c.code),
        }
    }
}

impl From<f64> for Value { fn from(n: f64) -> Self { Value::Number(n) } }
impl From<i32> for Value { fn from(n: i32) -> Self { Value::Number(n as f64) } }
impl From<bool> for Value { fn from(b: bool) -> Self { Value::Bool(b) } }
impl From<&str> for Value { fn from(s: &str) -> Self { Value::Text(s.to_string()) } }
impl From<String> for Value { fn from(s: String) -> Self { Value::Text(s) } }
impl From<()> for Value { fn from(_: ()) -> Self { Value::Unit } }
impl From<Builtin> for Value { fn from(b: Builtin) -> Self { Value::Function(Function::Builtin(b)) } }
