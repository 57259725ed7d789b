//! Runtime value type for Osun scripts.
//!
//! Script syntax only ever produces strings, numbers and nil.  Booleans,
//! callables and namespaces enter the value space through the host (seeded
//! variables and call results).

use std::fmt;
use std::sync::Arc;

use super::symbols::{Callable, Namespace};

/// Text printed for [`Value::Nil`].
pub const NIL_TEXT: &str = "<nil>";

/// An Osun script runtime value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Num(f64),
    Str(String),
    Bool(bool),
    Func(Callable),
    Namespace(Arc<Namespace>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str(NIL_TEXT),
            Value::Num(x) => f.write_str(&format_number(*x)),
            Value::Str(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Func(c) => write!(f, "<fn {}>", c.name()),
            Value::Namespace(ns) => write!(f, "<namespace {}>", ns.name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("Nil"),
            Value::Num(x) => write!(f, "Num({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Func(c) => write!(f, "Func({})", c.name()),
            Value::Namespace(ns) => write!(f, "Namespace({})", ns.name()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Func(a), Value::Func(b)) => a.ptr_eq(b),
            (Value::Namespace(a), Value::Namespace(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Render a number for output: integral values print without a fractional
/// part (`4`, not `4.0`), everything else uses the shortest round-trip form.
pub fn format_number(x: f64) -> String {
    if x == 0.0 {
        // Also folds -0.0.
        return "0".to_owned();
    }
    if x.fract() == 0.0 && x.abs() < 9.0e15 {
        format!("{}", x as i64)
    } else {
        format!("{x}")
    }
}

impl Value {
    /// Numeric view used by comparisons: numbers as-is, strings that parse
    /// as a float literal, nothing else.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Num(x) => Some(*x),
            Value::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Truthiness: booleans pass through, numbers are truthy iff nonzero,
    /// strings iff non-empty; nil, callables and namespaces are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Num(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            _ => false,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Name of the type, used in type-mismatch diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Func(_) => "function",
            Value::Namespace(_) => "namespace",
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Num(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Callable> for Value {
    fn from(c: Callable) -> Self {
        Value::Func(c)
    }
}

impl From<Namespace> for Value {
    fn from(ns: Namespace) -> Self {
        Value::Namespace(Arc::new(ns))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
