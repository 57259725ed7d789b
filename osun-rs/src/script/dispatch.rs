//! Dynamic call dispatch: resolve a dotted path to a [`Callable`], marshal
//! the evaluated arguments against its [`Signature`](super::symbols::Signature),
//! and invoke it.
//!
//! Resolution is at most two levels deep (`name` or `namespace.name`).  The
//! first segment is looked up in the symbol table; if it is not a symbol, a
//! variable holding a namespace or function value is accepted instead (this
//! is how host handles such as `server` are reached).
//!
//! Invocation is best-effort: an arity mismatch is a warning and the call
//! still happens; a type mismatch or a failing/panicking host function is
//! returned as an outcome, never propagated as a panic.

use std::panic::{catch_unwind, AssertUnwindSafe};

use super::error::ScriptError;
use super::expr::EvalContext;
use super::symbols::{Callable, Symbol, SymbolTable};
use super::value::Value;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not a function: {0}")]
    NotCallable(String),
    #[error("path too deep: {0}")]
    PathTooDeep(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl From<DispatchError> for ScriptError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::NotFound(p) => ScriptError::NotFound(p),
            DispatchError::NotCallable(p) => ScriptError::NotCallable(p),
            DispatchError::PathTooDeep(p) => ScriptError::PathTooDeep(p),
            DispatchError::InvalidPath(p) => ScriptError::Syntax(format!("invalid function path `{p}`")),
        }
    }
}

/// Supplied argument count differs from the callable's signature.
#[derive(Debug, Clone, PartialEq)]
pub struct ArityMismatch {
    pub expected: String,
    pub got: usize,
}

/// Result of invoking a resolved callable.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Ok(Value),
    /// The call ran despite a wrong argument count.
    ArityWarning { mismatch: ArityMismatch, value: Value },
    /// An argument could not be coerced to the parameter type; the host
    /// function did not run.
    TypeError {
        mismatch: Option<ArityMismatch>,
        reason: String,
    },
    /// The host function ran and reported failure (or panicked).
    Failed {
        mismatch: Option<ArityMismatch>,
        reason: String,
    },
}

impl CallOutcome {
    pub fn value(&self) -> Option<&Value> {
        match self {
            CallOutcome::Ok(v) | CallOutcome::ArityWarning { value: v, .. } => Some(v),
            _ => None,
        }
    }

    pub fn arity_mismatch(&self) -> Option<&ArityMismatch> {
        match self {
            CallOutcome::Ok(_) => None,
            CallOutcome::ArityWarning { mismatch, .. } => Some(mismatch),
            CallOutcome::TypeError { mismatch, .. } | CallOutcome::Failed { mismatch, .. } => {
                mismatch.as_ref()
            }
        }
    }
}

/// Resolve `path` against the symbol table (and, for handles, variables).
pub fn resolve(
    symbols: &SymbolTable,
    path: &str,
    vars: &dyn EvalContext,
) -> Result<Callable, DispatchError> {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(DispatchError::InvalidPath(path.to_owned()));
    }
    match parts.as_slice() {
        [name] => match symbols.get(name) {
            Some(Symbol::Callable(f)) => Ok(f.clone()),
            Some(Symbol::Namespace(_)) => Err(DispatchError::NotCallable(path.to_owned())),
            None => match vars.get_var(name) {
                Some(Value::Func(f)) => Ok(f),
                Some(_) => Err(DispatchError::NotCallable(path.to_owned())),
                None => Err(DispatchError::NotFound(path.to_owned())),
            },
        },
        [group, member] => {
            let found = match symbols.get(group) {
                Some(Symbol::Namespace(ns)) => ns.get(member).cloned(),
                Some(Symbol::Callable(_)) => None,
                None => match vars.get_var(group) {
                    Some(Value::Namespace(ns)) => ns.get(member).cloned(),
                    _ => None,
                },
            };
            found.ok_or_else(|| DispatchError::NotFound(path.to_owned()))
        }
        _ => Err(DispatchError::PathTooDeep(path.to_owned())),
    }
}

/// Marshal `args` against `f`'s signature and invoke it.
pub fn invoke(f: &Callable, args: Vec<Value>) -> CallOutcome {
    let sig = f.signature();
    let mismatch = (!sig.accepts(args.len())).then(|| ArityMismatch {
        expected: sig.arity(),
        got: args.len(),
    });

    let args = match sig.marshal(args) {
        Ok(a) => a,
        Err(reason) => return CallOutcome::TypeError { mismatch, reason },
    };

    let result = catch_unwind(AssertUnwindSafe(|| f.call(args)))
        .unwrap_or_else(|payload| Err(panic_message(payload.as_ref())));

    match (result, mismatch) {
        (Ok(value), None) => CallOutcome::Ok(value),
        (Ok(value), Some(mismatch)) => CallOutcome::ArityWarning { mismatch, value },
        (Err(reason), mismatch) => CallOutcome::Failed { mismatch, reason },
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_owned()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
