//! Script error taxonomy and console diagnostics.
//!
//! No script error is fatal: every failure is turned into a [`Diagnostic`],
//! reported, and execution resumes at the next statement.

use std::fmt;

/// Broad class of a [`ScriptError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A statement does not match any recognised shape.
    SyntaxShape,
    /// A variable or symbol path could not be resolved.
    NameResolution,
    /// Wrong argument count or type at a call boundary.
    ArityOrType,
    /// Unbalanced braces.
    MalformedBlock,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not a function: {0}")]
    NotCallable(String),

    #[error("unsupported path `{0}` (expected `name` or `namespace.name`)")]
    PathTooDeep(String),

    #[error("argument mismatch for {name}: expected {expected}, got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("type error in {name}: {reason}")]
    Type { name: String, reason: String },

    #[error("runtime error in {name}: {reason}")]
    Runtime { name: String, reason: String },

    #[error("block opened on line {0} is never closed")]
    UnclosedBlock(usize),

    #[error("blocks nested more than {0} levels deep; block skipped")]
    NestedTooDeep(usize),
}

impl ScriptError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScriptError::UnknownCommand(_) | ScriptError::Syntax(_) => ErrorKind::SyntaxShape,
            ScriptError::NotFound(_)
            | ScriptError::NotCallable(_)
            | ScriptError::PathTooDeep(_) => ErrorKind::NameResolution,
            ScriptError::Arity { .. } | ScriptError::Type { .. } | ScriptError::Runtime { .. } => {
                ErrorKind::ArityOrType
            }
            ScriptError::UnclosedBlock(_) | ScriptError::NestedTooDeep(_) => {
                ErrorKind::MalformedBlock
            }
        }
    }

    /// Arity mismatches and unclosed blocks are reported as warnings; the
    /// statement still runs.
    pub fn severity(&self) -> Severity {
        match self {
            ScriptError::Arity { .. } | ScriptError::UnclosedBlock(_) => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A reported failure, tied to the source line of the statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub line: usize,
    pub severity: Severity,
    pub error: ScriptError,
}

impl Diagnostic {
    pub fn new(line: usize, error: ScriptError) -> Self {
        Self {
            line,
            severity: error.severity(),
            error,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Warning => write!(f, "% line {}: warning: {}", self.line, self.error),
            Severity::Error => write!(f, "% line {}: {}", self.line, self.error),
        }
    }
}
