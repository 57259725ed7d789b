//! The osun scripting language.
//!
//! A script is a sequence of line-oriented statements:
//!
//! - `let NAME = EXPR` binds a variable
//! - `print(EXPR)` writes one line of output
//! - `if COND { ... } else { ... }` branches (`else if` chains are allowed)
//! - `path(args...)` calls a registered host function, where `path` is
//!   `name` or `namespace.name`; a `{ ... }` block directly after the call
//!   is passed as a trailing handler argument
//!
//! Expressions are string literals, bare words (variables, numbers, or
//! literal text) and `+` concatenation.  Failures never stop a run; each
//! one is reported as a [`Diagnostic`] against its source line.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use osun::script::{Interpreter, SymbolTable};
//!
//! let mut interp = Interpreter::new(Arc::new(SymbolTable::new())).buffered();
//! interp.run("let x = 6\nprint(\"x is \" + x)");
//! assert_eq!(interp.output(), ["x is 6"]);
//! ```

pub mod cond;
pub mod dispatch;
pub mod error;
pub mod expr;
pub mod interp;
pub mod stmt;
pub mod symbols;
pub mod value;

pub use dispatch::{CallOutcome, DispatchError};
pub use error::{Diagnostic, ErrorKind, ScriptError, Severity};
pub use expr::EvalContext;
pub use interp::{Bindings, Interpreter, RunSummary, ScriptBlock};
pub use symbols::{Callable, Namespace, ParamType, Signature, SymbolTable};
pub use value::Value;
