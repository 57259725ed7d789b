//! Osun statement interpreter.
//!
//! The [`Interpreter`] owns the variable scope and executes parsed [`Stmt`]
//! trees against a shared [`SymbolTable`].  It implements [`EvalContext`] so
//! the expression evaluator can read variables.
//!
//! Execution never aborts: each failing statement becomes a [`Diagnostic`]
//! that is written to the console, logged, and kept for inspection, and the
//! next statement runs.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use super::{
    cond::eval_condition,
    dispatch::{self, CallOutcome},
    error::{Diagnostic, ScriptError, Severity},
    expr::{eval, EvalContext},
    stmt::{parse_script, Stmt, StmtKind},
    symbols::{Callable, ParamType, Signature, SymbolTable},
    value::Value,
};

pub type Bindings = HashMap<String, Value>;

// ── Scope ─────────────────────────────────────────────────────────────────────

/// Variables visible to a run: an immutable shared base (seeded globals or
/// a handler's captured snapshot) plus the run's own assignments.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    base: Arc<Bindings>,
    vars: Bindings,
}

impl Scope {
    pub fn new(base: Arc<Bindings>) -> Self {
        Self {
            base,
            vars: Bindings::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name).or_else(|| self.base.get(name))
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Freeze the current bindings for a handler block.
    pub fn snapshot(&self) -> Arc<Bindings> {
        if self.vars.is_empty() {
            return Arc::clone(&self.base);
        }
        let mut all = (*self.base).clone();
        all.extend(self.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        Arc::new(all)
    }
}

// ── Output ────────────────────────────────────────────────────────────────────

/// Where `print` output goes.
#[derive(Debug)]
pub enum Sink {
    /// Console: print output and diagnostics go to stdout as they happen.
    Stdout,
    /// Collected: print output is kept (see [`Interpreter::take_output`]);
    /// diagnostics are kept only in [`Interpreter::diagnostics`].
    Buffer(Vec<String>),
}

/// Counters for one [`Interpreter::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub statements: usize,
    pub errors: usize,
    pub warnings: usize,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.errors == 0 && self.warnings == 0
    }
}

// ── Interpreter ───────────────────────────────────────────────────────────────

pub struct Interpreter {
    symbols: Arc<SymbolTable>,
    scope: Scope,
    sink: Sink,
    strict: bool,
    diagnostics: Vec<Diagnostic>,
    executed: usize,
}

impl Interpreter {
    /// A console interpreter with no seeded variables.
    pub fn new(symbols: Arc<SymbolTable>) -> Self {
        Self::with_globals(symbols, Arc::default())
    }

    pub fn with_globals(symbols: Arc<SymbolTable>, globals: Arc<Bindings>) -> Self {
        Interpreter {
            symbols,
            scope: Scope::new(globals),
            sink: Sink::Stdout,
            strict: false,
            diagnostics: Vec::new(),
            executed: 0,
        }
    }

    /// Collect `print` output instead of writing it to stdout.
    pub fn buffered(mut self) -> Self {
        self.sink = Sink::Buffer(Vec::new());
        self
    }

    /// In strict mode an unresolvable bare word is a name-resolution error
    /// rather than literal text.
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: Value) {
        self.scope.set(name, value);
    }

    pub fn get_var(&self, name: &str) -> Option<&Value> {
        self.scope.get(name)
    }

    pub fn symbols(&self) -> &Arc<SymbolTable> {
        &self.symbols
    }

    /// Lines printed so far (empty for a console interpreter).
    pub fn output(&self) -> &[String] {
        match &self.sink {
            Sink::Stdout => &[],
            Sink::Buffer(lines) => lines,
        }
    }

    pub fn take_output(&mut self) -> Vec<String> {
        match &mut self.sink {
            Sink::Stdout => Vec::new(),
            Sink::Buffer(lines) => std::mem::take(lines),
        }
    }

    /// Every diagnostic reported since the interpreter was created.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    // ── Execution ─────────────────────────────────────────────────────────────

    /// Parse and execute a script.
    pub fn run(&mut self, src: &str) -> RunSummary {
        let stmts = parse_script(src);
        tracing::debug!(statements = stmts.len(), "running script");
        let diag_start = self.diagnostics.len();
        let exec_start = self.executed;
        self.exec_block(&stmts);

        let new = &self.diagnostics[diag_start..];
        let summary = RunSummary {
            statements: self.executed - exec_start,
            errors: new.iter().filter(|d| d.severity == Severity::Error).count(),
            warnings: new.iter().filter(|d| d.severity == Severity::Warning).count(),
        };
        tracing::debug!(?summary, "script finished");
        summary
    }

    pub fn exec_block(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.exec_stmt(stmt);
        }
    }

    /// Execute one statement, reporting (not returning) any failure.
    pub fn exec_stmt(&mut self, stmt: &Stmt) {
        self.executed += 1;
        if let Err(e) = self.try_exec(stmt) {
            self.report(stmt.line, e);
        }
    }

    fn try_exec(&mut self, stmt: &Stmt) -> Result<(), ScriptError> {
        match &stmt.kind {
            StmtKind::Let { name, value } => {
                let v = eval(value, self)?;
                tracing::trace!(line = stmt.line, %name, value = ?v, "let");
                self.scope.set(name.clone(), v);
            }
            StmtKind::Print(expr) => {
                let v = eval(expr, self)?;
                self.emit(v.to_string());
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                if eval_condition(cond, self)? {
                    self.exec_block(then_block);
                } else if let Some(els) = else_block {
                    self.exec_block(els);
                }
            }
            StmtKind::Call { path, args, block } => {
                self.exec_call(stmt.line, path, args, block.as_ref())?;
            }
            StmtKind::Block(stmts) => self.exec_block(stmts),
            StmtKind::Invalid(e) => return Err(e.clone()),
        }
        Ok(())
    }

    fn exec_call(
        &mut self,
        line: usize,
        path: &str,
        args: &[super::expr::Expr],
        block: Option<&Arc<[Stmt]>>,
    ) -> Result<(), ScriptError> {
        let callable = dispatch::resolve(&self.symbols, path, self)?;
        let mut values = args
            .iter()
            .map(|a| eval(a, self))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(body) = block {
            let handler = ScriptBlock::new(
                format!("{path}:{line}"),
                Arc::clone(body),
                Arc::clone(&self.symbols),
                self.scope.snapshot(),
            );
            values.push(Value::Func(Callable::Script(Arc::new(handler))));
        }

        tracing::trace!(line, %path, argc = values.len(), "call");
        let name = callable.name().to_owned();
        let outcome = dispatch::invoke(&callable, values);
        if let Some(m) = outcome.arity_mismatch() {
            self.report(
                line,
                ScriptError::Arity {
                    name: name.clone(),
                    expected: m.expected.clone(),
                    got: m.got,
                },
            );
        }
        match outcome {
            CallOutcome::Ok(_) | CallOutcome::ArityWarning { .. } => Ok(()),
            CallOutcome::TypeError { reason, .. } => Err(ScriptError::Type { name, reason }),
            CallOutcome::Failed { reason, .. } => Err(ScriptError::Runtime { name, reason }),
        }
    }

    fn emit(&mut self, text: String) {
        match &mut self.sink {
            Sink::Stdout => console_line(&text),
            Sink::Buffer(lines) => lines.push(text),
        }
    }

    fn report(&mut self, line: usize, error: ScriptError) {
        let diag = Diagnostic::new(line, error);
        tracing::warn!(line, kind = ?diag.kind(), "{}", diag.error);
        if matches!(self.sink, Sink::Stdout) {
            console_line(&diag.to_string());
        }
        self.diagnostics.push(diag);
    }
}

fn console_line(text: &str) {
    let mut out = std::io::stdout().lock();
    // A closed stdout is not a script error.
    let _ = writeln!(out, "{text}");
}

// ── EvalContext impl ──────────────────────────────────────────────────────────

impl EvalContext for Interpreter {
    fn get_var(&self, name: &str) -> Option<Value> {
        self.scope.get(name).cloned()
    }

    fn strict(&self) -> bool {
        self.strict
    }
}

// ── ScriptBlock ───────────────────────────────────────────────────────────────

/// A `{ ... }` block passed to a call as a handler.
///
/// Invoking it runs the body in a fresh buffered interpreter whose base scope
/// is the variables captured at the call site, with the invocation's
/// arguments bound as `arg1`, `arg2`, ...  The result is the printed lines
/// joined by `\n`.  Diagnostics raised inside the block go to the console.
pub struct ScriptBlock {
    name: String,
    signature: Signature,
    body: Arc<[Stmt]>,
    symbols: Arc<SymbolTable>,
    captured: Arc<Bindings>,
}

impl ScriptBlock {
    pub fn new(
        name: impl Into<String>,
        body: Arc<[Stmt]>,
        symbols: Arc<SymbolTable>,
        captured: Arc<Bindings>,
    ) -> Self {
        Self {
            name: name.into(),
            signature: Signature::variadic(ParamType::Any),
            body,
            symbols,
            captured,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn invoke(&self, args: Vec<Value>) -> Result<Value, String> {
        let mut interp =
            Interpreter::with_globals(Arc::clone(&self.symbols), Arc::clone(&self.captured))
                .buffered();
        for (i, arg) in args.into_iter().enumerate() {
            interp.set_var(format!("arg{}", i + 1), arg);
        }
        interp.exec_block(&self.body);
        for d in interp.diagnostics() {
            console_line(&d.to_string());
        }
        Ok(Value::Str(interp.take_output().join("\n")))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::script::error::ErrorKind;
    use crate::script::symbols::Namespace;

    fn symbols() -> SymbolTable {
        let mut t = SymbolTable::new();
        t.register_namespace(
            Namespace::new("text")
                .with("upper", Callable::native1("text.upper", |s: String| Ok(s.to_uppercase()))),
        );
        t
    }

    fn run_with(table: SymbolTable, src: &str) -> Interpreter {
        let mut interp = Interpreter::new(Arc::new(table)).buffered();
        interp.run(src);
        interp
    }

    fn run(src: &str) -> Interpreter {
        run_with(symbols(), src)
    }

    fn output(src: &str) -> Vec<String> {
        run(src).take_output()
    }

    #[test]
    fn print_literal() {
        assert_eq!(output("print(\"hi\")"), vec!["hi"]);
    }

    #[test]
    fn let_then_print() {
        assert_eq!(output("let x = \"a\"\nprint(x)"), vec!["a"]);
    }

    #[test]
    fn concat_with_number() {
        assert_eq!(output("let n = 3\nprint(\"n=\" + n)"), vec!["n=3"]);
    }

    #[test]
    fn print_unset_name_falls_back_to_text() {
        assert_eq!(output("print(hello world)"), vec!["hello world"]);
    }

    #[test]
    fn print_empty_is_nil() {
        assert_eq!(output("print()"), vec!["<nil>"]);
    }

    #[test]
    fn if_else_branches() {
        let src = "let x = 5\nif x > 3 {\n print(\"big\")\n} else {\n print(\"small\")\n}";
        assert_eq!(output(src), vec!["big"]);
        let src = "let x = 1\nif x > 3 {\n print(\"big\")\n} else {\n print(\"small\")\n}";
        assert_eq!(output(src), vec!["small"]);
    }

    #[test]
    fn else_if_chain() {
        let src = "let x = 2\nif x == 1 {\nprint(\"one\")\n} else if x == 2 {\nprint(\"two\")\n} else {\nprint(\"many\")\n}";
        assert_eq!(output(src), vec!["two"]);
    }

    #[test]
    fn unknown_command_does_not_stop_execution() {
        let mut interp = run("print(\"a\")\nfrobnicate now\nprint(\"b\")");
        assert_eq!(interp.take_output(), vec!["a", "b"]);
        let diags = interp.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line, 2);
        assert_eq!(diags[0].kind(), ErrorKind::SyntaxShape);
    }

    #[test]
    fn unresolved_call_is_name_resolution_error() {
        let interp = run("text.nope(\"x\")\nprint(\"after\")");
        assert_eq!(interp.output(), ["after"]);
        assert_eq!(interp.diagnostics()[0].kind(), ErrorKind::NameResolution);
    }

    #[test]
    fn arity_mismatch_warns_and_still_calls() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut t = SymbolTable::new();
        t.register_fn(
            "record",
            Callable::native1("record", move |s: String| {
                sink.lock().unwrap().push(s);
                Ok(())
            }),
        );
        let interp = run_with(t, "record(\"a\", \"b\")");
        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string()]);
        assert_eq!(interp.diagnostics().len(), 1);
        assert_eq!(interp.diagnostics()[0].severity, Severity::Warning);
    }

    #[test]
    fn type_mismatch_is_reported() {
        let mut t = SymbolTable::new();
        t.register_fn("half", Callable::native1("half", |x: f64| Ok(x / 2.0)));
        let interp = run_with(t, "half(\"ten\")\nprint(\"still here\")");
        assert_eq!(interp.output(), ["still here"]);
        assert!(matches!(
            interp.diagnostics()[0].error,
            ScriptError::Type { .. }
        ));
    }

    #[test]
    fn run_summary_counts() {
        let mut interp = Interpreter::new(Arc::new(symbols())).buffered();
        let summary = interp.run("print(1)\nbogus line\nprint(2)");
        assert_eq!(
            summary,
            RunSummary {
                statements: 3,
                errors: 1,
                warnings: 0
            }
        );
        assert!(!summary.is_clean());
    }

    #[test]
    fn strict_mode_rejects_unknown_words() {
        let mut interp = Interpreter::new(Arc::new(symbols())).buffered();
        interp.set_strict(true);
        interp.run("print(missing)");
        assert!(interp.output().is_empty());
        assert_eq!(interp.diagnostics()[0].kind(), ErrorKind::NameResolution);
    }

    #[test]
    fn seeded_globals_are_visible() {
        let globals = Arc::new(Bindings::from([("PORT".to_owned(), Value::from("9000"))]));
        let mut interp = Interpreter::with_globals(Arc::new(symbols()), globals).buffered();
        interp.run("print(\"port \" + PORT)");
        assert_eq!(interp.output(), ["port 9000"]);
    }

    #[test]
    fn handler_block_captures_scope_and_args() {
        let captured = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&captured);
        let mut t = SymbolTable::new();
        t.register_fn(
            "on",
            Callable::native2("on", move |_event: String, f: Callable| {
                *slot.lock().unwrap() = Some(f);
                Ok(())
            }),
        );
        let interp = run_with(t, "let who = \"world\"\non(\"greet\") {\n print(arg1 + \" \" + who)\n print(\"bye\")\n}");
        assert!(interp.diagnostics().is_empty());
        let f = captured.lock().unwrap().clone().expect("handler registered");
        let out = f.call_checked(vec![Value::from("hello")]).unwrap();
        assert_eq!(out, Value::from("hello world\nbye"));
    }

    #[test]
    fn scope_snapshot_merges_overlay() {
        let base = Arc::new(Bindings::from([("a".to_owned(), Value::Num(1.0))]));
        let mut scope = Scope::new(base);
        scope.set("b", Value::Num(2.0));
        scope.set("a", Value::Num(3.0));
        let snap = scope.snapshot();
        assert_eq!(snap.get("a"), Some(&Value::Num(3.0)));
        assert_eq!(snap.get("b"), Some(&Value::Num(2.0)));
    }

    #[test]
    fn unclosed_block_is_warning() {
        let interp = run("if 1 {\nprint(\"in\")");
        assert_eq!(interp.output(), ["in"]);
        assert!(interp
            .diagnostics()
            .iter()
            .any(|d| d.kind() == ErrorKind::MalformedBlock && d.severity == Severity::Warning));
    }

    #[test]
    fn deeply_nested_blocks_degrade_instead_of_overflowing() {
        let n = 100_000;
        let src = format!("{}\n{}\nprint(\"after\")", "{".repeat(n), "}".repeat(n));
        let interp = run(&src);
        assert_eq!(interp.output(), ["after"]);
        assert!(interp
            .diagnostics()
            .iter()
            .any(|d| matches!(d.error, ScriptError::NestedTooDeep(_))));
    }

    #[test]
    fn deeply_nested_ifs_run_up_to_the_limit() {
        let n = 3_000;
        let src = format!(
            "{}print(\"deep\")\n{}print(\"after\")",
            "if 1 {\n".repeat(n),
            "}\n".repeat(n)
        );
        let interp = run(&src);
        assert_eq!(interp.output(), ["after"]);
        assert_eq!(interp.diagnostics().len(), 1);
    }

    #[test]
    fn unclosed_deep_blocks_still_finish() {
        let reported = run(&"{".repeat(100_000)).diagnostics().len();
        assert!(reported >= 2);
    }
}
