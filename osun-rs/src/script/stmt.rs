//! Statement tree and script-level parser.
//!
//! Parsing happens in two passes:
//!
//! 1. [`line_stream`] trims every source line, drops blanks and `//`
//!    comments, and splits each line at braces outside string literals, so
//!    `} else {`, `if x { print(x) }` and a brace on its own line all
//!    normalise to the same flat sequence of [`Piece`]s.
//! 2. A recursive-descent [`StmtParser`] turns the pieces into a
//!    [`Stmt`] tree; brace matching is parser nesting.
//!
//! The parser never fails as a whole.  A statement it cannot make sense of
//! becomes [`StmtKind::Invalid`] and is reported when execution reaches it,
//! so one bad line never stops the statements around it.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::cond::{parse_condition, Condition};
use super::error::ScriptError;
use super::expr::{parse_expr, Expr};

/// `path(args)` with a path free of blanks or parentheses.
static CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^\s()]+)\s*\((.*)\)$").expect("call regex"));

/// `name` or `a.b.c` made of identifiers.
static PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").expect("path regex")
});

/// How deep `{ ... }` blocks (and `else if` links) may nest.  Deeper
/// blocks are skipped whole and reported, so neither parsing nor execution
/// recurses without bound.
pub const MAX_BLOCK_DEPTH: usize = 64;

/// A `let` target: one word, no quotes, operators or brackets.
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^[^\s"+(){}=<>!,]+$"#).expect("name regex"));

// ── Line stream ───────────────────────────────────────────────────────────────

/// One element of the normalised line stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Piece {
    Text { line: usize, text: String },
    Open { line: usize },
    Close { line: usize },
}

/// Split source text into the normalised line stream.  Line numbers are
/// 1-based source lines.
pub fn line_stream(src: &str) -> Vec<Piece> {
    let mut pieces = Vec::new();
    for (i, raw) in src.lines().enumerate() {
        let line = i + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }

        let mut current = String::new();
        let mut in_str = false;
        for ch in trimmed.chars() {
            match ch {
                '"' => {
                    in_str = !in_str;
                    current.push(ch);
                }
                '{' | '}' if !in_str => {
                    let text = current.trim();
                    if !text.is_empty() {
                        pieces.push(Piece::Text {
                            line,
                            text: text.to_owned(),
                        });
                    }
                    current.clear();
                    pieces.push(if ch == '{' {
                        Piece::Open { line }
                    } else {
                        Piece::Close { line }
                    });
                }
                _ => current.push(ch),
            }
        }
        let text = current.trim();
        if !text.is_empty() {
            pieces.push(Piece::Text {
                line,
                text: text.to_owned(),
            });
        }
    }
    pieces
}

// ── Statement tree ────────────────────────────────────────────────────────────

/// A parsed statement with the source line it starts on.
#[derive(Debug, Clone)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    /// `let NAME = EXPR`
    Let { name: String, value: Expr },
    /// `print(EXPR)`
    Print(Expr),
    /// `if COND { ... } [else { ... } | else if ...]`
    If {
        cond: Condition,
        then_block: Vec<Stmt>,
        else_block: Option<Vec<Stmt>>,
    },
    /// `path(args...)`, optionally followed by a handler block.
    Call {
        path: String,
        args: Vec<Expr>,
        block: Option<Arc<[Stmt]>>,
    },
    /// A bare `{ ... }` group; runs inline.
    Block(Vec<Stmt>),
    /// Something that could not be parsed; reported when reached.
    Invalid(ScriptError),
}

impl Stmt {
    fn new(line: usize, kind: StmtKind) -> Self {
        Self { line, kind }
    }

    fn invalid(line: usize, err: ScriptError) -> Self {
        Self::new(line, StmtKind::Invalid(err))
    }
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Parse a script into statements.  Never fails; see the module docs.
pub fn parse_script(src: &str) -> Vec<Stmt> {
    let mut parser = StmtParser {
        pieces: line_stream(src),
        pos: 0,
        depth: 0,
    };
    let (stmts, _) = parser.parse_block(None);
    stmts
}

struct StmtParser {
    pieces: Vec<Piece>,
    pos: usize,
    depth: usize,
}

impl StmtParser {
    fn peek(&self) -> Option<&Piece> {
        self.pieces.get(self.pos)
    }

    fn advance(&mut self) -> Option<Piece> {
        let p = self.pieces.get(self.pos).cloned();
        if p.is_some() {
            self.pos += 1;
        }
        p
    }

    /// If the next piece is `{`, consume it and return its line.
    fn eat_open(&mut self) -> Option<usize> {
        match self.peek() {
            Some(Piece::Open { line }) => {
                let line = *line;
                self.pos += 1;
                Some(line)
            }
            _ => None,
        }
    }

    /// Parse statements up to the `}` closing `opened` (or end of stream).
    ///
    /// Returns the statements and whether the block was properly closed.
    /// At top level (`opened == None`) stray `}` are skipped.
    fn parse_block(&mut self, opened: Option<usize>) -> (Vec<Stmt>, bool) {
        let mut stmts = Vec::new();
        while let Some(piece) = self.advance() {
            match piece {
                Piece::Close { line } => {
                    if opened.is_some() {
                        return (stmts, true);
                    }
                    tracing::debug!(line, "ignoring unmatched `}}`");
                }
                Piece::Open { line } => {
                    let (body, closed) = self.nested_block(line);
                    stmts.push(Stmt::new(line, StmtKind::Block(body)));
                    if !closed {
                        stmts.push(Stmt::invalid(line, ScriptError::UnclosedBlock(line)));
                    }
                }
                Piece::Text { line, text } => self.parse_statement(line, &text, &mut stmts),
            }
        }
        // End of stream closes whatever is still open.
        (stmts, opened.is_none())
    }

    /// Parse the body of the `{` just consumed on `open_line`.  Past
    /// [`MAX_BLOCK_DEPTH`] the body is skipped instead.
    fn nested_block(&mut self, open_line: usize) -> (Vec<Stmt>, bool) {
        if self.depth >= MAX_BLOCK_DEPTH {
            tracing::debug!(line = open_line, "skipping block nested too deeply");
            let closed = self.skip_block();
            let err = Stmt::invalid(open_line, ScriptError::NestedTooDeep(MAX_BLOCK_DEPTH));
            return (vec![err], closed);
        }
        self.depth += 1;
        let result = self.parse_block(Some(open_line));
        self.depth -= 1;
        result
    }

    /// Consume pieces up to the `}` matching an already consumed `{`.
    /// Returns false if the stream ends first.
    fn skip_block(&mut self) -> bool {
        let mut open = 1usize;
        while let Some(piece) = self.pieces.get(self.pos) {
            self.pos += 1;
            match piece {
                Piece::Open { .. } => open += 1,
                Piece::Close { .. } => {
                    open -= 1;
                    if open == 0 {
                        return true;
                    }
                }
                Piece::Text { .. } => {}
            }
        }
        false
    }

    /// Skip what is left of an `else if` chain too long to nest.
    fn skip_else_chain(&mut self, line: usize, out: &mut Vec<Stmt>) {
        out.push(Stmt::invalid(line, ScriptError::NestedTooDeep(MAX_BLOCK_DEPTH)));
        loop {
            if self.eat_open().is_none() || !self.skip_block() {
                return;
            }
            match self.peek() {
                Some(Piece::Text { text, .. }) if text == "else" || text.starts_with("else if") => {
                    self.pos += 1;
                }
                _ => return,
            }
        }
    }

    /// Parse a `{ ... }` body that must follow the current statement.
    /// Returns `None` (and records an error) if no `{` follows.
    fn parse_body(&mut self, line: usize, what: &str, out: &mut Vec<Stmt>) -> Option<(Vec<Stmt>, usize, bool)> {
        match self.eat_open() {
            Some(open_line) => {
                let (body, closed) = self.nested_block(open_line);
                Some((body, open_line, closed))
            }
            None => {
                out.push(Stmt::invalid(
                    line,
                    ScriptError::Syntax(format!("expected `{{` after {what}")),
                ));
                None
            }
        }
    }

    fn parse_statement(&mut self, line: usize, text: &str, out: &mut Vec<Stmt>) {
        if text == "if" || text.starts_with("if ") || text.starts_with("if(") {
            self.parse_if(line, &text[2..], out);
        } else if text == "else" || text.starts_with("else ") {
            out.push(Stmt::invalid(
                line,
                ScriptError::Syntax("`else` without a preceding `if` block".into()),
            ));
        } else if let Some(rest) = text.strip_prefix("let ") {
            out.push(parse_let(line, text, rest));
        } else {
            self.parse_call(line, text, out);
        }
    }

    fn parse_if(&mut self, line: usize, cond_src: &str, out: &mut Vec<Stmt>) {
        let cond = parse_condition(strip_parens(cond_src.trim()));
        let Some((then_block, open_line, closed)) = self.parse_body(line, "if condition", out) else {
            return;
        };
        if !closed {
            out.push(if_stmt(line, cond, then_block, None));
            out.push(Stmt::invalid(open_line, ScriptError::UnclosedBlock(open_line)));
            return;
        }

        // Optional else / else if.
        let else_line = match self.peek() {
            Some(Piece::Text { line, text }) if text == "else" || text.starts_with("else if") => {
                Some((*line, text.clone()))
            }
            _ => None,
        };
        let Some((else_line, else_text)) = else_line else {
            out.push(if_stmt(line, cond, then_block, None));
            return;
        };
        self.pos += 1;

        let mut trailing = Vec::new();
        let else_block = if let Some(rest) = else_text.strip_prefix("else if") {
            let mut nested = Vec::new();
            if self.depth >= MAX_BLOCK_DEPTH {
                self.skip_else_chain(else_line, &mut nested);
            } else {
                self.depth += 1;
                self.parse_if(else_line, rest, &mut nested);
                self.depth -= 1;
            }
            Some(nested)
        } else {
            match self.parse_body(else_line, "else", &mut trailing) {
                Some((body, open_line, closed)) => {
                    if !closed {
                        trailing.push(Stmt::invalid(open_line, ScriptError::UnclosedBlock(open_line)));
                    }
                    Some(body)
                }
                None => None,
            }
        };
        out.push(if_stmt(line, cond, then_block, else_block));
        out.extend(trailing);
    }

    fn parse_call(&mut self, line: usize, text: &str, out: &mut Vec<Stmt>) {
        let Some(caps) = CALL_RE.captures(text) else {
            out.push(Stmt::invalid(line, ScriptError::UnknownCommand(text.to_owned())));
            return;
        };
        let path = &caps[1];
        let args_src = &caps[2];

        if path == "print" {
            out.push(match parse_expr(args_src) {
                Ok(e) => Stmt::new(line, StmtKind::Print(e)),
                Err(e) => Stmt::invalid(line, e),
            });
            return;
        }

        let parsed = if PATH_RE.is_match(path) {
            split_args(args_src)
                .into_iter()
                .map(parse_expr)
                .collect::<Result<Vec<_>, _>>()
        } else {
            Err(ScriptError::Syntax(format!("invalid function path `{path}`")))
        };

        // A directly following block is the call's handler argument.
        let mut trailing = Vec::new();
        let block = match self.eat_open() {
            Some(open_line) => {
                let (body, closed) = self.nested_block(open_line);
                if !closed {
                    trailing.push(Stmt::invalid(open_line, ScriptError::UnclosedBlock(open_line)));
                }
                Some(Arc::from(body))
            }
            None => None,
        };

        out.push(match parsed {
            Ok(args) => Stmt::new(
                line,
                StmtKind::Call {
                    path: path.to_owned(),
                    args,
                    block,
                },
            ),
            Err(e) => Stmt::invalid(line, e),
        });
        out.extend(trailing);
    }
}

fn if_stmt(
    line: usize,
    cond: Result<Condition, ScriptError>,
    then_block: Vec<Stmt>,
    else_block: Option<Vec<Stmt>>,
) -> Stmt {
    match cond {
        Ok(cond) => Stmt::new(
            line,
            StmtKind::If {
                cond,
                then_block,
                else_block,
            },
        ),
        Err(e) => Stmt::invalid(line, e),
    }
}

fn parse_let(line: usize, text: &str, rest: &str) -> Stmt {
    let Some((name, value)) = rest.split_once('=') else {
        return Stmt::invalid(line, ScriptError::Syntax(format!("malformed let: {text}")));
    };
    let name = name.trim();
    if !NAME_RE.is_match(name) {
        return Stmt::invalid(
            line,
            ScriptError::Syntax(format!("invalid variable name `{name}`")),
        );
    }
    match parse_expr(value) {
        Ok(value) => Stmt::new(
            line,
            StmtKind::Let {
                name: name.to_owned(),
                value,
            },
        ),
        Err(e) => Stmt::invalid(line, e),
    }
}

// ── Small utilities ───────────────────────────────────────────────────────────

/// Split a call's argument text on commas outside string literals.
///
/// Blank input yields no arguments; a trailing empty argument is dropped.
pub fn split_args(s: &str) -> Vec<&str> {
    if s.trim().is_empty() {
        return Vec::new();
    }
    let mut args = Vec::new();
    let mut in_str = false;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        match ch {
            '"' => in_str = !in_str,
            ',' if !in_str => {
                args.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = s[start..].trim();
    if !last.is_empty() {
        args.push(last);
    }
    args
}

/// Remove one pair of parentheses enclosing the whole of `s`.
fn strip_parens(s: &str) -> &str {
    if !(s.starts_with('(') && s.ends_with(')')) {
        return s;
    }
    // `(a) == (b)` must keep its parentheses.
    let mut depth = 0i32;
    let mut in_str = false;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_str = !in_str,
            '(' if !in_str => depth += 1,
            ')' if !in_str => {
                depth -= 1;
                if depth == 0 && i != s.len() - 1 {
                    return s;
                }
            }
            _ => {}
        }
    }
    &s[1..s.len() - 1]
}

// ── Tests ─────────────────────────────────────────────────────────────────────
