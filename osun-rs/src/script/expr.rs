//! Expression lexer, tree, and evaluator.
//!
//! The expression language is small:
//!
//! - `"text"`: string literal, no escape processing
//! - `name`: variable reference; falls back to a number literal, then to
//!   the raw text itself (see [`EvalContext::strict`])
//! - `a + b + c`: string concatenation of the operands' renderings
//!
//! There is no numeric addition: `1 + 1` evaluates to `"11"`.  Relational
//! operators only exist in condition context (see [`super::cond`]); the
//! lexer recognises them only when asked to.

use super::error::ScriptError;
use super::value::Value;

// ── EvalContext ───────────────────────────────────────────────────────────────

/// Variable lookup interface used by the evaluator.
///
/// The [`Interpreter`](super::interp::Interpreter) implements this over its
/// layered scope.
pub trait EvalContext {
    /// Look up a variable (overlay first, then the shared base).
    fn get_var(&self, name: &str) -> Option<Value>;

    /// When `true`, an unresolved non-numeric word is a name-resolution
    /// error instead of evaluating to its own text.
    fn strict(&self) -> bool {
        false
    }
}

// ── Token ─────────────────────────────────────────────────────────────────────

/// Relational operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Ge,
    Le,
    Eq,
    Ne,
    Gt,
    Lt,
}

impl CmpOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Ge => ">=",
            CmpOp::Le => "<=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Gt => ">",
            CmpOp::Lt => "<",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// A double-quoted literal (contents without the quotes).
    Str(String),
    /// Any other run of non-blank, non-operator text.
    Word,
    Plus,
    Cmp(CmpOp),
}

/// A token with its byte span in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

/// Which operators the lexer recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `+` only; `<`, `>`, `=`, `!` are ordinary word characters.
    Value,
    /// `+` and the six relational operators.
    Condition,
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    mode: Mode,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str, mode: Mode) -> Self {
        Lexer {
            src: src.as_bytes(),
            pos: 0,
            mode,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    /// Relational operator starting at `pos`, longest match first.
    fn cmp_at(&self, pos: usize) -> Option<(CmpOp, usize)> {
        if self.mode != Mode::Condition {
            return None;
        }
        let a = self.src.get(pos).copied()?;
        let b = self.src.get(pos + 1).copied();
        match (a, b) {
            (b'>', Some(b'=')) => Some((CmpOp::Ge, 2)),
            (b'<', Some(b'=')) => Some((CmpOp::Le, 2)),
            (b'=', Some(b'=')) => Some((CmpOp::Eq, 2)),
            (b'!', Some(b'=')) => Some((CmpOp::Ne, 2)),
            (b'>', _) => Some((CmpOp::Gt, 1)),
            (b'<', _) => Some((CmpOp::Lt, 1)),
            _ => None,
        }
    }

    fn read_string(&mut self, start: usize) -> Result<Token, ScriptError> {
        // Opening quote already consumed.
        let body_start = self.pos;
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == b'"' {
                let text = String::from_utf8_lossy(&self.src[body_start..self.pos - 1]).into_owned();
                return Ok(Token {
                    kind: TokenKind::Str(text),
                    start,
                    end: self.pos,
                });
            }
        }
        Err(ScriptError::Syntax(format!(
            "unterminated string: {}",
            String::from_utf8_lossy(&self.src[start..])
        )))
    }

    fn read_word(&mut self, start: usize) -> Token {
        while let Some(c) = self.peek() {
            if matches!(c, b' ' | b'\t' | b'\r' | b'\n' | b'"' | b'+') || self.cmp_at(self.pos).is_some() {
                break;
            }
            self.pos += 1;
        }
        Token {
            kind: TokenKind::Word,
            start,
            end: self.pos,
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, ScriptError> {
        self.skip_ws();
        let start = self.pos;
        let Some(ch) = self.peek() else {
            return Ok(None);
        };
        if let Some((op, len)) = self.cmp_at(start) {
            self.pos += len;
            return Ok(Some(Token {
                kind: TokenKind::Cmp(op),
                start,
                end: self.pos,
            }));
        }
        match ch {
            b'"' => {
                self.pos += 1;
                self.read_string(start).map(Some)
            }
            b'+' => {
                self.pos += 1;
                Ok(Some(Token {
                    kind: TokenKind::Plus,
                    start,
                    end: self.pos,
                }))
            }
            _ => Ok(Some(self.read_word(start))),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, ScriptError> {
        let mut tokens = Vec::new();
        while let Some(t) = self.next_token()? {
            tokens.push(t);
        }
        Ok(tokens)
    }
}

/// Split `src` into tokens.
pub fn tokenize(src: &str, mode: Mode) -> Result<Vec<Token>, ScriptError> {
    Lexer::new(src, mode).tokenize()
}

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// The empty expression.
    Nil,
    /// A quoted literal.
    Str(String),
    /// Unquoted text: variable, number, or bare string.
    Word(String),
    /// `a + b + ...`, left to right.
    Concat(Vec<Expr>),
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Parse a value expression (no relational operators).
pub fn parse_expr(src: &str) -> Result<Expr, ScriptError> {
    let src = src.trim();
    if src.is_empty() {
        return Ok(Expr::Nil);
    }
    let tokens = tokenize(src, Mode::Value)?;
    let parts: Vec<&[Token]> = tokens
        .split(|t| t.kind == TokenKind::Plus)
        .collect();
    if parts.len() == 1 {
        return parse_operand(src, parts[0]);
    }
    // An empty side of `+` is nil: `+5` renders as `<nil>5`.
    let operands = parts
        .into_iter()
        .map(|p| parse_operand(src, p))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Expr::Concat(operands))
}

/// One operand: a single string literal, or a run of words kept as the
/// original text (`hello world` stays one operand).
fn parse_operand(src: &str, tokens: &[Token]) -> Result<Expr, ScriptError> {
    let (Some(first), Some(last)) = (tokens.first(), tokens.last()) else {
        return Ok(Expr::Nil);
    };
    if let [Token {
        kind: TokenKind::Str(s),
        ..
    }] = tokens
    {
        return Ok(Expr::Str(s.clone()));
    }
    let text = &src[first.start..last.end];
    if tokens.iter().all(|t| t.kind == TokenKind::Word) {
        Ok(Expr::Word(text.to_owned()))
    } else {
        Err(ScriptError::Syntax(format!("cannot mix quoted and bare text: {text}")))
    }
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

/// Evaluate an expression tree.
pub fn eval(expr: &Expr, ctx: &dyn EvalContext) -> Result<Value, ScriptError> {
    match expr {
        Expr::Nil => Ok(Value::Nil),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Word(w) => eval_word(w, ctx),
        Expr::Concat(parts) => {
            let mut out = String::new();
            for p in parts {
                out.push_str(&eval(p, ctx)?.to_string());
            }
            Ok(Value::Str(out))
        }
    }
}

/// Variable first, so a binding shadows a number-like name; then a float
/// literal; then the text itself.
fn eval_word(word: &str, ctx: &dyn EvalContext) -> Result<Value, ScriptError> {
    if let Some(v) = ctx.get_var(word) {
        return Ok(v);
    }
    // `inf` and `nan` stay words.
    if let Ok(x) = word.parse::<f64>() {
        if x.is_finite() {
            return Ok(Value::Num(x));
        }
    }
    if ctx.strict() {
        return Err(ScriptError::NotFound(format!("variable `{word}`")));
    }
    Ok(Value::Str(word.to_owned()))
}

/// Parse and evaluate `src` in one step.
pub fn eval_str(src: &str, ctx: &dyn EvalContext) -> Result<Value, ScriptError> {
    eval(&parse_expr(src)?, ctx)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
