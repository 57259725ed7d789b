//! Condition parsing and evaluation for `if`.
//!
//! A condition is either a single comparison `lhs OP rhs` or a plain
//! expression coerced to truthiness.  Operands are value expressions
//! (see [`super::expr`]).

use super::error::ScriptError;
use super::expr::{eval, parse_expr, tokenize, CmpOp, EvalContext, Expr, Mode, TokenKind};
use super::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare { op: CmpOp, lhs: Expr, rhs: Expr },
    Truthy(Expr),
}

/// Parse a condition.  At most one relational operator is allowed.
pub fn parse_condition(src: &str) -> Result<Condition, ScriptError> {
    let src = src.trim();
    let tokens = tokenize(src, Mode::Condition)?;
    let mut ops = tokens.iter().filter_map(|t| match t.kind {
        TokenKind::Cmp(op) => Some((op, t.start, t.end)),
        _ => None,
    });
    let Some((op, start, end)) = ops.next() else {
        return Ok(Condition::Truthy(parse_expr(src)?));
    };
    if ops.next().is_some() {
        return Err(ScriptError::Syntax(format!("chained comparison: {src}")));
    }
    Ok(Condition::Compare {
        op,
        lhs: parse_expr(&src[..start])?,
        rhs: parse_expr(&src[end..])?,
    })
}

pub fn eval_condition(cond: &Condition, ctx: &dyn EvalContext) -> Result<bool, ScriptError> {
    match cond {
        Condition::Compare { op, lhs, rhs } => {
            let a = eval(lhs, ctx)?;
            let b = eval(rhs, ctx)?;
            Ok(compare(*op, &a, &b))
        }
        Condition::Truthy(e) => Ok(eval(e, ctx)?.is_truthy()),
    }
}

/// Numeric comparison when both sides are numeric; otherwise only `==`
/// and `!=` are defined (on the rendered text) and ordering operators
/// yield `false`.
pub fn compare(op: CmpOp, a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
        return match op {
            CmpOp::Gt => x > y,
            CmpOp::Lt => x < y,
            CmpOp::Ge => x >= y,
            CmpOp::Le => x <= y,
            CmpOp::Eq => x == y,
            CmpOp::Ne => x != y,
        };
    }
    match op {
        CmpOp::Eq => a.to_string() == b.to_string(),
        CmpOp::Ne => a.to_string() != b.to_string(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    struct Vars(HashMap<String, Value>);

    impl EvalContext for Vars {
        fn get_var(&self, name: &str) -> Option<Value> {
            self.0.get(name).cloned()
        }
    }

    fn check(src: &str, pairs: &[(&str, Value)]) -> bool {
        let ctx = Vars(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect());
        let cond = parse_condition(src).expect("parse failed");
        eval_condition(&cond, &ctx).expect("eval failed")
    }

    #[test]
    fn numeric_operators() {
        let x = [("x", Value::Num(10.0))];
        assert!(check("x >= 10", &x));
        assert!(check("x <= 10", &x));
        assert!(!check("x > 10", &x));
        assert!(!check("x < 10", &x));
        assert!(check("x == 10", &x));
        assert!(!check("x != 10", &x));
    }

    #[test]
    fn numeric_string_compares_as_number() {
        assert!(check("\"10.0\" == 10", &[]));
        assert!(check("\"9\" < 10", &[]));
    }

    #[test]
    fn string_equality() {
        let v = [("name", Value::Str("osun".into()))];
        assert!(check("name == \"osun\"", &v));
        assert!(check("name != \"other\"", &v));
    }

    #[test]
    fn string_ordering_is_false() {
        assert!(!check("\"a\" < \"b\"", &[]));
        assert!(!check("\"b\" > \"a\"", &[]));
        assert!(!check("\"a\" >= \"a\"", &[]));
    }

    #[test]
    fn truthiness_without_operator() {
        assert!(check("flag", &[("flag", Value::Bool(true))]));
        assert!(!check("flag", &[("flag", Value::Bool(false))]));
        assert!(!check("0", &[]));
        assert!(check("1", &[]));
        assert!(!check("\"\"", &[]));
        assert!(check("\"x\"", &[]));
        assert!(!check("", &[]));
    }

    #[test]
    fn operator_inside_quotes_is_not_a_split_point() {
        assert!(check("\"a>b\" == \"a>b\"", &[]));
    }

    #[test]
    fn chained_comparison_rejected() {
        assert!(parse_condition("a < b < c").is_err());
    }

    #[test]
    fn longest_operator_wins() {
        let cond = parse_condition("x >= 1").unwrap();
        assert!(matches!(cond, Condition::Compare { op: CmpOp::Ge, .. }));
    }
}
