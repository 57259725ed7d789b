//! Symbol table: the host-populated registry of callables and namespaces.
//!
//! Every callable carries an explicit [`Signature`] so the dispatcher can
//! check arity and coerce argument types before the native body runs.  The
//! typed constructors ([`Callable::native1`] and friends) derive the
//! signature from the Rust parameter types via [`FromValue`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use super::interp::ScriptBlock;
use super::value::{format_number, Value};

// ── Parameter types ──────────────────────────────────────────────────────────

/// The script-level type a callable parameter expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Any,
    Str,
    Num,
    Bool,
    Func,
}

impl ParamType {
    pub fn name(self) -> &'static str {
        match self {
            ParamType::Any => "any",
            ParamType::Str => "string",
            ParamType::Num => "number",
            ParamType::Bool => "boolean",
            ParamType::Func => "function",
        }
    }

    /// Coerce `v` to this type, or give it back unchanged on mismatch.
    pub fn coerce(self, v: Value) -> Result<Value, Value> {
        match (self, v) {
            (ParamType::Any, v) => Ok(v),
            (ParamType::Str, v @ Value::Str(_)) => Ok(v),
            (ParamType::Str, Value::Num(x)) => Ok(Value::Str(format_number(x))),
            (ParamType::Num, v @ Value::Num(_)) => Ok(v),
            (ParamType::Num, Value::Str(s)) => match s.parse::<f64>() {
                Ok(x) => Ok(Value::Num(x)),
                Err(_) => Err(Value::Str(s)),
            },
            (ParamType::Bool, v @ Value::Bool(_)) => Ok(v),
            (ParamType::Bool, Value::Str(s)) => match s.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(Value::Str(s)),
            },
            (ParamType::Func, v @ Value::Func(_)) => Ok(v),
            (_, v) => Err(v),
        }
    }
}

/// Argument shape of a callable: fixed positional parameters, optionally
/// followed by any number of `rest` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<ParamType>,
    pub rest: Option<ParamType>,
}

impl Signature {
    pub fn fixed(params: Vec<ParamType>) -> Self {
        Self { params, rest: None }
    }

    pub fn variadic(rest: ParamType) -> Self {
        Self {
            params: Vec::new(),
            rest: Some(rest),
        }
    }

    pub fn accepts(&self, argc: usize) -> bool {
        match self.rest {
            Some(_) => argc >= self.params.len(),
            None => argc == self.params.len(),
        }
    }

    /// Human-readable arity: `2`, or `at least 1` for variadics.
    pub fn arity(&self) -> String {
        match self.rest {
            Some(_) => format!("at least {}", self.params.len()),
            None => self.params.len().to_string(),
        }
    }

    /// Coerce `args` to this signature.  Missing arguments are nil (which
    /// only `Any` accepts); surplus arguments of a fixed signature are dropped.
    pub fn marshal(&self, args: Vec<Value>) -> Result<Vec<Value>, String> {
        let mut out = Vec::with_capacity(args.len().max(self.params.len()));
        let mut it = args.into_iter();
        for (i, ty) in self.params.iter().enumerate() {
            match it.next() {
                Some(v) => out.push(coerce_arg(*ty, i, v)?),
                None if *ty == ParamType::Any => out.push(Value::Nil),
                None => {
                    return Err(format!("missing argument {} ({})", i + 1, ty.name()));
                }
            }
        }
        if let Some(ty) = self.rest {
            let base = self.params.len();
            for (i, v) in it.enumerate() {
                out.push(coerce_arg(ty, base + i, v)?);
            }
        }
        Ok(out)
    }
}

fn coerce_arg(ty: ParamType, index: usize, v: Value) -> Result<Value, String> {
    ty.coerce(v).map_err(|v| {
        format!(
            "argument {} expects {}, got {} `{v}`",
            index + 1,
            ty.name(),
            v.type_name()
        )
    })
}

// ── Native conversions ───────────────────────────────────────────────────────

/// Conversion from an already-marshaled [`Value`] into a native parameter.
pub trait FromValue: Sized {
    const PARAM: ParamType;
    fn from_value(v: Value) -> Result<Self, String>;
}

impl FromValue for Value {
    const PARAM: ParamType = ParamType::Any;
    fn from_value(v: Value) -> Result<Self, String> {
        Ok(v)
    }
}

impl FromValue for String {
    const PARAM: ParamType = ParamType::Str;
    fn from_value(v: Value) -> Result<Self, String> {
        match Self::PARAM.coerce(v) {
            Ok(Value::Str(s)) => Ok(s),
            Ok(v) | Err(v) => Err(format!("expected string, got {}", v.type_name())),
        }
    }
}

impl FromValue for f64 {
    const PARAM: ParamType = ParamType::Num;
    fn from_value(v: Value) -> Result<Self, String> {
        match Self::PARAM.coerce(v) {
            Ok(Value::Num(x)) => Ok(x),
            Ok(v) | Err(v) => Err(format!("expected number, got {}", v.type_name())),
        }
    }
}

impl FromValue for bool {
    const PARAM: ParamType = ParamType::Bool;
    fn from_value(v: Value) -> Result<Self, String> {
        match Self::PARAM.coerce(v) {
            Ok(Value::Bool(b)) => Ok(b),
            Ok(v) | Err(v) => Err(format!("expected boolean, got {}", v.type_name())),
        }
    }
}

impl FromValue for Callable {
    const PARAM: ParamType = ParamType::Func;
    fn from_value(v: Value) -> Result<Self, String> {
        match v {
            Value::Func(c) => Ok(c),
            v => Err(format!("expected function, got {}", v.type_name())),
        }
    }
}

/// Conversion from a native return value into a [`Value`].
pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for () {
    fn into_value(self) -> Value {
        Value::Nil
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::Str(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::Str(self.to_owned())
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Num(self)
    }
}

impl IntoValue for usize {
    fn into_value(self) -> Value {
        Value::Num(self as f64)
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

// ── Callables ────────────────────────────────────────────────────────────────

type NativeBody = dyn Fn(Vec<Value>) -> Result<Value, String> + Send + Sync;

/// A host function with its argument descriptor.
pub struct NativeFn {
    name: String,
    signature: Signature,
    body: Box<NativeBody>,
}

impl NativeFn {
    pub fn new<F>(name: impl Into<String>, signature: Signature, body: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            signature,
            body: Box::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn invoke(&self, args: Vec<Value>) -> Result<Value, String> {
        (self.body)(args)
    }
}

/// Something a script can call.
#[derive(Clone)]
pub enum Callable {
    /// A host function.
    Native(Arc<NativeFn>),
    /// A script block captured as a handler (see [`ScriptBlock`]).
    Script(Arc<ScriptBlock>),
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Native(n) => write!(f, "Native({})", n.name()),
            Callable::Script(b) => write!(f, "Script({})", b.name()),
        }
    }
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Callable::Native(n) => n.name(),
            Callable::Script(b) => b.name(),
        }
    }

    pub fn signature(&self) -> &Signature {
        match self {
            Callable::Native(n) => n.signature(),
            Callable::Script(b) => b.signature(),
        }
    }

    pub fn ptr_eq(&self, other: &Callable) -> bool {
        match (self, other) {
            (Callable::Native(a), Callable::Native(b)) => Arc::ptr_eq(a, b),
            (Callable::Script(a), Callable::Script(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Invoke with arguments that already match the signature.
    ///
    /// Callers outside the dispatcher (e.g. the HTTP host) should go
    /// through [`Callable::call_checked`].
    pub fn call(&self, args: Vec<Value>) -> Result<Value, String> {
        match self {
            Callable::Native(n) => n.invoke(args),
            Callable::Script(b) => b.invoke(args),
        }
    }

    /// Marshal `args` against the signature, then invoke.
    pub fn call_checked(&self, args: Vec<Value>) -> Result<Value, String> {
        let args = self.signature().marshal(args)?;
        self.call(args)
    }

    pub fn native0<R, F>(name: &str, f: F) -> Self
    where
        R: IntoValue,
        F: Fn() -> Result<R, String> + Send + Sync + 'static,
    {
        let sig = Signature::fixed(Vec::new());
        Callable::Native(Arc::new(NativeFn::new(name, sig, move |_| {
            f().map(IntoValue::into_value)
        })))
    }

    pub fn native1<A, R, F>(name: &str, f: F) -> Self
    where
        A: FromValue,
        R: IntoValue,
        F: Fn(A) -> Result<R, String> + Send + Sync + 'static,
    {
        let sig = Signature::fixed(vec![A::PARAM]);
        Callable::Native(Arc::new(NativeFn::new(name, sig, move |args| {
            let mut it = args.into_iter();
            let a = A::from_value(it.next().unwrap_or_default())?;
            f(a).map(IntoValue::into_value)
        })))
    }

    pub fn native2<A, B, R, F>(name: &str, f: F) -> Self
    where
        A: FromValue,
        B: FromValue,
        R: IntoValue,
        F: Fn(A, B) -> Result<R, String> + Send + Sync + 'static,
    {
        let sig = Signature::fixed(vec![A::PARAM, B::PARAM]);
        Callable::Native(Arc::new(NativeFn::new(name, sig, move |args| {
            let mut it = args.into_iter();
            let a = A::from_value(it.next().unwrap_or_default())?;
            let b = B::from_value(it.next().unwrap_or_default())?;
            f(a, b).map(IntoValue::into_value)
        })))
    }

    pub fn native3<A, B, C, R, F>(name: &str, f: F) -> Self
    where
        A: FromValue,
        B: FromValue,
        C: FromValue,
        R: IntoValue,
        F: Fn(A, B, C) -> Result<R, String> + Send + Sync + 'static,
    {
        let sig = Signature::fixed(vec![A::PARAM, B::PARAM, C::PARAM]);
        Callable::Native(Arc::new(NativeFn::new(name, sig, move |args| {
            let mut it = args.into_iter();
            let a = A::from_value(it.next().unwrap_or_default())?;
            let b = B::from_value(it.next().unwrap_or_default())?;
            let c = C::from_value(it.next().unwrap_or_default())?;
            f(a, b, c).map(IntoValue::into_value)
        })))
    }

    /// A function taking any number of arguments of any type.
    pub fn variadic<F>(name: &str, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        let sig = Signature::variadic(ParamType::Any);
        Callable::Native(Arc::new(NativeFn::new(name, sig, f)))
    }
}

// ── Namespaces ───────────────────────────────────────────────────────────────

/// A named group of callables (`db.insert`, `server.Handle`, …).
#[derive(Debug, Clone)]
pub struct Namespace {
    name: String,
    members: BTreeMap<String, Callable>,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: BTreeMap::new(),
        }
    }

    /// Builder-style [`Namespace::insert`].
    pub fn with(mut self, member: impl Into<String>, f: Callable) -> Self {
        self.insert(member, f);
        self
    }

    pub fn insert(&mut self, member: impl Into<String>, f: Callable) {
        self.members.insert(member.into(), f);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, member: &str) -> Option<&Callable> {
        self.members.get(member)
    }

    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }
}

// ── Symbol table ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Symbol {
    Callable(Callable),
    Namespace(Arc<Namespace>),
}

/// Top-level names visible to scripts.  Filled by the host before a run and
/// shared read-only (behind an `Arc`) by every interpreter afterwards.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a top-level function.
    pub fn register_fn(&mut self, name: impl Into<String>, f: Callable) {
        self.entries.insert(name.into(), Symbol::Callable(f));
    }

    /// Register (or replace) a namespace under its own name.
    pub fn register_namespace(&mut self, ns: Namespace) {
        self.entries
            .insert(ns.name().to_owned(), Symbol::Namespace(Arc::new(ns)));
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_constructor_derives_signature() {
        let f = Callable::native2("join", |a: String, b: f64| Ok(format!("{a}{b}")));
        assert_eq!(
            f.signature(),
            &Signature::fixed(vec![ParamType::Str, ParamType::Num])
        );
        assert_eq!(f.signature().arity(), "2");
    }

    #[test]
    fn coerce_rules() {
        assert_eq!(ParamType::Str.coerce(Value::Num(4.0)), Ok(Value::Str("4".into())));
        assert_eq!(ParamType::Num.coerce(Value::Str("2.5".into())), Ok(Value::Num(2.5)));
        assert!(ParamType::Num.coerce(Value::Str("abc".into())).is_err());
        assert_eq!(ParamType::Bool.coerce(Value::Str("true".into())), Ok(Value::Bool(true)));
        assert!(ParamType::Func.coerce(Value::Str("f".into())).is_err());
        assert_eq!(ParamType::Any.coerce(Value::Nil), Ok(Value::Nil));
    }

    #[test]
    fn marshal_pads_and_drops() {
        let sig = Signature::fixed(vec![ParamType::Str, ParamType::Any]);
        assert_eq!(
            sig.marshal(vec![Value::Str("a".into())]).unwrap(),
            vec![Value::Str("a".into()), Value::Nil]
        );
        assert_eq!(
            sig.marshal(vec![Value::Str("a".into()), Value::Num(1.0), Value::Num(2.0)])
                .unwrap()
                .len(),
            2
        );
        assert!(sig.marshal(Vec::new()).is_err());
    }

    #[test]
    fn variadic_accepts_any_count() {
        let sig = Signature::variadic(ParamType::Any);
        assert!(sig.accepts(0));
        assert!(sig.accepts(5));
        assert_eq!(sig.arity(), "at least 0");
    }

    #[test]
    fn call_checked_runs_body() {
        let f = Callable::native1("double", |x: f64| Ok(x * 2.0));
        assert_eq!(f.call_checked(vec![Value::Str("21".into())]), Ok(Value::Num(42.0)));
        assert!(f.call_checked(vec![Value::Str("x".into())]).is_err());
    }

    #[test]
    fn namespace_lookup() {
        let ns = Namespace::new("db").with("ping", Callable::native0("db.ping", || Ok("pong")));
        let mut table = SymbolTable::new();
        table.register_namespace(ns);
        match table.get("db") {
            Some(Symbol::Namespace(ns)) => assert!(ns.get("ping").is_some()),
            other => panic!("expected namespace, got {other:?}"),
        }
        assert!(!table.contains("nope"));
    }
}
