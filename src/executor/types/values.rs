//! Runtime value types

use serde_json::{Map, Number, Value as JsonValue};
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use tokio::sync::Notify;

use super::ast::FunctionDef;
use super::control::EvalResult;
use crate::executor::scope::Scope;

pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Signature of every built-in and host-provided function
pub type NativeFn = dyn Fn(Vec<Val>) -> LocalBoxFuture<'static, EvalResult<Val>>;

/// Nesting limit for JSON conversion; deeper (or cyclic) data becomes null
const MAX_JSON_DEPTH: usize = 64;

/* ===================== Values ===================== */

/// Runtime value type
///
/// Lists and objects are shared references, like the script language's own
/// arrays and objects.
#[derive(Clone)]
pub enum Val {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    List(Rc<RefCell<Vec<Val>>>),
    Obj(Rc<RefCell<Object>>),
    Func(Rc<Function>),
    Promise(Rc<Promise>),
    /// Error value with kind and message
    Error(Rc<ErrorInfo>),
}

/// Insertion-ordered property map
#[derive(Debug, Clone, Default)]
pub struct Object {
    entries: Vec<(String, Val)>,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Val> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Val) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Val> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Val)> for Object {
    fn from_iter<I: IntoIterator<Item = (String, Val)>>(iter: I) -> Self {
        let mut object = Object::new();
        for (key, value) in iter {
            object.set(key, value);
        }
        object
    }
}

/* ===================== Functions ===================== */

pub enum Function {
    /// Script function with its captured scope
    Closure { def: Rc<FunctionDef>, scope: Scope },
    Native(NativeFunction),
}

pub struct NativeFunction {
    pub name: String,
    /// Non-awaited calls of async natives run as their own task
    pub is_async: bool,
    pub call: Rc<NativeFn>,
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::Closure { def, .. } => def.name.as_deref().unwrap_or(""),
            Function::Native(native) => &native.name,
        }
    }

    pub fn is_async(&self) -> bool {
        match self {
            Function::Closure { def, .. } => def.is_async,
            Function::Native(native) => native.is_async,
        }
    }
}

/* ===================== Promises ===================== */

/// Eventual result of an async function started without `await`
#[derive(Default)]
pub struct Promise {
    settled: RefCell<Option<EvalResult<Val>>>,
    notify: Notify,
}

impl Promise {
    pub fn new() -> Self {
        Self::default()
    }

    /// First settlement wins
    pub fn settle(&self, result: EvalResult<Val>) {
        {
            let mut settled = self.settled.borrow_mut();
            if settled.is_some() {
                return;
            }
            *settled = Some(result);
        }
        self.notify.notify_waiters();
    }

    pub fn is_settled(&self) -> bool {
        self.settled.borrow().is_some()
    }

    pub async fn wait(&self) -> EvalResult<Val> {
        loop {
            let notified = self.notify.notified();
            let current = self.settled.borrow().clone();
            if let Some(result) = current {
                return result;
            }
            notified.await;
        }
    }
}

/* ===================== Errors ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    ReferenceError,
    SyntaxError,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::SyntaxError => "SyntaxError",
        }
    }
}

/// Error value with kind and message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind.name())
        } else {
            write!(f, "{}: {}", self.kind.name(), self.message)
        }
    }
}

/* ===================== Operations ===================== */

impl Val {
    pub fn str(value: impl Into<String>) -> Self {
        Val::Str(value.into())
    }

    pub fn list(items: Vec<Val>) -> Self {
        Val::List(Rc::new(RefCell::new(items)))
    }

    pub fn object(object: Object) -> Self {
        Val::Obj(Rc::new(RefCell::new(object)))
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Val::Error(Rc::new(ErrorInfo::new(kind, message)))
    }

    /// Wrap a synchronous Rust closure as a callable value
    pub fn native<F>(name: &str, f: F) -> Self
    where
        F: Fn(Vec<Val>) -> EvalResult<Val> + 'static,
    {
        let call: Rc<NativeFn> = Rc::new(move |args| {
            let result = f(args);
            Box::pin(std::future::ready(result))
        });
        Val::Func(Rc::new(Function::Native(NativeFunction {
            name: name.to_string(),
            is_async: false,
            call,
        })))
    }

    /// Wrap an async Rust closure as a callable value
    pub fn native_async<F>(name: &str, f: F) -> Self
    where
        F: Fn(Vec<Val>) -> LocalBoxFuture<'static, EvalResult<Val>> + 'static,
    {
        Val::Func(Rc::new(Function::Native(NativeFunction {
            name: name.to_string(),
            is_async: true,
            call: Rc::new(f),
        })))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Val::Undefined | Val::Null)
    }

    /// Check if value is truthy (for conditionals)
    pub fn is_truthy(&self) -> bool {
        match self {
            Val::Undefined | Val::Null => false,
            Val::Bool(b) => *b,
            Val::Num(n) => *n != 0.0 && !n.is_nan(),
            Val::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Val::Undefined => "undefined",
            Val::Bool(_) => "boolean",
            Val::Num(_) => "number",
            Val::Str(_) => "string",
            Val::Func(_) => "function",
            Val::Null | Val::List(_) | Val::Obj(_) | Val::Promise(_) | Val::Error(_) => "object",
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Val::Undefined => f64::NAN,
            Val::Null => 0.0,
            Val::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Val::Num(n) => *n,
            Val::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            Val::List(items) => {
                let items = items.borrow();
                match items.as_slice() {
                    [] => 0.0,
                    [single] => single.to_number(),
                    _ => f64::NAN,
                }
            }
            _ => f64::NAN,
        }
    }

    /// String conversion as the script language's `String(value)`
    pub fn to_display(&self) -> String {
        match self {
            Val::Undefined => "undefined".to_string(),
            Val::Null => "null".to_string(),
            Val::Bool(b) => b.to_string(),
            Val::Num(n) => format_number(*n),
            Val::Str(s) => s.clone(),
            Val::List(items) => items
                .borrow()
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_display()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Val::Obj(_) => "[object Object]".to_string(),
            Val::Func(func) => format!("function {}() {{ [native code] }}", func.name()),
            Val::Promise(_) => "[object Promise]".to_string(),
            Val::Error(info) => info.to_string(),
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Val) -> bool {
        match (self, other) {
            (Val::Undefined, Val::Undefined) | (Val::Null, Val::Null) => true,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Num(a), Val::Num(b)) => a == b,
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::List(a), Val::List(b)) => Rc::ptr_eq(a, b),
            (Val::Obj(a), Val::Obj(b)) => Rc::ptr_eq(a, b),
            (Val::Func(a), Val::Func(b)) => Rc::ptr_eq(a, b),
            (Val::Promise(a), Val::Promise(b)) => Rc::ptr_eq(a, b),
            (Val::Error(a), Val::Error(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Val) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Val::Num(_), Val::Str(_))
            | (Val::Str(_), Val::Num(_))
            | (Val::Bool(_), _)
            | (_, Val::Bool(_)) => {
                let (a, b) = (self.to_number(), other.to_number());
                a == b
            }
            _ => self.strict_equals(other),
        }
    }

    /// Convert to JSON; functions and undefined become null
    pub fn to_json(&self) -> JsonValue {
        self.to_json_at(0)
    }

    fn to_json_at(&self, depth: usize) -> JsonValue {
        if depth > MAX_JSON_DEPTH {
            return JsonValue::Null;
        }
        match self {
            Val::Undefined | Val::Null | Val::Func(_) | Val::Promise(_) => JsonValue::Null,
            Val::Bool(b) => JsonValue::Bool(*b),
            Val::Num(n) => json_number(*n),
            Val::Str(s) => JsonValue::String(s.clone()),
            Val::List(items) => JsonValue::Array(
                items
                    .borrow()
                    .iter()
                    .map(|item| item.to_json_at(depth + 1))
                    .collect(),
            ),
            Val::Obj(object) => {
                let object = object.borrow();
                let mut map = Map::new();
                for (key, value) in object.entries.iter() {
                    if matches!(value, Val::Undefined | Val::Func(_)) {
                        continue;
                    }
                    map.insert(key.clone(), value.to_json_at(depth + 1));
                }
                JsonValue::Object(map)
            }
            Val::Error(info) => {
                let mut map = Map::new();
                map.insert("name".to_string(), JsonValue::from(info.kind.name()));
                map.insert("message".to_string(), JsonValue::from(info.message.clone()));
                JsonValue::Object(map)
            }
        }
    }

    pub fn from_json(value: &JsonValue) -> Val {
        match value {
            JsonValue::Null => Val::Null,
            JsonValue::Bool(b) => Val::Bool(*b),
            JsonValue::Number(n) => Val::Num(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => Val::Str(s.clone()),
            JsonValue::Array(items) => Val::list(items.iter().map(Val::from_json).collect()),
            JsonValue::Object(map) => Val::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Val::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Integral numbers serialize without a fraction; NaN and infinities become null
fn json_number(n: f64) -> JsonValue {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        JsonValue::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    }
}

pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        n.to_string()
    }
}

impl fmt::Debug for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Undefined => write!(f, "Undefined"),
            Val::Null => write!(f, "Null"),
            Val::Bool(b) => write!(f, "Bool({})", b),
            Val::Num(n) => write!(f, "Num({})", n),
            Val::Str(s) => write!(f, "Str({:?})", s),
            Val::List(items) => f.debug_tuple("List").field(&items.borrow()).finish(),
            Val::Obj(object) => f.debug_tuple("Obj").field(&object.borrow().entries).finish(),
            Val::Func(func) => write!(f, "Func({})", func.name()),
            Val::Promise(promise) => write!(f, "Promise(settled: {})", promise.is_settled()),
            Val::Error(info) => write!(f, "Error({})", info),
        }
    }
}

/// Structural equality, used by tests and by `includes`/`indexOf` for primitives
impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::List(a), Val::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Val::Obj(a), Val::Obj(b)) => {
                Rc::ptr_eq(a, b) || a.borrow().entries == b.borrow().entries
            }
            (Val::Error(a), Val::Error(b)) => a == b,
            _ => self.strict_equals(other),
        }
    }
}
