//! Language prelude
//!
//! Built-ins every sandbox starts with, before caller bindings are layered on:
//! error constructors, conversion functions, `Math`, `Object`, `JSON`, and
//! the per-type methods in [`array`] and [`string`].

pub mod array;
pub mod string;

use super::scope::Scope;
use super::types::{ErrorKind, EvalResult, Interrupt, Object, Val};

fn arg(args: &[Val], index: usize) -> Val {
    args.get(index).cloned().unwrap_or(Val::Undefined)
}

fn error_constructor(kind: ErrorKind) -> Val {
    Val::native(kind.name(), move |args| {
        let message = match arg(&args, 0) {
            Val::Undefined => String::new(),
            other => other.to_display(),
        };
        Ok(Val::error(kind, message))
    })
}

fn math_unary(name: &str, f: fn(f64) -> f64) -> (String, Val) {
    (
        name.to_string(),
        Val::native(name, move |args| Ok(Val::Num(f(arg(&args, 0).to_number())))),
    )
}

fn math_fold(name: &str, init: f64, f: fn(f64, f64) -> f64) -> (String, Val) {
    (
        name.to_string(),
        Val::native(name, move |args| {
            let mut acc = init;
            for value in &args {
                let n = value.to_number();
                if n.is_nan() {
                    return Ok(Val::Num(f64::NAN));
                }
                acc = f(acc, n);
            }
            Ok(Val::Num(acc))
        }),
    )
}

fn math_object() -> Val {
    let mut entries = vec![
        math_unary("floor", f64::floor),
        math_unary("ceil", f64::ceil),
        // Half-way cases round toward +Infinity
        math_unary("round", |n| (n + 0.5).floor()),
        math_unary("abs", f64::abs),
        math_unary("sqrt", f64::sqrt),
        math_fold("min", f64::INFINITY, f64::min),
        math_fold("max", f64::NEG_INFINITY, f64::max),
        (
            "pow".to_string(),
            Val::native("pow", |args| {
                Ok(Val::Num(
                    arg(&args, 0).to_number().powf(arg(&args, 1).to_number()),
                ))
            }),
        ),
    ];
    entries.push(("PI".to_string(), Val::Num(std::f64::consts::PI)));
    Val::object(entries.into_iter().collect())
}

fn object_object() -> Val {
    let keys = Val::native("keys", |args| match arg(&args, 0) {
        Val::Obj(object) => Ok(Val::list(
            object.borrow().keys().map(|k| Val::Str(k.clone())).collect(),
        )),
        Val::List(items) => Ok(Val::list(
            (0..items.borrow().len())
                .map(|i| Val::Str(i.to_string()))
                .collect(),
        )),
        other if other.is_nullish() => Err(Interrupt::type_error(
            "Cannot convert undefined or null to object",
        )),
        _ => Ok(Val::list(vec![])),
    });
    let values = Val::native("values", |args| match arg(&args, 0) {
        Val::Obj(object) => Ok(Val::list(object.borrow().values().cloned().collect())),
        Val::List(items) => Ok(Val::list(items.borrow().clone())),
        other if other.is_nullish() => Err(Interrupt::type_error(
            "Cannot convert undefined or null to object",
        )),
        _ => Ok(Val::list(vec![])),
    });

    let mut object = Object::new();
    object.set("keys", keys);
    object.set("values", values);
    Val::object(object)
}

fn json_object() -> Val {
    let stringify = Val::native("stringify", |args| -> EvalResult<Val> {
        match arg(&args, 0) {
            Val::Undefined | Val::Func(_) => Ok(Val::Undefined),
            value => Ok(Val::Str(value.to_json().to_string())),
        }
    });

    let mut object = Object::new();
    object.set("stringify", stringify);
    Val::object(object)
}

fn array_object() -> Val {
    let is_array = Val::native("isArray", |args| {
        Ok(Val::Bool(matches!(arg(&args, 0), Val::List(_))))
    });

    let mut object = Object::new();
    object.set("isArray", is_array);
    Val::object(object)
}

/// Bind the prelude into a (global) scope
pub fn install_prelude(scope: &Scope) {
    for kind in [
        ErrorKind::Error,
        ErrorKind::TypeError,
        ErrorKind::RangeError,
        ErrorKind::ReferenceError,
        ErrorKind::SyntaxError,
    ] {
        scope.define(kind.name(), error_constructor(kind));
    }

    scope.define(
        "String",
        Val::native("String", |args| {
            Ok(Val::Str(match args.first() {
                Some(value) => value.to_display(),
                None => String::new(),
            }))
        }),
    );
    scope.define(
        "Number",
        Val::native("Number", |args| {
            Ok(Val::Num(match args.first() {
                Some(value) => value.to_number(),
                None => 0.0,
            }))
        }),
    );
    scope.define(
        "Boolean",
        Val::native("Boolean", |args| {
            Ok(Val::Bool(arg(&args, 0).is_truthy()))
        }),
    );

    scope.define("NaN", Val::Num(f64::NAN));
    scope.define("Infinity", Val::Num(f64::INFINITY));
    scope.define("Math", math_object());
    scope.define("Object", object_object());
    scope.define("JSON", json_object());
    scope.define("Array", array_object());
}
