//! Expression evaluation
//!
//! Async tree walk over `Expr`. Calls of async script functions in awaited
//! position run inline; in any other position they are spawned on the local
//! task set and evaluate to a promise.

use std::cell::Cell;
use std::rc::Rc;

use super::scope::{AssignError, Scope};
use super::statements;
use super::stdlib::{array, string};
use super::types::ast::{AssignOp, BinaryOp, Expr, FunctionBody, LogicalOp, UnaryOp, UpdateOp};
use super::types::values::{format_number, LocalBoxFuture, Object, Promise};
use super::types::{Control, EvalResult, Function, Interrupt, Val};
use crate::parser::print_expr;

/// Nested script calls allowed on one task
pub const MAX_CALL_DEPTH: usize = 1_000;

/// Largest array length; indices at or past it are rejected
pub const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;

/// Holes one index assignment may open past the end of an array
const MAX_ARRAY_GAP: usize = 1_000_000;

tokio::task_local! {
    static CALL_DEPTH: Cell<usize>;
}

/* ===================== Entry Points ===================== */

/// Evaluate an expression to a value
pub fn eval_expr<'a>(expr: &'a Expr, scope: &'a Scope) -> LocalBoxFuture<'a, EvalResult<Val>> {
    Box::pin(async move {
        match expr {
            Expr::LitBool { v } => Ok(Val::Bool(*v)),

            Expr::LitNum { v } => Ok(Val::Num(*v)),

            Expr::LitStr { v } => Ok(Val::Str(v.clone())),

            Expr::LitNull => Ok(Val::Null),

            Expr::LitUndefined => Ok(Val::Undefined),

            Expr::Template { quasis, exprs } => {
                let mut out = String::new();
                for (i, quasi) in quasis.iter().enumerate() {
                    out.push_str(quasi);
                    if let Some(sub) = exprs.get(i) {
                        out.push_str(&eval_expr(sub, scope).await?.to_display());
                    }
                }
                Ok(Val::Str(out))
            }

            Expr::LitList { elements } => Ok(Val::list(eval_args(elements, scope).await?)),

            Expr::LitObj { properties } => {
                let mut object = Object::new();
                for (key, value_expr) in properties {
                    let value = eval_expr(value_expr, scope).await?;
                    object.set(key.clone(), value);
                }
                Ok(Val::object(object))
            }

            Expr::Ident { name } => scope
                .lookup(name)
                .ok_or_else(|| Interrupt::reference_error(format!("{} is not defined", name))),

            Expr::Member {
                object,
                property,
                optional,
            } => {
                let target = eval_expr(object, scope).await?;
                if *optional && target.is_nullish() {
                    return Ok(Val::Undefined);
                }
                get_property(&target, property)
            }

            Expr::Index { object, index } => {
                let target = eval_expr(object, scope).await?;
                let key = eval_expr(index, scope).await?;
                get_index(&target, &key)
            }

            Expr::Call { callee, args } => eval_call(callee, args, scope, false).await,

            Expr::New { callee, args } => {
                let constructor = eval_expr(callee, scope).await?;
                let arg_vals = eval_args(args, scope).await?;
                match &constructor {
                    Val::Func(func) if matches!(func.as_ref(), Function::Native(_)) => {
                        call_function(func, arg_vals).await
                    }
                    _ => Err(Interrupt::type_error(format!(
                        "{} is not a constructor",
                        print_expr(callee)
                    ))),
                }
            }

            Expr::Await { inner } => {
                let value = match inner.as_ref() {
                    Expr::Call { callee, args } => eval_call(callee, args, scope, true).await?,
                    other => eval_expr(other, scope).await?,
                };
                settle(value).await
            }

            Expr::Unary { op, operand } => {
                if *op == UnaryOp::Typeof {
                    if let Expr::Ident { name } = operand.as_ref() {
                        let value = scope.lookup(name).unwrap_or(Val::Undefined);
                        return Ok(Val::str(value.type_of()));
                    }
                }
                let value = eval_expr(operand, scope).await?;
                Ok(match op {
                    UnaryOp::Not => Val::Bool(!value.is_truthy()),
                    UnaryOp::Neg => Val::Num(-value.to_number()),
                    UnaryOp::Plus => Val::Num(value.to_number()),
                    UnaryOp::Typeof => Val::str(value.type_of()),
                })
            }

            Expr::Update { op, prefix, target } => {
                let old = eval_expr(target, scope).await?.to_number();
                let new = match op {
                    UpdateOp::Inc => old + 1.0,
                    UpdateOp::Dec => old - 1.0,
                };
                assign_to(target, Val::Num(new), scope).await?;
                Ok(Val::Num(if *prefix { new } else { old }))
            }

            Expr::Binary { op, left, right } => {
                let left = eval_expr(left, scope).await?;
                let right = eval_expr(right, scope).await?;
                Ok(binary_op(*op, &left, &right))
            }

            Expr::Logical { op, left, right } => {
                let left_val = eval_expr(left, scope).await?;
                let short_circuit = match op {
                    LogicalOp::And => !left_val.is_truthy(),
                    LogicalOp::Or => left_val.is_truthy(),
                    LogicalOp::Nullish => !left_val.is_nullish(),
                };
                if short_circuit {
                    Ok(left_val)
                } else {
                    eval_expr(right, scope).await
                }
            }

            Expr::Ternary {
                condition,
                consequent,
                alternate,
            } => {
                if eval_expr(condition, scope).await?.is_truthy() {
                    eval_expr(consequent, scope).await
                } else {
                    eval_expr(alternate, scope).await
                }
            }

            Expr::Assign { op, target, value } => {
                let rhs = eval_expr(value, scope).await?;
                let result = match op {
                    AssignOp::Assign => rhs,
                    compound => {
                        let current = eval_expr(target, scope).await?;
                        let bin = match compound {
                            AssignOp::Add => BinaryOp::Add,
                            AssignOp::Sub => BinaryOp::Sub,
                            AssignOp::Mul => BinaryOp::Mul,
                            _ => BinaryOp::Div,
                        };
                        binary_op(bin, &current, &rhs)
                    }
                };
                assign_to(target, result.clone(), scope).await?;
                Ok(result)
            }

            Expr::Function { func } => Ok(Val::Func(Rc::new(Function::Closure {
                def: func.clone(),
                scope: scope.clone(),
            }))),
        }
    })
}

pub async fn eval_args(args: &[Expr], scope: &Scope) -> EvalResult<Vec<Val>> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(eval_expr(arg, scope).await?);
    }
    Ok(values)
}

/// Resolve an awaited value: promises are waited on, anything else passes through
pub async fn settle(value: Val) -> EvalResult<Val> {
    match value {
        Val::Promise(promise) => promise.wait().await,
        other => Ok(other),
    }
}

/* ===================== Calls ===================== */

async fn eval_call(
    callee: &Expr,
    args: &[Expr],
    scope: &Scope,
    awaited: bool,
) -> EvalResult<Val> {
    if let Expr::Member {
        object,
        property,
        optional,
    } = callee
    {
        let receiver = eval_expr(object, scope).await?;
        if *optional && receiver.is_nullish() {
            return Ok(Val::Undefined);
        }
        let arg_vals = eval_args(args, scope).await?;

        match &receiver {
            Val::List(items) if array::has_method(property) => {
                return array::call_method(items.clone(), property, arg_vals).await;
            }
            Val::Str(text) if string::has_method(property) => {
                return string::call_method(text, property, arg_vals);
            }
            _ => {}
        }

        let func = get_property(&receiver, property)?;
        return call_value(&func, arg_vals, awaited, || print_expr(callee)).await;
    }

    let func = eval_expr(callee, scope).await?;
    let arg_vals = eval_args(args, scope).await?;
    call_value(&func, arg_vals, awaited, || print_expr(callee)).await
}

/// Call a value; non-awaited async functions are spawned and yield a promise
pub async fn call_value(
    func: &Val,
    args: Vec<Val>,
    awaited: bool,
    describe: impl FnOnce() -> String,
) -> EvalResult<Val> {
    let function = match func {
        Val::Func(function) => function.clone(),
        _ => {
            return Err(Interrupt::type_error(format!(
                "{} is not a function",
                describe()
            )))
        }
    };

    if !awaited && function.is_async() {
        let promise = Rc::new(Promise::new());
        let task_promise = promise.clone();
        tokio::task::spawn_local(async move {
            let result = call_function(&function, args).await;
            task_promise.settle(result);
        });
        return Ok(Val::Promise(promise));
    }

    call_function(&function, args).await
}

/// Run a function to completion on the current task
///
/// Script calls are counted per task; the first call on a task starts its
/// counter.
pub async fn call_function(function: &Rc<Function>, args: Vec<Val>) -> EvalResult<Val> {
    if CALL_DEPTH.try_with(|_| ()).is_err() {
        return CALL_DEPTH
            .scope(Cell::new(0), call_counted(function, args))
            .await;
    }
    call_counted(function, args).await
}

async fn call_counted(function: &Rc<Function>, args: Vec<Val>) -> EvalResult<Val> {
    if let Function::Native(native) = function.as_ref() {
        return (native.call)(args).await;
    }

    let depth = CALL_DEPTH.try_with(Cell::get).unwrap_or(0);
    if depth >= MAX_CALL_DEPTH {
        return Err(Interrupt::range_error("Maximum call stack size exceeded"));
    }
    let _ = CALL_DEPTH.try_with(|current| current.set(depth + 1));
    let result = call_closure(function, args).await;
    let _ = CALL_DEPTH.try_with(|current| current.set(depth));
    result
}

async fn call_closure(function: &Rc<Function>, args: Vec<Val>) -> EvalResult<Val> {
    match function.as_ref() {
        Function::Native(native) => (native.call)(args).await,
        Function::Closure { def, scope } => {
            let frame = scope.function_child();
            for (i, param) in def.params.iter().enumerate() {
                frame.define(param, args.get(i).cloned().unwrap_or(Val::Undefined));
            }
            if let Some(rest) = &def.rest {
                let rest_vals = args.iter().skip(def.params.len()).cloned().collect();
                frame.define(rest, Val::list(rest_vals));
            }

            match &def.body {
                FunctionBody::Expr { expr } => eval_expr(expr, &frame).await,
                FunctionBody::Block { body } => {
                    statements::hoist_functions(body, &frame);
                    match statements::exec_stmts(body, &frame).await? {
                        Control::Return(value) => Ok(value),
                        _ => Ok(Val::Undefined),
                    }
                }
            }
        }
    }
}

/* ===================== Properties ===================== */

fn nullish_name(value: &Val) -> &'static str {
    if matches!(value, Val::Null) {
        "null"
    } else {
        "undefined"
    }
}

fn list_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse::<usize>().ok()
}

pub fn get_property(target: &Val, property: &str) -> EvalResult<Val> {
    match target {
        Val::Undefined | Val::Null => Err(Interrupt::type_error(format!(
            "Cannot read properties of {} (reading '{}')",
            nullish_name(target),
            property
        ))),
        Val::List(items) => {
            let items = items.borrow();
            if property == "length" {
                return Ok(Val::Num(items.len() as f64));
            }
            Ok(list_index(property)
                .and_then(|i| items.get(i).cloned())
                .unwrap_or(Val::Undefined))
        }
        Val::Str(text) => {
            if property == "length" {
                return Ok(Val::Num(text.chars().count() as f64));
            }
            Ok(list_index(property)
                .and_then(|i| text.chars().nth(i))
                .map(|c| Val::Str(c.to_string()))
                .unwrap_or(Val::Undefined))
        }
        Val::Obj(object) => Ok(object
            .borrow()
            .get(property)
            .cloned()
            .unwrap_or(Val::Undefined)),
        Val::Error(info) => Ok(match property {
            "name" => Val::str(info.kind.name()),
            "message" => Val::str(info.message.clone()),
            _ => Val::Undefined,
        }),
        Val::Func(func) if property == "name" => Ok(Val::str(func.name())),
        _ => Ok(Val::Undefined),
    }
}

fn property_key(key: &Val) -> String {
    match key {
        Val::Num(n) => format_number(*n),
        other => other.to_display(),
    }
}

pub fn get_index(target: &Val, key: &Val) -> EvalResult<Val> {
    get_property(target, &property_key(key))
}

pub fn set_property(target: &Val, property: &str, value: Val) -> EvalResult<()> {
    match target {
        Val::Undefined | Val::Null => Err(Interrupt::type_error(format!(
            "Cannot set properties of {} (setting '{}')",
            nullish_name(target),
            property
        ))),
        Val::Obj(object) => {
            object.borrow_mut().set(property, value);
            Ok(())
        }
        Val::List(items) => {
            if let Some(index) = list_index(property) {
                let mut items = items.borrow_mut();
                if index >= items.len() {
                    if index >= MAX_ARRAY_LENGTH || index - items.len() > MAX_ARRAY_GAP {
                        return Err(Interrupt::range_error("Invalid array length"));
                    }
                    items.resize(index + 1, Val::Undefined);
                }
                items[index] = value;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

async fn assign_to(target: &Expr, value: Val, scope: &Scope) -> EvalResult<()> {
    match target {
        Expr::Ident { name } => scope.assign(name, value).map_err(|err| match err {
            AssignError::NotDefined => Interrupt::reference_error(format!("{} is not defined", name)),
            AssignError::Constant => Interrupt::type_error("Assignment to constant variable."),
        }),
        Expr::Member {
            object, property, ..
        } => {
            let target = eval_expr(object, scope).await?;
            set_property(&target, property, value)
        }
        Expr::Index { object, index } => {
            let target = eval_expr(object, scope).await?;
            let key = eval_expr(index, scope).await?;
            set_property(&target, &property_key(&key), value)
        }
        _ => Err(Interrupt::error(
            super::types::ErrorKind::SyntaxError,
            "Invalid assignment target",
        )),
    }
}

/* ===================== Operators ===================== */

fn is_stringish(value: &Val) -> bool {
    matches!(
        value,
        Val::Str(_) | Val::List(_) | Val::Obj(_) | Val::Error(_) | Val::Func(_) | Val::Promise(_)
    )
}

fn compare(left: &Val, right: &Val) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Val::Str(a), Val::Str(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    }
}

pub fn binary_op(op: BinaryOp, left: &Val, right: &Val) -> Val {
    use std::cmp::Ordering;

    match op {
        BinaryOp::Add => {
            if is_stringish(left) || is_stringish(right) {
                Val::Str(format!("{}{}", left.to_display(), right.to_display()))
            } else {
                Val::Num(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => Val::Num(left.to_number() - right.to_number()),
        BinaryOp::Mul => Val::Num(left.to_number() * right.to_number()),
        BinaryOp::Div => Val::Num(left.to_number() / right.to_number()),
        BinaryOp::Mod => Val::Num(left.to_number() % right.to_number()),
        BinaryOp::Eq => Val::Bool(left.loose_equals(right)),
        BinaryOp::Ne => Val::Bool(!left.loose_equals(right)),
        BinaryOp::StrictEq => Val::Bool(left.strict_equals(right)),
        BinaryOp::StrictNe => Val::Bool(!left.strict_equals(right)),
        BinaryOp::Lt => Val::Bool(compare(left, right) == Some(Ordering::Less)),
        BinaryOp::Lte => Val::Bool(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Gt => Val::Bool(compare(left, right) == Some(Ordering::Greater)),
        BinaryOp::Gte => Val::Bool(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
    }
}
