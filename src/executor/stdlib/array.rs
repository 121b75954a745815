//! Array methods
//!
//! The higher-order methods call their callback once per element, in order,
//! and wait for each result before moving on. Checkpoints reached inside a
//! callback therefore fire in element order.

use std::cell::RefCell;
use std::rc::Rc;

use crate::executor::expressions::{call_value, settle};
use crate::executor::types::{EvalResult, Interrupt, Val};

const METHODS: &[&str] = &[
    "push", "pop", "includes", "indexOf", "join", "slice", "concat", "map", "filter", "reduce",
    "forEach", "find", "some", "every",
];

pub fn has_method(name: &str) -> bool {
    METHODS.contains(&name)
}

type Items = Rc<RefCell<Vec<Val>>>;

fn arg(args: &[Val], index: usize) -> Val {
    args.get(index).cloned().unwrap_or(Val::Undefined)
}

fn item_at(items: &Items, index: usize) -> Option<Val> {
    items.borrow().get(index).cloned()
}

/// Resolve a relative slice bound against `len`
fn relative_index(value: &Val, len: usize, default: usize) -> usize {
    if matches!(value, Val::Undefined) {
        return default;
    }
    let n = value.to_number();
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        (n as usize).min(len)
    }
}

async fn call_back(callback: &Val, items: &Items, index: usize, item: Val) -> EvalResult<Val> {
    let args = vec![item, Val::Num(index as f64), Val::List(items.clone())];
    let result = call_value(callback, args, true, || "callback".to_string()).await?;
    settle(result).await
}

pub async fn call_method(items: Items, method: &str, args: Vec<Val>) -> EvalResult<Val> {
    match method {
        "push" => {
            let mut list = items.borrow_mut();
            list.extend(args);
            Ok(Val::Num(list.len() as f64))
        }
        "pop" => Ok(items.borrow_mut().pop().unwrap_or(Val::Undefined)),
        "includes" => {
            let needle = arg(&args, 0);
            let found = items
                .borrow()
                .iter()
                .any(|v| v.strict_equals(&needle) || (is_nan(v) && is_nan(&needle)));
            Ok(Val::Bool(found))
        }
        "indexOf" => {
            let needle = arg(&args, 0);
            let position = items.borrow().iter().position(|v| v.strict_equals(&needle));
            Ok(Val::Num(position.map(|p| p as f64).unwrap_or(-1.0)))
        }
        "join" => {
            let separator = match arg(&args, 0) {
                Val::Undefined => ",".to_string(),
                other => other.to_display(),
            };
            let joined = items
                .borrow()
                .iter()
                .map(|v| if v.is_nullish() { String::new() } else { v.to_display() })
                .collect::<Vec<_>>()
                .join(&separator);
            Ok(Val::Str(joined))
        }
        "slice" => {
            let list = items.borrow();
            let start = relative_index(&arg(&args, 0), list.len(), 0);
            let end = relative_index(&arg(&args, 1), list.len(), list.len());
            let sliced = if start < end {
                list[start..end].to_vec()
            } else {
                vec![]
            };
            Ok(Val::list(sliced))
        }
        "concat" => {
            let mut joined = items.borrow().clone();
            for value in args {
                match value {
                    Val::List(other) => joined.extend(other.borrow().iter().cloned()),
                    other => joined.push(other),
                }
            }
            Ok(Val::list(joined))
        }
        "map" => {
            let callback = arg(&args, 0);
            let mut mapped = Vec::new();
            let mut index = 0;
            while let Some(item) = item_at(&items, index) {
                mapped.push(call_back(&callback, &items, index, item).await?);
                index += 1;
            }
            Ok(Val::list(mapped))
        }
        "filter" => {
            let callback = arg(&args, 0);
            let mut kept = Vec::new();
            let mut index = 0;
            while let Some(item) = item_at(&items, index) {
                if call_back(&callback, &items, index, item.clone())
                    .await?
                    .is_truthy()
                {
                    kept.push(item);
                }
                index += 1;
            }
            Ok(Val::list(kept))
        }
        "forEach" => {
            let callback = arg(&args, 0);
            let mut index = 0;
            while let Some(item) = item_at(&items, index) {
                call_back(&callback, &items, index, item).await?;
                index += 1;
            }
            Ok(Val::Undefined)
        }
        "find" | "some" | "every" => {
            let callback = arg(&args, 0);
            let mut index = 0;
            while let Some(item) = item_at(&items, index) {
                let hit = call_back(&callback, &items, index, item.clone())
                    .await?
                    .is_truthy();
                match (method, hit) {
                    ("find", true) => return Ok(item),
                    ("some", true) => return Ok(Val::Bool(true)),
                    ("every", false) => return Ok(Val::Bool(false)),
                    _ => {}
                }
                index += 1;
            }
            Ok(match method {
                "find" => Val::Undefined,
                "some" => Val::Bool(false),
                _ => Val::Bool(true),
            })
        }
        "reduce" => {
            let callback = arg(&args, 0);
            let mut index = 0;
            let mut acc = match args.get(1) {
                Some(initial) => initial.clone(),
                None => match item_at(&items, 0) {
                    Some(first) => {
                        index = 1;
                        first
                    }
                    None => {
                        return Err(Interrupt::type_error(
                            "Reduce of empty array with no initial value",
                        ))
                    }
                },
            };
            while let Some(item) = item_at(&items, index) {
                let call_args = vec![acc, item, Val::Num(index as f64), Val::List(items.clone())];
                let result = call_value(&callback, call_args, true, || "callback".to_string()).await?;
                acc = settle(result).await?;
                index += 1;
            }
            Ok(acc)
        }
        other => Err(Interrupt::type_error(format!(
            "array.{} is not a function",
            other
        ))),
    }
}

fn is_nan(value: &Val) -> bool {
    matches!(value, Val::Num(n) if n.is_nan())
}
