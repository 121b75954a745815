//! String methods

use crate::executor::types::{EvalResult, Interrupt, Val};

const METHODS: &[&str] = &[
    "toUpperCase",
    "toLowerCase",
    "includes",
    "split",
    "trim",
    "startsWith",
    "endsWith",
];

pub fn has_method(name: &str) -> bool {
    METHODS.contains(&name)
}

fn arg_text(args: &[Val], index: usize) -> String {
    args.get(index)
        .map(|value| value.to_display())
        .unwrap_or_else(|| "undefined".to_string())
}

pub fn call_method(text: &str, method: &str, args: Vec<Val>) -> EvalResult<Val> {
    match method {
        "toUpperCase" => Ok(Val::Str(text.to_uppercase())),
        "toLowerCase" => Ok(Val::Str(text.to_lowercase())),
        "trim" => Ok(Val::str(text.trim())),
        "includes" => Ok(Val::Bool(text.contains(&arg_text(&args, 0)))),
        "startsWith" => Ok(Val::Bool(text.starts_with(&arg_text(&args, 0)))),
        "endsWith" => Ok(Val::Bool(text.ends_with(&arg_text(&args, 0)))),
        "split" => {
            let parts = match args.first() {
                None | Some(Val::Undefined) => vec![Val::str(text)],
                Some(separator) => {
                    let separator = separator.to_display();
                    if separator.is_empty() {
                        text.chars().map(|c| Val::Str(c.to_string())).collect()
                    } else {
                        text.split(separator.as_str()).map(Val::str).collect()
                    }
                }
            };
            Ok(Val::list(parts))
        }
        other => Err(Interrupt::type_error(format!(
            "string.{} is not a function",
            other
        ))),
    }
}
