//! Isolated evaluation of script text against a bindings object
//!
//! A sandbox owns one global scope made of the prelude plus the caller's
//! bindings. Nothing else is reachable from evaluated text. All evaluation
//! must happen inside a `tokio::task::LocalSet`, since non-awaited async
//! calls are spawned onto it.

use super::expressions::{call_value, eval_expr, settle};
use super::scope::Scope;
use super::statements::{exec_stmt, hoist_functions};
use super::stdlib::install_prelude;
use super::types::{Control, ErrorKind, EvalResult, Interrupt, Program, Stmt, Val};
use crate::parser::parse_program;

pub struct Sandbox {
    globals: Scope,
}

impl Sandbox {
    /// Build a sandbox; later bindings shadow earlier ones and the prelude
    pub fn new(bindings: impl IntoIterator<Item = (String, Val)>) -> Self {
        let globals = Scope::root();
        install_prelude(&globals);
        for (name, value) in bindings {
            globals.define(&name, value);
        }
        Self { globals }
    }

    pub fn globals(&self) -> &Scope {
        &self.globals
    }

    /// Parse and run `text`, returning the value of its last expression statement
    ///
    /// Parse failures surface as a thrown `SyntaxError` value.
    pub async fn evaluate(&self, text: &str) -> EvalResult<Val> {
        let program = parse_program(text)
            .map_err(|err| Interrupt::error(ErrorKind::SyntaxError, err.message()))?;
        self.execute(&program).await
    }

    pub async fn execute(&self, program: &Program) -> EvalResult<Val> {
        hoist_functions(&program.body, &self.globals);

        let mut completion = Val::Undefined;
        for stmt in &program.body {
            match stmt {
                Stmt::Expr { expr } => completion = eval_expr(expr, &self.globals).await?,
                other => match exec_stmt(other, &self.globals).await? {
                    Control::Normal => {}
                    _ => break,
                },
            }
        }
        Ok(completion)
    }
}

/// Invoke a callable value to completion, waiting on any promise it returns
pub async fn invoke(callable: &Val, args: Vec<Val>) -> EvalResult<Val> {
    let result = call_value(callable, args, true, || callable.to_display()).await?;
    settle(result).await
}
