//! Instrumentation pass
//!
//! Source-to-source rewrite that makes a program controllable:
//! - a checkpoint `await step(`<text>`)` precedes every statement except
//!   function declarations, carrying the statement's own text,
//! - every function becomes `async` and every call is awaited,
//! - the whole body is wrapped in `async function __main__() { .. }`
//!   followed by `__main__;`, so evaluating the output yields the entry
//!   point instead of running it.
//!
//! Re-running the pass on its own output changes nothing.

use std::rc::Rc;
use tracing::debug;

use crate::executor::types::ast::{Expr, FunctionBody, FunctionDef, Program, Stmt};
use crate::parser::transform::{walk_expr, walk_function, walk_stmt, walk_stmts, Transform};
use crate::parser::{parse_program, print_expr, print_program, print_stmt, ParseError};


/// Name of the checkpoint capability called by instrumented code
pub const CHECKPOINT_FN: &str = "step";

/// Name of the wrapper function holding the instrumented body
pub const ENTRY_POINT: &str = "__main__";

/* ===================== Public API ===================== */

/// Instrument program text. Parse failures abort with no output.
pub fn instrument(source: &str) -> Result<String, ParseError> {
    let program = parse_program(source)?;
    let instrumented = instrument_program(program);
    debug!(
        statements = instrumented.body.len(),
        "instrumented program"
    );
    Ok(print_program(&instrumented))
}

pub fn instrument_program(program: Program) -> Program {
    let body = match unwrap_entry(&program) {
        Some(body) => body,
        None => program.body,
    };

    let entry = FunctionDef {
        name: Some(ENTRY_POINT.to_string()),
        params: vec![],
        rest: None,
        body: FunctionBody::Block {
            body: Instrumenter.stmts(body),
        },
        is_async: true,
        is_arrow: false,
    };

    Program {
        body: vec![
            Stmt::Function {
                func: Rc::new(entry),
            },
            Stmt::Expr {
                expr: Expr::ident(ENTRY_POINT),
            },
        ],
    }
}

/// Whether a statement is a checkpoint call
pub fn is_checkpoint(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Expr {
            expr: Expr::Await { inner },
        } => inner.called_name() == Some(CHECKPOINT_FN),
        Stmt::Expr { expr } => expr.called_name() == Some(CHECKPOINT_FN),
        _ => false,
    }
}

/// Remove checkpoint statements at every depth
pub fn strip_checkpoints(stmt: Stmt) -> Stmt {
    StripCheckpoints.stmt(stmt)
}

/* ===================== Internals ===================== */

/// Body of an already wrapped program
fn unwrap_entry(program: &Program) -> Option<Vec<Stmt>> {
    match program.body.as_slice() {
        [Stmt::Function { func }, Stmt::Expr {
            expr: Expr::Ident { name },
        }] if name == ENTRY_POINT && func.name.as_deref() == Some(ENTRY_POINT) => {
            match &func.body {
                FunctionBody::Block { body } => Some(body.clone()),
                FunctionBody::Expr { .. } => None,
            }
        }
        _ => None,
    }
}

fn checkpoint(text: String) -> Stmt {
    let call = Expr::call(
        Expr::ident(CHECKPOINT_FN),
        vec![Expr::Template {
            quasis: vec![text],
            exprs: vec![],
        }],
    );
    Stmt::Expr {
        expr: Expr::awaited(call),
    }
}

fn needs_checkpoint(stmt: &Stmt) -> bool {
    !matches!(
        stmt,
        Stmt::Function { .. }
            | Stmt::Empty
            | Stmt::Expr {
                expr: Expr::Function { .. }
            }
    )
}

fn into_block(stmt: Box<Stmt>) -> Box<Stmt> {
    match *stmt {
        block @ Stmt::Block { .. } => Box::new(block),
        other => Box::new(Stmt::Block { body: vec![other] }),
    }
}

struct StripCheckpoints;

impl Transform for StripCheckpoints {
    fn stmts(&mut self, stmts: Vec<Stmt>) -> Vec<Stmt> {
        let kept = stmts.into_iter().filter(|s| !is_checkpoint(s)).collect();
        walk_stmts(self, kept)
    }
}

struct Instrumenter;

impl Transform for Instrumenter {
    fn stmts(&mut self, stmts: Vec<Stmt>) -> Vec<Stmt> {
        let mut out: Vec<Stmt> = Vec::with_capacity(stmts.len() * 2);

        for stmt in stmts {
            if is_checkpoint(&stmt) {
                out.push(stmt);
                continue;
            }

            let preceded = out.last().map(is_checkpoint).unwrap_or(false);
            if needs_checkpoint(&stmt) && !preceded {
                let text = print_stmt(&strip_checkpoints(stmt.clone()));
                out.push(checkpoint(text));
            }
            out.push(self.stmt(stmt));
        }

        out
    }

    fn stmt(&mut self, stmt: Stmt) -> Stmt {
        let normalized = match stmt {
            Stmt::If {
                test,
                then_s,
                else_s,
            } => Stmt::If {
                test,
                then_s: into_block(then_s),
                // `else if` chains stay flat
                else_s: else_s.map(|s| match *s {
                    chained @ Stmt::If { .. } => Box::new(chained),
                    other => into_block(Box::new(other)),
                }),
            },
            Stmt::While { test, body } => Stmt::While {
                test,
                body: into_block(body),
            },
            Stmt::For {
                init,
                test,
                update,
                body,
            } => Stmt::For {
                init,
                test,
                update,
                body: into_block(body),
            },
            Stmt::ForLoop {
                kind,
                var_kind,
                binding,
                iterable,
                body,
            } => Stmt::ForLoop {
                kind,
                var_kind,
                binding,
                iterable,
                body: into_block(body),
            },
            other => other,
        };
        walk_stmt(self, normalized)
    }

    fn expr(&mut self, expr: Expr) -> Expr {
        match expr {
            Expr::Await { inner } => match *inner {
                // Already awaited: transform the call's parts only
                call @ Expr::Call { .. } => Expr::awaited(walk_expr(self, call)),
                other => Expr::awaited(self.expr(other)),
            },
            call @ Expr::Call { .. } => Expr::awaited(walk_expr(self, call)),
            other => walk_expr(self, other),
        }
    }

    fn function(&mut self, func: FunctionDef) -> FunctionDef {
        let body = match func.body {
            FunctionBody::Expr { expr } => {
                let text = print_expr(&StripCheckpoints.expr(expr.as_ref().clone()));
                FunctionBody::Block {
                    body: vec![checkpoint(text), Stmt::Return { value: Some(*expr) }],
                }
            }
            block => block,
        };

        walk_function(
            self,
            FunctionDef {
                is_async: true,
                body,
                ..func
            },
        )
    }
}
