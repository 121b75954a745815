//! Statement execution

use std::rc::Rc;

use super::expressions::{eval_expr, get_property};
use super::scope::Scope;
use super::types::ast::{DeclareTarget, ForLoopKind, Stmt, VarKind};
use super::types::values::LocalBoxFuture;
use super::types::{Control, EvalResult, Function, Interrupt, Val};

/// Bind the function declarations of a statement list before it runs
pub fn hoist_functions(stmts: &[Stmt], scope: &Scope) {
    for stmt in stmts {
        if let Stmt::Function { func } = stmt {
            if let Some(name) = &func.name {
                let closure = Function::Closure {
                    def: func.clone(),
                    scope: scope.clone(),
                };
                scope.define(name, Val::Func(Rc::new(closure)));
            }
        }
    }
}

/// Execute statements in order, stopping at the first abrupt completion
pub async fn exec_stmts(stmts: &[Stmt], scope: &Scope) -> EvalResult<Control> {
    for stmt in stmts {
        match exec_stmt(stmt, scope).await? {
            Control::Normal => {}
            other => return Ok(other),
        }
    }
    Ok(Control::Normal)
}

/// Loop body outcome: `None` keeps iterating
fn loop_control(control: Control) -> Option<Control> {
    match control {
        Control::Normal | Control::Continue => None,
        Control::Break => Some(Control::Normal),
        Control::Return(value) => Some(Control::Return(value)),
    }
}

pub fn exec_stmt<'a>(stmt: &'a Stmt, scope: &'a Scope) -> LocalBoxFuture<'a, EvalResult<Control>> {
    Box::pin(async move {
        match stmt {
            Stmt::Block { body } => {
                let block_scope = scope.child();
                hoist_functions(body, &block_scope);
                exec_stmts(body, &block_scope).await
            }

            Stmt::Declare {
                var_kind,
                declarations,
            } => {
                for declarator in declarations {
                    let value = match &declarator.init {
                        Some(init) => eval_expr(init, scope).await?,
                        None => Val::Undefined,
                    };
                    match &declarator.target {
                        DeclareTarget::Simple { name } => scope.declare(name, value, *var_kind),
                        DeclareTarget::Destructure { names } => {
                            for name in names {
                                let field = get_property(&value, name)?;
                                scope.declare(name, field, *var_kind);
                            }
                        }
                    }
                }
                Ok(Control::Normal)
            }

            // Bound by hoist_functions when the enclosing list was entered
            Stmt::Function { .. } => Ok(Control::Normal),

            Stmt::If {
                test,
                then_s,
                else_s,
            } => {
                if eval_expr(test, scope).await?.is_truthy() {
                    exec_stmt(then_s, scope).await
                } else if let Some(else_s) = else_s {
                    exec_stmt(else_s, scope).await
                } else {
                    Ok(Control::Normal)
                }
            }

            Stmt::While { test, body } => {
                while eval_expr(test, scope).await?.is_truthy() {
                    if let Some(done) = loop_control(exec_stmt(body, scope).await?) {
                        return Ok(done);
                    }
                }
                Ok(Control::Normal)
            }

            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                let loop_scope = scope.child();
                if let Some(init) = init {
                    exec_stmt(init, &loop_scope).await?;
                }
                loop {
                    if let Some(test) = test {
                        if !eval_expr(test, &loop_scope).await?.is_truthy() {
                            break;
                        }
                    }
                    if let Some(done) = loop_control(exec_stmt(body, &loop_scope).await?) {
                        return Ok(done);
                    }
                    if let Some(update) = update {
                        eval_expr(update, &loop_scope).await?;
                    }
                }
                Ok(Control::Normal)
            }

            Stmt::ForLoop {
                kind,
                var_kind,
                binding,
                iterable,
                body,
            } => {
                let source = eval_expr(iterable, scope).await?;
                let items = iteration_items(*kind, &source)?;
                for item in items {
                    let iteration_scope = scope.child();
                    iteration_scope.declare(binding, item, *var_kind);
                    if let Some(done) = loop_control(exec_stmt(body, &iteration_scope).await?) {
                        return Ok(done);
                    }
                }
                Ok(Control::Normal)
            }

            Stmt::Return { value } => {
                let value = match value {
                    Some(expr) => eval_expr(expr, scope).await?,
                    None => Val::Undefined,
                };
                Ok(Control::Return(value))
            }

            Stmt::Throw { value } => Err(Interrupt::Throw(eval_expr(value, scope).await?)),

            Stmt::Try {
                body,
                catch_var,
                catch_body,
                finally_body,
            } => {
                let result = exec_stmt(body, scope).await;

                let result = match (result, catch_body) {
                    (Err(Interrupt::Throw(thrown)), Some(catch_body)) => {
                        let catch_scope = scope.child();
                        if let Some(var) = catch_var {
                            catch_scope.declare(var, thrown, VarKind::Let);
                        }
                        exec_stmt(catch_body, &catch_scope).await
                    }
                    (other, _) => other,
                };

                // A halted run skips finally blocks
                if matches!(result, Err(Interrupt::Halt)) {
                    return result;
                }

                if let Some(finally_body) = finally_body {
                    match exec_stmt(finally_body, scope).await? {
                        Control::Normal => {}
                        abrupt => return Ok(abrupt),
                    }
                }
                result
            }

            Stmt::Expr { expr } => {
                eval_expr(expr, scope).await?;
                Ok(Control::Normal)
            }

            Stmt::Break => Ok(Control::Break),

            Stmt::Continue => Ok(Control::Continue),

            Stmt::Empty => Ok(Control::Normal),
        }
    })
}

fn iteration_items(kind: ForLoopKind, source: &Val) -> EvalResult<Vec<Val>> {
    match (kind, source) {
        (ForLoopKind::Of, Val::List(items)) => Ok(items.borrow().clone()),
        (ForLoopKind::Of, Val::Str(text)) => {
            Ok(text.chars().map(|c| Val::Str(c.to_string())).collect())
        }
        (ForLoopKind::Of, other) => Err(Interrupt::type_error(format!(
            "{} is not iterable",
            other.type_of()
        ))),
        (ForLoopKind::In, Val::Obj(object)) => {
            Ok(object.borrow().keys().map(|k| Val::Str(k.clone())).collect())
        }
        (ForLoopKind::In, Val::List(items)) => Ok((0..items.borrow().len())
            .map(|i| Val::Str(i.to_string()))
            .collect()),
        (ForLoopKind::In, Val::Str(text)) => Ok((0..text.chars().count())
            .map(|i| Val::Str(i.to_string()))
            .collect()),
        (ForLoopKind::In, _) => Ok(vec![]),
    }
}
