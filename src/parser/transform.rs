//! Owned tree rewriting
//!
//! A [`Transform`] consumes nodes and returns replacements. The default
//! methods rebuild each node from its transformed children, so an
//! implementation overrides only the node kinds it cares about and calls the
//! matching `walk_*` function to keep descending.

use std::rc::Rc;

use crate::executor::types::ast::{Declarator, Expr, FunctionBody, FunctionDef, Program, Stmt};

pub trait Transform {
    fn program(&mut self, program: Program) -> Program {
        Program {
            body: self.stmts(program.body),
        }
    }

    fn stmts(&mut self, stmts: Vec<Stmt>) -> Vec<Stmt> {
        walk_stmts(self, stmts)
    }

    fn stmt(&mut self, stmt: Stmt) -> Stmt {
        walk_stmt(self, stmt)
    }

    fn expr(&mut self, expr: Expr) -> Expr {
        walk_expr(self, expr)
    }

    fn function(&mut self, func: FunctionDef) -> FunctionDef {
        walk_function(self, func)
    }
}

fn take_rc(func: Rc<FunctionDef>) -> FunctionDef {
    Rc::try_unwrap(func).unwrap_or_else(|shared| (*shared).clone())
}

fn boxed<T: Transform + ?Sized>(t: &mut T, stmt: Box<Stmt>) -> Box<Stmt> {
    Box::new(t.stmt(*stmt))
}

fn boxed_expr<T: Transform + ?Sized>(t: &mut T, expr: Box<Expr>) -> Box<Expr> {
    Box::new(t.expr(*expr))
}

pub fn walk_stmts<T: Transform + ?Sized>(t: &mut T, stmts: Vec<Stmt>) -> Vec<Stmt> {
    stmts.into_iter().map(|stmt| t.stmt(stmt)).collect()
}

pub fn walk_function<T: Transform + ?Sized>(t: &mut T, func: FunctionDef) -> FunctionDef {
    let body = match func.body {
        FunctionBody::Block { body } => FunctionBody::Block {
            body: t.stmts(body),
        },
        FunctionBody::Expr { expr } => FunctionBody::Expr {
            expr: boxed_expr(t, expr),
        },
    };
    FunctionDef { body, ..func }
}

pub fn walk_stmt<T: Transform + ?Sized>(t: &mut T, stmt: Stmt) -> Stmt {
    match stmt {
        Stmt::Block { body } => Stmt::Block { body: t.stmts(body) },
        Stmt::Declare {
            var_kind,
            declarations,
        } => Stmt::Declare {
            var_kind,
            declarations: declarations
                .into_iter()
                .map(|d| Declarator {
                    target: d.target,
                    init: d.init.map(|e| t.expr(e)),
                })
                .collect(),
        },
        Stmt::Function { func } => Stmt::Function {
            func: Rc::new(t.function(take_rc(func))),
        },
        Stmt::If {
            test,
            then_s,
            else_s,
        } => Stmt::If {
            test: t.expr(test),
            then_s: boxed(t, then_s),
            else_s: else_s.map(|s| boxed(t, s)),
        },
        Stmt::While { test, body } => Stmt::While {
            test: t.expr(test),
            body: boxed(t, body),
        },
        Stmt::For {
            init,
            test,
            update,
            body,
        } => Stmt::For {
            init: init.map(|s| boxed(t, s)),
            test: test.map(|e| t.expr(e)),
            update: update.map(|e| t.expr(e)),
            body: boxed(t, body),
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
            iterable: t.expr(iterable),
            body: boxed(t, body),
        },
        Stmt::Return { value } => Stmt::Return {
            value: value.map(|e| t.expr(e)),
        },
        Stmt::Throw { value } => Stmt::Throw {
            value: t.expr(value),
        },
        Stmt::Try {
            body,
            catch_var,
            catch_body,
            finally_body,
        } => Stmt::Try {
            body: boxed(t, body),
            catch_var,
            catch_body: catch_body.map(|s| boxed(t, s)),
            finally_body: finally_body.map(|s| boxed(t, s)),
        },
        Stmt::Expr { expr } => Stmt::Expr { expr: t.expr(expr) },
        other @ (Stmt::Break | Stmt::Continue | Stmt::Empty) => other,
    }
}

pub fn walk_expr<T: Transform + ?Sized>(t: &mut T, expr: Expr) -> Expr {
    match expr {
        Expr::Template { quasis, exprs } => Expr::Template {
            quasis,
            exprs: exprs.into_iter().map(|e| t.expr(e)).collect(),
        },
        Expr::LitList { elements } => Expr::LitList {
            elements: elements.into_iter().map(|e| t.expr(e)).collect(),
        },
        Expr::LitObj { properties } => Expr::LitObj {
            properties: properties
                .into_iter()
                .map(|(key, value)| (key, t.expr(value)))
                .collect(),
        },
        Expr::Member {
            object,
            property,
            optional,
        } => Expr::Member {
            object: boxed_expr(t, object),
            property,
            optional,
        },
        Expr::Index { object, index } => Expr::Index {
            object: boxed_expr(t, object),
            index: boxed_expr(t, index),
        },
        Expr::Call { callee, args } => Expr::Call {
            callee: boxed_expr(t, callee),
            args: args.into_iter().map(|e| t.expr(e)).collect(),
        },
        Expr::New { callee, args } => Expr::New {
            callee: boxed_expr(t, callee),
            args: args.into_iter().map(|e| t.expr(e)).collect(),
        },
        Expr::Await { inner } => Expr::Await {
            inner: boxed_expr(t, inner),
        },
        Expr::Unary { op, operand } => Expr::Unary {
            op,
            operand: boxed_expr(t, operand),
        },
        Expr::Update { op, prefix, target } => Expr::Update {
            op,
            prefix,
            target: boxed_expr(t, target),
        },
        Expr::Binary { op, left, right } => Expr::Binary {
            op,
            left: boxed_expr(t, left),
            right: boxed_expr(t, right),
        },
        Expr::Logical { op, left, right } => Expr::Logical {
            op,
            left: boxed_expr(t, left),
            right: boxed_expr(t, right),
        },
        Expr::Ternary {
            condition,
            consequent,
            alternate,
        } => Expr::Ternary {
            condition: boxed_expr(t, condition),
            consequent: boxed_expr(t, consequent),
            alternate: boxed_expr(t, alternate),
        },
        Expr::Assign { op, target, value } => Expr::Assign {
            op,
            target: boxed_expr(t, target),
            value: boxed_expr(t, value),
        },
        Expr::Function { func } => Expr::Function {
            func: Rc::new(t.function(take_rc(func))),
        },
        leaf @ (Expr::LitBool { .. }
        | Expr::LitNum { .. }
        | Expr::LitStr { .. }
        | Expr::LitNull
        | Expr::LitUndefined
        | Expr::Ident { .. }) => leaf,
    }
}
