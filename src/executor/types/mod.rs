//! Core types for the sandbox executor

pub mod ast;
pub mod control;
pub mod values;

pub use ast::{Expr, FunctionDef, Program, Stmt};
pub use control::{Control, EvalResult, Interrupt};
pub use values::{
    ErrorInfo, ErrorKind, Function, LocalBoxFuture, NativeFn, NativeFunction, Object, Promise, Val,
};
