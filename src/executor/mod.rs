//! Sandbox executor
//!
//! A cooperative async tree walker for the script language. Evaluation is
//! single-threaded (`Rc` values); suspension happens only where the script
//! awaits, which after instrumentation means every call and every checkpoint.

pub mod expressions;
pub mod sandbox;
pub mod scope;
pub mod statements;
pub mod stdlib;
pub mod types;

#[cfg(test)]
mod tests;

pub use sandbox::{invoke, Sandbox};
pub use scope::Scope;
pub use types::{
    Control, ErrorInfo, ErrorKind, EvalResult, Function, Interrupt, LocalBoxFuture, Object,
    Promise, Val,
};
