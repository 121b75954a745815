//! Test helpers for sandbox tests
//!
//! Evaluation needs a current-thread runtime with a `LocalSet`, the same
//! environment a run thread provides.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use crate::executor::{ErrorKind, EvalResult, Interrupt, Sandbox, Val};

/// Drive a future on a fresh current-thread runtime inside a `LocalSet`
pub fn run_local<F: Future>(future: F) -> F::Output {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build test runtime");
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, future)
}

/// Evaluate source in a sandbox with no extra bindings
pub fn eval(source: &str) -> EvalResult<Val> {
    eval_with(source, vec![])
}

pub fn eval_with(source: &str, bindings: Vec<(String, Val)>) -> EvalResult<Val> {
    run_local(async move { Sandbox::new(bindings).evaluate(source).await })
}

/// A `log` native that records its first argument
pub fn recorder() -> (Val, Rc<RefCell<Vec<Val>>>) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let log = Val::native("log", move |args| {
        sink.borrow_mut()
            .push(args.into_iter().next().unwrap_or(Val::Undefined));
        Ok(Val::Undefined)
    });
    (log, seen)
}

/// Assert that evaluation threw an error value of `kind` whose message contains `needle`
pub fn assert_thrown(result: EvalResult<Val>, kind: ErrorKind, needle: &str) {
    match result {
        Err(Interrupt::Throw(Val::Error(info))) => {
            assert_eq!(info.kind, kind, "unexpected error kind: {}", info);
            assert!(
                info.message.contains(needle),
                "message {:?} does not contain {:?}",
                info.message,
                needle
            );
        }
        other => panic!("Expected thrown {:?}, got {:?}", kind, other),
    }
}
