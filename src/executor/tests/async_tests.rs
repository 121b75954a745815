//! Tests for suspension: awaited calls, promises, async natives and halting

use std::time::Duration;

use super::helpers::{eval, eval_with, recorder, run_local};
use crate::executor::{invoke, Interrupt, Sandbox, Val};

#[test]
fn test_awaited_async_call_returns_value() {
    let source = "async function twice(x) { return x * 2 } await twice(21)";
    assert_eq!(eval(source).unwrap(), Val::Num(42.0));
}

#[test]
fn test_unawaited_async_call_yields_promise() {
    let source = r#"
        async function five() { return 5 }
        const p = five()
        const kind = typeof p
        const value = await p
        kind + ':' + value
    "#;
    assert_eq!(eval(source).unwrap(), Val::str("object:5"));
}

#[test]
fn test_async_rejection_is_catchable() {
    let (log, seen) = recorder();
    let source = r#"
        async function boom() { throw new Error('inner') }
        try { await boom() } catch (e) { log(e.message) }
    "#;
    eval_with(source, vec![("log".to_string(), log)]).unwrap();
    assert_eq!(*seen.borrow(), vec![Val::str("inner")]);
}

#[test]
fn test_async_native_suspends() {
    let sleep = Val::native_async("sleep", |args| {
        let ms = args.first().map(|v| v.to_number()).unwrap_or(0.0);
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(ms as u64)).await;
            Ok(Val::str("slept"))
        })
    });
    let result = eval_with("await sleep(5)", vec![("sleep".to_string(), sleep)]);
    assert_eq!(result.unwrap(), Val::str("slept"));
}

#[test]
fn test_array_callbacks_run_sequentially() {
    let (log, seen) = recorder();
    let source = r#"
        await [1, 2, 3].map(async x => { log(x); return x + 1 })
    "#;
    let result = eval_with(source, vec![("log".to_string(), log)]).unwrap();
    assert_eq!(
        result,
        Val::list(vec![Val::Num(2.0), Val::Num(3.0), Val::Num(4.0)])
    );
    assert_eq!(
        *seen.borrow(),
        vec![Val::Num(1.0), Val::Num(2.0), Val::Num(3.0)]
    );
}

#[test]
fn test_halt_is_not_catchable() {
    let (log, seen) = recorder();
    let halt = Val::native("halt", |_| Err(Interrupt::Halt));
    let source = r#"
        try { halt() } catch (e) { log('caught') } finally { log('finally') }
        log('after')
    "#;
    let result = eval_with(
        source,
        vec![("log".to_string(), log), ("halt".to_string(), halt)],
    );
    assert_eq!(result, Err(Interrupt::Halt));
    assert!(seen.borrow().is_empty());
}

#[test]
fn test_invoke_entry_point() {
    let result = run_local(async {
        let sandbox = Sandbox::new(vec![("base".to_string(), Val::Num(40.0))]);
        let entry = sandbox
            .evaluate("async function __main__() { return base + 2 }\n__main__;")
            .await?;
        invoke(&entry, vec![]).await
    });
    assert_eq!(result.unwrap(), Val::Num(42.0));
}

#[test]
fn test_invoke_non_function_is_type_error() {
    let result = run_local(async { invoke(&Val::Num(1.0), vec![]).await });
    assert!(matches!(result, Err(Interrupt::Throw(Val::Error(_)))));
}
