use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{json, Value as JsonValue};

use super::*;
use crate::config::Config;

/* ===================== Helpers ===================== */

type Seen = Arc<Mutex<Vec<JsonValue>>>;

fn recorder() -> (HostFunction, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let function = HostFunction::new(move |args| {
        sink.lock().unwrap().extend(args);
        Ok(JsonValue::Null)
    });
    (function, seen)
}

fn sleeper() -> HostFunction {
    HostFunction::new_async(|args: Vec<JsonValue>| async move {
        let ms = args.first().and_then(JsonValue::as_u64).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok::<_, String>(JsonValue::Null)
    })
}

fn fast() -> RunOptions {
    RunOptions::default().pace(Duration::ZERO)
}

async fn finish(handle: &RunHandle) -> Result<(), RunError> {
    tokio::time::timeout(Duration::from_secs(5), handle.completion())
        .await
        .expect("run should finish")
}

async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn strings(seen: &Seen) -> Vec<String> {
    seen.lock()
        .unwrap()
        .iter()
        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
        .collect()
}

/* ===================== Completion ===================== */

#[tokio::test]
async fn test_end_to_end_steps_precede_callback() {
    let steps = Arc::new(Mutex::new(Vec::<String>::new()));
    let at_call = Arc::new(Mutex::new(Vec::new()));

    let callback = {
        let steps = steps.clone();
        let at_call = at_call.clone();
        HostFunction::new(move |args| {
            at_call
                .lock()
                .unwrap()
                .push((args, steps.lock().unwrap().clone()));
            Ok(JsonValue::Null)
        })
    };
    let sink = steps.clone();
    let options = fast()
        .bindings(Bindings::new().function("callback", callback))
        .on_step(move |text| sink.lock().unwrap().push(text.to_string()));

    let handle = start_run("const a = 1; const b = 2; callback(a+b);", options).unwrap();
    assert_eq!(finish(&handle).await, Ok(()));

    let at_call = at_call.lock().unwrap();
    assert_eq!(at_call.len(), 1);
    let (args, steps_before) = &at_call[0];
    assert_eq!(args, &vec![json!(3)]);
    assert_eq!(
        steps_before,
        &vec!["const a = 1;", "const b = 2;", "callback(a + b);"]
    );
    assert_eq!(handle.last_step().as_deref(), Some("callback(a + b);"));
    assert_eq!(handle.outcome(), Some(Ok(())));
}

#[tokio::test]
async fn test_step_fires_for_every_top_level_statement() {
    let count = Arc::new(Mutex::new(0));
    let sink = count.clone();
    let options = fast().on_step(move |_| *sink.lock().unwrap() += 1);

    let handle = start_run("let x = 1\nx += 1\nx *= 3\nif (x > 1) x = 0", options).unwrap();
    finish(&handle).await.unwrap();
    assert!(*count.lock().unwrap() >= 4);
}

#[tokio::test]
async fn test_reference_error_rejects_completion() {
    let handle = start_run("const a = badVariable;", fast()).unwrap();
    match finish(&handle).await {
        Err(RunError::Reference(message)) => assert!(message.contains("badVariable")),
        other => panic!("expected reference error, got {:?}", other),
    }
    assert!(handle.is_finished());
}

#[tokio::test]
async fn test_thrown_error_keeps_native_kind() {
    let handle = start_run("throw new RangeError('out of range')", fast()).unwrap();
    assert_eq!(
        finish(&handle).await,
        Err(RunError::Range("out of range".into()))
    );
}

#[tokio::test]
async fn test_huge_array_index_rejects_completion() {
    let handle = start_run("const a = []; a[4000000000000] = 1;", fast()).unwrap();
    assert_eq!(
        finish(&handle).await,
        Err(RunError::Range("Invalid array length".into()))
    );
}

#[tokio::test]
async fn test_unbounded_recursion_rejects_completion() {
    let handle = start_run("function f(n) { return f(n + 1) }\nf(0)", fast()).unwrap();
    assert_eq!(
        finish(&handle).await,
        Err(RunError::Range("Maximum call stack size exceeded".into()))
    );
}

#[tokio::test]
async fn test_recursion_error_is_catchable() {
    let (record, seen) = recorder();
    let options = fast().bindings(Bindings::new().function("record", record));
    let source = r#"
        function f(n) { return f(n + 1) }
        try { f(0) } catch (e) { record(e.name) }
        record('after')
    "#;
    let handle = start_run(source, options).unwrap();
    assert_eq!(finish(&handle).await, Ok(()));
    assert_eq!(strings(&seen), vec!["RangeError", "after"]);
}

#[test]
fn test_syntax_error_is_reported_before_running() {
    let result = start_run("const a =;", fast());
    assert!(matches!(result, Err(RunError::Syntax(_))));
}

#[tokio::test]
async fn test_completion_can_be_awaited_repeatedly() {
    let handle = start_run("const a = 1", fast()).unwrap();
    assert_eq!(finish(&handle).await, Ok(()));
    assert_eq!(finish(&handle).await, Ok(()));
}

/* ===================== Pause and Stop ===================== */

#[tokio::test]
async fn test_pause_delays_completion() {
    let handle = start_run(
        "let n = 0\nwhile (n < 3) { n++ }",
        fast().start_paused(true),
    )
    .unwrap();
    assert!(handle.is_paused());

    let started = Instant::now();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!handle.is_finished());

    handle.resume();
    finish(&handle).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_pause_mid_run_freezes_steps_until_resume() {
    let (tick, ticks) = recorder();
    let source = "let n = 0\nwhile (n < 10) { n++; tick(n) }";
    let options = RunOptions::default()
        .pace(Duration::from_millis(2))
        .bindings(Bindings::new().function("tick", tick));
    let handle = start_run(source, options).unwrap();

    wait_until(|| ticks.lock().unwrap().len() >= 2).await;
    handle.pause();
    assert!(handle.is_paused());
    let paused_at = Instant::now();

    // At most one call already past its checkpoint may still land
    tokio::time::sleep(Duration::from_millis(20)).await;
    let frozen_ticks = ticks.lock().unwrap().len();
    let frozen_step = handle.last_step();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(ticks.lock().unwrap().len(), frozen_ticks);
    assert_eq!(handle.last_step(), frozen_step);
    assert!(frozen_ticks < 10);
    assert!(!handle.is_finished());

    handle.resume();
    assert_eq!(finish(&handle).await, Ok(()));
    assert!(paused_at.elapsed() >= Duration::from_millis(100));
    assert_eq!(ticks.lock().unwrap().len(), 10);
}

#[tokio::test]
async fn test_stop_while_paused_resolves() {
    let handle = start_run("const a = 1", fast().start_paused(true)).unwrap();
    wait_until(|| handle.last_step().is_some()).await;

    handle.stop();
    handle.stop();
    assert_eq!(finish(&handle).await, Ok(()));
}

#[tokio::test]
async fn test_stop_deep_in_nested_calls_resolves() {
    let (tick, ticks) = recorder();
    let source = r#"
        function outer() { return middle() }
        function middle() { return inner() }
        function inner() { while (true) { tick(1) } }
        outer()
    "#;
    let options = RunOptions::default()
        .pace(Duration::from_millis(1))
        .bindings(Bindings::new().function("tick", tick));
    let handle = start_run(source, options).unwrap();

    wait_until(|| ticks.lock().unwrap().len() >= 3).await;
    handle.stop();
    assert_eq!(finish(&handle).await, Ok(()));
}

#[tokio::test]
async fn test_stop_is_not_caught_by_program() {
    let (record, seen) = recorder();
    let source = r#"
        try {
            while (true) { record('tick') }
        } catch (e) {
            record('caught')
        } finally {
            record('finally')
        }
    "#;
    let options = RunOptions::default()
        .pace(Duration::from_millis(1))
        .bindings(Bindings::new().function("record", record));
    let handle = start_run(source, options).unwrap();

    wait_until(|| !seen.lock().unwrap().is_empty()).await;
    handle.stop();
    finish(&handle).await.unwrap();

    let seen = strings(&seen);
    assert!(seen.iter().all(|s| s == "tick"), "{:?}", seen);
}

#[tokio::test]
async fn test_program_can_stop_itself() {
    let (record, seen) = recorder();
    let options = fast().bindings(Bindings::new().function("record", record));
    let handle = start_run("record('before'); stop(); record('after')", options).unwrap();
    assert_eq!(finish(&handle).await, Ok(()));
    assert_eq!(strings(&seen), vec!["before"]);
}

#[tokio::test]
async fn test_set_pace_from_handle() {
    let handle = start_run("const a = 1", fast().start_paused(true)).unwrap();
    handle.set_pace(40);
    assert_eq!(handle.pace(), Duration::from_millis(40));
    handle.resume();
    finish(&handle).await.unwrap();
}

/* ===================== Listeners and Quiescence ===================== */

#[tokio::test]
async fn test_once_listener_holds_run_open_until_emit() {
    let (record, seen) = recorder();
    let options = fast().bindings(Bindings::new().function("record", record));
    let source = "once('x', (v) => { record(v) }); record('body done')";
    let handle = start_run(source, options).unwrap();

    wait_until(|| !seen.lock().unwrap().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished());
    assert_eq!(handle.active_listeners(), 1);

    handle.emit("x", json!(42));
    assert_eq!(finish(&handle).await, Ok(()));
    assert_eq!(*seen.lock().unwrap(), vec![json!("body done"), json!(42)]);
    assert_eq!(handle.active_listeners(), 0);
}

#[tokio::test]
async fn test_each_registration_is_released_once() {
    let source = r#"
        const h = () => {}
        once('x', h)
        on('y', h)
        off('x', h)
        off('x', h)
        emit('x', 1)
        const dispose = on('z', h)
        dispose()
        dispose()
        off('y', h)
    "#;
    let handle = start_run(source, fast()).unwrap();
    assert_eq!(finish(&handle).await, Ok(()));
    assert_eq!(handle.active_listeners(), 0);
}

#[tokio::test]
async fn test_program_emit_reaches_host_and_program_listeners() {
    let (record, seen) = recorder();
    let received = Arc::new(Mutex::new(Vec::new()));
    let options = fast()
        .start_paused(true)
        .bindings(Bindings::new().function("record", record));
    let source = r#"
        once('ping', (n) => { record(n) })
        emit('ping', 7)
        emit('done', { ok: true })
    "#;
    let handle = start_run(source, options).unwrap();
    let sink = received.clone();
    handle.on("done", move |payload| sink.lock().unwrap().push(payload.clone()));
    handle.resume();

    assert_eq!(finish(&handle).await, Ok(()));
    assert_eq!(*received.lock().unwrap(), vec![json!({ "ok": true })]);
    assert_eq!(*seen.lock().unwrap(), vec![json!(7)]);
}

#[tokio::test]
async fn test_throwing_handler_rejects_completion() {
    let source = "on('x', () => { throw new TypeError('bad handler') })\nemit('ready', null)";
    let handle = start_run(source, fast().start_paused(true)).unwrap();
    let ready = Arc::new(Mutex::new(false));
    let flag = ready.clone();
    handle.once("ready", move |_| *flag.lock().unwrap() = true);
    handle.resume();

    wait_until(|| *ready.lock().unwrap()).await;
    handle.emit("x", JsonValue::Null);
    assert_eq!(
        finish(&handle).await,
        Err(RunError::Type("bad handler".into()))
    );
}

#[tokio::test]
async fn test_stop_releases_waiting_listeners() {
    let handle = start_run("on('never', () => {})", fast()).unwrap();
    wait_until(|| handle.last_step().is_some() && handle.active_listeners() == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!handle.is_finished());

    handle.stop();
    assert_eq!(finish(&handle).await, Ok(()));
}

#[tokio::test]
async fn test_lifecycle_events_reach_host_listeners() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let handle = start_run("const a = 1\nconst b = 2", fast().start_paused(true)).unwrap();
    for name in [STEP_EVENT, END_EVENT] {
        let sink = events.clone();
        handle.on(name, move |payload| {
            sink.lock().unwrap().push((name, payload.clone()))
        });
    }
    handle.resume();
    finish(&handle).await.unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events.last(), Some(&(END_EVENT, JsonValue::Null)));
    assert!(events.contains(&(STEP_EVENT, json!("const b = 2;"))));
}

/* ===================== Bindings and Concurrency ===================== */

#[tokio::test]
async fn test_awaited_calls_run_in_program_order() {
    let (log, seen) = recorder();
    let source = r#"
        async function a() { log('A-start'); await sleep(20); log('A-end') }
        async function b() { log('B-start'); await sleep(5); log('B-end') }
        a()
        b()
    "#;
    let options = fast().bindings(
        Bindings::new()
            .function("log", log)
            .function("sleep", sleeper()),
    );
    let handle = start_run(source, options).unwrap();
    finish(&handle).await.unwrap();

    assert_eq!(strings(&seen), vec!["A-start", "A-end", "B-start", "B-end"]);
}

#[tokio::test]
async fn test_handlers_of_one_emit_interleave() {
    let (log, seen) = recorder();
    let source = r#"
        once('go', () => { log('A-start'); sleep(40); log('A-step'); log('A-end') })
        once('go', () => { log('B-start'); sleep(5); log('B-step'); log('B-end') })
        emit('go', null)
    "#;
    let options = fast().bindings(
        Bindings::new()
            .function("log", log)
            .function("sleep", sleeper()),
    );
    let handle = start_run(source, options).unwrap();
    assert_eq!(finish(&handle).await, Ok(()));

    let seen = strings(&seen);
    let position = |name: &str| {
        seen.iter()
            .position(|s| s == name)
            .unwrap_or_else(|| panic!("{} missing from {:?}", name, seen))
    };
    assert!(position("A-start") < position("B-start"), "{:?}", seen);
    assert!(position("B-start") < position("A-end"), "{:?}", seen);
    assert!(position("B-end") < position("A-end"), "{:?}", seen);
    for routine in ["A", "B"] {
        let own: Vec<&String> = seen.iter().filter(|s| s.starts_with(routine)).collect();
        let expected: Vec<String> = ["start", "step", "end"]
            .iter()
            .map(|suffix| format!("{}-{}", routine, suffix))
            .collect();
        assert_eq!(own, expected.iter().collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn test_reserved_names_cannot_be_overridden() {
    let (record, seen) = recorder();
    let options = fast().bindings(
        Bindings::new()
            .value("step", json!("not a function"))
            .value("base", json!(40))
            .function("record", record),
    );
    let handle = start_run("record(base + 2)", options).unwrap();
    assert_eq!(finish(&handle).await, Ok(()));
    assert_eq!(*seen.lock().unwrap(), vec![json!(42)]);
}

#[tokio::test]
async fn test_host_function_error_is_catchable() {
    let (record, seen) = recorder();
    let failing = HostFunction::new(|_| Err("host refused".to_string()));
    let options = fast().bindings(
        Bindings::new()
            .function("failing", failing)
            .function("record", record),
    );
    let source = "try { failing() } catch (e) { record(e.message) }";
    let handle = start_run(source, options).unwrap();
    assert_eq!(finish(&handle).await, Ok(()));
    assert_eq!(strings(&seen), vec!["host refused"]);
}

#[tokio::test]
async fn test_lifecycle_callbacks() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let (start, end) = (calls.clone(), calls.clone());
    let options = fast()
        .on_start(move || start.lock().unwrap().push("start".to_string()))
        .on_end(move |result| end.lock().unwrap().push(format!("end:{}", result.is_ok())));

    let handle = start_run("const a = missing", options).unwrap();
    assert!(finish(&handle).await.is_err());
    assert_eq!(*calls.lock().unwrap(), vec!["start", "end:false"]);
}

/* ===================== Interpreter ===================== */

#[tokio::test]
async fn test_interpreter_caches_instrumentation_and_runs_independently() {
    let interpreter = Interpreter::new(fast());
    let first = interpreter.start("const a = 1").unwrap();
    let second = interpreter.start("const a = 1").unwrap();
    assert_ne!(first.id(), second.id());
    assert_eq!(interpreter.cached(), 1);

    finish(&first).await.unwrap();
    finish(&second).await.unwrap();
    interpreter.run("const b = 2").await.unwrap();
    assert_eq!(interpreter.cached(), 2);

    assert!(matches!(
        interpreter.run("const =").await,
        Err(RunError::Syntax(_))
    ));
}

#[test]
fn test_options_from_config() {
    let mut config = Config::default();
    config.runner.pace_ms = 3;
    config.runner.start_paused = true;

    let options = RunOptions::from_config(&config);
    assert_eq!(options.pace, Duration::from_millis(3));
    assert!(options.start_paused);
    assert!(options.bindings.is_empty());
    assert_eq!(RunOptions::default().pace, DEFAULT_PACE);
}
