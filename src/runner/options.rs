//! Run options and caller-supplied bindings

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::config::Config;
use crate::errors::RunError;
use crate::executor::{ErrorKind, Interrupt, LocalBoxFuture, Val};

pub const DEFAULT_PACE: Duration = Duration::from_millis(15);

pub type StartCallback = Arc<dyn Fn() + Send + Sync>;
pub type StepCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub type EndCallback = Arc<dyn Fn(&Result<(), RunError>) + Send + Sync>;

/* ===================== Host Functions ===================== */

type SyncHostFn = dyn Fn(Vec<JsonValue>) -> Result<JsonValue, String> + Send + Sync;
type AsyncHostFn =
    dyn Fn(Vec<JsonValue>) -> LocalBoxFuture<'static, Result<JsonValue, String>> + Send + Sync;

#[derive(Clone)]
enum HostCall {
    Sync(Arc<SyncHostFn>),
    Async(Arc<AsyncHostFn>),
}

/// A Rust function exposed to the program
///
/// Arguments and results cross the boundary as JSON. An `Err` message is
/// thrown into the program as an `Error`.
#[derive(Clone)]
pub struct HostFunction {
    call: HostCall,
}

impl HostFunction {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Vec<JsonValue>) -> Result<JsonValue, String> + Send + Sync + 'static,
    {
        Self {
            call: HostCall::Sync(Arc::new(f)),
        }
    }

    /// The returned future runs on the run's own thread
    pub fn new_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<JsonValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JsonValue, String>> + 'static,
    {
        Self {
            call: HostCall::Async(Arc::new(
                move |args: Vec<JsonValue>| -> LocalBoxFuture<'static, Result<JsonValue, String>> {
                    Box::pin(f(args))
                },
            )),
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self.call, HostCall::Async(_))
    }

    pub(crate) fn into_val(self, name: &str) -> Val {
        match self.call {
            HostCall::Sync(call) => Val::native(name, move |args| {
                call(to_json_args(&args))
                    .map(|value| Val::from_json(&value))
                    .map_err(host_error)
            }),
            HostCall::Async(call) => Val::native_async(name, move |args| {
                let pending = call(to_json_args(&args));
                Box::pin(async move {
                    pending
                        .await
                        .map(|value| Val::from_json(&value))
                        .map_err(host_error)
                })
            }),
        }
    }
}

fn to_json_args(args: &[Val]) -> Vec<JsonValue> {
    args.iter().map(Val::to_json).collect()
}

fn host_error(message: String) -> Interrupt {
    Interrupt::error(ErrorKind::Error, message)
}

/* ===================== Bindings ===================== */

#[derive(Clone)]
enum Binding {
    Value(JsonValue),
    Function(HostFunction),
}

/// Caller-supplied capabilities, in definition order
#[derive(Clone, Default)]
pub struct Bindings {
    entries: Vec<(String, Binding)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, name: impl Into<String>, value: JsonValue) -> Self {
        self.entries.push((name.into(), Binding::Value(value)));
        self
    }

    pub fn function(mut self, name: impl Into<String>, function: HostFunction) -> Self {
        self.entries.push((name.into(), Binding::Function(function)));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_vals(self) -> Vec<(String, Val)> {
        self.entries
            .into_iter()
            .map(|(name, binding)| {
                let value = match binding {
                    Binding::Value(value) => Val::from_json(&value),
                    Binding::Function(function) => function.into_val(&name),
                };
                (name, value)
            })
            .collect()
    }
}

/* ===================== Options ===================== */

#[derive(Clone)]
pub struct RunOptions {
    pub pace: Duration,
    pub start_paused: bool,
    pub bindings: Bindings,
    pub on_start: Option<StartCallback>,
    pub on_step: Option<StepCallback>,
    pub on_end: Option<EndCallback>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            pace: DEFAULT_PACE,
            start_paused: false,
            bindings: Bindings::default(),
            on_start: None,
            on_step: None,
            on_end: None,
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            pace: Duration::from_millis(config.runner.pace_ms),
            start_paused: config.runner.start_paused,
            ..Self::default()
        }
    }

    pub fn pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    pub fn start_paused(mut self, start_paused: bool) -> Self {
        self.start_paused = start_paused;
        self
    }

    pub fn bindings(mut self, bindings: Bindings) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn on_start(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(callback));
        self
    }

    pub fn on_step(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_step = Some(Arc::new(callback));
        self
    }

    pub fn on_end(mut self, callback: impl Fn(&Result<(), RunError>) + Send + Sync + 'static) -> Self {
        self.on_end = Some(Arc::new(callback));
        self
    }
}
