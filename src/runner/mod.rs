//! Run controller
//!
//! `start_run` instruments a program and executes it on a dedicated thread
//! with a current-thread runtime and a `LocalSet`. The returned [`RunHandle`]
//! controls the run from any thread.
//!
//! Completion follows the quiescence detector: the main body is one
//! obligation, every program listener another. The run finishes once all of
//! them are released, or fails with the first error that reset the detector.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, watch};
use tokio::task::{spawn_local, LocalSet};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::context::{ExecutionContext, RunControls};
use crate::errors::{adapt_error, RunError};
use crate::events::ListenerId;
use crate::executor::{invoke, Interrupt, Sandbox, Val};
use crate::instrument::instrument;

mod interpreter;
mod options;

#[cfg(test)]
mod tests;

pub use interpreter::Interpreter;
pub use options::{
    Bindings, EndCallback, HostFunction, RunOptions, StartCallback, StepCallback, DEFAULT_PACE,
};

/// Lifecycle events delivered to host listeners
pub const START_EVENT: &str = "start";
pub const STEP_EVENT: &str = "step";
pub const END_EVENT: &str = "end";

/// Stack of a run thread; deep enough for `MAX_CALL_DEPTH` nested calls
const RUN_STACK_SIZE: usize = 256 * 1024 * 1024;

type Outcome = Option<Result<(), RunError>>;

enum Command {
    Emit { event: String, payload: JsonValue },
}

/* ===================== Starting Runs ===================== */

/// Instrument `source` and start running it
///
/// Syntax errors are returned here, before anything runs.
pub fn start_run(source: &str, options: RunOptions) -> Result<RunHandle, RunError> {
    let instrumented = instrument(source)?;
    launch(instrumented, options)
}

/// Start a run from already instrumented text
pub(crate) fn launch(instrumented: String, options: RunOptions) -> Result<RunHandle, RunError> {
    let id = Uuid::new_v4();
    let controls = Arc::new(RunControls::new(options.pace));
    if options.start_paused {
        controls.gate.pause();
    }

    let last_step = Arc::new(Mutex::new(None));
    {
        let last_step = last_step.clone();
        let host = controls.host.clone();
        let on_step = options.on_step.clone();
        controls.gate.subscribe(move |text| {
            *last_step.lock().unwrap_or_else(PoisonError::into_inner) = Some(text.to_string());
            host.deliver(STEP_EVENT, &JsonValue::String(text.to_string()));
            if let Some(on_step) = &on_step {
                on_step(text);
            }
        });
    }

    let (commands, command_rx) = mpsc::unbounded_channel();
    let (outcome_tx, outcome) = watch::channel(None);

    let run = RunThread {
        id,
        instrumented,
        options,
        controls: controls.clone(),
        commands: command_rx,
        outcome: outcome_tx,
    };
    thread::Builder::new()
        .name(format!("tempo-run-{}", id))
        .stack_size(RUN_STACK_SIZE)
        .spawn(move || run.run())
        .map_err(|err| RunError::Runtime(format!("Failed to spawn run thread: {}", err)))?;

    Ok(RunHandle {
        id,
        started_at: Utc::now(),
        controls,
        commands,
        outcome,
        last_step,
    })
}

/* ===================== Run Thread ===================== */

struct RunThread {
    id: Uuid,
    instrumented: String,
    options: RunOptions,
    controls: Arc<RunControls>,
    commands: mpsc::UnboundedReceiver<Command>,
    outcome: watch::Sender<Outcome>,
}

impl RunThread {
    fn run(self) {
        let span = info_span!("run", id = %self.id);
        let _enter = span.enter();

        let RunThread {
            instrumented,
            options,
            controls,
            commands,
            outcome,
            ..
        } = self;
        let on_end = options.on_end.clone();

        let result = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => {
                let local = LocalSet::new();
                local.block_on(
                    &runtime,
                    execute(instrumented, options, controls.clone(), commands),
                )
            }
            Err(err) => Err(RunError::Runtime(format!(
                "Failed to build run runtime: {}",
                err
            ))),
        };

        let payload = match &result {
            Ok(()) => {
                info!("run finished");
                JsonValue::Null
            }
            Err(err) => {
                warn!(error = %err, "run failed");
                JsonValue::String(err.to_string())
            }
        };
        controls.host.deliver(END_EVENT, &payload);
        if let Some(on_end) = on_end {
            on_end(&result);
        }
        outcome.send_replace(Some(result));
    }
}

async fn execute(
    instrumented: String,
    options: RunOptions,
    controls: Arc<RunControls>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) -> Result<(), RunError> {
    let context = ExecutionContext::new(controls.clone());
    let sandbox = Sandbox::new(context.bindings(options.bindings.into_vals()));

    let events = context.events().clone();
    let pump = spawn_local(async move {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Emit { event, payload } => {
                    events.dispatch(&event, Val::from_json(&payload))
                }
            }
        }
    });

    let detector = &controls.detector;
    let drained = detector.once_drained();
    detector.increment();

    info!("run started");
    controls.host.deliver(START_EVENT, &JsonValue::Null);
    if let Some(on_start) = &options.on_start {
        on_start();
    }

    let body = async {
        let entry = sandbox.evaluate(&instrumented).await?;
        invoke(&entry, Vec::new()).await
    };

    let result = match body.await {
        Ok(_) => {
            debug!(
                outstanding = detector.outstanding() - 1,
                "main body returned"
            );
            detector.decrement();
            drained.await
        }
        Err(Interrupt::Halt) => {
            debug!("run stopped");
            Ok(())
        }
        Err(Interrupt::Throw(value)) => {
            let err = adapt_error(&value);
            detector.reset(Some(err.clone()));
            Err(err)
        }
    };

    pump.abort();
    result
}

/* ===================== Run Handle ===================== */

/// Control surface of one run
///
/// Dropping the handle stops a run that has not finished.
pub struct RunHandle {
    id: Uuid,
    started_at: DateTime<Utc>,
    controls: Arc<RunControls>,
    commands: mpsc::UnboundedSender<Command>,
    outcome: watch::Receiver<Outcome>,
    last_step: Arc<Mutex<Option<String>>>,
}

impl RunHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn pause(&self) {
        self.controls.gate.pause();
    }

    pub fn resume(&self) {
        self.controls.gate.resume();
    }

    /// Abort the pending checkpoint and release all obligations
    pub fn stop(&self) {
        self.controls.stop();
    }

    pub fn set_pace(&self, ms: u64) {
        self.controls.gate.set_pace(Duration::from_millis(ms));
    }

    pub fn pace(&self) -> Duration {
        self.controls.gate.pace()
    }

    pub fn is_paused(&self) -> bool {
        self.controls.gate.is_paused()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Deliver to host listeners now and to program listeners on the run thread
    pub fn emit(&self, event: &str, payload: JsonValue) {
        self.controls.host.deliver(event, &payload);
        let command = Command::Emit {
            event: event.to_string(),
            payload,
        };
        if self.commands.send(command).is_err() {
            debug!(event, "run already finished, program listeners skipped");
        }
    }

    pub fn on(
        &self,
        event: &str,
        listener: impl Fn(&JsonValue) + Send + Sync + 'static,
    ) -> ListenerId {
        self.controls.host.on(event, listener)
    }

    pub fn once(
        &self,
        event: &str,
        listener: impl Fn(&JsonValue) + Send + Sync + 'static,
    ) -> ListenerId {
        self.controls.host.once(event, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.controls.host.off(id)
    }

    /// Obligations still holding the run open
    pub fn active_listeners(&self) -> i64 {
        self.controls.detector.outstanding()
    }

    /// Text of the most recent checkpoint
    pub fn last_step(&self) -> Option<String> {
        self.last_step
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Result of the run, if it has finished
    pub fn outcome(&self) -> Option<Result<(), RunError>> {
        self.outcome.borrow().clone()
    }

    /// Wait for the run to finish; may be awaited any number of times
    pub async fn completion(&self) -> Result<(), RunError> {
        let mut outcome = self.outcome.clone();
        let settled = outcome
            .wait_for(Option::is_some)
            .await
            .map(|value| (*value).clone());
        match settled {
            Ok(Some(result)) => result,
            _ => Err(RunError::Runtime(
                "Run thread exited without an outcome".to_string(),
            )),
        }
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if !self.is_finished() {
            debug!(id = %self.id, "run handle dropped, stopping run");
            self.stop();
        }
    }
}
