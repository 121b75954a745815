//! Execution context of a run
//!
//! Turns the run's gate, detector and event bus into the capability set an
//! instrumented program runs against.

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::events::{EventBus, HostListeners};
use crate::executor::{ErrorKind, Interrupt, Val};
use crate::gate::StepGate;
use crate::instrument::CHECKPOINT_FN;
use crate::quiescence::QuiescenceDetector;

/// Capability names caller bindings can never replace
pub const RESERVED_NAMES: [&str; 9] = [
    "on", "once", "off", "emit", CHECKPOINT_FN, "pause", "resume", "stop", "setPace",
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Thread-safe controls of a run, shared by its context and its handle
pub struct RunControls {
    pub gate: StepGate,
    pub detector: Arc<QuiescenceDetector>,
    pub host: Arc<HostListeners>,
}

impl RunControls {
    pub fn new(pace: Duration) -> Self {
        Self {
            gate: StepGate::new(pace),
            detector: Arc::new(QuiescenceDetector::new()),
            host: Arc::new(HostListeners::new()),
        }
    }

    /// Abort pending checkpoints and release every outstanding obligation
    pub fn stop(&self) {
        if self.gate.is_destroyed() {
            return;
        }
        debug!("stopping run");
        self.gate.destroy();
        self.detector.reset(None);
    }
}

pub struct ExecutionContext {
    controls: Arc<RunControls>,
    events: Rc<EventBus>,
}

impl ExecutionContext {
    pub fn new(controls: Arc<RunControls>) -> Self {
        let events = EventBus::new(controls.host.clone(), controls.detector.clone());
        Self { controls, events }
    }

    pub fn events(&self) -> &Rc<EventBus> {
        &self.events
    }

    pub fn controls(&self) -> &Arc<RunControls> {
        &self.controls
    }

    /// Reserved capabilities followed by the caller's own bindings
    pub fn bindings(&self, caller: Vec<(String, Val)>) -> Vec<(String, Val)> {
        let mut bindings = self.capabilities();
        for (name, value) in caller {
            if is_reserved(&name) {
                warn!(name = %name, "binding shadows a reserved capability and was dropped");
                continue;
            }
            bindings.push((name, value));
        }
        bindings
    }

    fn capabilities(&self) -> Vec<(String, Val)> {
        let mut capabilities = Vec::with_capacity(RESERVED_NAMES.len());
        let mut add = |name: &str, value: Val| capabilities.push((name.to_string(), value));

        for (name, once) in [("on", false), ("once", true)] {
            let events = Rc::downgrade(&self.events);
            add(
                name,
                Val::native(name, move |args| {
                    let (event, handler) = listener_args(name, &args)?;
                    match events.upgrade() {
                        Some(events) => Ok(events.register(&event, handler, once)),
                        None => Ok(Val::Undefined),
                    }
                }),
            );
        }

        let events = Rc::downgrade(&self.events);
        add(
            "off",
            Val::native("off", move |args| {
                let (event, handler) = listener_args("off", &args)?;
                let removed = events
                    .upgrade()
                    .map(|events| events.off(&event, &handler))
                    .unwrap_or(false);
                Ok(Val::Bool(removed))
            }),
        );

        let events = Rc::downgrade(&self.events);
        add(
            "emit",
            Val::native("emit", move |args| {
                let event = event_name("emit", &args)?;
                let payload = args.get(1).cloned().unwrap_or(Val::Undefined);
                if let Some(events) = events.upgrade() {
                    events.emit(&event, payload);
                }
                Ok(Val::Undefined)
            }),
        );

        let controls = self.controls.clone();
        add(
            CHECKPOINT_FN,
            Val::native_async(CHECKPOINT_FN, move |args| {
                let controls = controls.clone();
                let text = args.first().map(Val::to_display).unwrap_or_default();
                Box::pin(async move {
                    match controls.gate.checkpoint(&text).await {
                        Ok(()) => Ok(Val::Undefined),
                        Err(destroyed) => Err(Interrupt::from(destroyed)),
                    }
                })
            }),
        );

        let controls = self.controls.clone();
        add(
            "pause",
            Val::native("pause", move |_| {
                controls.gate.pause();
                Ok(Val::Undefined)
            }),
        );

        let controls = self.controls.clone();
        add(
            "resume",
            Val::native("resume", move |_| {
                controls.gate.resume();
                Ok(Val::Undefined)
            }),
        );

        let controls = self.controls.clone();
        add(
            "stop",
            Val::native("stop", move |_| {
                controls.stop();
                Ok(Val::Undefined)
            }),
        );

        let controls = self.controls.clone();
        add(
            "setPace",
            Val::native("setPace", move |args| {
                let ms = args.first().map(Val::to_number).unwrap_or(f64::NAN);
                if !ms.is_finite() || ms < 0.0 {
                    return Err(Interrupt::range_error(format!(
                        "Invalid pace: {}",
                        args.first().map(Val::to_display).unwrap_or_default()
                    )));
                }
                controls.gate.set_pace(Duration::from_millis(ms.round() as u64));
                Ok(Val::Undefined)
            }),
        );

        capabilities
    }
}

fn event_name(capability: &str, args: &[Val]) -> Result<String, Interrupt> {
    match args.first() {
        Some(Val::Str(event)) => Ok(event.clone()),
        Some(other) if !other.is_nullish() => Ok(other.to_display()),
        _ => Err(Interrupt::type_error(format!(
            "{}: event name is required",
            capability
        ))),
    }
}

fn listener_args(capability: &str, args: &[Val]) -> Result<(String, Val), Interrupt> {
    let event = event_name(capability, args)?;
    match args.get(1) {
        Some(handler @ Val::Func(_)) => Ok((event, handler.clone())),
        _ => Err(Interrupt::error(
            ErrorKind::TypeError,
            format!("{}: handler must be a function", capability),
        )),
    }
}
