//! Event bus of a run
//!
//! Host listeners live behind a mutex so the run handle can register them
//! from any thread; they receive JSON payloads and never hold a run open.
//! Program listeners are script functions registered through `on`/`once`.
//! Each program registration is one obligation on the quiescence detector,
//! released exactly once.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value as JsonValue;
use tokio::task::spawn_local;
use tracing::{debug, warn};

use crate::errors::adapt_error;
use crate::executor::{invoke, Interrupt, Val};
use crate::quiescence::QuiescenceDetector;

/* ===================== Host Listeners ===================== */

pub type HostListener = Arc<dyn Fn(&JsonValue) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

struct HostEntry {
    id: ListenerId,
    event: String,
    once: bool,
    listener: HostListener,
}

#[derive(Default)]
struct HostState {
    next_id: u64,
    entries: Vec<HostEntry>,
}

#[derive(Default)]
pub struct HostListeners {
    state: Mutex<HostState>,
}

impl HostListeners {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn on(&self, event: &str, listener: impl Fn(&JsonValue) + Send + Sync + 'static) -> ListenerId {
        self.add(event, false, Arc::new(listener))
    }

    pub fn once(&self, event: &str, listener: impl Fn(&JsonValue) + Send + Sync + 'static) -> ListenerId {
        self.add(event, true, Arc::new(listener))
    }

    fn add(&self, event: &str, once: bool, listener: HostListener) -> ListenerId {
        let mut state = self.state();
        let id = ListenerId(state.next_id);
        state.next_id += 1;
        state.entries.push(HostEntry {
            id,
            event: event.to_string(),
            once,
            listener,
        });
        id
    }

    pub fn off(&self, id: ListenerId) -> bool {
        let mut state = self.state();
        let before = state.entries.len();
        state.entries.retain(|entry| entry.id != id);
        state.entries.len() != before
    }

    /// Call every listener of `event`; `once` listeners are removed first
    pub fn deliver(&self, event: &str, payload: &JsonValue) {
        let listeners: Vec<HostListener> = {
            let mut state = self.state();
            let matching = state
                .entries
                .iter()
                .filter(|entry| entry.event == event)
                .map(|entry| entry.listener.clone())
                .collect();
            state
                .entries
                .retain(|entry| !(entry.once && entry.event == event));
            matching
        };
        for listener in listeners {
            listener(payload);
        }
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/* ===================== Program Listeners ===================== */

/// One obligation on the detector, released at most once
struct Obligation {
    released: Cell<bool>,
    detector: Arc<QuiescenceDetector>,
}

impl Obligation {
    fn acquire(detector: &Arc<QuiescenceDetector>) -> Rc<Self> {
        detector.increment();
        Rc::new(Self {
            released: Cell::new(false),
            detector: detector.clone(),
        })
    }

    fn release(&self) {
        if !self.released.replace(true) {
            self.detector.decrement();
        }
    }
}

struct Registration {
    id: u64,
    event: String,
    handler: Val,
    once: bool,
    obligation: Rc<Obligation>,
}

pub struct EventBus {
    host: Arc<HostListeners>,
    detector: Arc<QuiescenceDetector>,
    registrations: RefCell<Vec<Registration>>,
    next_id: Cell<u64>,
}

impl EventBus {
    pub fn new(host: Arc<HostListeners>, detector: Arc<QuiescenceDetector>) -> Rc<Self> {
        Rc::new(Self {
            host,
            detector,
            registrations: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        })
    }

    /// Register a program handler; returns a disposer releasing it
    pub fn register(self: &Rc<Self>, event: &str, handler: Val, once: bool) -> Val {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        self.registrations.borrow_mut().push(Registration {
            id,
            event: event.to_string(),
            handler,
            once,
            obligation: Obligation::acquire(&self.detector),
        });
        debug!(event, once, "program listener registered");

        let bus = Rc::downgrade(self);
        Val::native("dispose", move |_| {
            if let Some(bus) = bus.upgrade() {
                bus.remove(|registration| registration.id == id);
            }
            Ok(Val::Undefined)
        })
    }

    /// Remove registrations of `handler` for `event`, by function identity
    pub fn off(&self, event: &str, handler: &Val) -> bool {
        self.remove(|registration| {
            registration.event == event && registration.handler.strict_equals(handler)
        }) > 0
    }

    fn remove(&self, predicate: impl Fn(&Registration) -> bool) -> usize {
        let removed: Vec<Registration> = {
            let mut registrations = self.registrations.borrow_mut();
            let (removed, kept) = registrations.drain(..).partition(|r| predicate(r));
            *registrations = kept;
            removed
        };
        for registration in &removed {
            registration.obligation.release();
        }
        removed.len()
    }

    /// Deliver to host listeners, then schedule program handlers
    pub fn emit(self: &Rc<Self>, event: &str, payload: Val) {
        self.host.deliver(event, &payload.to_json());
        self.dispatch(event, payload);
    }

    /// Schedule every program handler of `event` as its own local task
    pub fn dispatch(self: &Rc<Self>, event: &str, payload: Val) {
        let fired: Vec<(Val, Option<Rc<Obligation>>)> = {
            let mut registrations = self.registrations.borrow_mut();
            let fired = registrations
                .iter()
                .filter(|r| r.event == event)
                .map(|r| (r.handler.clone(), r.once.then(|| r.obligation.clone())))
                .collect();
            registrations.retain(|r| !(r.once && r.event == event));
            fired
        };

        for (handler, once) in fired {
            let detector = self.detector.clone();
            let payload = payload.clone();
            let event = event.to_string();
            spawn_local(async move {
                match invoke(&handler, vec![payload]).await {
                    Ok(_) | Err(Interrupt::Halt) => {}
                    Err(Interrupt::Throw(value)) => {
                        let err = adapt_error(&value);
                        warn!(event = %event, error = %err, "event handler failed");
                        detector.reset(Some(err));
                    }
                }
                if let Some(obligation) = once {
                    obligation.release();
                }
            });
        }
    }

    /// Number of live program registrations
    pub fn registered(&self) -> usize {
        self.registrations.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Sandbox;
    use serde_json::json;
    use tokio::task::LocalSet;

    fn bus() -> (Rc<EventBus>, Arc<HostListeners>, Arc<QuiescenceDetector>) {
        let host = Arc::new(HostListeners::new());
        let detector = Arc::new(QuiescenceDetector::new());
        (EventBus::new(host.clone(), detector.clone()), host, detector)
    }

    fn run_local<F: std::future::Future>(future: F) -> F::Output {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        LocalSet::new().block_on(&runtime, future)
    }

    #[test]
    fn test_host_once_listener_fires_once() {
        let host = HostListeners::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        host.once("tick", move |payload| sink.lock().unwrap().push(payload.clone()));

        host.deliver("tick", &json!(1));
        host.deliver("tick", &json!(2));
        assert_eq!(*seen.lock().unwrap(), vec![json!(1)]);
        assert!(host.is_empty());
    }

    #[test]
    fn test_host_off_by_id() {
        let host = HostListeners::new();
        let id = host.on("tick", |_| panic!("removed listener called"));
        assert!(host.off(id));
        assert!(!host.off(id));
        host.deliver("tick", &JsonValue::Null);
    }

    #[test]
    fn test_registration_holds_one_obligation() {
        run_local(async {
            let (bus, _, detector) = bus();
            let handler = Val::native("h", |_| Ok(Val::Undefined));

            let dispose = bus.register("x", handler.clone(), false);
            assert_eq!(detector.outstanding(), 1);

            assert!(bus.off("x", &handler));
            assert_eq!(detector.outstanding(), 0);

            invoke(&dispose, vec![]).await.unwrap();
            assert!(!bus.off("x", &handler));
            assert_eq!(detector.outstanding(), 0);
        });
    }

    #[test]
    fn test_once_handler_releases_after_running() {
        run_local(async {
            let (bus, host, detector) = bus();
            let sandbox = Sandbox::new(Vec::new());
            let handler = sandbox
                .evaluate("let got = 0; function handler(v) { got = v }\nhandler")
                .await
                .unwrap();

            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = seen.clone();
            host.on("x", move |payload| sink.lock().unwrap().push(payload.clone()));

            bus.register("x", handler, true);
            assert_eq!(detector.outstanding(), 1);
            let drained = detector.once_drained();

            bus.emit("x", Val::Num(7.0));
            assert_eq!(bus.registered(), 0);
            drained.await.unwrap();

            assert_eq!(detector.outstanding(), 0);
            assert_eq!(sandbox.globals().lookup("got"), Some(Val::Num(7.0)));
            assert_eq!(*seen.lock().unwrap(), vec![json!(7)]);
        });
    }

    #[test]
    fn test_off_while_once_handler_runs_releases_once() {
        run_local(async {
            let (bus, _, detector) = bus();
            let sandbox = Sandbox::new(Vec::new());
            let handler = sandbox
                .evaluate("async function handler() { 1 }\nhandler")
                .await
                .unwrap();

            detector.increment();
            bus.register("x", handler.clone(), true);
            bus.dispatch("x", Val::Undefined);
            assert!(!bus.off("x", &handler));

            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            assert_eq!(detector.outstanding(), 1);
        });
    }

    #[test]
    fn test_throwing_handler_resets_with_error() {
        run_local(async {
            let (bus, _, detector) = bus();
            let handler = Val::native("h", |_| {
                Err(Interrupt::type_error("handler broke"))
            });
            detector.increment();
            bus.register("x", handler, false);
            let drained = detector.once_drained();

            bus.dispatch("x", Val::Null);
            let result = drained.await;
            assert_eq!(
                result,
                Err(crate::errors::RunError::Type("handler broke".into()))
            );
        });
    }
}
