//! Quiescence detector
//!
//! Counts outstanding obligations of a run: the main body plus every
//! listener the program registered. The 1 -> 0 transition of the count
//! fires drained callbacks and settles waiting [`Drained`] futures. A reset
//! settles everything at once, optionally failing the futures with an error
//! that drained callbacks never see.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::debug;

use crate::errors::RunError;

pub type DrainedCallback = Arc<dyn Fn() + Send + Sync>;

type Waiter = oneshot::Sender<Result<(), RunError>>;

#[derive(Default)]
struct DetectorState {
    outstanding: i64,
    callbacks: Vec<DrainedCallback>,
    waiters: Vec<Waiter>,
}

#[derive(Default)]
pub struct QuiescenceDetector {
    state: Mutex<DetectorState>,
}

impl QuiescenceDetector {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, DetectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn increment(&self) {
        self.state().outstanding += 1;
    }

    pub fn decrement(&self) {
        let drained = {
            let mut state = self.state();
            state.outstanding -= 1;
            if state.outstanding == 0 {
                Some((state.callbacks.clone(), std::mem::take(&mut state.waiters)))
            } else {
                None
            }
        };

        if let Some((callbacks, waiters)) = drained {
            debug!("obligations drained");
            settle(callbacks, waiters, None);
        }
    }

    /// Zero the count and settle every waiter, with `error` if given
    pub fn reset(&self, error: Option<RunError>) {
        let (callbacks, waiters) = {
            let mut state = self.state();
            state.outstanding = 0;
            (state.callbacks.clone(), std::mem::take(&mut state.waiters))
        };
        debug!(failed = error.is_some(), "detector reset");
        settle(callbacks, waiters, error);
    }

    pub fn outstanding(&self) -> i64 {
        self.state().outstanding
    }

    /// Register a callback fired on every drain and reset
    pub fn on_drained(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.state().callbacks.push(Arc::new(callback));
    }

    /// Future settled by the next drain or reset
    pub fn once_drained(&self) -> Drained {
        let (tx, rx) = oneshot::channel();
        self.state().waiters.push(tx);
        Drained { rx }
    }
}

fn settle(callbacks: Vec<DrainedCallback>, waiters: Vec<Waiter>, error: Option<RunError>) {
    for callback in callbacks {
        callback();
    }
    for waiter in waiters {
        let result = match &error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        };
        let _ = waiter.send(result);
    }
}

/// Settles with the outcome of a drain; resolves `Ok` if the detector is gone
pub struct Drained {
    rx: oneshot::Receiver<Result<(), RunError>>,
}

impl Future for Drained {
    type Output = Result<(), RunError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Ok(())),
            Poll::Pending => Poll::Pending,
        }
    }
}
