//! Step gate
//!
//! Every checkpoint of an instrumented program passes through the gate. A
//! checkpoint notifies subscribers with the statement text, waits out the
//! pace delay, then waits while the gate is paused. Destroying the gate
//! cancels both waits and fails every later checkpoint.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::task::yield_now;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Signal raised by checkpoints once the gate is destroyed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("gate-destroyed")]
pub struct GateDestroyed;

pub type StepSubscriber = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct GateState {
    pace: Duration,
    /// Present while paused; cancelled on resume
    resume: Option<CancellationToken>,
    subscribers: Vec<(SubscriptionId, StepSubscriber)>,
    next_subscription: u64,
}

pub struct StepGate {
    state: Mutex<GateState>,
    destroyed: CancellationToken,
}

impl StepGate {
    pub fn new(pace: Duration) -> Self {
        Self {
            state: Mutex::new(GateState {
                pace,
                resume: None,
                subscribers: Vec::new(),
                next_subscription: 0,
            }),
            destroyed: CancellationToken::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /* ===================== Checkpoints ===================== */

    pub async fn checkpoint(&self, text: &str) -> Result<(), GateDestroyed> {
        if self.is_destroyed() {
            return Err(GateDestroyed);
        }

        let (pace, subscribers) = {
            let state = self.state();
            let subscribers: Vec<StepSubscriber> =
                state.subscribers.iter().map(|(_, s)| s.clone()).collect();
            (state.pace, subscribers)
        };
        for subscriber in subscribers {
            subscriber(text);
        }

        self.pace_delay(pace).await?;

        while let Some(resume) = self.resume_token() {
            tokio::select! {
                biased;
                _ = self.destroyed.cancelled() => return Err(GateDestroyed),
                _ = resume.cancelled() => {}
            }
        }

        if self.is_destroyed() {
            return Err(GateDestroyed);
        }
        Ok(())
    }

    async fn pace_delay(&self, pace: Duration) -> Result<(), GateDestroyed> {
        if pace.is_zero() {
            yield_now().await;
            return Ok(());
        }

        tokio::select! {
            biased;
            _ = self.destroyed.cancelled() => Err(GateDestroyed),
            _ = sleep(pace) => Ok(()),
        }
    }

    fn resume_token(&self) -> Option<CancellationToken> {
        self.state().resume.clone()
    }

    /* ===================== Control ===================== */

    pub fn pause(&self) {
        if self.is_destroyed() {
            return;
        }
        let mut state = self.state();
        if state.resume.is_none() {
            state.resume = Some(CancellationToken::new());
            debug!("gate paused");
        }
    }

    pub fn resume(&self) {
        if let Some(token) = self.state().resume.take() {
            token.cancel();
            debug!("gate resumed");
        }
    }

    /// Affects checkpoints that start after the call
    pub fn set_pace(&self, pace: Duration) {
        self.state().pace = pace;
    }

    pub fn destroy(&self) {
        if self.destroyed.is_cancelled() {
            return;
        }
        self.destroyed.cancel();
        if let Some(token) = self.state().resume.take() {
            token.cancel();
        }
        debug!("gate destroyed");
    }

    pub fn subscribe(&self, subscriber: impl Fn(&str) + Send + Sync + 'static) -> SubscriptionId {
        let mut state = self.state();
        let id = SubscriptionId(state.next_subscription);
        state.next_subscription += 1;
        state.subscribers.push((id, Arc::new(subscriber)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state();
        let before = state.subscribers.len();
        state.subscribers.retain(|(existing, _)| *existing != id);
        state.subscribers.len() != before
    }

    /* ===================== Queries ===================== */

    pub fn pace(&self) -> Duration {
        self.state().pace
    }

    pub fn is_paused(&self) -> bool {
        self.state().resume.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.is_cancelled()
    }
}
