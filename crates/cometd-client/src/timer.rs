//! Timer seam between the client state machine and whatever drives it.
//!
//! The state machine never sleeps: it asks a `Scheduler` to hand a
//! `TimerTask` back to `BayeuxClient::on_timer` once a delay has elapsed.
//! Cancellation is best effort, so every consumer re-checks the timer id
//! before acting on a firing.

use std::time::Duration;

use crate::transport::RequestId;

/// Identifier allocated by the scheduler.
pub type TimerId = u64;

/// Delayed protocol operation (only one may be pending at a time).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayedAction {
    Handshake,
    Connect,
}

/// What to do when a timer fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerTask {
    /// Backoff / advice interval elapsed.
    Delayed(DelayedAction),
    /// A request exceeded its network delay.
    RequestTimeout { transport: String, request: RequestId },
    /// A send failed synchronously; report it outside the send call stack.
    DeferredFailure {
        transport: String,
        request: RequestId,
        reason: String,
    },
}

/// A fired timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timer {
    pub id: TimerId,
    pub task: TimerTask,
}

/// `setTimeout`/`clearTimeout` for the state machine.
pub trait Scheduler: Send + Sync {
    /// Deliver `task` to `BayeuxClient::on_timer` after `delay`.
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerId;
    fn cancel(&self, id: TimerId);
}
