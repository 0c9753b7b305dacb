//! Batch run-state gate.
//!
//! Two states, `Idle` and `BatchRunning`, shared by the command interpreter
//! (sole writer) and the heartbeat loop (reader). Transitions are guarded
//! compare-and-set operations under one lock:
//!
//! ```text
//!          BatchStart (only from Idle)
//!   Idle ─────────────────────────────► BatchRunning
//!    ▲                                      │
//!    └──────────── BatchEnd ────────────────┘
//!          (BatchGuard drop, incl. unwind)
//! ```
//!
//! The heartbeat only writes while holding the gate in `Idle`, so a batch
//! can never start in the middle of a heartbeat write and the heartbeat can
//! never write while a batch runs.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::trace;

/// Interpreter run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No batch executing; heartbeat may write.
    Idle,
    /// A batch is executing; heartbeat skips its ticks.
    BatchRunning,
}

/// Event that can trigger a run-state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEvent {
    /// A batch is about to execute its first line.
    BatchStart,
    /// A batch finished, was aborted, or unwound.
    BatchEnd,
}

/// Result of a run-state transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition succeeded, carrying the new state.
    Ok(RunState),
    /// Transition rejected, with the reason.
    Rejected(&'static str),
}

/// Shared run-state gate.
#[derive(Debug)]
pub struct RunGate {
    state: Mutex<RunState>,
    released: Notify,
}

impl RunGate {
    /// Create a gate in `Idle`.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RunState::Idle),
            released: Notify::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    /// Apply `event` if it is valid from the current state.
    pub fn handle_event(&self, event: RunEvent) -> TransitionResult {
        let mut state = self.state.lock();
        let result = transition(*state, event);
        if let TransitionResult::Ok(next) = result {
            trace!("RunGate {:?} -> {:?}", *state, next);
            *state = next;
        }
        result
    }

    /// Enter `BatchRunning` if currently `Idle`.
    pub fn try_begin(self: &Arc<Self>) -> Option<BatchGuard> {
        match self.handle_event(RunEvent::BatchStart) {
            TransitionResult::Ok(_) => Some(BatchGuard {
                gate: Arc::clone(self),
            }),
            TransitionResult::Rejected(_) => None,
        }
    }

    /// Enter `BatchRunning`, waiting for a running batch to finish first.
    pub async fn begin(self: &Arc<Self>) -> BatchGuard {
        loop {
            let released = self.released.notified();
            if let Some(guard) = self.try_begin() {
                return guard;
            }
            released.await;
        }
    }

    /// Run `f` only while `Idle`, holding the gate so no batch can start
    /// until `f` returns. Returns `None` without calling `f` otherwise.
    pub fn when_idle<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let state = self.state.lock();
        if *state != RunState::Idle {
            return None;
        }
        Some(f())
    }
}

impl Default for RunGate {
    fn default() -> Self {
        Self::new()
    }
}

fn transition(state: RunState, event: RunEvent) -> TransitionResult {
    match (state, event) {
        (RunState::Idle, RunEvent::BatchStart) => TransitionResult::Ok(RunState::BatchRunning),
        (RunState::BatchRunning, RunEvent::BatchEnd) => TransitionResult::Ok(RunState::Idle),
        (RunState::BatchRunning, RunEvent::BatchStart) => {
            TransitionResult::Rejected("batch already running")
        }
        (RunState::Idle, RunEvent::BatchEnd) => TransitionResult::Rejected("no batch running"),
    }
}

/// Proof of a running batch. Returns the gate to `Idle` when dropped,
/// whether the batch completed, returned early, or unwound.
#[derive(Debug)]
pub struct BatchGuard {
    gate: Arc<RunGate>,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.gate.handle_event(RunEvent::BatchEnd);
        self.gate.released.notify_waiters();
    }
}
