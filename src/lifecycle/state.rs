//! Lifecycle state machine.
//!
//! ```text
//! Idle → Starting → Running → ShuttingDown → Stopped
//!            └──────────(bind failed)────────────┘
//! ```
//!
//! Every transition is a compare-and-set under one lock, so concurrent
//! callers racing for the same edge see exactly one winner.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

/// Lifecycle of a single transport run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Idle,
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

impl LifecycleState {
    /// Whether `self → next` is an edge of the state machine.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Running)
                | (Starting, Stopped)
                | (Running, ShuttingDown)
                | (ShuttingDown, Stopped)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting_down",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid lifecycle transition {from} → {to} (current state: {actual})")]
pub struct TransitionError {
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub actual: LifecycleState,
}

#[derive(Debug)]
struct Inner {
    current: LifecycleState,
    history: Vec<LifecycleState>,
}

/// Guarded lifecycle state with a recorded trace.
#[derive(Debug)]
pub struct StateMachine {
    inner: Mutex<Inner>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                current: LifecycleState::Idle,
                history: vec![LifecycleState::Idle],
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state.
    pub fn current(&self) -> LifecycleState {
        self.lock().current
    }

    /// Every state visited so far, starting with `Idle`.
    pub fn history(&self) -> Vec<LifecycleState> {
        self.lock().history.clone()
    }

    /// Move from `from` to `to` if and only if the machine is currently in
    /// `from` and the edge exists.
    pub fn advance(&self, from: LifecycleState, to: LifecycleState) -> Result<(), TransitionError> {
        let mut inner = self.lock();
        if inner.current != from || !from.can_transition_to(to) {
            return Err(TransitionError {
                from,
                to,
                actual: inner.current,
            });
        }
        inner.current = to;
        inner.history.push(to);
        tracing::debug!(from = %from, to = %to, "Lifecycle transition");
        Ok(())
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
