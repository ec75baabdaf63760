//! Lifecycle manager: run one transport, stop it exactly once.
//!
//! # Data Flow
//! ```text
//! run()
//!   Idle → Starting ── bind() fails ──────────────────────────→ Stopped (Err)
//!            │
//!            ├─ spawn serve() ─→ error channel (capacity 1) ─┐
//!            │                                               │ first event wins
//!   Running  └─ wait for SIGINT / SIGTERM / trigger ─────────┤
//!                                                            ▼
//!   ShuttingDown: graceful_stop() under deadline, else force_stop()
//!                                                            ▼
//!   Stopped: serve task joined, error channel drained and closed
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::config::ShutdownConfig;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::{self, StopSignal};
use crate::lifecycle::state::{LifecycleState, StateMachine, TransitionError};
use crate::lifecycle::transport::{Transport, TransportError};
use crate::observability::metrics;

/// Default upper bound for a graceful stop.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Errors returned by [`LifecycleManager::run`].
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// `run` was called on a manager that already ran.
    #[error("lifecycle manager has already been started")]
    AlreadyStarted,

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// The transport failed to bind, or its serve loop failed first.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}

/// Why the manager left `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// A termination signal or stop request arrived first.
    Signal(StopSignal),
    /// The serve loop returned an error first.
    TransportFailure,
    /// The serve loop returned cleanly on its own.
    TransportClosed,
}

impl ShutdownReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ShutdownReason::Signal(_) => "signal",
            ShutdownReason::TransportFailure => "transport_failure",
            ShutdownReason::TransportClosed => "transport_closed",
        }
    }
}

/// How the transport was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Graceful stop finished within the deadline.
    Graceful,
    /// Deadline elapsed; the transport was force-closed.
    Forced,
}

impl ShutdownOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ShutdownOutcome::Graceful => "graceful",
            ShutdownOutcome::Forced => "forced",
        }
    }
}

/// Summary of a completed shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub reason: ShutdownReason,
    pub outcome: ShutdownOutcome,
}

/// Runs a blocking [`Transport`] until it fails or is told to stop.
pub struct LifecycleManager<T: Transport> {
    transport: Arc<T>,
    state: StateMachine,
    trigger: Shutdown,
    grace_period: Duration,
    handle_signals: bool,
    report: Mutex<Option<ShutdownReport>>,
    stopped_tx: watch::Sender<bool>,
}

impl<T: Transport> LifecycleManager<T> {
    /// Create a manager with the default grace period, listening for OS signals.
    pub fn new(transport: Arc<T>) -> Self {
        let (stopped_tx, _) = watch::channel(false);
        Self {
            transport,
            state: StateMachine::new(),
            trigger: Shutdown::new(),
            grace_period: DEFAULT_GRACE_PERIOD,
            handle_signals: true,
            report: Mutex::new(None),
            stopped_tx,
        }
    }

    /// Create a manager from the `[shutdown]` config section.
    pub fn from_config(transport: Arc<T>, config: &ShutdownConfig) -> Self {
        Self::new(transport)
            .with_grace_period(config.grace_period())
            .with_signal_handling(config.handle_signals)
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Enable or disable SIGINT/SIGTERM handling. The trigger handle works
    /// either way.
    pub fn with_signal_handling(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// Handle that requests a stop, as if a termination signal arrived.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.trigger.clone()
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn state(&self) -> LifecycleState {
        self.state.current()
    }

    /// States visited so far, starting with `Idle`.
    pub fn history(&self) -> Vec<LifecycleState> {
        self.state.history()
    }

    /// Reason and outcome of the shutdown, once one has happened.
    pub fn report(&self) -> Option<ShutdownReport> {
        *self.report.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind and serve the transport until it fails or a stop is requested,
    /// then shut it down. Resolves once the manager is `Stopped`.
    ///
    /// Returns the serve error if the transport failed first, `Ok(())` for a
    /// requested stop or a clean close.
    pub async fn run(&self) -> Result<(), LifecycleError> {
        self.state
            .advance(LifecycleState::Idle, LifecycleState::Starting)
            .map_err(|_| LifecycleError::AlreadyStarted)?;

        tracing::info!(transport = self.transport.name(), "Starting transport");
        if let Err(e) = self.transport.bind().await {
            tracing::error!(transport = self.transport.name(), error = %e, "Transport failed to bind");
            self.state
                .advance(LifecycleState::Starting, LifecycleState::Stopped)?;
            return Err(LifecycleError::Transport(e));
        }

        let (serve_tx, mut serve_rx) = mpsc::channel::<Result<(), TransportError>>(1);
        let transport = Arc::clone(&self.transport);
        let mut serve_task = tokio::spawn(async move {
            let result = transport.serve().await;
            let _ = serve_tx.send(result).await;
        });

        self.state
            .advance(LifecycleState::Starting, LifecycleState::Running)?;
        tracing::info!(transport = self.transport.name(), "Transport running");

        let (reason, failure) = tokio::select! {
            signal = self.wait_for_stop() => (ShutdownReason::Signal(signal), None),
            served = serve_rx.recv() => match served {
                Some(Err(e)) => {
                    tracing::error!(transport = self.transport.name(), error = %e, "Transport failed");
                    (ShutdownReason::TransportFailure, Some(e))
                }
                Some(Ok(())) => {
                    tracing::info!(transport = self.transport.name(), "Transport closed");
                    (ShutdownReason::TransportClosed, None)
                }
                // The serve task ended without reporting: it panicked.
                None => {
                    tracing::error!(transport = self.transport.name(), "Serve task terminated unexpectedly");
                    (
                        ShutdownReason::TransportFailure,
                        Some(TransportError::Other("serve task terminated unexpectedly".into())),
                    )
                }
            },
        };

        // Wake any other holder of the trigger; a later signal is then moot.
        self.trigger.trigger();

        let (won, outcome) = match self.begin_shutdown(reason, self.grace_period).await {
            Some(outcome) => (true, outcome),
            None => (false, self.wait_until_stopped().await),
        };

        if outcome == ShutdownOutcome::Forced {
            serve_task.abort();
        }
        match tokio::time::timeout(self.grace_period, &mut serve_task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_cancelled() => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Serve task panicked"),
            Err(_) => {
                tracing::warn!(
                    transport = self.transport.name(),
                    "Serve loop outlived its stop, aborting"
                );
                serve_task.abort();
            }
        }
        while let Ok(late) = serve_rx.try_recv() {
            if let Err(e) = late {
                tracing::debug!(error = %e, "Ignoring serve error after shutdown began");
            }
        }
        serve_rx.close();

        self.state
            .advance(LifecycleState::ShuttingDown, LifecycleState::Stopped)?;
        tracing::info!(transport = self.transport.name(), "Transport stopped");

        match failure {
            Some(e) if won => Err(LifecycleError::Transport(e)),
            _ => Ok(()),
        }
    }

    /// Stop a running transport within `deadline`.
    ///
    /// Only the first caller performs the stop; any later call (or a call
    /// when the manager is not `Running`) returns `None`.
    pub async fn shutdown(&self, deadline: Duration) -> Option<ShutdownOutcome> {
        self.begin_shutdown(ShutdownReason::Signal(StopSignal::Requested), deadline)
            .await
    }

    async fn begin_shutdown(
        &self,
        reason: ShutdownReason,
        deadline: Duration,
    ) -> Option<ShutdownOutcome> {
        if let Err(e) = self
            .state
            .advance(LifecycleState::Running, LifecycleState::ShuttingDown)
        {
            tracing::debug!(state = %e.actual, "Shutdown already in progress or not running");
            return None;
        }
        // Pull `run` out of its wait so it joins or aborts the serve task.
        self.trigger.trigger();

        tracing::info!(
            transport = self.transport.name(),
            reason = reason.as_str(),
            deadline_ms = deadline.as_millis() as u64,
            "Stopping transport gracefully"
        );

        let outcome = match tokio::time::timeout(deadline, self.transport.graceful_stop()).await {
            Ok(()) => {
                tracing::info!(transport = self.transport.name(), outcome = "graceful", "Transport drained");
                ShutdownOutcome::Graceful
            }
            Err(_) => {
                tracing::warn!(
                    transport = self.transport.name(),
                    outcome = "forced",
                    deadline_ms = deadline.as_millis() as u64,
                    "Graceful stop exceeded deadline, forcing close"
                );
                self.transport.force_stop();
                ShutdownOutcome::Forced
            }
        };

        *self.report.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(ShutdownReport { reason, outcome });
        metrics::record_shutdown(reason.as_str(), outcome.as_str());
        self.stopped_tx.send_replace(true);
        Some(outcome)
    }

    async fn wait_for_stop(&self) -> StopSignal {
        let os = async {
            if self.handle_signals {
                signals::termination().await
            } else {
                std::future::pending().await
            }
        };
        tokio::select! {
            signal = os => signal,
            _ = self.trigger.triggered() => {
                tracing::info!("Shutdown requested");
                StopSignal::Requested
            }
        }
    }

    async fn wait_until_stopped(&self) -> ShutdownOutcome {
        let mut rx = self.stopped_tx.subscribe();
        let _ = rx.wait_for(|stopped| *stopped).await;
        self.report()
            .map(|report| report.outcome)
            .unwrap_or(ShutdownOutcome::Graceful)
    }
}
