//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use service_envelope::lifecycle::{LifecycleManager, LifecycleState, Transport, TransportError};
use tokio::sync::watch;

/// How [`MockTransport::serve`] behaves.
#[derive(Debug, Clone, Copy)]
pub enum ServeBehavior {
    /// Serve until stopped or forced, then return `Ok`.
    UntilStopped,
    /// Fail on its own after the delay.
    FailAfter(Duration),
    /// Return `Ok` on its own after the delay.
    CloseAfter(Duration),
    /// Serve until stopped, then return an error.
    FailOnStop,
    /// Panic after the delay.
    PanicAfter(Duration),
    /// Never return, even when forced.
    IgnoreStop,
}

/// Scriptable transport that counts how it was driven.
pub struct MockTransport {
    behavior: ServeBehavior,
    fail_bind: AtomicBool,
    hang_on_stop: AtomicBool,
    stop_tx: watch::Sender<bool>,
    force_tx: watch::Sender<bool>,
    finished_tx: watch::Sender<bool>,
    pub serve_calls: AtomicUsize,
    pub graceful_calls: AtomicUsize,
    pub force_calls: AtomicUsize,
}

impl MockTransport {
    pub fn new(behavior: ServeBehavior) -> Self {
        Self {
            behavior,
            fail_bind: AtomicBool::new(false),
            hang_on_stop: AtomicBool::new(false),
            stop_tx: watch::channel(false).0,
            force_tx: watch::channel(false).0,
            finished_tx: watch::channel(false).0,
            serve_calls: AtomicUsize::new(0),
            graceful_calls: AtomicUsize::new(0),
            force_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_bind(self) -> Self {
        self.fail_bind.store(true, Ordering::SeqCst);
        self
    }

    /// `graceful_stop` never completes.
    pub fn hanging_stop(self) -> Self {
        self.hang_on_stop.store(true, Ordering::SeqCst);
        self
    }

    pub fn graceful(&self) -> usize {
        self.graceful_calls.load(Ordering::SeqCst)
    }

    pub fn forced(&self) -> usize {
        self.force_calls.load(Ordering::SeqCst)
    }

    async fn stopped(&self) -> bool {
        let mut stop = self.stop_tx.subscribe();
        let mut force = self.force_tx.subscribe();
        tokio::select! {
            _ = stop.wait_for(|s| *s) => false,
            _ = force.wait_for(|f| *f) => true,
        }
    }
}

impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn bind(&self) -> Result<(), TransportError> {
        if self.fail_bind.load(Ordering::SeqCst) {
            return Err(TransportError::Bind {
                address: "mock:0".into(),
                source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
            });
        }
        Ok(())
    }

    async fn serve(&self) -> Result<(), TransportError> {
        self.serve_calls.fetch_add(1, Ordering::SeqCst);
        let result = match self.behavior {
            ServeBehavior::UntilStopped => {
                self.stopped().await;
                Ok(())
            }
            ServeBehavior::FailAfter(delay) => {
                tokio::time::sleep(delay).await;
                Err(TransportError::Other("listener exploded".into()))
            }
            ServeBehavior::CloseAfter(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            ServeBehavior::PanicAfter(delay) => {
                tokio::time::sleep(delay).await;
                panic!("serve loop bug")
            }
            ServeBehavior::IgnoreStop => std::future::pending().await,
            ServeBehavior::FailOnStop => {
                self.stopped().await;
                Err(TransportError::Other("failed while draining".into()))
            }
        };
        self.finished_tx.send_replace(true);
        result
    }

    async fn graceful_stop(&self) {
        self.graceful_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_on_stop.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let mut finished = self.finished_tx.subscribe();
        self.stop_tx.send_replace(true);
        let _ = finished.wait_for(|done| *done).await;
    }

    fn force_stop(&self) {
        self.force_calls.fetch_add(1, Ordering::SeqCst);
        self.force_tx.send_replace(true);
    }
}

/// Manager that ignores OS signals so tests only stop it explicitly.
pub fn manager<T: Transport>(transport: Arc<T>, grace: Duration) -> Arc<LifecycleManager<T>> {
    Arc::new(
        LifecycleManager::new(transport)
            .with_grace_period(grace)
            .with_signal_handling(false),
    )
}

/// Poll until the manager reaches `state`.
pub async fn wait_for_state<T: Transport>(manager: &LifecycleManager<T>, state: LifecycleState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while manager.state() != state {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("manager never reached {state}"));
}
