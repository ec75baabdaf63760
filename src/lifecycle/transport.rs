//! The transport seam.
//!
//! A transport is anything with a blocking serve loop that can be asked to
//! stop: an HTTP listener, an RPC server, a test double. The lifecycle
//! manager drives it through `bind → serve → graceful_stop / force_stop`.

use std::future::Future;

use thiserror::Error;

/// Transport failures (bind/listen or serve).
#[derive(Debug, Error)]
pub enum TransportError {
    /// Listening socket could not be created.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// `serve` was called before a successful `bind`, or twice.
    #[error("transport is not bound")]
    NotBound,

    /// The serve loop terminated with an I/O error.
    #[error("serve failed: {0}")]
    Serve(#[source] std::io::Error),

    /// Transport-specific failure.
    #[error("{0}")]
    Other(String),
}

/// A blocking network server managed by
/// [`LifecycleManager`](crate::lifecycle::LifecycleManager).
pub trait Transport: Send + Sync + 'static {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Acquire the listening resource. Failure here is fatal and happens
    /// before the manager reaches `Running`.
    fn bind(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Serve until the listener stops or fails.
    fn serve(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Stop accepting work and wait for in-flight work to finish. The
    /// manager bounds this with its grace period.
    fn graceful_stop(&self) -> impl Future<Output = ()> + Send;

    /// Abandon in-flight work immediately.
    fn force_stop(&self);
}
