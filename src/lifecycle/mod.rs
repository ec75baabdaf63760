//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! transport.rs: the seam (bind → serve → graceful_stop / force_stop)
//!
//! manager.rs:
//!     bind → spawn serve → race(serve outcome, stop signal) → bounded stop
//!
//! signals.rs:  SIGTERM/SIGINT → stop request
//! shutdown.rs: programmatic stop request (cloneable trigger)
//! state.rs:    Idle → Starting → Running → ShuttingDown → Stopped
//! ```
//!
//! # Design Decisions
//! - First event wins; a serve error is authoritative, a later one is ignored
//! - Exactly one caller performs the stop, guarded by the state transition
//! - Shutdown has a deadline: forced close after it elapses

pub mod manager;
pub mod shutdown;
pub mod signals;
pub mod state;
pub mod transport;

pub use manager::{
    LifecycleError, LifecycleManager, ShutdownOutcome, ShutdownReason, ShutdownReport,
    DEFAULT_GRACE_PERIOD,
};
pub use shutdown::Shutdown;
pub use signals::StopSignal;
pub use state::{LifecycleState, TransitionError};
pub use transport::{Transport, TransportError};
