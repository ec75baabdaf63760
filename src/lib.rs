//! Service lifecycle and response envelopes.
//!
//! Runs a network transport under a lifecycle manager that races transport
//! failure against termination signals and stops the transport exactly once,
//! gracefully within a deadline or by force. HTTP handlers answer with a
//! uniform JSON envelope assembled from fragments.
//!
//! # Architecture Overview
//!
//! ```text
//!   SIGINT / SIGTERM / Shutdown ─┐
//!                                ▼
//!   ┌──────────────────────────────────────────┐
//!   │ lifecycle::LifecycleManager              │
//!   │   Idle → Starting → Running              │
//!   │        → ShuttingDown → Stopped          │
//!   └───────────────┬──────────────────────────┘
//!                   │ bind / serve / stop
//!                   ▼
//!   ┌──────────────────────────────────────────┐
//!   │ http::HttpTransport (axum + tower-http)  │
//!   │   RequestContext → handler → Envelope    │
//!   └──────────────────────────────────────────┘
//!
//!   config (TOML)      observability (tracing, Prometheus)
//! ```

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::ServiceConfig;
pub use http::{ApiError, Envelope, EnvelopeBuilder, Fragment, HttpTransport, RequestContext};
pub use lifecycle::{LifecycleManager, Shutdown, Transport};
