//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (listener, middleware stack, graceful drain)
//!     → request.rs (version, content type, request ID per request)
//!     → bind.rs (JSON / form body → typed value)
//!     → handler builds fragments
//!     → envelope.rs (merge fragments, stamp version + meta)
//!     → response.rs / error.rs (status, headers, JSON body)
//!     → Send to client
//! ```

pub mod bind;
pub mod content_type;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod request;
pub mod response;
pub mod server;
pub mod status;

pub use bind::{BindError, Bound};
pub use content_type::{force_content_type, ContentType};
pub use envelope::{
    Envelope, EnvelopeBuilder, EnvelopeError, Fragment, Meta, Pagination, Version,
};
pub use error::{signal_error, ApiError, ErrorKind, HeadError, ResponseHead};
pub use request::{DefaultVersion, RequestContext, X_REQUEST_ID};
pub use response::{redirect, respond};
pub use server::HttpTransport;
pub use status::{ErrorStatus, StatusRecord, STATUS_TABLE};
