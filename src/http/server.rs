//! HTTP transport.
//!
//! # Responsibilities
//! - Bind a TCP listener for the configured address
//! - Serve an Axum router wrapped in the service middleware stack
//! - Drain connections on a graceful stop, abandon them on a forced one
//!
//! # Middleware (outermost first)
//! ```text
//! SetRequestId → Trace → PropagateRequestId → timeout_envelope → Timeout → BodyLimit
//!     → record_metrics → CatchPanic → DefaultVersion → routes / not_found
//! ```

use std::any::Any;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::config::{ListenerConfig, ServiceConfig};
use crate::http::envelope::Version;
use crate::http::error::{ApiError, ErrorKind};
use crate::http::handlers;
use crate::http::request::{DefaultVersion, X_REQUEST_ID};
use crate::lifecycle::{Transport, TransportError};
use crate::observability::metrics;

/// Serves an Axum router as a [`Transport`].
pub struct HttpTransport {
    config: ListenerConfig,
    router: Router,
    listener: Mutex<Option<TcpListener>>,
    local_addr: OnceLock<SocketAddr>,
    stop_tx: watch::Sender<bool>,
    force_tx: watch::Sender<bool>,
    finished_tx: watch::Sender<bool>,
}

impl HttpTransport {
    /// Wrap `routes` in the middleware stack. Unmatched paths get a 404
    /// error envelope stamped with `version`.
    pub fn new(config: ListenerConfig, routes: Router, version: Version) -> Self {
        let router = build_router(&config, routes, version);
        Self {
            config,
            router,
            listener: Mutex::new(None),
            local_addr: OnceLock::new(),
            stop_tx: watch::channel(false).0,
            force_tx: watch::channel(false).0,
            finished_tx: watch::channel(false).0,
        }
    }

    /// Transport serving the built-in routes.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let version = Version::new(&config.version.label, &config.version.number);
        Self::new(config.listener.clone(), handlers::routes(), version)
    }

    /// Address actually bound, once `bind` has succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    fn take_listener(&self) -> Result<TcpListener, TransportError> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TransportError::NotBound)
    }
}

impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn bind(&self) -> Result<(), TransportError> {
        let address = self.config.bind_address.as_str();
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| TransportError::Bind {
                address: address.to_string(),
                source,
            })?;
        let local = listener.local_addr().map_err(|source| TransportError::Bind {
            address: address.to_string(),
            source,
        })?;

        let _ = self.local_addr.set(local);
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
        tracing::info!(address = %local, "Listener bound");
        Ok(())
    }

    async fn serve(&self) -> Result<(), TransportError> {
        let listener = self.take_listener()?;
        let mut stop_rx = self.stop_tx.subscribe();
        let mut force_rx = self.force_tx.subscribe();

        let drain = async move {
            let _ = stop_rx.wait_for(|stop| *stop).await;
        };
        let server = axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(drain)
            .into_future();

        let result = tokio::select! {
            served = server => served.map_err(TransportError::Serve),
            _ = force_rx.wait_for(|force| *force) => {
                tracing::warn!("Abandoning open connections");
                Ok(())
            }
        };
        self.finished_tx.send_replace(true);
        result
    }

    async fn graceful_stop(&self) {
        let mut finished = self.finished_tx.subscribe();
        self.stop_tx.send_replace(true);
        let _ = finished.wait_for(|done| *done).await;
    }

    fn force_stop(&self) {
        self.force_tx.send_replace(true);
    }
}

fn build_router(config: &ListenerConfig, routes: Router, version: Version) -> Router {
    let panic_version = version.clone();
    routes
        .fallback(handlers::not_found)
        .layer(Extension(DefaultVersion(version.clone())))
        .layer(CatchPanicLayer::custom(move |cause| {
            panic_response(&panic_version, cause)
        }))
        .layer(middleware::from_fn(record_metrics))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout(),
        ))
        .layer(middleware::map_response_with_state(version, timeout_envelope))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Span for one request, tagged with the ID set by `SetRequestIdLayer`.
fn request_span(request: &Request) -> Span {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id,
    )
}

// The timeout layer answers with a bare 408; give it an envelope.
async fn timeout_envelope(State(version): State<Version>, response: Response) -> Response {
    if response.status() != StatusCode::REQUEST_TIMEOUT
        || response.headers().contains_key(CONTENT_TYPE)
    {
        return response;
    }
    ApiError::request_timeout("request exceeded the configured timeout")
        .with_kind(ErrorKind::Transport)
        .with_version(version)
        .into_response()
}

fn panic_response(version: &Version, cause: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = cause.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = cause.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    tracing::error!(panic = detail, "Handler panicked");
    metrics::record_panic();

    ApiError::internal_server_error(format!("handler panicked: {detail}"))
        .with_kind(ErrorKind::Transport)
        .with_version(version.clone())
        .into_response()
}

async fn record_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let response = next.run(request).await;
    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}
