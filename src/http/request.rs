//! Per-request state.
//!
//! # Responsibilities
//! - Carry the envelope version for this request (overridable once)
//! - Resolve the request content type (forced by middleware, else header)
//! - Expose the request ID set by the request-id layer
//!
//! # Design Decisions
//! - Explicit value extracted per request; nothing request-scoped is global
//! - The service-wide default version rides in request extensions

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::CONTENT_TYPE;
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap};

use crate::http::content_type::ContentType;
use crate::http::envelope::Version;
use crate::http::error::ApiError;
use crate::http::status::ErrorStatus;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Service-wide default version, installed as a request extension by the
/// HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultVersion(pub Version);

/// State for one request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    version: Version,
    version_overridden: bool,
    content_type: ContentType,
    request_id: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from request headers and extensions.
    pub fn resolve(headers: &HeaderMap, extensions: &Extensions) -> Self {
        let version = extensions
            .get::<DefaultVersion>()
            .map(|default| default.0.clone())
            .unwrap_or_default();

        let content_type = extensions.get::<ContentType>().copied().unwrap_or_else(|| {
            headers
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(ContentType::classify)
                .unwrap_or_default()
        });

        let request_id = headers
            .get(X_REQUEST_ID)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        Self {
            version,
            version_overridden: false,
            content_type,
            request_id,
        }
    }

    /// Override the envelope version for this request.
    ///
    /// Only the first override takes effect; later attempts are logged and
    /// return `false`.
    pub fn override_version(&mut self, label: impl Into<String>, number: impl Into<String>) -> bool {
        if self.version_overridden {
            tracing::warn!(
                request_id = self.request_id.as_deref().unwrap_or("unknown"),
                "Version already overridden for this request"
            );
            return false;
        }
        self.version = Version::new(label, number);
        self.version_overridden = true;
        true
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// An [`ApiError`] stamped with this request's version.
    pub fn error(&self, status: ErrorStatus, message: impl Into<String>) -> ApiError {
        ApiError::new(status, message).with_version(self.version.clone())
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::resolve(&parts.headers, &parts.extensions))
    }
}
