//! Error-status signaling.
//!
//! # Responsibilities
//! - [`ResponseHead`]: status and headers with write-once ordering
//! - [`signal_error`]: mark a response as failed, pass the error through
//! - [`ApiError`]: a failed handler rendered as an error envelope
//!
//! # Design Decisions
//! - Headers are frozen once the status is written; a second status write
//!   is rejected instead of corrupting the response
//! - Every error response carries `X-Content-Type-Options: nosniff`

use std::fmt;

use axum::body::Body;
use axum::http::header::{HeaderName, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::http::content_type::{ContentType, MIME_APPLICATION_JSON_CHARSET_UTF8};
use crate::http::envelope::{Envelope, Version};
use crate::http::status::ErrorStatus;

/// Response head ordering violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeadError {
    #[error("status already written ({0})")]
    StatusAlreadyWritten(StatusCode),

    #[error("headers are frozen once the status is written")]
    HeadersFrozen,
}

/// Status line and headers of a response under construction.
#[derive(Debug, Default)]
pub struct ResponseHead {
    status: Option<StatusCode>,
    headers: HeaderMap,
}

impl ResponseHead {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) -> Result<(), HeadError> {
        if self.status.is_some() {
            return Err(HeadError::HeadersFrozen);
        }
        self.headers.insert(name, value);
        Ok(())
    }

    /// Set `Content-Type`. `Unknown` leaves the header untouched.
    pub fn set_content_type(&mut self, content_type: ContentType) -> Result<(), HeadError> {
        match content_type.header_value() {
            Some(value) => self.set_header(CONTENT_TYPE, value),
            None => Ok(()),
        }
    }

    /// Finalize the status. Only the first call succeeds.
    pub fn write_status(&mut self, status: StatusCode) -> Result<(), HeadError> {
        if let Some(written) = self.status {
            return Err(HeadError::StatusAlreadyWritten(written));
        }
        self.status = Some(status);
        Ok(())
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Assemble the response. An unwritten status means 200.
    pub fn into_response(self, body: impl Into<Body>) -> Response {
        let mut response = Response::new(body.into());
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

/// Mark `head` as an error response and hand `err` back unchanged.
///
/// Sets `nosniff` and writes `status`. If a status was already written the
/// second write is ignored and logged.
pub fn signal_error<E>(head: &mut ResponseHead, status: ErrorStatus, err: E) -> E {
    if head.set_header(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")).is_ok() {
        let _ = head.write_status(status.status_code());
    } else {
        tracing::warn!(
            ignored_status = status.as_u16(),
            written_status = head.status().map(|s| s.as_u16()),
            "Status already written, ignoring error status"
        );
    }
    err
}

/// Which part of the system produced an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Request body could not be bound.
    Bind,
    /// Response payload could not be encoded.
    Encoding,
    /// Serving failed underneath the handler (including recovered panics).
    Transport,
    /// The handler reported a failure.
    Handler,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Bind => "bind",
            ErrorKind::Encoding => "encoding",
            ErrorKind::Transport => "transport",
            ErrorKind::Handler => "handler",
        }
    }
}

/// A failed request, rendered as an error envelope.
#[derive(Debug, Clone, Error)]
#[error("{status}: {message}")]
pub struct ApiError {
    status: ErrorStatus,
    message: String,
    kind: ErrorKind,
    version: Version,
}

macro_rules! status_constructors {
    ($($name:ident => $status:ident),* $(,)?) => {
        impl ApiError {
            $(
                pub fn $name(err: impl fmt::Display) -> Self {
                    Self::new(ErrorStatus::$status, err.to_string())
                }
            )*
        }
    };
}

status_constructors! {
    bad_request => BadRequest,
    unauthorized => Unauthorized,
    payment_required => PaymentRequired,
    forbidden => Forbidden,
    not_found => NotFound,
    method_not_allowed => MethodNotAllowed,
    not_acceptable => NotAcceptable,
    proxy_auth_required => ProxyAuthRequired,
    request_timeout => RequestTimeout,
    conflict => Conflict,
    payload_too_large => PayloadTooLarge,
    unsupported_media_type => UnsupportedMediaType,
    unprocessable_entity => UnprocessableEntity,
    internal_server_error => InternalServerError,
    bad_gateway => BadGateway,
    service_unavailable => ServiceUnavailable,
    gateway_timeout => GatewayTimeout,
}

impl ApiError {
    pub fn new(status: ErrorStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            kind: ErrorKind::Handler,
            version: Version::default(),
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn envelope(&self) -> Envelope {
        Envelope::error(self.version.clone(), self.status, self.message.clone())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = self.status.as_u16(), kind = self.kind.as_str(), error = %self.message, "Request failed");
        } else {
            tracing::debug!(status = self.status.as_u16(), kind = self.kind.as_str(), error = %self.message, "Request rejected");
        }

        let mut head = ResponseHead::new();
        match self.envelope().to_json_bytes() {
            Ok(body) => {
                let _ = head.set_header(
                    CONTENT_TYPE,
                    HeaderValue::from_static(MIME_APPLICATION_JSON_CHARSET_UTF8),
                );
                signal_error(&mut head, self.status, ());
                head.into_response(body)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode error envelope");
                signal_error(&mut head, ErrorStatus::InternalServerError, ());
                head.into_response(Body::empty())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Boom;

    #[test]
    fn signal_error_passes_error_through() {
        let mut head = ResponseHead::new();
        let err = signal_error(&mut head, ErrorStatus::Forbidden, Boom);
        assert_eq!(err, Boom);
        assert_eq!(head.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(head.headers()[X_CONTENT_TYPE_OPTIONS], "nosniff");
    }

    #[test]
    fn second_status_is_ignored() {
        let mut head = ResponseHead::new();
        head.write_status(StatusCode::CREATED).unwrap();
        let _ = signal_error(&mut head, ErrorStatus::BadGateway, Boom);
        assert_eq!(head.status(), Some(StatusCode::CREATED));
        assert_eq!(
            head.write_status(StatusCode::OK),
            Err(HeadError::StatusAlreadyWritten(StatusCode::CREATED))
        );
    }

    #[test]
    fn content_type_must_precede_status() {
        let mut head = ResponseHead::new();
        head.set_content_type(ContentType::Json).unwrap();
        head.write_status(StatusCode::OK).unwrap();
        assert_eq!(
            head.set_content_type(ContentType::Html),
            Err(HeadError::HeadersFrozen)
        );
        assert_eq!(head.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn unwritten_status_defaults_to_ok() {
        let response = ResponseHead::new().into_response(Body::empty());
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn api_error_envelope_shape() {
        let err = ApiError::unprocessable_entity("name is required")
            .with_version(Version::new("v2", "2.0.0"));
        let envelope = err.envelope();
        assert_eq!(envelope.version.label, "v2");
        assert_eq!(envelope.meta.code, "UNPROCESSABLE_ENTITY");
        assert_eq!(envelope.meta.error_type, "Unprocessable Entity");
        assert_eq!(envelope.meta.error_message, "name is required");
        assert!(envelope.data.is_empty());
        assert_eq!(err.to_string(), "422 Unprocessable Entity: name is required");
    }

    #[tokio::test]
    async fn api_error_response_has_status_and_nosniff() {
        let response = ApiError::not_found("nothing here").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            MIME_APPLICATION_JSON_CHARSET_UTF8
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let envelope: Envelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(envelope.meta.code, "NOT_FOUND");
        assert_eq!(envelope.meta.error_message, "nothing here");
    }
}
