//! Canonical status table.
//!
//! One versioned constant mapping HTTP status → (machine code, human text).
//! `meta.code` in every envelope carries the machine code. Unknown statuses
//! resolve to the empty string.

use std::fmt;

use axum::http::StatusCode;

/// One row of the status table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StatusRecord {
    pub status: u16,
    /// Stable machine-readable code, e.g. `BAD_REQUEST`.
    pub code: &'static str,
    /// Human-readable reason phrase, e.g. `Bad Request`.
    pub text: &'static str,
}

const fn record(status: u16, code: &'static str, text: &'static str) -> StatusRecord {
    StatusRecord { status, code, text }
}

/// Ordered by status.
pub const STATUS_TABLE: [StatusRecord; 21] = [
    record(200, "OK", "OK"),
    record(201, "CREATED", "Created"),
    record(202, "ACCEPTED", "Accepted"),
    record(301, "MOVED_PERMANENTLY", "Moved Permanently"),
    record(400, "BAD_REQUEST", "Bad Request"),
    record(401, "UNAUTHORIZED", "Unauthorized"),
    record(402, "PAYMENT_REQUIRED", "Payment Required"),
    record(403, "FORBIDDEN", "Forbidden"),
    record(404, "NOT_FOUND", "Not Found"),
    record(405, "METHOD_NOT_ALLOWED", "Method Not Allowed"),
    record(406, "NOT_ACCEPTABLE", "Not Acceptable"),
    record(407, "PROXY_AUTH_REQUIRED", "Proxy Authentication Required"),
    record(408, "REQUEST_TIMEOUT", "Request Timeout"),
    record(409, "CONFLICT", "Conflict"),
    record(413, "PAYLOAD_TOO_LARGE", "Payload Too Large"),
    record(415, "UNSUPPORTED_MEDIA_TYPE", "Unsupported Media Type"),
    record(422, "UNPROCESSABLE_ENTITY", "Unprocessable Entity"),
    record(500, "INTERNAL_SERVER_ERROR", "Internal Server Error"),
    record(502, "BAD_GATEWAY", "Bad Gateway"),
    record(503, "SERVICE_UNAVAILABLE", "Service Unavailable"),
    record(504, "GATEWAY_TIMEOUT", "Gateway Timeout"),
];

/// Look up a status.
pub fn lookup(status: u16) -> Option<&'static StatusRecord> {
    STATUS_TABLE
        .binary_search_by_key(&status, |record| record.status)
        .ok()
        .map(|index| &STATUS_TABLE[index])
}

/// Machine code for `status`, or `""` if the status is not in the table.
pub fn machine_code(status: u16) -> &'static str {
    lookup(status).map_or("", |record| record.code)
}

/// Human text for `status`, or `""` if the status is not in the table.
pub fn status_text(status: u16) -> &'static str {
    lookup(status).map_or("", |record| record.text)
}

/// Statuses accepted by the error-signaling API. Each has a table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorStatus {
    BadRequest = 400,
    Unauthorized = 401,
    PaymentRequired = 402,
    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,
    NotAcceptable = 406,
    ProxyAuthRequired = 407,
    RequestTimeout = 408,
    Conflict = 409,
    PayloadTooLarge = 413,
    UnsupportedMediaType = 415,
    UnprocessableEntity = 422,
    InternalServerError = 500,
    BadGateway = 502,
    ServiceUnavailable = 503,
    GatewayTimeout = 504,
}

impl ErrorStatus {
    pub const ALL: [ErrorStatus; 17] = [
        ErrorStatus::BadRequest,
        ErrorStatus::Unauthorized,
        ErrorStatus::PaymentRequired,
        ErrorStatus::Forbidden,
        ErrorStatus::NotFound,
        ErrorStatus::MethodNotAllowed,
        ErrorStatus::NotAcceptable,
        ErrorStatus::ProxyAuthRequired,
        ErrorStatus::RequestTimeout,
        ErrorStatus::Conflict,
        ErrorStatus::PayloadTooLarge,
        ErrorStatus::UnsupportedMediaType,
        ErrorStatus::UnprocessableEntity,
        ErrorStatus::InternalServerError,
        ErrorStatus::BadGateway,
        ErrorStatus::ServiceUnavailable,
        ErrorStatus::GatewayTimeout,
    ];

    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorStatus::BadRequest => StatusCode::BAD_REQUEST,
            ErrorStatus::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorStatus::PaymentRequired => StatusCode::PAYMENT_REQUIRED,
            ErrorStatus::Forbidden => StatusCode::FORBIDDEN,
            ErrorStatus::NotFound => StatusCode::NOT_FOUND,
            ErrorStatus::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorStatus::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            ErrorStatus::ProxyAuthRequired => StatusCode::PROXY_AUTHENTICATION_REQUIRED,
            ErrorStatus::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            ErrorStatus::Conflict => StatusCode::CONFLICT,
            ErrorStatus::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorStatus::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ErrorStatus::UnprocessableEntity => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorStatus::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorStatus::BadGateway => StatusCode::BAD_GATEWAY,
            ErrorStatus::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorStatus::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn code(self) -> &'static str {
        machine_code(self.as_u16())
    }

    pub fn text(self) -> &'static str {
        status_text(self.as_u16())
    }

    pub fn is_server_error(self) -> bool {
        self.as_u16() >= 500
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.text())
    }
}
