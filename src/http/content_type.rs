//! Content-type negotiation.
//!
//! Classify a wire MIME string into a closed [`ContentType`] set and render
//! it back. A route can force its content type with
//! [`force_content_type`]; handlers then see the forced type through
//! [`RequestContext`](crate::http::RequestContext).

use axum::extract::{Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

pub const MIME_APPLICATION_JSON: &str = "application/json";
pub const MIME_APPLICATION_JSON_CHARSET_UTF8: &str = "application/json; charset=UTF-8";
pub const MIME_APPLICATION_XML: &str = "application/xml";
pub const MIME_TEXT_XML: &str = "text/xml";
pub const MIME_APPLICATION_FORM: &str = "application/x-www-form-urlencoded";
pub const MIME_MULTIPART_FORM: &str = "multipart/form-data";
pub const MIME_TEXT_HTML: &str = "text/html";
pub const MIME_TEXT_PLAIN: &str = "text/plain";
pub const MIME_TEXT_EVENT_STREAM: &str = "text/event-stream";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// Content types this crate distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentType {
    #[default]
    Unknown,
    PlainText,
    Html,
    Json,
    Xml,
    Form,
    MultipartForm,
    EventStream,
}

impl ContentType {
    /// Classify a MIME string. Parameters after `;` are ignored; the first
    /// matching prefix wins.
    pub fn classify(mime: &str) -> ContentType {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        let essence = essence.to_ascii_lowercase();
        let prefixed = |prefix: &str| essence.starts_with(prefix);

        if prefixed(MIME_TEXT_HTML) {
            ContentType::Html
        } else if prefixed(MIME_TEXT_XML) || prefixed(MIME_APPLICATION_XML) {
            ContentType::Xml
        } else if prefixed(MIME_APPLICATION_JSON) {
            ContentType::Json
        } else if prefixed(MIME_APPLICATION_FORM) {
            ContentType::Form
        } else if prefixed(MIME_MULTIPART_FORM) {
            ContentType::MultipartForm
        } else if prefixed(MIME_TEXT_PLAIN) {
            ContentType::PlainText
        } else if prefixed(MIME_OCTET_STREAM) || prefixed(MIME_TEXT_EVENT_STREAM) {
            ContentType::EventStream
        } else {
            ContentType::Unknown
        }
    }

    /// Canonical MIME string, empty for `Unknown`.
    pub fn render(self) -> &'static str {
        match self {
            ContentType::Unknown => "",
            ContentType::PlainText => MIME_TEXT_PLAIN,
            ContentType::Html => MIME_TEXT_HTML,
            ContentType::Json => MIME_APPLICATION_JSON,
            ContentType::Xml => MIME_TEXT_XML,
            ContentType::Form => MIME_APPLICATION_FORM,
            ContentType::MultipartForm => MIME_MULTIPART_FORM,
            ContentType::EventStream => MIME_TEXT_EVENT_STREAM,
        }
    }

    pub fn header_value(self) -> Option<HeaderValue> {
        match self {
            ContentType::Unknown => None,
            other => Some(HeaderValue::from_static(other.render())),
        }
    }
}

/// Middleware forcing a route's content type.
///
/// Stores the type in request extensions and sets the response
/// `Content-Type` when the handler did not.
///
/// ```ignore
/// router.layer(axum::middleware::from_fn_with_state(ContentType::Json, force_content_type))
/// ```
pub async fn force_content_type(
    State(content_type): State<ContentType>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(content_type);
    let mut response = next.run(request).await;
    if let Some(value) = content_type.header_value() {
        response.headers_mut().entry(CONTENT_TYPE).or_insert(value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_are_ignored() {
        assert_eq!(
            ContentType::classify("application/json; charset=UTF-8"),
            ContentType::Json
        );
        assert_eq!(
            ContentType::classify("  text/html ;charset=utf-8"),
            ContentType::Html
        );
    }

    #[test]
    fn priority_order() {
        assert_eq!(ContentType::classify("text/xml"), ContentType::Xml);
        assert_eq!(ContentType::classify("application/xml"), ContentType::Xml);
        assert_eq!(
            ContentType::classify("application/x-www-form-urlencoded"),
            ContentType::Form
        );
        assert_eq!(
            ContentType::classify("multipart/form-data; boundary=xyz"),
            ContentType::MultipartForm
        );
        assert_eq!(ContentType::classify("text/plain"), ContentType::PlainText);
        assert_eq!(
            ContentType::classify("application/octet-stream"),
            ContentType::EventStream
        );
        assert_eq!(
            ContentType::classify("text/event-stream"),
            ContentType::EventStream
        );
    }

    #[test]
    fn unknown_and_empty() {
        assert_eq!(ContentType::classify(""), ContentType::Unknown);
        assert_eq!(ContentType::classify("image/png"), ContentType::Unknown);
        assert_eq!(ContentType::Unknown.render(), "");
        assert!(ContentType::Unknown.header_value().is_none());
    }

    #[test]
    fn render_classifies_back() {
        for content_type in [
            ContentType::PlainText,
            ContentType::Html,
            ContentType::Json,
            ContentType::Xml,
            ContentType::Form,
            ContentType::MultipartForm,
            ContentType::EventStream,
        ] {
            assert_eq!(ContentType::classify(content_type.render()), content_type);
        }
    }
}
