//! Response writing.
//!
//! # Responsibilities
//! - Build an envelope from fragments and write it as JSON
//! - Fall back to a 500 error envelope when a fragment cannot be encoded
//! - Uncacheable permanent redirects
//!
//! # Design Decisions
//! - A failed build never leaks a partially merged body
//! - Envelope strings are HTML-escaped on the wire

use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, EXPIRES, LOCATION, PRAGMA};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::http::content_type::MIME_APPLICATION_JSON_CHARSET_UTF8;
use crate::http::envelope::{EnvelopeBuilder, Fragment};
use crate::http::error::{ApiError, ErrorKind, ResponseHead};
use crate::http::request::RequestContext;
use crate::observability::metrics;

const NO_CACHE: &str = "no-cache, no-store, must-revalidate, private, max-age=0";
const UNIX_EPOCH_HTTP_DATE: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Write `fragments` as an envelope with `status`.
pub fn respond<I>(ctx: &RequestContext, status: StatusCode, fragments: I) -> Response
where
    I: IntoIterator,
    I::Item: Into<Fragment>,
{
    let encoded = EnvelopeBuilder::new(status.as_u16())
        .version(ctx.version().clone())
        .fragments(fragments)
        .build()
        .and_then(|envelope| envelope.to_json_bytes());

    match encoded {
        Ok(body) => {
            let mut head = ResponseHead::new();
            let _ = head.set_header(
                CONTENT_TYPE,
                HeaderValue::from_static(MIME_APPLICATION_JSON_CHARSET_UTF8),
            );
            let _ = head.write_status(status);
            head.into_response(body)
        }
        Err(e) => {
            metrics::record_envelope_failure();
            tracing::error!(
                request_id = ctx.request_id().unwrap_or("unknown"),
                error = %e,
                "Failed to build response envelope"
            );
            ApiError::internal_server_error(e)
                .with_kind(ErrorKind::Encoding)
                .with_version(ctx.version().clone())
                .into_response()
        }
    }
}

/// 301 to `location` with every cache told not to keep it.
pub fn redirect(location: &str) -> Result<Response, ApiError> {
    let location = HeaderValue::from_str(location)
        .map_err(|_| ApiError::bad_request("redirect location is not a valid header value"))?;

    let mut head = ResponseHead::new();
    let _ = head.set_header(LOCATION, location);
    let _ = head.set_header(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
    let _ = head.set_header(EXPIRES, HeaderValue::from_static(UNIX_EPOCH_HTTP_DATE));
    let _ = head.set_header(PRAGMA, HeaderValue::from_static("no-cache"));
    let _ = head.write_status(StatusCode::MOVED_PERMANENTLY);
    Ok(head.into_response(axum::body::Body::empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::envelope::{Envelope, Version};
    use axum::http::header::X_CONTENT_TYPE_OPTIONS;
    use serde_json::json;

    async fn body(response: Response) -> Envelope {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn writes_envelope_with_status() {
        let mut ctx = RequestContext::new();
        ctx.override_version("v9", "9.9.9");
        let response = respond(&ctx, StatusCode::CREATED, [json!({"id": 1})]);
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            MIME_APPLICATION_JSON_CHARSET_UTF8
        );

        let envelope = body(response).await;
        assert_eq!(envelope.version, Version::new("v9", "9.9.9"));
        assert_eq!(envelope.meta.code, "CREATED");
        assert_eq!(envelope.data["id"], json!(1));
    }

    #[tokio::test]
    async fn encoding_failure_becomes_500_without_data() {
        let ctx = RequestContext::new();
        let response = respond(
            &ctx,
            StatusCode::OK,
            [json!({"leak": "me"}).into(), Fragment::record(&42)],
        );
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[X_CONTENT_TYPE_OPTIONS], "nosniff");

        let envelope = body(response).await;
        assert_eq!(envelope.meta.code, "INTERNAL_SERVER_ERROR");
        assert!(envelope.data.is_empty());
    }

    #[test]
    fn redirect_is_uncacheable() {
        let response = redirect("/login").unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[LOCATION], "/login");
        assert_eq!(response.headers()[CACHE_CONTROL], NO_CACHE);
        assert_eq!(response.headers()[EXPIRES], UNIX_EPOCH_HTTP_DATE);
        assert_eq!(response.headers()[PRAGMA], "no-cache");
    }

    #[test]
    fn redirect_rejects_invalid_location() {
        let err = redirect("/bad\nlocation").unwrap_err();
        assert_eq!(err.status(), crate::http::status::ErrorStatus::BadRequest);
    }
}
