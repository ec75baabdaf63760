//! Request body binding.
//!
//! `Bound<T>` decodes a JSON or urlencoded form body into `T`. Every failure
//! is a [`BindError`] that renders as a 4xx error envelope.

use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::Form;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::http::content_type::{ContentType, MIME_APPLICATION_FORM};
use crate::http::error::{ApiError, ErrorKind};
use crate::http::request::RequestContext;
use crate::http::status::ErrorStatus;

/// Body binding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("request body is empty")]
    EmptyBody,

    #[error("unsupported content type {0:?}")]
    UnsupportedMediaType(String),

    #[error("request body exceeds the configured limit")]
    TooLarge,

    #[error("malformed request body: {0}")]
    Malformed(String),

    #[error("request body does not match the expected shape: {0}")]
    Invalid(String),
}

impl BindError {
    pub fn status(&self) -> ErrorStatus {
        match self {
            BindError::EmptyBody | BindError::Malformed(_) => ErrorStatus::BadRequest,
            BindError::UnsupportedMediaType(_) => ErrorStatus::UnsupportedMediaType,
            BindError::TooLarge => ErrorStatus::PayloadTooLarge,
            BindError::Invalid(_) => ErrorStatus::UnprocessableEntity,
        }
    }
}

impl From<BindError> for ApiError {
    fn from(err: BindError) -> Self {
        ApiError::new(err.status(), err.to_string()).with_kind(ErrorKind::Bind)
    }
}

/// Extractor decoding the request body by its content type.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bound<T>(pub T);

impl<T, S> FromRequest<S> for Bound<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let ctx = RequestContext::resolve(req.headers(), req.extensions());
        let reject = |err: BindError| ApiError::from(err).with_version(ctx.version().clone());

        let raw_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let content_type = ContentType::classify(&raw_type);
        if !matches!(content_type, ContentType::Json | ContentType::Form) {
            return Err(reject(BindError::UnsupportedMediaType(raw_type)));
        }

        let bytes = Bytes::from_request(req, state).await.map_err(|rejection| {
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                reject(BindError::TooLarge)
            } else {
                reject(BindError::Malformed(rejection.body_text()))
            }
        })?;
        if bytes.is_empty() {
            return Err(reject(BindError::EmptyBody));
        }

        match content_type {
            ContentType::Json => serde_json::from_slice(&bytes).map(Bound).map_err(|e| {
                if e.is_data() {
                    reject(BindError::Invalid(e.to_string()))
                } else {
                    reject(BindError::Malformed(e.to_string()))
                }
            }),
            _ => {
                let mut form = Request::new(Body::from(bytes));
                *form.method_mut() = Method::POST;
                form.headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(MIME_APPLICATION_FORM));
                Form::<T>::from_request(form, state)
                    .await
                    .map(|Form(value)| Bound(value))
                    .map_err(|rejection| {
                        if rejection.status() == StatusCode::UNPROCESSABLE_ENTITY {
                            reject(BindError::Invalid(rejection.body_text()))
                        } else {
                            reject(BindError::Malformed(rejection.body_text()))
                        }
                    })
            }
        }
    }
}
