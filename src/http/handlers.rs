//! Built-in routes.
//!
//! - `GET /` redirects to `/health`
//! - `GET /health` reports liveness and the service version
//! - `POST /echo` binds a JSON or form body and echoes it back
//! - `GET /status-codes` pages through the status table

use axum::extract::Query;
use axum::http::{StatusCode, Uri};
use axum::middleware;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::http::bind::Bound;
use crate::http::content_type::{force_content_type, ContentType};
use crate::http::envelope::{Fragment, Pagination};
use crate::http::error::ApiError;
use crate::http::request::RequestContext;
use crate::http::response::{redirect, respond};
use crate::http::status::{ErrorStatus, STATUS_TABLE};

const MAX_PER_PAGE: u64 = 100;

/// Router with the built-in routes.
pub fn routes() -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/echo", post(echo))
        .route(
            "/status-codes",
            get(status_codes).layer(middleware::from_fn_with_state(
                ContentType::Json,
                force_content_type,
            )),
        )
}

async fn root() -> Result<Response, ApiError> {
    redirect("/health")
}

async fn health(ctx: RequestContext) -> Response {
    respond(
        &ctx,
        StatusCode::OK,
        [json!({ "status": "operational", "version": ctx.version().number })],
    )
}

/// Body accepted by `POST /echo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoMessage {
    pub message: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

async fn echo(ctx: RequestContext, Bound(body): Bound<EchoMessage>) -> Result<Response, ApiError> {
    if body.message.trim().is_empty() {
        return Err(ctx.error(ErrorStatus::UnprocessableEntity, "message must not be blank"));
    }
    tracing::debug!(
        request_id = ctx.request_id().unwrap_or("unknown"),
        tags = body.tags.len(),
        "Echoing message"
    );
    Ok(respond(&ctx, StatusCode::OK, [Fragment::record(&body)]))
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct PageParams {
    page: u64,
    per_page: u64,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

async fn status_codes(ctx: RequestContext, Query(params): Query<PageParams>) -> Response {
    let page = params.page.max(1);
    let per_page = params.per_page.clamp(1, MAX_PER_PAGE);
    let skip = usize::try_from((page - 1).saturating_mul(per_page)).unwrap_or(usize::MAX);
    let rows: Vec<_> = STATUS_TABLE
        .iter()
        .skip(skip)
        .take(per_page as usize)
        .collect();

    respond(
        &ctx,
        StatusCode::OK,
        [
            Fragment::list_named("status_codes", &rows),
            Pagination::new(page, per_page, STATUS_TABLE.len() as u64).into(),
        ],
    )
}

/// Fallback for unmatched routes.
pub async fn not_found(ctx: RequestContext, uri: Uri) -> ApiError {
    ctx.error(ErrorStatus::NotFound, format!("no route for {}", uri.path()))
}
