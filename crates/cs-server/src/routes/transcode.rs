//! Re-encode manifest/segment proxy and job stop.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, RawQuery, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use cs_core::Error;

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::auth::UpstreamToken;
use crate::routes::proxy::{is_safe_path, relay};
use crate::upstream::strip_credentials;

/// Upstream re-encode endpoints reachable through the proxy.
const TRANSCODE_PATH_PREFIX: &str = "video/:/transcode/universal/";

/// GET /api/transcode/{*path}
pub async fn transcode_proxy(
    State(ctx): State<AppContext>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    Extension(token): Extension<UpstreamToken>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let path = path.trim_start_matches('/');
    if !path.starts_with(TRANSCODE_PATH_PREFIX) || !is_safe_path(path) {
        return Err(Error::Validation(format!("Invalid transcode path: {path}")).into());
    }

    let query = query
        .map(|q| strip_credentials(&q))
        .filter(|q| !q.is_empty());
    let upstream_path = match query {
        Some(q) => format!("/{path}?{q}"),
        None => format!("/{path}"),
    };

    let upstream = ctx
        .upstream
        .get_raw(&upstream_path, token.as_str(), &headers)
        .await?;
    relay(upstream).await
}

#[derive(Debug, Deserialize)]
pub struct StopRequest {
    pub session: String,
}

/// POST /api/transcode/stop
pub async fn stop_transcode(
    State(ctx): State<AppContext>,
    Extension(token): Extension<UpstreamToken>,
    payload: Result<Json<StopRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(body) = payload.map_err(|e| Error::Validation(e.body_text()))?;
    if body.session.trim().is_empty() {
        return Err(Error::Validation("session must not be empty".into()).into());
    }

    ctx.upstream
        .stop_transcode(token.as_str(), &body.session)
        .await?;
    tracing::debug!(session = %body.session, "Stopped re-encode job");
    Ok(Json(json!({ "success": true })))
}
