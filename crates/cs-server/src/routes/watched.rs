//! Watched / unwatched marking.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use cs_core::{Error, TitleId};

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::auth::UpstreamToken;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchedRequest {
    pub title_id: TitleId,
}

/// POST /api/watched
pub async fn mark_watched(
    State(ctx): State<AppContext>,
    Extension(token): Extension<UpstreamToken>,
    payload: Result<Json<WatchedRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    set_watched(ctx, token, payload, true).await
}

/// DELETE /api/watched
pub async fn mark_unwatched(
    State(ctx): State<AppContext>,
    Extension(token): Extension<UpstreamToken>,
    payload: Result<Json<WatchedRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    set_watched(ctx, token, payload, false).await
}

async fn set_watched(
    ctx: AppContext,
    token: UpstreamToken,
    payload: Result<Json<WatchedRequest>, JsonRejection>,
    watched: bool,
) -> Result<Json<Value>, AppError> {
    let Json(body) = payload.map_err(|e| Error::Validation(e.body_text()))?;
    ctx.upstream
        .set_watched(token.as_str(), &body.title_id, watched)
        .await?;
    tracing::info!(title_id = %body.title_id, watched, "Watched state updated");
    Ok(Json(json!({ "success": true })))
}
