//! Timeline (playback position) reports.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use serde_json::{json, Value};

use cs_core::{Error, TimelineEvent};

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::auth::UpstreamToken;

/// POST /api/timeline
pub async fn report_timeline(
    State(ctx): State<AppContext>,
    Extension(token): Extension<UpstreamToken>,
    payload: Result<Json<TimelineEvent>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(event) = payload.map_err(|e| Error::Validation(e.body_text()))?;

    ctx.upstream.timeline(token.as_str(), &event).await?;
    tracing::trace!(
        title_id = %event.title_id,
        state = %event.state,
        position_ms = event.position_ms,
        "Timeline reported"
    );
    Ok(Json(json!({ "success": true })))
}
