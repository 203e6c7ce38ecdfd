//! Stream negotiation over HTTP.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use cs_core::{Error, QualityProfile, SessionId, StreamDescriptor, TitleId};
use cs_playback::NegotiateOptions;

use crate::context::AppContext;
use crate::error::AppError;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DescriptorQuery {
    pub offset: f64,
    pub quality: Option<String>,
    pub force_reencode: bool,
    pub session: Option<SessionId>,
}

/// GET /api/playback/{title_id}/descriptor
pub async fn stream_descriptor(
    State(ctx): State<AppContext>,
    Path(title_id): Path<String>,
    query: Result<Query<DescriptorQuery>, QueryRejection>,
) -> Result<Json<StreamDescriptor>, AppError> {
    let title_id: TitleId = title_id.parse()?;
    let Query(query) = query.map_err(|e| Error::Validation(e.body_text()))?;

    let opts = NegotiateOptions {
        offset_seconds: query.offset,
        quality: query.quality,
        force_reencode: query.force_reencode,
        session: query.session,
        ..Default::default()
    };
    Ok(Json(ctx.negotiator.build_stream_descriptor(&title_id, &opts)))
}

/// GET /api/qualities
pub async fn list_qualities(State(ctx): State<AppContext>) -> Json<Vec<QualityProfile>> {
    Json(ctx.negotiator.catalog().to_vec())
}
