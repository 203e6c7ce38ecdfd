//! Media proxy for unmodified-file delivery.
//!
//! Resolves a title's playable file through the metadata collaborator and
//! relays the upstream bytes with range support. The client's `Range` header
//! goes upstream untouched; the upstream token is attached server-side.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Extension;

use cs_core::{Error, TitleId};

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::auth::UpstreamToken;
use crate::routes::proxy::relay;

/// GET /api/stream/{title_id}
pub async fn stream_title(
    State(ctx): State<AppContext>,
    Path(title_id): Path<String>,
    Extension(token): Extension<UpstreamToken>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let title_id: TitleId = title_id.parse()?;

    let metadata = ctx
        .metadata
        .title_metadata(&title_id, token.as_str())
        .await
        .map_err(|e| match e {
            Error::Network(_) => e,
            other => {
                tracing::warn!(title_id = %title_id, error = %other, "Metadata lookup failed");
                Error::not_found("title", &title_id)
            }
        })?;

    let part = metadata
        .playable_file()
        .ok_or_else(|| Error::NoPlayableFile(title_id.to_string()))?;

    tracing::debug!(
        title_id = %title_id,
        range = ?headers.get(axum::http::header::RANGE),
        "Proxying file bytes"
    );

    let upstream = ctx
        .upstream
        .get_raw(&part.key, token.as_str(), &headers)
        .await?;
    relay(upstream).await
}
