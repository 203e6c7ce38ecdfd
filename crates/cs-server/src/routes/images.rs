//! Image proxy.
//!
//! Upstream asset paths embed a content-version token that changes whenever
//! the asset does, so successful responses are cacheable forever.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use serde::Deserialize;

use cs_core::Error;

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::auth::UpstreamToken;

/// Cache policy for versioned upstream assets.
pub const IMMUTABLE_CACHE: &str = "public, max-age=31536000, immutable";

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    pub path: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// GET /api/images?path=&width=&height=
pub async fn get_image(
    State(ctx): State<AppContext>,
    Extension(token): Extension<UpstreamToken>,
    query: Result<Query<ImageQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query.map_err(|e| Error::Validation(e.body_text()))?;
    if !query.path.starts_with('/') {
        return Err(Error::Validation("path must be an absolute upstream path".into()).into());
    }

    let upstream = ctx
        .upstream
        .image(token.as_str(), &query.path, query.width, query.height)
        .await
        .inspect_err(|e| {
            if let Error::RateLimited { retry_after_secs } = e {
                tracing::debug!(path = %query.path, ?retry_after_secs, "Image request rate limited");
            }
        })?;

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("image/jpeg"));
    let bytes = upstream
        .bytes()
        .await
        .map_err(|e| Error::Network(format!("Failed to read image body: {e}")))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, HeaderValue::from_static(IMMUTABLE_CACHE)),
        ],
        bytes,
    )
        .into_response())
}
