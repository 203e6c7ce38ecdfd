//! Shared helpers for relaying upstream byte responses.

use axum::body::Body;
use axum::http::{header, HeaderName};
use axum::response::Response;

use cs_core::Error;

use crate::error::AppError;
use crate::upstream::ensure_success;

/// Response headers copied verbatim from upstream.
const PASSTHROUGH_HEADERS: [HeaderName; 4] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::CONTENT_RANGE,
    header::ACCEPT_RANGES,
];

/// Stream an upstream response back to the client.
///
/// 2xx (including 206) is relayed with its status, the passthrough headers
/// and a streamed body. Anything else becomes an [`Error::Upstream`] carrying
/// the upstream status and message.
pub async fn relay(upstream: reqwest::Response) -> Result<Response, AppError> {
    let upstream = ensure_success(upstream).await?;

    let mut builder = Response::builder().status(upstream.status());
    for name in &PASSTHROUGH_HEADERS {
        if let Some(value) = upstream.headers().get(name) {
            builder = builder.header(name, value.clone());
        }
    }

    builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| Error::Internal(format!("Failed to build proxy response: {e}")).into())
}

/// Reject path segments that could escape the proxied prefix.
pub fn is_safe_path(path: &str) -> bool {
    !path.split('/').any(|s| s == ".." || s == ".") && !path.contains('\\')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_paths() {
        assert!(is_safe_path("video/:/transcode/universal/session/abc/base/00001.ts"));
        assert!(!is_safe_path("video/:/transcode/universal/../../library/sections"));
        assert!(!is_safe_path("video/./x"));
        assert!(!is_safe_path("video\\x"));
    }
}
