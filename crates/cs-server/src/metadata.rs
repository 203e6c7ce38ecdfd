//! Title metadata lookups.
//!
//! The media proxy only needs to know where a title's playable file lives,
//! so the collaborator is a narrow trait with the upstream-backed
//! implementation below.

use std::sync::Arc;

use serde::Deserialize;

use cs_core::{Error, Result, TitleId};

use crate::upstream::UpstreamClient;

/// What the proxy needs to know about a title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleMetadata {
    pub title_id: TitleId,
    pub title: Option<String>,
    pub duration_ms: Option<u64>,
    pub parts: Vec<MediaPart>,
    pub tracks: Vec<Track>,
}

impl TitleMetadata {
    /// Upstream path of the first file part, if any exists.
    pub fn playable_file(&self) -> Option<&MediaPart> {
        self.parts.iter().find(|p| !p.key.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPart {
    /// Upstream path serving the file bytes.
    pub key: String,
    pub container: Option<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub stream_type: u8,
    pub codec: Option<String>,
    pub language: Option<String>,
}

#[async_trait::async_trait]
pub trait MetadataSource: Send + Sync {
    async fn title_metadata(&self, title_id: &TitleId, token: &str) -> Result<TitleMetadata>;
}

// ---------------------------------------------------------------------------
// Upstream wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    #[serde(rename = "MediaContainer")]
    container: MediaContainer,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MediaContainer {
    #[serde(rename = "Metadata")]
    metadata: Vec<MetadataItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetadataItem {
    title: Option<String>,
    duration: Option<u64>,
    #[serde(rename = "Media")]
    media: Vec<MediaItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MediaItem {
    #[serde(rename = "Part")]
    parts: Vec<PartItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartItem {
    key: String,
    container: Option<String>,
    size: Option<u64>,
    #[serde(rename = "Stream")]
    streams: Vec<StreamItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StreamItem {
    stream_type: u8,
    codec: Option<String>,
    language_code: Option<String>,
}

fn into_metadata(title_id: &TitleId, response: MetadataResponse) -> Result<TitleMetadata> {
    let item = response
        .container
        .metadata
        .into_iter()
        .next()
        .ok_or_else(|| Error::not_found("title", title_id))?;

    let mut parts = Vec::new();
    let mut tracks = Vec::new();
    for part in item.media.into_iter().flat_map(|m| m.parts) {
        tracks.extend(part.streams.into_iter().map(|s| Track {
            stream_type: s.stream_type,
            codec: s.codec,
            language: s.language_code,
        }));
        parts.push(MediaPart {
            key: part.key,
            container: part.container,
            size: part.size,
        });
    }

    Ok(TitleMetadata {
        title_id: title_id.clone(),
        title: item.title,
        duration_ms: item.duration,
        parts,
        tracks,
    })
}

/// Reads `GET /library/metadata/{id}` from the upstream server.
pub struct UpstreamMetadata {
    upstream: Arc<UpstreamClient>,
}

impl UpstreamMetadata {
    pub fn new(upstream: Arc<UpstreamClient>) -> Self {
        Self { upstream }
    }
}

#[async_trait::async_trait]
impl MetadataSource for UpstreamMetadata {
    async fn title_metadata(&self, title_id: &TitleId, token: &str) -> Result<TitleMetadata> {
        let response = self
            .upstream
            .get(&format!("/library/metadata/{title_id}"), token)
            .await?;
        let body: MetadataResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Malformed metadata for {title_id}: {e}")))?;
        into_metadata(title_id, body)
    }
}
