//! Stream negotiation.
//!
//! Pure and synchronous: given a title, a quality profile and a resume
//! offset, decide between the unmodified file and a server-side re-encode and
//! build the parameters the upstream stream endpoint expects. Nothing here
//! can fail; failures only show up once the descriptor is used to fetch bytes.

use cs_core::config::{Config, UpstreamConfig};
use cs_core::{
    DeliveryMethod, QualityProfile, SessionId, StreamDescriptor, StreamProtocol, TitleId,
};

/// Path of the re-encode start manifest on the upstream server.
pub const TRANSCODE_START_PATH: &str = "/video/:/transcode/universal/start.m3u8";

/// Prefix under which this server proxies the upstream re-encode endpoints.
pub const TRANSCODE_PROXY_PREFIX: &str = "/api/transcode";

/// Prefix under which this server proxies unmodified file bytes.
pub const STREAM_PROXY_PREFIX: &str = "/api/stream";

/// Fixed profile-id to resolution table understood by the upstream server.
const RESOLUTIONS: &[(&str, &str)] = &[
    ("1080p", "1920x1080"),
    ("720p", "1280x720"),
    ("480p", "854x480"),
    ("360p", "640x360"),
];

/// Identification fields sent with every re-encode request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub client_identifier: String,
    pub product: String,
    pub platform: String,
}

impl From<&UpstreamConfig> for ClientIdentity {
    fn from(config: &UpstreamConfig) -> Self {
        Self {
            client_identifier: config.client_identifier.clone(),
            product: config.product.clone(),
            platform: config.platform.clone(),
        }
    }
}

/// Per-negotiation inputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NegotiateOptions {
    /// Resume offset in seconds.
    pub offset_seconds: f64,
    /// Selected quality profile id; `None` selects the catalog default.
    pub quality: Option<String>,
    /// Re-encode even when the selected profile is the original.
    pub force_reencode: bool,
    /// Watch attempt this negotiation belongs to.
    pub session: Option<SessionId>,
    /// Reload number within the watch attempt. Each non-zero value names a
    /// distinct upstream re-encode job, so stopping one job never reaches
    /// the job that replaces it.
    pub attempt: u64,
}

/// Builds [`StreamDescriptor`]s from an immutable quality catalog.
#[derive(Debug, Clone)]
pub struct StreamNegotiator {
    catalog: Vec<QualityProfile>,
    client: ClientIdentity,
    video_codec: String,
    audio_codec: String,
}

impl StreamNegotiator {
    pub fn new(
        catalog: Vec<QualityProfile>,
        client: ClientIdentity,
        video_codec: impl Into<String>,
        audio_codec: impl Into<String>,
    ) -> Self {
        let catalog = if catalog.is_empty() {
            cs_core::default_quality_catalog()
        } else {
            catalog
        };
        Self {
            catalog,
            client,
            video_codec: video_codec.into(),
            audio_codec: audio_codec.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.quality_catalog(),
            ClientIdentity::from(&config.upstream),
            config.playback.video_codec.clone(),
            config.playback.audio_codec.clone(),
        )
    }

    pub fn catalog(&self) -> &[QualityProfile] {
        &self.catalog
    }

    /// Resolve a profile id against the catalog. Unknown or missing ids fall
    /// back to the first entry.
    pub fn resolve_quality(&self, id: Option<&str>) -> QualityProfile {
        id.and_then(|id| self.catalog.iter().find(|q| q.id == id))
            .unwrap_or(&self.catalog[0])
            .clone()
    }

    /// Decide delivery for `title_id` and build the request parameters.
    pub fn build_stream_descriptor(
        &self,
        title_id: &TitleId,
        opts: &NegotiateOptions,
    ) -> StreamDescriptor {
        let selected = self.resolve_quality(opts.quality.as_deref());
        let delivery = delivery_for(&selected, opts.force_reencode);
        let offset = round_offset(opts.offset_seconds);

        match delivery {
            DeliveryMethod::Direct => self.direct_descriptor(title_id, selected, offset),
            DeliveryMethod::Transcode => {
                let effective = self.reencode_profile(selected);
                self.transcode_descriptor(title_id, effective, offset, opts.session, opts.attempt)
            }
        }
    }

    fn direct_descriptor(
        &self,
        title_id: &TitleId,
        quality: QualityProfile,
        offset: u64,
    ) -> StreamDescriptor {
        let mut params = vec![
            ("directPlay".to_string(), "1".to_string()),
            ("directStream".to_string(), "1".to_string()),
        ];
        if offset > 0 {
            params.push(("offset".into(), offset.to_string()));
        }

        StreamDescriptor {
            title_id: title_id.clone(),
            url: format!("{STREAM_PROXY_PREFIX}/{title_id}"),
            protocol: StreamProtocol::Http,
            delivery: DeliveryMethod::Direct,
            quality,
            qualities: self.catalog.clone(),
            params,
            start_offset_secs: offset,
            session: None,
        }
    }

    fn transcode_descriptor(
        &self,
        title_id: &TitleId,
        quality: QualityProfile,
        offset: u64,
        session: Option<SessionId>,
        attempt: u64,
    ) -> StreamDescriptor {
        let session = session
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("{}-{}", self.client.client_identifier, title_id));
        let session = if attempt > 0 {
            format!("{session}-{attempt}")
        } else {
            session
        };

        let mut params: Vec<(String, String)> = vec![
            ("path".into(), format!("/library/metadata/{title_id}")),
            ("mediaIndex".into(), "0".into()),
            ("partIndex".into(), "0".into()),
            ("protocol".into(), "hls".into()),
            ("fastSeek".into(), "1".into()),
            ("directPlay".into(), "0".into()),
            ("directStream".into(), "0".into()),
            ("subtitleSize".into(), "100".into()),
            ("audioBoost".into(), "100".into()),
            ("location".into(), "lan".into()),
            ("videoCodec".into(), self.video_codec.clone()),
            ("audioCodec".into(), self.audio_codec.clone()),
        ];
        if quality.max_bitrate_kbps > 0 {
            params.push(("maxVideoBitrate".into(), quality.max_bitrate_kbps.to_string()));
        }
        params.push(("videoQuality".into(), "100".into()));
        if let Some(resolution) = resolution_for(&quality) {
            params.push(("videoResolution".into(), resolution));
        }
        if offset > 0 {
            params.push(("offset".into(), offset.to_string()));
        }
        params.push(("session".into(), session.clone()));
        params.push(("X-Plex-Session-Identifier".into(), session.clone()));
        params.push((
            "X-Plex-Client-Identifier".into(),
            self.client.client_identifier.clone(),
        ));
        params.push(("X-Plex-Product".into(), self.client.product.clone()));
        params.push(("X-Plex-Platform".into(), self.client.platform.clone()));

        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish();

        StreamDescriptor {
            title_id: title_id.clone(),
            url: format!("{TRANSCODE_PROXY_PREFIX}{TRANSCODE_START_PATH}?{query}"),
            protocol: StreamProtocol::Hls,
            delivery: DeliveryMethod::Transcode,
            quality,
            qualities: self.catalog.clone(),
            params,
            start_offset_secs: offset,
            session: Some(session),
        }
    }

    /// A forced re-encode of the original profile targets the best
    /// re-encode profile in the catalog.
    fn reencode_profile(&self, selected: QualityProfile) -> QualityProfile {
        if !selected.is_original {
            return selected;
        }
        self.catalog
            .iter()
            .find(|q| !q.is_original)
            .cloned()
            .unwrap_or(selected)
    }
}

/// Delivery is unmodified-file iff the profile is the original and no
/// re-encode was forced.
pub fn delivery_for(quality: &QualityProfile, force_reencode: bool) -> DeliveryMethod {
    if quality.is_original && !force_reencode {
        DeliveryMethod::Direct
    } else {
        DeliveryMethod::Transcode
    }
}

/// Resolution string for a re-encode profile. The fixed table wins; other
/// profiles use their own dimensions. The original profile has none.
pub fn resolution_for(quality: &QualityProfile) -> Option<String> {
    if quality.is_original {
        return None;
    }
    if let Some((_, res)) = RESOLUTIONS.iter().find(|(id, _)| *id == quality.id) {
        return Some((*res).to_string());
    }
    if quality.width > 0 && quality.height > 0 {
        Some(format!("{}x{}", quality.width, quality.height))
    } else {
        None
    }
}

/// Round a resume offset to whole seconds. Negative and non-finite values
/// become zero.
pub fn round_offset(offset_seconds: f64) -> u64 {
    if offset_seconds.is_finite() && offset_seconds > 0.0 {
        offset_seconds.round() as u64
    } else {
        0
    }
}
