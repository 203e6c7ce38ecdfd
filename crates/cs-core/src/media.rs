//! Media-domain types shared by the playback controller and the server.
//!
//! Enums serialize in lowercase and implement `Display` manually for a
//! consistent string form. Structs exchanged with the browser use camelCase
//! field names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ids::TitleId;
use crate::Error;

// ---------------------------------------------------------------------------
// QualityProfile
// ---------------------------------------------------------------------------

/// A named delivery target from the immutable quality catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityProfile {
    /// Stable identifier, e.g. "original" or "720p".
    pub id: String,
    /// Human label shown in the quality picker.
    pub label: String,
    /// Target frame width in pixels (0 for the original file).
    pub width: u32,
    /// Target frame height in pixels (0 for the original file).
    pub height: u32,
    /// Video bitrate cap in kbps (0 means uncapped).
    pub max_bitrate_kbps: u32,
    /// Whether this profile plays the unmodified file.
    pub is_original: bool,
}

impl QualityProfile {
    /// The unmodified-file profile.
    pub fn original() -> Self {
        Self {
            id: "original".into(),
            label: "Original".into(),
            width: 0,
            height: 0,
            max_bitrate_kbps: 0,
            is_original: true,
        }
    }

    /// A re-encode target.
    pub fn reencode(id: &str, label: &str, width: u32, height: u32, max_bitrate_kbps: u32) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            width,
            height,
            max_bitrate_kbps,
            is_original: false,
        }
    }
}

/// The catalog offered when configuration does not override it.
///
/// The original profile comes first so it is the default selection.
pub fn default_quality_catalog() -> Vec<QualityProfile> {
    vec![
        QualityProfile::original(),
        QualityProfile::reencode("1080p", "1080p (8 Mbps)", 1920, 1080, 8000),
        QualityProfile::reencode("720p", "720p (4 Mbps)", 1280, 720, 4000),
        QualityProfile::reencode("480p", "480p (1.5 Mbps)", 854, 480, 1500),
    ]
}

// ---------------------------------------------------------------------------
// DeliveryMethod
// ---------------------------------------------------------------------------

/// How the upstream server delivers bytes for a title.
///
/// Ordered so that a watch attempt only ever moves forward
/// (`Direct < Transcode`) unless the user re-selects quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    /// The original file, served byte-for-byte with range support.
    Direct,
    /// A server-side re-encode matching a quality profile.
    Transcode,
}

impl fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Transcode => write!(f, "transcode"),
        }
    }
}

// ---------------------------------------------------------------------------
// StreamProtocol
// ---------------------------------------------------------------------------

/// Wire protocol of a negotiated stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamProtocol {
    /// Progressive HTTP with byte ranges.
    Http,
    /// Segmented HLS playlist.
    Hls,
}

impl fmt::Display for StreamProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::Hls => write!(f, "hls"),
        }
    }
}

// ---------------------------------------------------------------------------
// StreamDescriptor
// ---------------------------------------------------------------------------

/// Output of one negotiation. Created fresh every time and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescriptor {
    pub title_id: TitleId,
    /// URL the client loads, relative to this server.
    pub url: String,
    pub protocol: StreamProtocol,
    pub delivery: DeliveryMethod,
    /// The profile actually in effect.
    pub quality: QualityProfile,
    /// The full catalog, always attached so the UI can offer switching.
    pub qualities: Vec<QualityProfile>,
    /// Query parameters for the upstream stream endpoint, in wire order.
    pub params: Vec<(String, String)>,
    /// Resume offset rounded to whole seconds.
    pub start_offset_secs: u64,
    /// Re-encode session identifier, present only for re-encoded delivery.
    pub session: Option<String>,
}

impl StreamDescriptor {
    /// Look up a parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

/// Playback state reported upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineState {
    Playing,
    Paused,
    Stopped,
}

impl fmt::Display for TimelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Playing => write!(f, "playing"),
            Self::Paused => write!(f, "paused"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

impl FromStr for TimelineState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "playing" => Ok(Self::Playing),
            "paused" => Ok(Self::Paused),
            "stopped" => Ok(Self::Stopped),
            other => Err(Error::Validation(format!("unknown timeline state: {other}"))),
        }
    }
}

/// A fire-and-forget position report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    pub title_id: TitleId,
    pub state: TimelineState,
    pub position_ms: u64,
    pub duration_ms: u64,
}

impl TimelineEvent {
    /// Build an event from second-based positions, clamping the position
    /// into `[0, duration]`.
    pub fn from_secs(title_id: TitleId, state: TimelineState, position: f64, duration: f64) -> Self {
        let duration_ms = secs_to_ms(duration);
        let position_ms = secs_to_ms(position).min(duration_ms);
        Self {
            title_id,
            state,
            position_ms,
            duration_ms,
        }
    }
}

fn secs_to_ms(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        (secs * 1000.0).round() as u64
    } else {
        0
    }
}

// ---------------------------------------------------------------------------
// BufferedRange
// ---------------------------------------------------------------------------

/// A contiguous span of downloaded media, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferedRange {
    pub start: f64,
    pub end: f64,
}

impl BufferedRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Whether `position` lies inside the range widened by the given slack.
    pub fn contains_with_slack(&self, position: f64, back: f64, forward: f64) -> bool {
        position >= self.start - back && position <= self.end + forward
    }
}
