//! The per-watch-attempt session value owned by the controller.

use serde::Serialize;
use std::fmt;

use cs_core::{BufferedRange, DeliveryMethod, QualityProfile, SessionId, StreamDescriptor, TitleId};

/// Lifecycle of one watch attempt. `Seeking` is tracked separately as an
/// overlay flag on [`PlaybackSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Initializing,
    Loading,
    Playing,
    Paused,
    Buffering,
    Ended,
    Error,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Buffering => "buffering",
            Self::Ended => "ended",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Why playback failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The media element could not decode the stream.
    Decode(String),
    /// The stream could not be fetched.
    Network(String),
    /// The segmented-streaming client gave up.
    Transport(String),
    /// The loading deadline elapsed.
    Timeout,
}

impl FailureKind {
    /// Message shown next to the retry affordance.
    pub fn user_message(&self) -> String {
        match self {
            Self::Decode(_) => "This video format can't be played in your browser.".into(),
            Self::Network(_) => "The stream could not be loaded.".into(),
            Self::Transport(_) => "Playback stopped because the stream failed.".into(),
            Self::Timeout => "The video took too long to start.".into(),
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(d) => write!(f, "decode failure: {d}"),
            Self::Network(d) => write!(f, "network failure: {d}"),
            Self::Transport(d) => write!(f, "transport failure: {d}"),
            Self::Timeout => write!(f, "loading deadline elapsed"),
        }
    }
}

/// Terminal error surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPrompt {
    pub message: String,
    /// "Retry" is always offered.
    pub can_retry: bool,
    /// "Try Transcoding" is offered while still on the unmodified file.
    pub can_transcode: bool,
}

/// Everything the controller knows about the current watch attempt.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub id: SessionId,
    pub title_id: TitleId,
    pub state: PlaybackState,
    /// Seek overlay; set while the media element is repositioning.
    pub seeking: bool,
    /// Current position in seconds, kept within `[0, duration]`.
    pub position: f64,
    /// Total duration in seconds; zero until known.
    pub duration: f64,
    pub delivery: DeliveryMethod,
    pub quality: QualityProfile,
    pub buffered: Vec<BufferedRange>,
    /// Descriptor of the stream currently attached.
    pub descriptor: Option<StreamDescriptor>,
    /// Bumped on every (re)load; stale timer firings carry an older value.
    pub generation: u64,
    pub initialized: bool,
    /// Re-encoded delivery has been tried for this title.
    pub transcode_attempted: bool,
    /// The automatic direct → re-encode fallback has been spent.
    pub fallback_used: bool,
    pub muted: bool,
    pub autoplay_retried: bool,
    pub error: Option<ErrorPrompt>,
}

impl PlaybackSession {
    pub fn new(id: SessionId, title_id: TitleId, quality: QualityProfile, duration: f64) -> Self {
        Self {
            id,
            title_id,
            state: PlaybackState::Initializing,
            seeking: false,
            position: 0.0,
            duration: duration.max(0.0),
            delivery: DeliveryMethod::Direct,
            quality,
            buffered: Vec::new(),
            descriptor: None,
            generation: 0,
            initialized: false,
            transcode_attempted: false,
            fallback_used: false,
            muted: false,
            autoplay_retried: false,
            error: None,
        }
    }

    /// Move the playhead, keeping `0 <= position <= duration` once the
    /// duration is known.
    pub fn set_position(&mut self, position: f64) {
        self.position = self.clamp(position);
    }

    pub fn clamp(&self, position: f64) -> f64 {
        if !position.is_finite() || position < 0.0 {
            return 0.0;
        }
        if self.duration > 0.0 {
            position.min(self.duration)
        } else {
            position
        }
    }

    /// Seconds of contiguous buffer ahead of the playhead.
    pub fn buffer_ahead(&self) -> f64 {
        self.buffered
            .iter()
            .find(|r| r.start <= self.position && self.position <= r.end)
            .map(|r| r.end - self.position)
            .unwrap_or(0.0)
    }

    /// Whether the session has reached a state it never leaves on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, PlaybackState::Ended | PlaybackState::Error)
    }
}
