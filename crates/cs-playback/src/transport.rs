//! Adaptive transport error classification.
//!
//! Segmented streams the host cannot play natively go through a
//! segmented-streaming client owned by the [`crate::MediaHost`]. The host
//! reports that client's errors as [`TransportError`]s; the recovery budget
//! here decides whether to retry loading, recover the decoder, or give up
//! and hand the failure to the controller's fallback policy.

use serde::{Deserialize, Serialize};
use std::fmt;

use cs_core::config::PlaybackConfig;
use cs_core::StreamProtocol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportErrorKind {
    Network,
    Media,
    Other,
}

/// An error raised by the segmented-streaming client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub fatal: bool,
    pub details: String,
}

impl TransportError {
    pub fn network(details: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Network,
            fatal: false,
            details: details.into(),
        }
    }

    pub fn media(details: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Media,
            fatal: false,
            details: details.into(),
        }
    }

    pub fn fatal(kind: TransportErrorKind, details: impl Into<String>) -> Self {
        Self {
            kind,
            fatal: true,
            details: details.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = if self.fatal { "fatal" } else { "recoverable" };
        write!(f, "{severity} {:?} error: {}", self.kind, self.details)
    }
}

/// What to do about a transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Informational; the client handles it on its own.
    Ignore,
    /// Restart segment loading.
    RetryLoad,
    /// Ask the client to recover the media decoder.
    RecoverDecoder,
    /// Tear the client down and fail playback.
    GiveUp,
}

/// Limits on internal recovery attempts per stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub max_network_retries: u32,
    pub max_decoder_recoveries: u32,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_network_retries: 3,
            max_decoder_recoveries: 2,
        }
    }
}

impl From<&PlaybackConfig> for RecoveryPolicy {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            max_network_retries: config.max_network_retries,
            max_decoder_recoveries: config.max_decoder_recoveries,
        }
    }
}

/// Recovery attempts spent on the current stream.
#[derive(Debug, Clone, Default)]
pub struct RecoveryBudget {
    policy: RecoveryPolicy,
    network_retries: u32,
    decoder_recoveries: u32,
}

impl RecoveryBudget {
    pub fn new(policy: RecoveryPolicy) -> Self {
        Self {
            policy,
            network_retries: 0,
            decoder_recoveries: 0,
        }
    }

    /// Classify an error and charge the budget for any recovery attempt.
    pub fn classify(&mut self, error: &TransportError) -> RecoveryAction {
        match error.kind {
            TransportErrorKind::Network => {
                if self.network_retries < self.policy.max_network_retries {
                    self.network_retries += 1;
                    RecoveryAction::RetryLoad
                } else {
                    RecoveryAction::GiveUp
                }
            }
            TransportErrorKind::Media => {
                if self.decoder_recoveries < self.policy.max_decoder_recoveries {
                    self.decoder_recoveries += 1;
                    RecoveryAction::RecoverDecoder
                } else {
                    RecoveryAction::GiveUp
                }
            }
            TransportErrorKind::Other if error.fatal => RecoveryAction::GiveUp,
            TransportErrorKind::Other => RecoveryAction::Ignore,
        }
    }

    /// Playback progressed; earlier failures no longer count against it.
    pub fn reset(&mut self) {
        self.network_retries = 0;
        self.decoder_recoveries = 0;
    }
}

/// Whether a stream needs the segmented-streaming client instead of the
/// host's native playback.
pub fn needs_adaptive_transport(protocol: StreamProtocol, native_hls: bool) -> bool {
    protocol == StreamProtocol::Hls && !native_hls
}
