//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! server, upstream, auth, and playback sections plus the quality catalog.
//! Every section defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::media::{default_quality_catalog, QualityProfile};
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub auth: AuthConfig,
    pub playback: PlaybackConfig,
    pub qualities: Vec<QualityProfile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            auth: AuthConfig::default(),
            playback: PlaybackConfig::default(),
            qualities: default_quality_catalog(),
        }
    }
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Load configuration strictly: a missing or malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Validation(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_json(&contents)
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.upstream.url.is_empty() {
            warnings.push("upstream.url is empty; every proxied request will fail".into());
        }

        if self.upstream.token.is_none() {
            warnings.push(
                "upstream.token is not set; requests will be redirected to sign in".into(),
            );
        }

        if self.upstream.client_identifier.is_empty() {
            warnings.push("upstream.client_identifier is empty".into());
        }

        if self.qualities.is_empty() {
            warnings.push("qualities is empty; the default catalog will be used".into());
        } else if !self.qualities.iter().any(|q| q.is_original) {
            warnings.push("qualities has no original profile; direct play is unreachable".into());
        }

        let pb = &self.playback;
        if !(0.0..=1.0).contains(&pb.watched_threshold) {
            warnings.push(format!(
                "playback.watched_threshold {} is outside 0.0..=1.0",
                pb.watched_threshold
            ));
        }
        if pb.progress_interval_secs == 0 {
            warnings.push("playback.progress_interval_secs is 0; 1 second will be used".into());
        }
        if pb.transcode_load_timeout_secs < pb.direct_load_timeout_secs {
            warnings.push(
                "playback.transcode_load_timeout_secs is shorter than direct_load_timeout_secs"
                    .into(),
            );
        }

        warnings
    }

    /// The quality catalog, never empty.
    pub fn quality_catalog(&self) -> Vec<QualityProfile> {
        if self.qualities.is_empty() {
            default_quality_catalog()
        } else {
            self.qualities.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            static_dir: None,
        }
    }
}

/// Connection to the upstream media server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL, e.g. `http://192.168.1.10:32400`.
    pub url: String,
    /// Access token injected server-side into every upstream call.
    pub token: Option<String>,
    pub client_identifier: String,
    pub product: String,
    pub platform: String,
    pub device_name: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:32400".into(),
            token: None,
            client_identifier: "cinesync".into(),
            product: "Cinesync".into(),
            platform: "Web".into(),
            device_name: "Cinesync".into(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl UpstreamConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Sign-in collaborator settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Where to send a browser that has no usable credential.
    pub login_url: Option<String>,
}

/// Client-side playback tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub direct_load_timeout_secs: u64,
    pub transcode_load_timeout_secs: u64,
    pub progress_interval_secs: u64,
    pub seek_debounce_ms: u64,
    /// Buffer ahead of the playhead required before scrubbing is re-enabled
    /// after a re-encode reload.
    pub scrub_ready_buffer_secs: f64,
    pub watched_threshold: f64,
    pub buffer_back_tolerance_secs: f64,
    pub buffer_forward_tolerance_secs: f64,
    pub max_network_retries: u32,
    pub max_decoder_recoveries: u32,
    pub video_codec: String,
    pub audio_codec: String,
    /// Whether the client can play HLS without a segmented-streaming client.
    pub native_hls: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            direct_load_timeout_secs: 20,
            transcode_load_timeout_secs: 45,
            progress_interval_secs: 10,
            seek_debounce_ms: 500,
            scrub_ready_buffer_secs: 10.0,
            watched_threshold: 0.9,
            buffer_back_tolerance_secs: 1.0,
            buffer_forward_tolerance_secs: 5.0,
            max_network_retries: 3,
            max_decoder_recoveries: 2,
            video_codec: "h264".into(),
            audio_codec: "aac".into(),
            native_hls: false,
        }
    }
}

impl PlaybackConfig {
    pub fn direct_load_timeout(&self) -> Duration {
        Duration::from_secs(self.direct_load_timeout_secs)
    }

    pub fn transcode_load_timeout(&self) -> Duration {
        Duration::from_secs(self.transcode_load_timeout_secs)
    }

    /// Period of progress reports while playing. Never zero.
    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs.max(1))
    }

    pub fn seek_debounce(&self) -> Duration {
        Duration::from_millis(self.seek_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_valid() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.playback.seek_debounce_ms, 500);
        assert_eq!(config.qualities.len(), 4);
        assert!(config.qualities[0].is_original);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = Config::from_json(
            r#"{"upstream": {"url": "http://plex:32400", "token": "abc"}, "playback": {"seek_debounce_ms": 250}}"#,
        )
        .unwrap();
        assert_eq!(config.upstream.url, "http://plex:32400");
        assert_eq!(config.upstream.token.as_deref(), Some("abc"));
        assert_eq!(config.upstream.request_timeout_secs, 30);
        assert_eq!(config.playback.seek_debounce_ms, 250);
        assert_eq!(config.playback.direct_load_timeout_secs, 20);
    }

    #[test]
    fn malformed_json_is_validation_error() {
        let err = Config::from_json("{not json").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn load_or_default_missing_file() {
        let config = Config::load_or_default(Some(Path::new("/nonexistent/cinesync.json")));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"server": {"port": 9191}}"#).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.port, 9191);
    }

    #[test]
    fn validate_flags_missing_token_and_original() {
        let mut config = Config::default();
        config.qualities.retain(|q| !q.is_original);
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("upstream.token")));
        assert!(warnings.iter().any(|w| w.contains("no original profile")));
    }

    #[test]
    fn validate_flags_inverted_timeouts() {
        let mut config = Config::default();
        config.upstream.token = Some("t".into());
        config.playback.transcode_load_timeout_secs = 5;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("transcode_load_timeout_secs"));
    }

    #[test]
    fn zero_progress_interval_is_floored_and_flagged() {
        let mut config = Config::default();
        config.upstream.token = Some("t".into());
        config.playback.progress_interval_secs = 0;
        assert_eq!(config.playback.progress_interval(), Duration::from_secs(1));
        let warnings = config.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("progress_interval_secs"));
    }

    #[test]
    fn empty_catalog_falls_back_to_default() {
        let mut config = Config::default();
        config.qualities.clear();
        assert_eq!(config.quality_catalog(), default_quality_catalog());
    }
}
