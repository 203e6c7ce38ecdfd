//! Unified error type for cinesync.
//!
//! Server handlers and the playback runtime funnel their failures into
//! [`Error`], which carries enough context for an HTTP status via
//! [`Error::http_status`] and for the controller to decide whether a failure
//! is worth retrying via [`Error::is_retryable`].

use std::fmt;

/// Unified error type covering every failure mode of the playback core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Metadata for the requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "title", "image").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Metadata resolved but carries no playable file part.
    #[error("No playable file for title {0}")]
    NoPlayableFile(String),

    /// No upstream credential is available for this request.
    #[error("Unauthorized")]
    Unauthorized {
        /// Where the client should be sent to sign in, if known.
        redirect: Option<String>,
    },

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Connection failure or timeout talking to the upstream server.
    #[error("Network error: {0}")]
    Network(String),

    /// The upstream server answered with a non-success status.
    #[error("Upstream error ({status}): {message}")]
    Upstream {
        /// Status code returned by the upstream server.
        status: u16,
        /// Message or body returned with it.
        message: String,
    },

    /// The media could not be decoded by the client.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The upstream server rate limited the request.
    #[error("Rate limited")]
    RateLimited {
        /// Seconds the upstream asked us to wait, from `Retry-After`.
        retry_after_secs: Option<u64>,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::NoPlayableFile(_) => 404,
            Error::Unauthorized { redirect: Some(_) } => 307,
            Error::Unauthorized { redirect: None } => 401,
            Error::Validation(_) => 400,
            Error::Network(_) => 502,
            Error::Upstream { status, .. } => *status,
            Error::UnsupportedFormat(_) => 415,
            Error::RateLimited { .. } => 429,
            Error::Internal(_) => 500,
        }
    }

    /// Whether the same request may succeed if simply tried again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network(_) | Error::RateLimited { .. })
    }

    /// Short machine-readable code for JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::NoPlayableFile(_) => "no_playable_file",
            Error::Unauthorized { .. } => "unauthorized",
            Error::Validation(_) => "validation_error",
            Error::Network(_) => "network_error",
            Error::Upstream { .. } => "upstream_error",
            Error::UnsupportedFormat(_) => "unsupported_format",
            Error::RateLimited { .. } => "rate_limited",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Upstream`].
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Error::Upstream {
            status,
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
