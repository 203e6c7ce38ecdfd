//! Application context shared across route handlers via Axum state.
//!
//! Every field is immutable after startup and wrapped in an `Arc`, so
//! cloning the context per request is cheap and handlers share no mutable
//! state.

use std::sync::Arc;

use cs_core::config::Config;
use cs_playback::StreamNegotiator;

use crate::metadata::{MetadataSource, UpstreamMetadata};
use crate::middleware::auth::{ConfiguredTokenSource, TokenSource};
use crate::upstream::UpstreamClient;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub upstream: Arc<UpstreamClient>,
    pub metadata: Arc<dyn MetadataSource>,
    pub tokens: Arc<dyn TokenSource>,
    pub negotiator: Arc<StreamNegotiator>,
}

impl AppContext {
    /// Build the context with upstream-backed collaborators.
    pub fn new(config: Config) -> Self {
        let upstream = Arc::new(UpstreamClient::new(&config.upstream));
        let metadata: Arc<dyn MetadataSource> = Arc::new(UpstreamMetadata::new(upstream.clone()));
        let tokens: Arc<dyn TokenSource> = Arc::new(ConfiguredTokenSource::from_config(&config));
        let negotiator = Arc::new(StreamNegotiator::from_config(&config));

        Self {
            config: Arc::new(config),
            upstream,
            metadata,
            tokens,
            negotiator,
        }
    }

    /// Replace the credential source, e.g. with a per-user sign-in store.
    pub fn with_tokens(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = tokens;
        self
    }

    /// Replace the metadata collaborator.
    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataSource>) -> Self {
        self.metadata = metadata;
        self
    }
}
