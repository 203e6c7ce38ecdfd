//! Upstream credential middleware.
//!
//! Resolves the upstream access token for a request through a
//! [`TokenSource`] and injects it into request extensions as an
//! [`UpstreamToken`]. Handlers attach it to upstream calls; it is never
//! written into a response. Requests without a usable credential are turned
//! away with 401, or redirected to the sign-in page when one is configured.

use std::fmt;

use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;

use cs_core::config::Config;
use cs_core::{Error, Result};

use crate::context::AppContext;
use crate::error::AppError;

/// The upstream access token resolved for one request.
#[derive(Clone, PartialEq, Eq)]
pub struct UpstreamToken(String);

impl UpstreamToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UpstreamToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UpstreamToken(<redacted>)")
    }
}

/// Source of upstream credentials.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    /// Resolve the token to use for a request with these headers.
    async fn access_token(&self, headers: &HeaderMap) -> Result<UpstreamToken>;
}

/// Hands out the single token from configuration.
pub struct ConfiguredTokenSource {
    token: Option<String>,
    login_url: Option<String>,
}

impl ConfiguredTokenSource {
    pub fn new(token: Option<String>, login_url: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
            login_url,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.upstream.token.clone(), config.auth.login_url.clone())
    }
}

#[async_trait::async_trait]
impl TokenSource for ConfiguredTokenSource {
    async fn access_token(&self, _headers: &HeaderMap) -> Result<UpstreamToken> {
        match &self.token {
            Some(token) => Ok(UpstreamToken::new(token.clone())),
            None => Err(Error::Unauthorized {
                redirect: self.login_url.clone(),
            }),
        }
    }
}

/// Authentication middleware. Applied to every `/api` route.
pub async fn auth_middleware(
    State(ctx): State<AppContext>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> std::result::Result<Response, AppError> {
    match ctx.tokens.access_token(request.headers()).await {
        Ok(token) => {
            request.extensions_mut().insert(token);
            Ok(next.run(request).await)
        }
        Err(e) => {
            tracing::debug!(path = %request.uri().path(), "No upstream credential for request");
            Err(AppError::new(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn configured_token_is_returned() {
        let source = ConfiguredTokenSource::new(Some("abc".into()), None);
        let token = source.access_token(&HeaderMap::new()).await.unwrap();
        assert_eq!(token.as_str(), "abc");
    }

    #[tokio::test]
    async fn missing_token_redirects_to_login() {
        let source = ConfiguredTokenSource::new(Some("  ".into()), Some("/signin".into()));
        let err = source.access_token(&HeaderMap::new()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Unauthorized { redirect: Some(ref url) } if url == "/signin"
        ));
    }

    #[test]
    fn debug_output_hides_token() {
        let token = UpstreamToken::new("super-secret");
        assert!(!format!("{token:?}").contains("super-secret"));
    }
}
