//! HTTP client for the upstream media server.
//!
//! Every request carries the access token and client identification headers
//! the upstream protocol expects. The token only ever travels server to
//! server; nothing here copies it into a response.

use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};

use cs_core::config::UpstreamConfig;
use cs_core::{Error, Result, TimelineEvent, TitleId};

/// Header carrying the upstream access token.
pub const TOKEN_HEADER: &str = "X-Plex-Token";

/// Library identifier used by the watched/unwatched endpoints.
const LIBRARY_IDENTIFIER: &str = "com.plexapp.plugins.library";

/// Query parameters that must never be forwarded from a client.
const CREDENTIAL_PARAMS: &[&str] = &["X-Plex-Token", "x-plex-token"];

pub struct UpstreamClient {
    client: Client,
    base_url: String,
    identity: Vec<(&'static str, String)>,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Self {
        let timeout = config.request_timeout();
        // The timeout covers connecting and reading headers; bodies are
        // streamed and bounded by the read timeout instead.
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                Client::new()
            });

        Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            identity: vec![
                ("X-Plex-Client-Identifier", config.client_identifier.clone()),
                ("X-Plex-Product", config.product.clone()),
                ("X-Plex-Platform", config.platform.clone()),
                ("X-Plex-Device-Name", config.device_name.clone()),
            ],
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute upstream URL for a path that may already carry a query.
    pub fn url(&self, path_and_query: &str) -> String {
        if path_and_query.starts_with('/') {
            format!("{}{}", self.base_url, path_and_query)
        } else {
            format!("{}/{}", self.base_url, path_and_query)
        }
    }

    fn request(&self, method: Method, path_and_query: &str, token: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, self.url(path_and_query))
            .header(TOKEN_HEADER, token)
            .header(header::ACCEPT, "application/json");
        for (name, value) in &self.identity {
            builder = builder.header(*name, value);
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        // Bound the wait for response headers; a stalled upstream surfaces
        // as a retryable network error.
        match tokio::time::timeout(self.timeout, builder.send()).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(Error::Network(format!("{what}: {e}"))),
            Err(_) => Err(Error::Network(format!(
                "{what}: timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    /// GET a path, forwarding the given request headers verbatim. The
    /// response is returned whatever its status.
    pub async fn get_raw(
        &self,
        path_and_query: &str,
        token: &str,
        forward: &HeaderMap,
    ) -> Result<Response> {
        let mut builder = self.request(Method::GET, path_and_query, token);
        for name in [header::RANGE, header::IF_RANGE] {
            if let Some(value) = forward.get(&name) {
                builder = builder.header(name, value.clone());
            }
        }
        self.send(builder, path_and_query).await
    }

    /// GET a path and require a success status.
    pub async fn get(&self, path_and_query: &str, token: &str) -> Result<Response> {
        let response = self
            .send(self.request(Method::GET, path_and_query, token), path_and_query)
            .await?;
        ensure_success(response).await
    }

    /// Report playback position.
    pub async fn timeline(&self, token: &str, event: &TimelineEvent) -> Result<()> {
        let id = event.title_id.as_str();
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("ratingKey", id)
            .append_pair("key", &format!("/library/metadata/{id}"))
            .append_pair("state", &event.state.to_string())
            .append_pair("time", &event.position_ms.to_string())
            .append_pair("duration", &event.duration_ms.to_string())
            .finish();
        self.get(&format!("/:/timeline?{query}"), token).await?;
        Ok(())
    }

    /// Mark (`watched = true`) or unmark a title as watched.
    pub async fn set_watched(&self, token: &str, title_id: &TitleId, watched: bool) -> Result<()> {
        let endpoint = if watched { "scrobble" } else { "unscrobble" };
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("identifier", LIBRARY_IDENTIFIER)
            .append_pair("key", title_id.as_str())
            .finish();
        self.get(&format!("/:/{endpoint}?{query}"), token).await?;
        Ok(())
    }

    /// Stop a re-encode job.
    pub async fn stop_transcode(&self, token: &str, session: &str) -> Result<()> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("session", session)
            .finish();
        self.get(&format!("/video/:/transcode/universal/stop?{query}"), token)
            .await?;
        Ok(())
    }

    /// Fetch a resized image.
    pub async fn image(
        &self,
        token: &str,
        path: &str,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<Response> {
        let path = {
            let mut query = url::form_urlencoded::Serializer::new(String::new());
            query.append_pair("url", path);
            if let Some(w) = width {
                query.append_pair("width", &w.to_string());
            }
            if let Some(h) = height {
                query.append_pair("height", &h.to_string());
            }
            query.append_pair("minSize", "1").append_pair("upscale", "1");
            format!("/photo/:/transcode?{}", query.finish())
        };
        self.get(&path, token).await
    }
}

/// Turn a non-success response into an [`Error`]. 429 becomes
/// [`Error::RateLimited`] with the upstream `Retry-After` hint.
pub async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(Error::RateLimited {
            retry_after_secs: retry_after(response.headers()),
        });
    }
    let message = response.text().await.unwrap_or_default();
    let message = if message.trim().is_empty() {
        status.canonical_reason().unwrap_or("upstream error").to_string()
    } else {
        message
    };
    Err(Error::upstream(status.as_u16(), message))
}

/// Parse a `Retry-After` header given in seconds.
pub fn retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|v: &HeaderValue| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

/// Drop credential parameters from a client-supplied query string.
pub fn strip_credentials(query: &str) -> String {
    let pairs = url::form_urlencoded::parse(query.as_bytes())
        .filter(|(k, _)| !CREDENTIAL_PARAMS.contains(&k.as_ref()));
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header as has_header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> UpstreamClient {
        UpstreamClient::new(&UpstreamConfig {
            url: format!("{}/", server.uri()),
            token: Some("secret".into()),
            ..Default::default()
        })
    }

    #[test]
    fn strip_credentials_removes_token_only() {
        let q = strip_credentials("X-Plex-Token=abc&session=s1&offset=10");
        assert_eq!(q, "session=s1&offset=10");
        assert_eq!(strip_credentials(""), "");
    }

    #[test]
    fn retry_after_parses_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(header::RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(retry_after(&headers), Some(12));
        headers.insert(
            header::RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
    }

    #[tokio::test]
    async fn requests_carry_token_and_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/:/timeline"))
            .and(has_header("X-Plex-Token", "secret"))
            .and(has_header("X-Plex-Client-Identifier", "cinesync"))
            .and(query_param("ratingKey", "10"))
            .and(query_param("key", "/library/metadata/10"))
            .and(query_param("state", "playing"))
            .and(query_param("time", "5000"))
            .and(query_param("duration", "60000"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let event = TimelineEvent::from_secs(
            "10".parse().unwrap(),
            cs_core::TimelineState::Playing,
            5.0,
            60.0,
        );
        client(&server).timeline("secret", &event).await.unwrap();
    }

    #[tokio::test]
    async fn scrobble_and_unscrobble() {
        let server = MockServer::start().await;
        for endpoint in ["/:/scrobble", "/:/unscrobble"] {
            Mock::given(method("GET"))
                .and(path(endpoint))
                .and(query_param("identifier", "com.plexapp.plugins.library"))
                .and(query_param("key", "10"))
                .respond_with(ResponseTemplate::new(200))
                .expect(1)
                .mount(&server)
                .await;
        }
        let c = client(&server);
        let id: TitleId = "10".parse().unwrap();
        c.set_watched("secret", &id, true).await.unwrap();
        c.set_watched("secret", &id, false).await.unwrap();
    }

    #[tokio::test]
    async fn rate_limit_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photo/:/transcode"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;

        let err = client(&server)
            .image("secret", "/library/metadata/1/thumb/99", Some(300), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::RateLimited {
                retry_after_secs: Some(7)
            }
        ));
    }

    #[tokio::test]
    async fn stalled_upstream_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let c = UpstreamClient::new(&UpstreamConfig {
            url: server.uri(),
            request_timeout_secs: 1,
            ..Default::default()
        });
        let err = c.stop_transcode("secret", "s1").await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert!(err.is_retryable());
    }
}
