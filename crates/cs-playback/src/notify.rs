//! HTTP notifier posting progress reports to the cinesync server.

use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use cs_core::{Error, Result, TimelineEvent, TitleId};

use crate::driver::Notifier;

/// Timeout for notification requests
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Posts timeline, watched and stop calls to `/api/*` on the cinesync
/// server, which forwards them upstream with the access token attached.
#[derive(Clone)]
pub struct HttpNotifier {
    client: Client,
    base_url: String,
}

impl HttpNotifier {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                Client::new()
            });

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<()> {
        post_json(&self.client, self.url(path), body).await
    }
}

async fn post_json<T: Serialize + ?Sized>(client: &Client, url: String, body: &T) -> Result<()> {
    let response = client
        .post(&url)
        .json(body)
        .send()
        .await
        .map_err(|e| Error::Network(format!("POST {url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(Error::upstream(status.as_u16(), message));
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WatchedBody<'a> {
    title_id: &'a TitleId,
}

#[derive(Serialize)]
struct StopBody<'a> {
    session: &'a str,
}

#[async_trait::async_trait]
impl Notifier for HttpNotifier {
    async fn timeline(&self, event: &TimelineEvent) -> Result<()> {
        self.post("/timeline", event).await
    }

    async fn mark_watched(&self, title_id: &TitleId) -> Result<()> {
        self.post("/watched", &WatchedBody { title_id }).await
    }

    async fn stop_transcode(&self, session: &str) -> Result<()> {
        self.post("/transcode/stop", &StopBody { session }).await
    }

    fn beacon(&self, event: TimelineEvent) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(title_id = %event.title_id, "No runtime for final timeline report");
            return;
        };
        let client = self.client.clone();
        let url = self.url("/timeline");
        // Detached so teardown never waits on it.
        runtime.spawn(async move {
            if let Err(e) = post_json(&client, url, &event).await {
                tracing::warn!(title_id = %event.title_id, error = %e, "Final timeline report failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cs_core::TimelineState;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event() -> TimelineEvent {
        TimelineEvent::from_secs("55".parse().unwrap(), TimelineState::Paused, 12.0, 60.0)
    }

    #[tokio::test]
    async fn timeline_posts_camel_case_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/timeline"))
            .and(body_json(serde_json::json!({
                "titleId": "55",
                "state": "paused",
                "positionMs": 12000,
                "durationMs": 60000
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        HttpNotifier::new(&server.uri()).timeline(&event()).await.unwrap();
    }

    #[tokio::test]
    async fn watched_and_stop_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/watched"))
            .and(body_json(serde_json::json!({"titleId": "55"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/transcode/stop"))
            .and(body_json(serde_json::json!({"session": "abc"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = HttpNotifier::new(&format!("{}/", server.uri()));
        notifier.mark_watched(&"55".parse().unwrap()).await.unwrap();
        notifier.stop_transcode("abc").await.unwrap();
    }

    #[tokio::test]
    async fn server_error_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let err = HttpNotifier::new(&server.uri())
            .timeline(&event())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upstream { status: 503, .. }));
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        let err = HttpNotifier::new("http://127.0.0.1:1")
            .timeline(&event())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn beacon_returns_immediately_and_delivers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/timeline"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
            .expect(1)
            .mount(&server)
            .await;

        let started = std::time::Instant::now();
        HttpNotifier::new(&server.uri()).beacon(event());
        assert!(started.elapsed() < Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}
