//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which starts a mock upstream media server and a
//! full [`AppContext`] pointed at it. The [`TestHarness::with_server`]
//! constructor also starts Axum on a random port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;

use cs_core::config::Config;
use cs_server::context::AppContext;
use cs_server::router::build_router;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Access token the harness configures for the upstream server.
pub const UPSTREAM_TOKEN: &str = "upstream-secret-token";

/// Test harness wrapping a mock upstream and a fully-constructed
/// [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    pub upstream: MockServer,
}

impl TestHarness {
    /// Create a new harness with a configured upstream token.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a harness, letting the caller adjust the configuration after
    /// the upstream URL and token are filled in.
    pub async fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let upstream = MockServer::start().await;
        let mut config = Config::default();
        config.upstream.url = upstream.uri();
        config.upstream.token = Some(UPSTREAM_TOKEN.into());
        config.upstream.request_timeout_secs = 2;
        adjust(&mut config);

        let ctx = AppContext::new(config);
        Self { ctx, upstream }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::new().await.serve().await
    }

    /// Start an Axum server for an already-built harness.
    pub async fn serve(self) -> (Self, SocketAddr) {
        let app = build_router(self.ctx.clone(), None);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (self, addr)
    }

    /// Mount upstream metadata for `title_id` whose single part lives at
    /// `part_key`.
    pub async fn mount_title(&self, title_id: &str, part_key: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/library/metadata/{title_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "MediaContainer": {
                    "size": 1,
                    "Metadata": [{
                        "ratingKey": title_id,
                        "title": "Test Title",
                        "duration": 7_200_000,
                        "Media": [{
                            "Part": [{
                                "key": part_key,
                                "container": "mp4",
                                "size": 4096
                            }]
                        }]
                    }]
                }
            })))
            .mount(&self.upstream)
            .await;
    }

    /// All requests the mock upstream has seen so far.
    pub async fn upstream_requests(&self) -> Vec<wiremock::Request> {
        self.upstream.received_requests().await.unwrap_or_default()
    }
}
