//! Axum router construction.
//!
//! Builds the full application router with the proxy and reporting routes,
//! middleware layers, and static file serving for the web client.

use axum::http::header;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::middleware::auth::auth_middleware;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext, static_dir: Option<PathBuf>) -> Router {
    // Media elements read range headers cross-origin when the client is
    // served from a different host.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            header::CONTENT_RANGE,
            header::CONTENT_LENGTH,
            header::ACCEPT_RANGES,
            header::RETRY_AFTER,
        ]);

    let api = Router::new()
        // Negotiation
        .route("/qualities", get(routes::playback::list_qualities))
        .route(
            "/playback/{title_id}/descriptor",
            get(routes::playback::stream_descriptor),
        )
        // Media proxy
        .route("/stream/{title_id}", get(routes::stream::stream_title))
        .route("/transcode/stop", post(routes::transcode::stop_transcode))
        .route(
            "/transcode/{*path}",
            get(routes::transcode::transcode_proxy),
        )
        // Reporting
        .route("/timeline", post(routes::timeline::report_timeline))
        .route(
            "/watched",
            post(routes::watched::mark_watched).delete(routes::watched::mark_unwatched),
        )
        // Images
        .route("/images", get(routes::images::get_image))
        .layer(middleware::from_fn_with_state(ctx.clone(), auth_middleware));

    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx);

    // Static file serving for the web client build.
    if let Some(dir) = static_dir {
        if dir.exists() {
            tracing::info!("Serving static files from {:?}", dir);
            let index_path = dir.join("index.html");
            app = app.fallback_service(
                tower_http::services::ServeDir::new(&dir)
                    .append_index_html_on_directories(true)
                    .not_found_service(tower_http::services::ServeFile::new(index_path)),
            );
        }
    } else {
        tracing::debug!("No static_dir configured; serving API only");
    }

    app
}
