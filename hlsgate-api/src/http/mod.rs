// Module: http
// HTTP/JSON API for the stream orchestrator

pub mod error;
pub mod health;
pub mod hls;
pub mod streams;

use axum::{routing::get, Router};
use hlsgate_livestream::StreamManager;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use error::{ApiResponse, AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<StreamManager>,
    /// Secret mixed into HLS access tokens
    pub token_secret: Arc<str>,
}

impl AppState {
    pub fn new(manager: Arc<StreamManager>, token_secret: &str) -> Self {
        Self {
            manager,
            token_secret: Arc::from(token_secret),
        }
    }
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let hls_root = state.manager.config().hls_root.clone();

    let router = Router::new()
        .route(
            "/api/streams",
            get(streams::list_streams).post(streams::control_stream),
        )
        .route("/api/streams/{stream_id}", get(streams::get_stream))
        .route("/api/health", get(health::health_check))
        .route("/api/hls/{stream_id}", get(hls::hls_metadata))
        .route("/api/debug/{stream_id}", get(hls::playlist_debug))
        // Playlists and segments written by the workers
        .nest_service("/hls", ServeDir::new(hls_root));

    // Apply layers before state
    let router = router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    router.with_state(state)
}
