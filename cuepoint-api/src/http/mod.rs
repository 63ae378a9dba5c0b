// Module: http
// HTTP/JSON REST API for devices and the media-analysis stage

pub mod capability;
pub mod error;
pub mod health;
pub mod keyframe;
pub mod playlist;
pub mod session;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use cuepoint_core::{
    bootstrap::Services,
    service::{CapabilityRegistry, KeyframeResolver, PlaybackService, PlaylistService},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub capabilities: Arc<CapabilityRegistry>,
    pub keyframes: Arc<KeyframeResolver>,
    pub playlists: PlaylistService,
    pub playback: PlaybackService,
}

impl From<Services> for AppState {
    fn from(services: Services) -> Self {
        Self {
            capabilities: services.capabilities,
            keyframes: services.keyframes,
            playlists: services.playlists,
            playback: services.playback,
        }
    }
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let router = Router::new()
        // Health check endpoints (for monitoring probes)
        .merge(health::create_health_router())
        // Capability routes
        .route("/api/capabilities", post(capability::declare_capability))
        .route(
            "/api/capabilities/{device_id}",
            get(capability::get_capability),
        )
        // Session routes
        .route("/api/sessions", post(session::start_playback))
        .route("/api/sessions/{session_id}", delete(session::stop))
        .route(
            "/api/sessions/{session_id}/heartbeat",
            post(session::heartbeat),
        )
        .route("/api/sessions/{session_id}/decision", post(session::decide))
        .route("/api/sessions/{session_id}/resume", post(session::resume))
        .route("/api/sessions/{session_id}/seek", post(session::seek))
        // Playlist routes
        .route("/api/playlists", post(playlist::create_playlist))
        .route("/api/playlists/{generator_id}", get(playlist::get_playlist))
        .route(
            "/api/playlists/{generator_id}/items",
            get(playlist::get_items),
        )
        .route("/api/playlists/{generator_id}/next", post(playlist::next))
        .route(
            "/api/playlists/{generator_id}/previous",
            post(playlist::previous),
        )
        .route("/api/playlists/{generator_id}/jump", post(playlist::jump))
        .route(
            "/api/playlists/{generator_id}/shuffle",
            put(playlist::set_shuffle),
        )
        .route(
            "/api/playlists/{generator_id}/repeat",
            put(playlist::set_repeat),
        )
        // Keyframe routes
        .route(
            "/api/media-parts/{media_part_id}/seek",
            get(keyframe::resolve_seek),
        )
        .route(
            "/api/media-parts/{media_part_id}/keyframes",
            put(keyframe::register_keyframes).delete(keyframe::remove_keyframes),
        );

    // Apply layers before state
    let router = router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Apply state to all routes (must be last)
    router.with_state(state)
}
