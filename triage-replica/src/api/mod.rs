//! HTTP API
//!
//! REST endpoints for reading the ordered replica, reordering records,
//! editing tags and triggering syncs, plus the SSE event stream.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod sse;

use crate::state::SharedState;
use crate::sync::SyncService;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use triage_common::config::ServerConfig;

pub use error::{ApiError, ApiResult};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Replica behind its lock, plus the event bus
    pub state: Arc<SharedState>,

    pub sync: Arc<SyncService>,

    /// Remote server, used to build record URLs
    pub server: ServerConfig,

    /// Cancelled on shutdown; in-flight syncs get a child token
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        state: Arc<SharedState>,
        sync: Arc<SyncService>,
        server: ServerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            state,
            sync,
            server,
            shutdown,
        }
    }
}

/// Build application router
pub fn build_router(app: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Replica
        .route("/api/records", get(handlers::list_records))
        .route("/api/records/order", post(handlers::set_order_near))
        .route("/api/records/tier", post(handlers::set_tier))
        .route("/api/records/new", post(handlers::set_new_marker))
        .route("/api/records/:id", get(handlers::get_record))
        // Tags
        .route(
            "/api/records/:id/tags",
            post(handlers::add_tag).delete(handlers::clear_tags),
        )
        .route("/api/records/:id/tags/:tag", delete(handlers::remove_tag))
        .route("/api/tags", get(handlers::list_tags))
        .route(
            "/api/tags/:name",
            put(handlers::define_tag).delete(handlers::remove_tag_definition),
        )
        // Sync
        .route("/api/sync", post(handlers::full_sync))
        .route("/api/sync/refresh", post(handlers::refresh))
        // SSE
        .route("/api/events", get(sse::event_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app)
}
