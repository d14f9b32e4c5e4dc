//! md2pptx-server library - Markdown to PowerPoint conversion service
//!
//! Accepts a Markdown upload, runs the external converter on it, streams the
//! generated deck back and deletes both files after a grace period.

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod cleanup;
pub mod converter;
pub mod error;
pub mod staging;

pub use crate::error::{ApiError, ApiResult};

use crate::cleanup::CleanupScheduler;
use crate::converter::Converter;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Directory uploads are staged in
    pub upload_dir: Arc<PathBuf>,
    /// Located converter executable
    pub converter: Arc<Converter>,
    /// Deferred deletion of staged files
    pub cleanup: CleanupScheduler,
    /// Largest accepted request body
    pub max_upload_bytes: usize,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        upload_dir: PathBuf,
        converter: Converter,
        cleanup: CleanupScheduler,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            upload_dir: Arc::new(upload_dir),
            converter: Arc::new(converter),
            cleanup,
            max_upload_bytes,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        .merge(api::upload_routes().layer(body_limit))
        .merge(api::health_routes())
        .route("/api/buildinfo", axum::routing::get(api::get_build_info))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // Browser frontend is served from a different origin
        .layer(CorsLayer::permissive())
}
