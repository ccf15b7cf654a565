//! HTTP inbound adapter.

pub mod api;
pub mod error;
pub mod streams;
pub mod subtitles;

use crate::application::cache::StreamCache;
use crate::application::gate::ReadinessGate;
use crate::application::index::MediaIndex;
use crate::application::lock::JobLock;
use crate::application::orchestrator::JobScheduler;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<ReadinessGate>,
    pub scheduler: Arc<dyn JobScheduler>,
    pub index: Arc<MediaIndex>,
    pub cache: StreamCache,
    pub lock: JobLock,
    pub subtitles_dir: PathBuf,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::RANGE]);

    Router::new()
        .route("/streams/:id/:file", get(streams::get_stream_file))
        .route("/subtitles/:id", get(subtitles::get_subtitles))
        .route("/api/videos", get(api::list_videos))
        .route("/api/rescan", post(api::rescan))
        .route("/api/status", get(api::status))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
