//! JSON API: library listing, rescans and job status.

use super::error::AppError;
use super::AppState;
use crate::application::orchestrator::JobScheduler;
use crate::domain::jobs::JobProgress;
use crate::domain::ContentId;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
pub struct VideoSummary {
    pub id: ContentId,
    pub name: String,
    pub path: PathBuf,
    /// Fully transcoded and cached.
    pub ready: bool,
    pub master_url: String,
}

#[derive(Debug, Serialize)]
pub struct RescanResponse {
    pub videos: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Content id holding the job lock.
    pub active: Option<ContentId>,
    /// Contents of the lock artifact.
    pub status_text: Option<String>,
    pub job: Option<JobProgress>,
}

pub async fn list_videos(State(state): State<AppState>) -> Json<Vec<VideoSummary>> {
    let mut videos = Vec::new();
    for entry in state.index.entries() {
        let ready = state.cache.is_complete(&entry.id).await;
        let name = entry
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        videos.push(VideoSummary {
            master_url: format!("/streams/{}/master.m3u8", entry.id),
            id: entry.id,
            name,
            path: entry.path,
            ready,
        });
    }
    Json(videos)
}

pub async fn rescan(State(state): State<AppState>) -> Result<Json<RescanResponse>, AppError> {
    let videos = state.index.rescan().await?;
    Ok(Json(RescanResponse { videos }))
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        active: state.lock.holder().await,
        status_text: state.lock.status().await,
        job: state.scheduler.progress(),
    })
}
