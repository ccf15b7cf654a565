//! HLS delivery: gated master manifest, sub-manifests and segments.

use super::error::AppError;
use super::AppState;
use crate::application::gate::is_plain_file_name;
use crate::domain::hls::{filter_by_max_quality, MASTER_PLAYLIST};
use crate::domain::ContentId;
use crate::error::Error;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::io::ErrorKind;
use tokio::fs::{self, File};
use tokio_util::io::ReaderStream;

pub const PLAYLIST_MIME: &str = "application/vnd.apple.mpegurl";
pub const SEGMENT_MIME: &str = "video/mp2t";

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Highest variant height to advertise.
    pub quality: Option<u32>,
}

fn content_type(file: &str) -> String {
    match file.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "m3u8" => PLAYLIST_MIME.to_string(),
        Some(ext) if ext == "ts" => SEGMENT_MIME.to_string(),
        _ => mime_guess::from_path(file)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

pub async fn get_stream_file(
    State(state): State<AppState>,
    Path((id, file)): Path<(String, String)>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, AppError> {
    let id = ContentId::parse(&id)?;
    if !is_plain_file_name(&file) {
        return Err(Error::Validation(format!("invalid file name: {file:?}")).into());
    }

    if file == MASTER_PLAYLIST {
        return master(&state, &id, query.quality).await;
    }

    let path = state.cache.stream_dir(&id).join(&file);
    let handle = match File::open(&path).await {
        Ok(handle) => handle,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Error::not_found("file", format!("{id}/{file}")).into())
        }
        Err(e) => return Err(e.into()),
    };

    let cache_control = if file.ends_with(".m3u8") {
        // event playlists keep growing while encoding
        "no-cache"
    } else {
        "public, max-age=86400"
    };

    Ok((
        [
            (CONTENT_TYPE, content_type(&file)),
            (CACHE_CONTROL, cache_control.to_string()),
        ],
        Body::from_stream(ReaderStream::new(handle)),
    )
        .into_response())
}

async fn master(state: &AppState, id: &ContentId, quality: Option<u32>) -> Result<Response, AppError> {
    let path = state.gate.ensure_ready(id, quality).await?;
    let text = fs::read_to_string(&path).await?;
    let body = match quality {
        Some(max) => filter_by_max_quality(&text, max),
        None => text,
    };

    Ok((
        [
            (CONTENT_TYPE, PLAYLIST_MIME),
            (CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}
