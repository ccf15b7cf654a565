use super::error::AppError;
use super::AppState;
use crate::domain::ContentId;
use crate::error::Error;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use std::io::ErrorKind;
use tokio::fs;

pub async fn get_subtitles(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = ContentId::parse(&id)?;
    let path = state.subtitles_dir.join(format!("{id}.srt"));
    match fs::read(&path).await {
        Ok(bytes) => Ok(([(CONTENT_TYPE, "application/x-subrip; charset=utf-8")], bytes).into_response()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(Error::not_found("subtitles", id).into())
        }
        Err(e) => Err(e.into()),
    }
}
