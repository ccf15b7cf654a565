//! Lazily starts transcodes and holds manifest requests until the stream
//! can be played.

use super::cache::StreamCache;
use super::index::MediaIndex;
use super::orchestrator::JobScheduler;
use crate::adapters::local::events::hub::EventHub;
use crate::adapters::local::events::{StreamEvent, StreamEventKind};
use crate::domain::hls::{first_variant_uri, MASTER_PLAYLIST};
use crate::domain::jobs::JobState;
use crate::domain::ContentId;
use crate::error::{Error, Result};
use crate::ports::SubtitleExtractor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::broadcast::{self, error::RecvError};

pub struct ReadinessGate {
    scheduler: Arc<dyn JobScheduler>,
    subtitles: Arc<dyn SubtitleExtractor>,
    index: Arc<MediaIndex>,
    cache: StreamCache,
    events: Arc<EventHub>,
    poll_interval: Duration,
    timeout: Duration,
}

/// A bare file name with nothing that could leave the stream directory.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains("..")
}

impl ReadinessGate {
    pub fn new(
        scheduler: Arc<dyn JobScheduler>,
        subtitles: Arc<dyn SubtitleExtractor>,
        index: Arc<MediaIndex>,
        cache: StreamCache,
        events: Arc<EventHub>,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            scheduler,
            subtitles,
            index,
            cache,
            events,
            poll_interval,
            timeout,
        }
    }

    /// The master exists and so does the sub-manifest of its first variant.
    pub async fn is_playable(&self, id: &ContentId) -> bool {
        let dir = self.cache.stream_dir(id);
        let Ok(master) = fs::read_to_string(dir.join(MASTER_PLAYLIST)).await else {
            return false;
        };
        match first_variant_uri(&master) {
            Some(uri) if is_plain_file_name(uri) => {
                fs::try_exists(dir.join(uri)).await.unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Output on disk comes from a finished run or from the run in flight.
    ///
    /// A directory left behind by an aborted run does not count even when
    /// its master and first variant exist.
    async fn is_live(&self, id: &ContentId) -> bool {
        if self.cache.is_complete(id).await {
            return true;
        }
        if !self.scheduler.is_pending(id) {
            return false;
        }
        matches!(
            self.scheduler.progress(),
            Some(progress) if progress.id == *id
                && matches!(progress.state, JobState::EncodingVideo { .. } | JobState::Completed)
        )
    }

    async fn is_servable(&self, id: &ContentId) -> bool {
        self.is_live(id).await && self.is_playable(id).await
    }

    /// Returns the master manifest path once it is playable, starting a
    /// transcode for `id` if nothing has produced one yet.
    pub async fn ensure_ready(&self, id: &ContentId, requested_max: Option<u32>) -> Result<PathBuf> {
        let master = self.cache.stream_dir(id).join(MASTER_PLAYLIST);
        if self.is_servable(id).await {
            return Ok(master);
        }

        // subscribe first so an early abort is not missed
        let mut events = self.events.subscribe();

        if !self.cache.is_complete(id).await && !self.scheduler.is_pending(id) {
            let source = self
                .index
                .get(id)
                .ok_or_else(|| Error::not_found("video", id))?;
            if self.scheduler.start(id, source.clone(), requested_max) {
                tracing::info!(id = %id, source = %source.display(), "Transcode requested");
                self.spawn_subtitles(id, source);
            }
        }

        match tokio::time::timeout(self.timeout, self.wait_playable(id, &mut events)).await {
            Ok(result) => result.map(|()| master),
            Err(_) => {
                tracing::warn!(id = %id, waited = ?self.timeout, "Stream not ready in time");
                Err(Error::Timeout {
                    id: id.to_string(),
                    waited: self.timeout,
                })
            }
        }
    }

    fn spawn_subtitles(&self, id: &ContentId, source: PathBuf) {
        let subtitles = Arc::clone(&self.subtitles);
        let id = id.clone();
        tokio::spawn(async move {
            match subtitles.extract(&id, &source).await {
                Ok(Some(path)) => tracing::debug!(id = %id, path = %path.display(), "Subtitles ready"),
                Ok(None) => tracing::debug!(id = %id, "No subtitles to extract"),
                Err(e) => tracing::warn!(id = %id, error = %e, "Subtitle extraction failed"),
            }
        });
    }

    /// The last run for `id` ended in an abort and nothing is running now.
    fn abort_reason(&self, id: &ContentId) -> Option<String> {
        if self.scheduler.is_pending(id) {
            return None;
        }
        match self.scheduler.progress() {
            Some(progress) if progress.id == *id => match progress.state {
                JobState::Aborted { reason } => Some(reason),
                _ => None,
            },
            _ => None,
        }
    }

    async fn wait_playable(
        &self,
        id: &ContentId,
        events: &mut broadcast::Receiver<StreamEvent>,
    ) -> Result<()> {
        let mut listening = true;
        loop {
            if self.is_servable(id).await {
                return Ok(());
            }

            tokio::select! {
                received = events.recv(), if listening => match received {
                    Ok(StreamEvent { id: event_id, kind: StreamEventKind::Aborted { reason } })
                        if event_id == *id =>
                    {
                        return Err(Error::Aborted { id: id.to_string(), reason });
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(id = %id, skipped, "Gate lagged behind stream events");
                    }
                    Err(RecvError::Closed) => listening = false,
                },
                _ = tokio::time::sleep(self.poll_interval) => {
                    if let Some(reason) = self.abort_reason(id) {
                        return Err(Error::Aborted { id: id.to_string(), reason });
                    }
                }
            }
        }
    }
}
