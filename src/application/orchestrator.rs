//! Transcode orchestration: one job at a time, renditions in priority order,
//! master manifest republished whenever the ready-set grows.

use super::cache::{Admission, StreamCache};
use super::lock::{JobLock, LockGuard};
use crate::adapters::local::events::hub::EventHub;
use crate::adapters::local::events::{StreamEvent, StreamEventKind};
use crate::domain::hls::{MasterPlaylist, SEGMENT_SECONDS};
use crate::domain::jobs::{percent_complete, JobProgress, JobState, StreamJob};
use crate::domain::{ContentId, Rendition};
use crate::error::{Error, Result};
use crate::ports::{EncodeHandle, EncodeRequest, Encoder, MediaProber, TrackKind};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Wait before retrying when another job holds the lock.
    pub lock_retry: Duration,
    /// Minimum gap between progress writes to the lock artifact.
    pub progress_interval: Duration,
    pub segment_seconds: u32,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            lock_retry: Duration::from_secs(5),
            progress_interval: Duration::from_secs(2),
            segment_seconds: SEGMENT_SECONDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Output was already complete; nothing was encoded.
    AlreadyComplete,
    Completed { renditions: usize },
}

/// What the readiness gate and the HTTP layer need from the orchestrator.
pub trait JobScheduler: Send + Sync {
    /// Starts a background run for `id` unless one is already pending.
    /// Returns whether a run was started.
    fn start(&self, id: &ContentId, source: PathBuf, requested_max: Option<u32>) -> bool;

    fn is_pending(&self, id: &ContentId) -> bool;

    /// State of the current or most recent job.
    fn progress(&self) -> Option<JobProgress>;
}

/// Audio encodes running alongside the video ladder.
///
/// Dropping the set aborts whatever is still running.
struct AudioEncodes {
    aborts: Vec<AbortHandle>,
    pending: FuturesUnordered<BoxFuture<'static, Result<()>>>,
}

impl AudioEncodes {
    fn new(handles: Vec<EncodeHandle>) -> Self {
        let aborts = handles.iter().map(|h| h.task.abort_handle()).collect();
        let pending = handles.into_iter().map(|h| h.wait().boxed()).collect();
        Self { aborts, pending }
    }

    /// Resolves with the first audio failure. Never resolves once every
    /// track has finished cleanly.
    async fn failure(&mut self) -> Error {
        while let Some(result) = self.pending.next().await {
            if let Err(e) = result {
                return e;
            }
        }
        std::future::pending().await
    }

    async fn finish(mut self) -> Result<()> {
        while let Some(result) = self.pending.next().await {
            result?;
        }
        Ok(())
    }
}

impl Drop for AudioEncodes {
    fn drop(&mut self) {
        for abort in &self.aborts {
            abort.abort();
        }
    }
}

/// Rate-limits progress writes to the lock artifact.
struct StatusWriter<'a> {
    guard: &'a LockGuard,
    interval: Duration,
    last_write: Option<Instant>,
}

impl<'a> StatusWriter<'a> {
    fn new(guard: &'a LockGuard, interval: Duration) -> Self {
        Self {
            guard,
            interval,
            last_write: None,
        }
    }

    async fn write(&mut self, progress: &JobProgress) {
        if self
            .last_write
            .is_some_and(|at| at.elapsed() < self.interval)
        {
            return;
        }
        if let Err(e) = self.guard.write_status(&progress.to_status_text()).await {
            tracing::warn!(id = %progress.id, error = %e, "Could not write progress");
        }
        self.last_write = Some(Instant::now());
    }
}

struct Inner<P, E> {
    prober: P,
    encoder: E,
    cache: StreamCache,
    lock: JobLock,
    events: Arc<EventHub>,
    settings: OrchestratorSettings,
    pending: Mutex<HashSet<ContentId>>,
    progress: RwLock<Option<JobProgress>>,
}

pub struct TranscodeOrchestrator<P, E> {
    inner: Arc<Inner<P, E>>,
}

impl<P, E> Clone for TranscodeOrchestrator<P, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, E> TranscodeOrchestrator<P, E>
where
    P: MediaProber + 'static,
    E: Encoder + 'static,
{
    pub fn new(
        prober: P,
        encoder: E,
        cache: StreamCache,
        lock: JobLock,
        events: Arc<EventHub>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                prober,
                encoder,
                cache,
                lock,
                events,
                settings,
                pending: Mutex::new(HashSet::new()),
                progress: RwLock::new(None),
            }),
        }
    }

    /// Runs a job to the end, waiting for the lock if needed.
    ///
    /// Failures are reported on the event hub before being returned.
    pub async fn run(
        &self,
        id: &ContentId,
        source: &Path,
        requested_max: Option<u32>,
    ) -> Result<JobOutcome> {
        self.inner
            .set_progress(JobProgress::idle(id.clone(), JobState::Idle));
        match self.inner.run_with_retry(id, source, requested_max).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(id = %id, error = %reason, "Transcode aborted");
                self.inner.set_progress(JobProgress::idle(
                    id.clone(),
                    JobState::Aborted {
                        reason: reason.clone(),
                    },
                ));
                self.inner
                    .publish(id, StreamEventKind::Aborted { reason });
                Err(e)
            }
        }
    }
}

impl<P, E> JobScheduler for TranscodeOrchestrator<P, E>
where
    P: MediaProber + 'static,
    E: Encoder + 'static,
{
    fn start(&self, id: &ContentId, source: PathBuf, requested_max: Option<u32>) -> bool {
        if !self.inner.pending.lock().insert(id.clone()) {
            return false;
        }

        let this = self.clone();
        let id = id.clone();
        tokio::spawn(async move {
            if let Ok(outcome) = this.run(&id, &source, requested_max).await {
                tracing::info!(id = %id, outcome = ?outcome, "Transcode finished");
            }
            this.inner.pending.lock().remove(&id);
        });
        true
    }

    fn is_pending(&self, id: &ContentId) -> bool {
        self.inner.pending.lock().contains(id)
    }

    fn progress(&self) -> Option<JobProgress> {
        self.inner.progress.read().clone()
    }
}

impl<P, E> Inner<P, E>
where
    P: MediaProber,
    E: Encoder,
{
    fn publish(&self, id: &ContentId, kind: StreamEventKind) {
        self.events.publish(StreamEvent::new(id, kind));
    }

    fn set_progress(&self, progress: JobProgress) {
        *self.progress.write() = Some(progress);
    }

    async fn run_with_retry(
        &self,
        id: &ContentId,
        source: &Path,
        requested_max: Option<u32>,
    ) -> Result<JobOutcome> {
        loop {
            match self.lock.try_acquire(id).await? {
                Some(guard) => {
                    let result = self.run_locked(id, source, requested_max, &guard).await;
                    if let Err(e) = guard.release().await {
                        tracing::warn!(id = %id, error = %e, "Could not release job lock");
                    }
                    return result;
                }
                None => {
                    tracing::info!(
                        id = %id,
                        retry_in = ?self.settings.lock_retry,
                        "Another transcode is running, deferring"
                    );
                    self.set_progress(JobProgress::idle(id.clone(), JobState::Deferred));
                    self.publish(id, StreamEventKind::Deferred);
                    tokio::time::sleep(self.settings.lock_retry).await;
                }
            }
        }
    }

    async fn prepare_dir(&self, id: &ContentId) -> Result<Option<PathBuf>> {
        let evicted = match self.cache.admit(id).await? {
            Admission::Complete => return Ok(None),
            Admission::Admitted { evicted } => evicted,
            Admission::InProgress => {
                // nothing else can be writing while we hold the lock
                tracing::warn!(id = %id, "Discarding stale partial output");
                self.cache.discard(id).await?;
                match self.cache.admit(id).await? {
                    Admission::Admitted { evicted } => evicted,
                    Admission::Complete => return Ok(None),
                    Admission::InProgress => {
                        return Err(Error::Validation(format!(
                            "stream directory for {id} could not be reset"
                        )))
                    }
                }
            }
        };
        if !evicted.is_empty() {
            tracing::info!(id = %id, evicted = ?evicted, "Made room in stream cache");
        }
        Ok(Some(self.cache.stream_dir(id)))
    }

    async fn run_locked(
        &self,
        id: &ContentId,
        source: &Path,
        requested_max: Option<u32>,
        guard: &LockGuard,
    ) -> Result<JobOutcome> {
        self.publish(id, StreamEventKind::Started);

        let Some(dir) = self.prepare_dir(id).await? else {
            tracing::info!(id = %id, "Stream already complete");
            self.set_progress(JobProgress::idle(id.clone(), JobState::Completed));
            self.publish(id, StreamEventKind::Completed);
            return Ok(JobOutcome::AlreadyComplete);
        };

        self.set_progress(JobProgress::idle(id.clone(), JobState::Probing));
        let info = self.prober.probe(source).await?;
        let mut job = StreamJob::new(id.clone(), source.to_path_buf(), dir, &info, requested_max)?;
        tracing::info!(
            id = %id,
            source = %source.display(),
            ladder = ?job.priority.iter().map(|r| r.height).collect::<Vec<_>>(),
            audio_tracks = job.audio_tracks.len(),
            "Starting transcode"
        );

        self.set_progress(job.progress(JobState::EncodingAudio, None));
        let mut audio = AudioEncodes::new(self.spawn_audio(&job).await?);

        let mut status = StatusWriter::new(guard, self.settings.progress_interval);
        self.encode_video(&mut job, &mut audio, &mut status).await?;
        audio.finish().await?;

        self.cache
            .mark_complete(id, chrono::Utc::now().timestamp_millis())
            .await?;
        self.set_progress(job.progress(JobState::Completed, None));
        self.publish(id, StreamEventKind::Completed);
        tracing::info!(id = %id, renditions = job.ladder.len(), "Transcode complete");

        Ok(JobOutcome::Completed {
            renditions: job.ladder.len(),
        })
    }

    async fn spawn_audio(&self, job: &StreamJob) -> Result<Vec<EncodeHandle>> {
        let mut handles = Vec::with_capacity(job.audio_tracks.len());
        for track in &job.audio_tracks {
            let request = EncodeRequest {
                source: job.source.clone(),
                stream_index: track.source_index,
                playlist: job.output_dir.join(track.playlist_name()),
                segment_pattern: job.output_dir.join(track.segment_pattern()),
                kind: TrackKind::Audio,
                segment_seconds: self.settings.segment_seconds,
            };
            match self.encoder.spawn(request, None).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    for handle in &handles {
                        handle.task.abort();
                    }
                    return Err(e);
                }
            }
        }
        Ok(handles)
    }

    async fn encode_video(
        &self,
        job: &mut StreamJob,
        audio: &mut AudioEncodes,
        status: &mut StatusWriter<'_>,
    ) -> Result<()> {
        let order = job.priority.clone();
        for (index, rendition) in order.into_iter().enumerate() {
            self.encode_rendition(job, index, rendition, audio, status)
                .await?;
        }
        Ok(())
    }

    async fn publish_master(&self, job: &StreamJob) -> Result<()> {
        MasterPlaylist::for_job(job).write_to(&job.output_dir).await?;
        self.publish(&job.id, StreamEventKind::ManifestPublished);
        Ok(())
    }

    async fn encode_rendition(
        &self,
        job: &mut StreamJob,
        index: usize,
        rendition: Rendition,
        audio: &mut AudioEncodes,
        status: &mut StatusWriter<'_>,
    ) -> Result<()> {
        // the first rendition is playable while it grows; the rest are
        // renamed into place once finished
        let first = index == 0;
        let playlist = if first {
            rendition.playlist_name()
        } else {
            rendition.temp_playlist_name()
        };

        let request = EncodeRequest {
            source: job.source.clone(),
            stream_index: job.video.index,
            playlist: job.output_dir.join(&playlist),
            segment_pattern: job.output_dir.join(rendition.segment_pattern()),
            kind: TrackKind::Video {
                height: rendition.height,
                bitrate_kbps: rendition.bitrate_kbps,
            },
            segment_seconds: self.settings.segment_seconds,
        };

        let state = JobState::EncodingVideo { index };
        let progress = job.progress(state.clone(), Some((rendition, 0)));
        status.write(&progress).await;
        self.set_progress(progress);
        tracing::info!(id = %job.id, rendition = %rendition.label(), index, "Encoding rendition");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = self.encoder.spawn(request, Some(tx)).await?;
        let video_abort = handle.task.abort_handle();

        if first {
            job.mark_ready(rendition);
            self.publish_master(job).await?;
            self.publish(
                &job.id,
                StreamEventKind::RenditionReady {
                    height: rendition.height,
                },
            );
        }

        let snapshot: &StreamJob = job;
        let report = async {
            while let Some(timemark) = rx.recv().await {
                let percent = percent_complete(timemark, snapshot.duration);
                let progress = snapshot.progress(state.clone(), Some((rendition, percent)));
                status.write(&progress).await;
                self.set_progress(progress);
            }
        };
        let encode = async { tokio::join!(handle.wait(), report).0 };
        tokio::select! {
            result = encode => result?,
            e = audio.failure() => {
                video_abort.abort();
                return Err(e);
            }
        }

        if !first {
            fs::rename(
                job.output_dir.join(&playlist),
                job.output_dir.join(rendition.playlist_name()),
            )
            .await?;
            job.mark_ready(rendition);
            self.publish_master(job).await?;
            self.publish(
                &job.id,
                StreamEventKind::RenditionReady {
                    height: rendition.height,
                },
            );
        }

        let progress = job.progress(state, None);
        status.write(&progress).await;
        self.set_progress(progress);
        tracing::info!(id = %job.id, rendition = %rendition.label(), "Rendition ready");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cache::COMPLETION_MARKER;
    use crate::domain::av::{AudioStream, MediaInfo, VideoStream};
    use crate::domain::hls::MASTER_PLAYLIST;
    use crate::domain::jobs::RenditionStatus;
    use crate::ports::prober::MockMediaProber;
    use async_trait::async_trait;
    use tempfile::{tempdir, TempDir};
    use tokio::sync::broadcast;

    #[derive(Clone, Default)]
    struct FakeEncoder {
        calls: Arc<Mutex<Vec<EncodeRequest>>>,
        fail_height: Option<u32>,
        fail_audio: bool,
        video_delay: Duration,
        /// When set, each video spawn records the lock artifact contents.
        lock_path: Option<PathBuf>,
        seen_status: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Encoder for FakeEncoder {
        async fn spawn(
            &self,
            request: EncodeRequest,
            progress: Option<mpsc::UnboundedSender<f64>>,
        ) -> Result<EncodeHandle> {
            self.calls.lock().push(request.clone());
            let label = request.label();
            let is_video = matches!(request.kind, TrackKind::Video { .. });
            if let (true, Some(lock_path)) = (is_video, &self.lock_path) {
                let text = std::fs::read_to_string(lock_path).unwrap_or_default();
                self.seen_status.lock().push(text);
            }
            let fail = match request.kind {
                TrackKind::Video { height, .. } => Some(height) == self.fail_height,
                TrackKind::Audio => self.fail_audio,
            };
            let delay = if is_video { self.video_delay } else { Duration::ZERO };
            let track = label.clone();
            let task = tokio::spawn(async move {
                if let Some(tx) = progress {
                    for timemark in [5.0, 10.0, 15.0, 20.0, 25.0, 30.0] {
                        let _ = tx.send(timemark);
                    }
                }
                tokio::time::sleep(delay).await;
                if fail {
                    return Err(Error::encode(track, "exit status: 1"));
                }
                fs::write(&request.playlist, "#EXTM3U\n#EXT-X-ENDLIST\n").await?;
                Ok::<(), Error>(())
            });
            Ok(EncodeHandle { label, task })
        }
    }

    struct Harness {
        _root: TempDir,
        streams: PathBuf,
        lock_path: PathBuf,
        encoder: FakeEncoder,
        events: Arc<EventHub>,
        orchestrator: TranscodeOrchestrator<MockMediaProber, FakeEncoder>,
    }

    fn media_info(height: u32, audio_tracks: usize) -> MediaInfo {
        MediaInfo {
            video: Some(VideoStream {
                index: 0,
                codec: "h264".into(),
                width: height * 16 / 9,
                height,
            }),
            audio: (0..audio_tracks)
                .map(|i| AudioStream {
                    index: i + 1,
                    codec: "aac".into(),
                    language: Some("eng".into()),
                    title: None,
                })
                .collect(),
            subtitles: vec![],
            duration: Some(60.0),
        }
    }

    async fn harness(prober: MockMediaProber, encoder: FakeEncoder) -> Harness {
        harness_with_interval(prober, encoder, Duration::ZERO).await
    }

    async fn harness_with_interval(
        prober: MockMediaProber,
        mut encoder: FakeEncoder,
        progress_interval: Duration,
    ) -> Harness {
        let root = tempdir().unwrap();
        let streams = root.path().join("streams");
        let lock_path = root.path().join("transcode.lock");
        encoder.lock_path = Some(lock_path.clone());
        let cache = StreamCache::open(&streams, 5).await.unwrap();
        let events = Arc::new(EventHub::new());
        let settings = OrchestratorSettings {
            lock_retry: Duration::from_millis(20),
            progress_interval,
            segment_seconds: 6,
        };
        let orchestrator = TranscodeOrchestrator::new(
            prober,
            encoder.clone(),
            cache,
            JobLock::new(&lock_path),
            events.clone(),
            settings,
        );
        Harness {
            _root: root,
            streams,
            lock_path,
            encoder,
            events,
            orchestrator,
        }
    }

    fn prober_for(info: MediaInfo) -> MockMediaProber {
        let mut prober = MockMediaProber::new();
        prober
            .expect_probe()
            .returning(move |_| Ok(info.clone()));
        prober
    }

    fn id() -> ContentId {
        ContentId::parse("movie").unwrap()
    }

    fn drain(rx: &mut broadcast::Receiver<StreamEvent>) -> Vec<StreamEventKind> {
        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind);
        }
        kinds
    }

    fn video_heights(calls: &[EncodeRequest]) -> Vec<u32> {
        calls
            .iter()
            .filter_map(|c| match c.kind {
                TrackKind::Video { height, .. } => Some(height),
                TrackKind::Audio => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_full_run_publishes_every_rendition() {
        let h = harness(prober_for(media_info(900, 2)), FakeEncoder::default()).await;
        let mut rx = h.events.subscribe();

        let outcome = h
            .orchestrator
            .run(&id(), Path::new("/media/movie.mkv"), None)
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Completed { renditions: 6 });

        let calls = h.encoder.calls.lock().clone();
        // audio goes out before any video
        assert!(matches!(calls[0].kind, TrackKind::Audio));
        assert!(matches!(calls[1].kind, TrackKind::Audio));
        assert_eq!(video_heights(&calls), vec![720, 144, 240, 360, 480, 900]);
        assert!(calls[2].playlist.ends_with("video_720p.m3u8"));
        assert!(calls[3].playlist.ends_with("video_temp_144p.m3u8"));

        let dir = h.streams.join("movie");
        let master = std::fs::read_to_string(dir.join(MASTER_PLAYLIST)).unwrap();
        let uris: Vec<&str> = master.lines().filter(|l| l.starts_with("video_")).collect();
        assert_eq!(
            uris,
            vec![
                "video_144p.m3u8",
                "video_240p.m3u8",
                "video_360p.m3u8",
                "video_480p.m3u8",
                "video_720p.m3u8",
                "video_900p.m3u8"
            ]
        );
        assert_eq!(master.matches("#EXT-X-MEDIA:TYPE=AUDIO").count(), 2);
        assert!(dir.join("video_144p.m3u8").exists());
        assert!(!dir.join("video_temp_144p.m3u8").exists());
        assert!(dir.join(COMPLETION_MARKER).exists());
        assert!(!h.lock_path.exists());

        let kinds = drain(&mut rx);
        assert_eq!(kinds.first(), Some(&StreamEventKind::Started));
        assert_eq!(kinds.last(), Some(&StreamEventKind::Completed));
        let ready: Vec<u32> = kinds
            .iter()
            .filter_map(|k| match k {
                StreamEventKind::RenditionReady { height } => Some(*height),
                _ => None,
            })
            .collect();
        assert_eq!(ready, vec![720, 144, 240, 360, 480, 900]);

        let progress = h.orchestrator.progress().unwrap();
        assert_eq!(progress.state, JobState::Completed);
        assert!(progress
            .renditions
            .iter()
            .all(|r| r.status == RenditionStatus::Ready));
    }

    #[tokio::test]
    async fn test_requested_quality_goes_first() {
        let h = harness(prober_for(media_info(1080, 1)), FakeEncoder::default()).await;
        h.orchestrator
            .run(&id(), Path::new("/media/movie.mkv"), Some(480))
            .await
            .unwrap();
        let calls = h.encoder.calls.lock().clone();
        assert_eq!(video_heights(&calls), vec![480, 144, 240, 360, 720, 1080]);
    }

    #[tokio::test]
    async fn test_complete_stream_is_not_reencoded() {
        // probing would panic: no expectations
        let h = harness(MockMediaProber::new(), FakeEncoder::default()).await;
        let dir = h.streams.join("movie");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(COMPLETION_MARKER), "1").unwrap();

        let outcome = h
            .orchestrator
            .run(&id(), Path::new("/media/movie.mkv"), None)
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::AlreadyComplete);
        assert!(h.encoder.calls.lock().is_empty());
        assert!(!h.lock_path.exists());
    }

    #[tokio::test]
    async fn test_missing_audio_aborts_before_encoding() {
        let h = harness(prober_for(media_info(720, 0)), FakeEncoder::default()).await;
        let mut rx = h.events.subscribe();

        let err = h
            .orchestrator
            .run(&id(), Path::new("/media/movie.mkv"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingStream("audio")));
        assert!(h.encoder.calls.lock().is_empty());
        assert!(!h.lock_path.exists());
        assert!(!h.streams.join("movie").join(MASTER_PLAYLIST).exists());
        assert!(matches!(
            drain(&mut rx).last(),
            Some(StreamEventKind::Aborted { .. })
        ));
        assert!(matches!(
            h.orchestrator.progress().unwrap().state,
            JobState::Aborted { .. }
        ));
    }

    #[tokio::test]
    async fn test_encode_failure_leaves_unmarked_directory() {
        let encoder = FakeEncoder {
            fail_height: Some(240),
            ..FakeEncoder::default()
        };
        let h = harness(prober_for(media_info(720, 1)), encoder).await;

        let err = h
            .orchestrator
            .run(&id(), Path::new("/media/movie.mkv"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Encode { .. }));

        let dir = h.streams.join("movie");
        assert!(dir.exists());
        assert!(!dir.join(COMPLETION_MARKER).exists());
        assert!(!h.lock_path.exists());

        let master = std::fs::read_to_string(dir.join(MASTER_PLAYLIST)).unwrap();
        assert!(master.contains("video_144p.m3u8"));
        assert!(master.contains("video_720p.m3u8"));
        assert!(!master.contains("video_240p.m3u8"));
    }

    #[tokio::test]
    async fn test_audio_failure_aborts_before_ladder_finishes() {
        let encoder = FakeEncoder {
            fail_audio: true,
            video_delay: Duration::from_millis(200),
            ..FakeEncoder::default()
        };
        let h = harness(prober_for(media_info(900, 1)), encoder).await;
        let mut rx = h.events.subscribe();

        let err = h
            .orchestrator
            .run(&id(), Path::new("/media/movie.mkv"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Encode { ref track, .. } if track.starts_with("audio")));

        assert_eq!(video_heights(&h.encoder.calls.lock()), vec![720]);
        assert!(!h.streams.join("movie").join(COMPLETION_MARKER).exists());
        assert!(!h.lock_path.exists());
        assert!(matches!(
            drain(&mut rx).last(),
            Some(StreamEventKind::Aborted { .. })
        ));
    }

    #[tokio::test]
    async fn test_status_writes_are_throttled() {
        let h = harness_with_interval(
            prober_for(media_info(480, 1)),
            FakeEncoder::default(),
            Duration::from_secs(3600),
        )
        .await;
        h.orchestrator
            .run(&id(), Path::new("/media/movie.mkv"), None)
            .await
            .unwrap();

        // one write for the whole job: every later spawn still sees it
        let seen = h.encoder.seen_status.lock().clone();
        assert_eq!(seen.len(), 4);
        assert!(seen
            .iter()
            .all(|text| text == "movie\n480p active 0%\n144p\n240p\n360p\n"));
    }

    #[tokio::test]
    async fn test_status_follows_each_rendition_without_throttle() {
        let h = harness(prober_for(media_info(480, 1)), FakeEncoder::default()).await;
        h.orchestrator
            .run(&id(), Path::new("/media/movie.mkv"), None)
            .await
            .unwrap();

        let seen = h.encoder.seen_status.lock().clone();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], "movie\n480p active 0%\n144p\n240p\n360p\n");
        assert!(seen[1].contains("480p ready"));
        assert!(seen[1].contains("144p active 0%"));
    }

    #[tokio::test]
    async fn test_stale_partial_output_is_discarded() {
        let h = harness(prober_for(media_info(144, 1)), FakeEncoder::default()).await;
        let dir = h.streams.join("movie");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("video_1080p_007.ts"), b"left over").unwrap();

        h.orchestrator
            .run(&id(), Path::new("/media/movie.mkv"), None)
            .await
            .unwrap();
        assert!(!dir.join("video_1080p_007.ts").exists());
        assert!(dir.join(COMPLETION_MARKER).exists());
    }

    #[tokio::test]
    async fn test_busy_lock_defers_then_runs() {
        let h = harness(prober_for(media_info(144, 1)), FakeEncoder::default()).await;
        std::fs::write(&h.lock_path, "other\n").unwrap();
        let mut rx = h.events.subscribe();

        assert!(h
            .orchestrator
            .start(&id(), PathBuf::from("/media/movie.mkv"), None));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, StreamEventKind::Deferred);
        assert!(h.encoder.calls.lock().is_empty());
        assert!(h.orchestrator.is_pending(&id()));

        std::fs::remove_file(&h.lock_path).unwrap();
        loop {
            let event = rx.recv().await.unwrap();
            if event.kind == StreamEventKind::Completed {
                break;
            }
        }
        assert!(h.streams.join("movie").join(COMPLETION_MARKER).exists());
    }

    #[tokio::test]
    async fn test_start_is_singleflight() {
        let h = harness(prober_for(media_info(144, 1)), FakeEncoder::default()).await;
        let mut rx = h.events.subscribe();
        let source = PathBuf::from("/media/movie.mkv");

        assert!(h.orchestrator.start(&id(), source.clone(), None));
        assert!(!h.orchestrator.start(&id(), source, None));

        loop {
            if rx.recv().await.unwrap().kind == StreamEventKind::Completed {
                break;
            }
        }
        // pending is cleared right after the final event
        for _ in 0..100 {
            if !h.orchestrator.is_pending(&id()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!h.orchestrator.is_pending(&id()));
        assert_eq!(video_heights(&h.encoder.calls.lock()), vec![144]);
    }
}
