use super::av::{AudioStream, MediaInfo, VideoStream};
use super::content::ContentId;
use super::ladder::{build_ladder, prioritize, Rendition};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// One audio rendition, mapped from a source audio stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub source_index: usize,
    pub track_id: String,
    pub language: String,
    pub name: String,
}

impl AudioTrack {
    pub fn from_stream(ordinal: usize, stream: &AudioStream) -> Self {
        let language = stream.language.clone().unwrap_or_else(|| "und".to_string());
        let name = stream
            .title
            .clone()
            .or_else(|| stream.language.clone())
            .unwrap_or_else(|| format!("Track {}", ordinal + 1));

        Self {
            source_index: stream.index,
            track_id: format!("audio_{ordinal}"),
            language,
            name,
        }
    }

    pub fn playlist_name(&self) -> String {
        format!("{}.m3u8", self.track_id)
    }

    pub fn segment_pattern(&self) -> String {
        format!("{}_%03d.ts", self.track_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Deferred,
    Probing,
    EncodingAudio,
    EncodingVideo { index: usize },
    Completed,
    Aborted { reason: String },
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Idle => f.write_str("idle"),
            JobState::Deferred => f.write_str("deferred"),
            JobState::Probing => f.write_str("probing"),
            JobState::EncodingAudio => f.write_str("encoding audio"),
            JobState::EncodingVideo { index } => write!(f, "encoding video #{index}"),
            JobState::Completed => f.write_str("completed"),
            JobState::Aborted { reason } => write!(f, "aborted: {reason}"),
        }
    }
}

/// The mutable unit of work for one content id.
#[derive(Debug, Clone)]
pub struct StreamJob {
    pub id: ContentId,
    pub source: PathBuf,
    pub output_dir: PathBuf,
    /// Valid ladder, ascending.
    pub ladder: Vec<Rendition>,
    /// Processing order.
    pub priority: Vec<Rendition>,
    pub audio_tracks: Vec<AudioTrack>,
    pub video: VideoStream,
    pub duration: Option<f64>,
    ready: BTreeSet<Rendition>,
}

impl StreamJob {
    /// Derives ladder, order and audio tracks from probe output.
    ///
    /// Fails with [`Error::MissingStream`] when the source has no video or
    /// no audio.
    pub fn new(
        id: ContentId,
        source: PathBuf,
        output_dir: PathBuf,
        info: &MediaInfo,
        requested_max: Option<u32>,
    ) -> Result<Self> {
        let video = info.video.clone().ok_or(Error::MissingStream("video"))?;
        if info.audio.is_empty() {
            return Err(Error::MissingStream("audio"));
        }

        let ladder = build_ladder(video.height)?;
        let priority = prioritize(&ladder, requested_max);
        let audio_tracks = info
            .audio
            .iter()
            .enumerate()
            .map(|(i, stream)| AudioTrack::from_stream(i, stream))
            .collect();

        Ok(Self {
            id,
            source,
            output_dir,
            ladder,
            priority,
            audio_tracks,
            video,
            duration: info.duration,
            ready: BTreeSet::new(),
        })
    }

    /// Returns false if the rendition was already ready.
    pub fn mark_ready(&mut self, rendition: Rendition) -> bool {
        self.ready.insert(rendition)
    }

    pub fn is_ready(&self, rendition: &Rendition) -> bool {
        self.ready.contains(rendition)
    }

    /// Ready renditions, ascending by height.
    pub fn ready_renditions(&self) -> impl Iterator<Item = &Rendition> {
        self.ready.iter()
    }

    pub fn variant_width(&self, rendition: &Rendition) -> u32 {
        self.video.scaled_width(rendition.encoded_height())
    }

    /// Snapshot for the status API and the lock artifact.
    pub fn progress(&self, state: JobState, active: Option<(Rendition, u8)>) -> JobProgress {
        let renditions = self
            .priority
            .iter()
            .map(|r| {
                let status = match active {
                    _ if self.is_ready(r) && active.map(|(a, _)| a) != Some(*r) => {
                        RenditionStatus::Ready
                    }
                    Some((a, percent)) if a == *r => RenditionStatus::Active { percent },
                    _ => RenditionStatus::Pending,
                };
                RenditionProgress {
                    height: r.height,
                    status,
                }
            })
            .collect();

        JobProgress {
            id: self.id.clone(),
            state,
            renditions,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RenditionStatus {
    Pending,
    Active { percent: u8 },
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenditionProgress {
    pub height: u32,
    #[serde(flatten)]
    pub status: RenditionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub id: ContentId,
    #[serde(flatten)]
    pub state: JobState,
    pub renditions: Vec<RenditionProgress>,
}

impl JobProgress {
    pub fn idle(id: ContentId, state: JobState) -> Self {
        Self {
            id,
            state,
            renditions: Vec::new(),
        }
    }

    /// Text written to the lock artifact: the id, then one line per
    /// rendition in processing order.
    pub fn to_status_text(&self) -> String {
        let mut out = format!("{}\n", self.id);
        for r in &self.renditions {
            match r.status {
                RenditionStatus::Pending => out.push_str(&format!("{}p\n", r.height)),
                RenditionStatus::Active { percent } => {
                    out.push_str(&format!("{}p active {}%\n", r.height, percent))
                }
                RenditionStatus::Ready => out.push_str(&format!("{}p ready\n", r.height)),
            }
        }
        out
    }
}

/// Encoder timemark over source duration, as a whole percentage.
pub fn percent_complete(timemark_secs: f64, duration: Option<f64>) -> u8 {
    match duration {
        Some(total) if total > 0.0 && timemark_secs.is_finite() => {
            (timemark_secs / total * 100.0).clamp(0.0, 100.0) as u8
        }
        _ => 0,
    }
}
