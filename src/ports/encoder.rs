use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video { height: u32, bitrate_kbps: u32 },
    Audio,
}

/// One encoder invocation producing an HLS sub-manifest and its segments.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeRequest {
    pub source: PathBuf,
    /// Stream index inside the source container.
    pub stream_index: usize,
    /// Sub-manifest to write.
    pub playlist: PathBuf,
    /// Segment file pattern, absolute, with a `%03d` counter.
    pub segment_pattern: PathBuf,
    pub kind: TrackKind,
    pub segment_seconds: u32,
}

impl EncodeRequest {
    pub fn label(&self) -> String {
        match self.kind {
            TrackKind::Video { height, .. } => format!("video_{height}p"),
            TrackKind::Audio => format!("audio_{}", self.stream_index),
        }
    }
}

/// A running encode. The task resolves once the subprocess exits.
#[derive(Debug)]
pub struct EncodeHandle {
    pub label: String,
    pub task: JoinHandle<Result<()>>,
}

impl EncodeHandle {
    pub async fn wait(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(Error::encode(self.label, format!("encode task failed: {e}"))),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Starts an encode without waiting for it.
    ///
    /// When `progress` is given, the encoder sends the current output
    /// timemark in seconds as it advances.
    async fn spawn(
        &self,
        request: EncodeRequest,
        progress: Option<mpsc::UnboundedSender<f64>>,
    ) -> Result<EncodeHandle>;
}
