use crate::domain::ladder::AUDIO_BITRATE_KBPS;
use crate::error::{Error, Result};
use crate::ports::{EncodeHandle, EncodeRequest, Encoder, TrackKind};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// Lines of stderr kept for error reports.
const STDERR_TAIL: usize = 20;

/// [`Encoder`] that runs one `ffmpeg` process per track.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

/// Full ffmpeg argument list for one HLS track.
pub fn build_args(request: &EncodeRequest) -> Vec<String> {
    let mut args: Vec<String> = [
        "-y", "-nostdin", "-loglevel", "error", "-progress", "pipe:1", "-nostats", "-i",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(request.source.to_string_lossy().into_owned());
    args.push("-map".into());
    args.push(format!("0:{}", request.stream_index));

    match request.kind {
        TrackKind::Video {
            height,
            bitrate_kbps,
        } => {
            // libx264 rejects odd dimensions
            let height = (height + 1) / 2 * 2;
            args.extend(
                [
                    "-an".to_string(),
                    "-c:v".into(),
                    "libx264".into(),
                    "-vf".into(),
                    format!("scale=-2:{height}"),
                    "-b:v".into(),
                    format!("{bitrate_kbps}k"),
                    "-maxrate".into(),
                    format!("{bitrate_kbps}k"),
                    "-bufsize".into(),
                    format!("{}k", bitrate_kbps * 2),
                    "-profile:v".into(),
                    "main".into(),
                    "-pix_fmt".into(),
                    "yuv420p".into(),
                    "-crf".into(),
                    "23".into(),
                    "-preset".into(),
                    "veryfast".into(),
                    "-force_key_frames".into(),
                    format!("expr:gte(t,n_forced*{})", request.segment_seconds),
                    "-sc_threshold".into(),
                    "0".into(),
                ],
            );
        }
        TrackKind::Audio => {
            args.extend(
                [
                    "-vn".to_string(),
                    "-c:a".into(),
                    "aac".into(),
                    "-b:a".into(),
                    format!("{AUDIO_BITRATE_KBPS}k"),
                    "-ac".into(),
                    "2".into(),
                    "-ar".into(),
                    "44100".into(),
                ],
            );
        }
    }

    args.extend([
        "-sn".to_string(),
        "-dn".into(),
        "-map_metadata".into(),
        "-1".into(),
        "-max_muxing_queue_size".into(),
        "1024".into(),
        "-f".into(),
        "hls".into(),
        "-hls_time".into(),
        request.segment_seconds.to_string(),
        "-hls_list_size".into(),
        "0".into(),
        "-hls_playlist_type".into(),
        "event".into(),
        "-hls_segment_filename".into(),
        request.segment_pattern.to_string_lossy().into_owned(),
    ]);
    args.push(request.playlist.to_string_lossy().into_owned());
    args
}

/// Parses `HH:MM:SS(.frac)` into seconds.
pub fn parse_timemark(mark: &str) -> Option<f64> {
    let mark = mark.trim();
    if mark.starts_with('-') {
        return None;
    }
    let mut parts = mark.rsplitn(3, ':');
    let seconds: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next().map_or(Ok(0.0), str::parse).ok()?;
    let hours: f64 = parts.next().map_or(Ok(0.0), str::parse).ok()?;
    let total = hours * 3600.0 + minutes * 60.0 + seconds;
    (total.is_finite() && total >= 0.0).then_some(total)
}

/// Output position in seconds from one `-progress` line, if it carries one.
pub fn parse_progress_line(line: &str) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" => value
            .parse::<i64>()
            .ok()
            .filter(|us| *us >= 0)
            .map(|us| us as f64 / 1_000_000.0),
        "out_time" => parse_timemark(value),
        _ => None,
    }
}

async fn stderr_tail<R: AsyncRead + Unpin>(stderr: R) -> String {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL);
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == STDERR_TAIL {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect::<Vec<_>>().join("\n")
}

/// Forwards progress until ffmpeg exits, then maps its exit status.
async fn supervise(
    mut child: Child,
    track: String,
    progress: Option<mpsc::UnboundedSender<f64>>,
) -> Result<()> {
    let stderr = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        match stderr {
            Some(stderr) => stderr_tail(stderr).await,
            None => String::new(),
        }
    });

    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let (Some(tx), Some(seconds)) = (&progress, parse_progress_line(&line)) {
                let _ = tx.send(seconds);
            }
        }
    }

    let status = child.wait().await?;
    let tail = stderr_task.await.unwrap_or_default();

    if status.success() {
        tracing::debug!(track = %track, "ffmpeg finished");
        Ok(())
    } else {
        Err(Error::encode(track, format!("ffmpeg exited with {status}: {tail}")))
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn spawn(
        &self,
        request: EncodeRequest,
        progress: Option<mpsc::UnboundedSender<f64>>,
    ) -> Result<EncodeHandle> {
        let label = request.label();
        let args = build_args(&request);
        tracing::debug!(track = %label, args = ?args, "Starting ffmpeg");

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::encode(&label, format!("failed to start {}: {e}", self.binary.display()))
            })?;

        let task = tokio::spawn(supervise(child, label.clone(), progress));
        Ok(EncodeHandle { label, task })
    }
}
