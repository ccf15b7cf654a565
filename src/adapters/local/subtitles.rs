use crate::domain::av::SubtitleStream;
use crate::domain::ContentId;
use crate::error::Result;
use crate::ports::{MediaProber, SubtitleExtractor};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::process::Command;

/// Pulls the best English text subtitle out of a source with ffmpeg.
pub struct FfmpegSubtitleExtractor<P> {
    prober: P,
    ffmpeg: PathBuf,
    subtitles_dir: PathBuf,
}

impl<P: MediaProber> FfmpegSubtitleExtractor<P> {
    pub fn new(prober: P, ffmpeg: impl Into<PathBuf>, subtitles_dir: impl Into<PathBuf>) -> Self {
        Self {
            prober,
            ffmpeg: ffmpeg.into(),
            subtitles_dir: subtitles_dir.into(),
        }
    }

    pub fn target(&self, id: &ContentId) -> PathBuf {
        self.subtitles_dir.join(format!("{id}.srt"))
    }

    async fn copy_out(&self, source: &Path, stream: &SubtitleStream, out: &Path) -> bool {
        let codec = if stream.codec == "subrip" { "copy" } else { "srt" };
        let result = Command::new(&self.ffmpeg)
            .args(["-y", "-nostdin", "-loglevel", "error", "-i"])
            .arg(source)
            .arg("-map")
            .arg(format!("0:{}", stream.index))
            .args(["-c:s", codec])
            .arg(out)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        match result {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                tracing::warn!(
                    stream = stream.index,
                    status = %output.status,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "Subtitle copy failed"
                );
                false
            }
            Err(e) => {
                tracing::warn!(stream = stream.index, error = %e, "Could not run ffmpeg for subtitles");
                false
            }
        }
    }
}

#[async_trait]
impl<P: MediaProber> SubtitleExtractor for FfmpegSubtitleExtractor<P> {
    async fn extract(&self, id: &ContentId, source: &Path) -> Result<Option<PathBuf>> {
        let target = self.target(id);
        if fs::try_exists(&target).await? {
            return Ok(Some(target));
        }

        let info = self.prober.probe(source).await?;
        let candidates: Vec<&SubtitleStream> = info
            .subtitles
            .iter()
            .filter(|s| s.is_english() && s.is_text())
            .collect();
        if candidates.is_empty() {
            tracing::debug!(id = %id, "No English text subtitles");
            return Ok(None);
        }

        let scratch = tempfile::Builder::new().prefix("reelcast-subs").tempdir()?;
        let mut best: Option<(u64, PathBuf)> = None;
        for stream in candidates {
            let out = scratch.path().join(format!("sub_{}.srt", stream.index));
            if !self.copy_out(source, stream, &out).await {
                continue;
            }
            let size = fs::metadata(&out).await?.len();
            if best.as_ref().map_or(true, |(largest, _)| size > *largest) {
                best = Some((size, out));
            }
        }

        let Some((_, chosen)) = best else {
            return Ok(None);
        };

        let raw = fs::read(&chosen).await?;
        let text = normalize_srt(&String::from_utf8_lossy(&raw));

        fs::create_dir_all(&self.subtitles_dir).await?;
        let tmp = self.subtitles_dir.join(format!(".{id}.srt.tmp"));
        fs::write(&tmp, text).await?;
        fs::rename(&tmp, &target).await?;

        tracing::info!(id = %id, path = %target.display(), "Subtitles extracted");
        Ok(Some(target))
    }
}

fn is_cue_index(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && line.chars().all(|c| c.is_ascii_digit())
}

/// LF line endings, one blank line before each cue index and none elsewhere.
pub fn normalize_srt(text: &str) -> String {
    let text = text.trim_start_matches('\u{feff}');
    let lines: Vec<&str> = text.lines().collect();
    let mut out = String::with_capacity(text.len());

    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            let before_cue = lines.get(i + 1).is_some_and(|next| is_cue_index(next));
            if before_cue && !out.is_empty() {
                out.push('\n');
            }
            continue;
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}
