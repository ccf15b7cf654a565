use crate::domain::av::MediaInfo;
use crate::error::{Error, Result};
use crate::ports::MediaProber;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// [`MediaProber`] backed by the `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    binary: PathBuf,
}

impl FfprobeProber {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, path: &Path) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("-v")
            .arg("error")
            .arg("-show_format")
            .arg("-show_streams")
            .arg("-print_format")
            .arg("json")
            .arg(path)
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        if !path.is_file() {
            return Err(Error::Probe(format!("{} is not a file", path.display())));
        }

        let output = self.command(path).output().await.map_err(|e| {
            Error::Probe(format!("failed to run {}: {e}", self.binary.display()))
        })?;

        if !output.status.success() {
            return Err(Error::Probe(format!(
                "ffprobe exited with {} for {}: {}",
                output.status,
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let json: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::Probe(format!("unreadable ffprobe output: {e}")))?;
        let info = MediaInfo::from_ffprobe(&json)?;

        tracing::debug!(
            path = %path.display(),
            video = ?info.video.as_ref().map(|v| (v.width, v.height)),
            audio = info.audio.len(),
            subtitles = info.subtitles.len(),
            duration = ?info.duration,
            "Probed source"
        );
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_command_line() {
        let prober = FfprobeProber::new("/opt/ffprobe");
        let command = prober.command(Path::new("/media/a.mkv"));
        let std = command.as_std();
        assert_eq!(std.get_program(), "/opt/ffprobe");
        let args: Vec<_> = std.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-v",
                "error",
                "-show_format",
                "-show_streams",
                "-print_format",
                "json",
                "/media/a.mkv"
            ]
        );
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let dir = tempdir().unwrap();
        let prober = FfprobeProber::new("ffprobe");
        let err = prober.probe(&dir.path().join("nope.mkv")).await.unwrap_err();
        assert!(matches!(err, Error::Probe(_)));
    }

    #[tokio::test]
    async fn test_probe_missing_binary() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.mkv");
        std::fs::write(&source, b"not really a video").unwrap();

        let prober = FfprobeProber::new(dir.path().join("no-such-ffprobe"));
        let err = prober.probe(&source).await.unwrap_err();
        assert!(matches!(err, Error::Probe(_)));
    }
}
