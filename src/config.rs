//! Configuration from environment variables (and `.env`).

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct StreamerConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: u16,
    /// Directory scanned for source videos
    pub media_root: PathBuf,
    /// Stream cache root, one directory per content id
    pub streams_dir: PathBuf,
    pub subtitles_dir: PathBuf,
    /// Persisted content id → path index
    pub index_file: PathBuf,
    /// Global job lock artifact
    pub lock_file: PathBuf,
    /// Maximum number of resident stream directories
    pub cache_capacity: usize,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub ready_timeout: Duration,
    pub ready_poll: Duration,
    pub lock_retry: Duration,
    pub progress_interval: Duration,
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, value = %raw, error = %e, "Invalid setting, using default");
                default
            }
        },
        None => default,
    }
}

impl StreamerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = |key: &str, default: &str| {
            PathBuf::from(lookup(key).unwrap_or_else(|| default.to_string()))
        };

        Self {
            addr: lookup("ADDR").unwrap_or_else(|| String::from("127.0.0.1")),
            port: parsed(&lookup, "PORT", 12906),
            media_root: path("MEDIA_ROOT", "./videos"),
            streams_dir: path("STREAMS_DIR", "./streams"),
            subtitles_dir: path("SUBTITLES_DIR", "./subtitles"),
            index_file: path("INDEX_FILE", "./videos_index.json"),
            lock_file: path("LOCK_FILE", "./transcode.lock"),
            cache_capacity: parsed::<usize>(&lookup, "CACHE_CAPACITY", 5).max(1),
            ffmpeg_path: path("FFMPEG_PATH", "ffmpeg"),
            ffprobe_path: path("FFPROBE_PATH", "ffprobe"),
            ready_timeout: Duration::from_secs(parsed(&lookup, "READY_TIMEOUT_SECS", 120)),
            ready_poll: Duration::from_millis(parsed(&lookup, "READY_POLL_MS", 1000)),
            lock_retry: Duration::from_secs(parsed(&lookup, "LOCK_RETRY_SECS", 5)),
            progress_interval: Duration::from_millis(parsed(&lookup, "PROGRESS_INTERVAL_MS", 2000)),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}
