//! HLS master manifests: rendering from a job's ready-set and per-request
//! quality filtering.

use super::jobs::StreamJob;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

pub const MASTER_PLAYLIST: &str = "master.m3u8";
pub const AUDIO_GROUP: &str = "stereo";

/// Target segment duration in seconds.
pub const SEGMENT_SECONDS: u32 = 6;

pub struct AudioMedia {
    pub language: String,
    pub name: String,
    pub default: bool,
    pub uri: String,
}

pub struct VariantStream {
    pub bandwidth: u64,
    pub width: u32,
    pub height: u32,
    pub uri: String,
}

pub struct MasterPlaylist {
    pub version: u8,
    pub audio: Vec<AudioMedia>,
    pub variants: Vec<VariantStream>,
}

impl MasterPlaylist {
    /// Master for the job's current ready-set, variants ascending by height.
    pub fn for_job(job: &StreamJob) -> Self {
        let audio = job
            .audio_tracks
            .iter()
            .enumerate()
            .map(|(i, track)| AudioMedia {
                language: track.language.clone(),
                name: track.name.clone(),
                default: i == 0,
                uri: track.playlist_name(),
            })
            .collect();

        let variants = job
            .ready_renditions()
            .map(|r| VariantStream {
                bandwidth: r.bandwidth(),
                width: job.variant_width(r),
                height: r.encoded_height(),
                uri: r.playlist_name(),
            })
            .collect();

        Self {
            version: 3,
            audio,
            variants,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::from("#EXTM3U\n");
        out.push_str(&format!("#EXT-X-VERSION:{}\n", self.version));

        for media in &self.audio {
            out.push_str(&format!(
                "#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"{}\",LANGUAGE=\"{}\",NAME=\"{}\",DEFAULT={},AUTOSELECT=YES,URI=\"{}\"\n",
                AUDIO_GROUP,
                quoted(&media.language),
                quoted(&media.name),
                if media.default { "YES" } else { "NO" },
                media.uri
            ));
        }

        for variant in &self.variants {
            out.push_str(&format!(
                "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{},AUDIO=\"{}\"\n",
                variant.bandwidth, variant.width, variant.height, AUDIO_GROUP
            ));
            out.push_str(&variant.uri);
            out.push('\n');
        }

        out
    }

    /// Replaces `<dir>/master.m3u8` in one step so readers never see a
    /// half-written manifest.
    pub async fn write_to(&self, dir: &Path) -> Result<(), std::io::Error> {
        let tmp = dir.join(format!(".{MASTER_PLAYLIST}.tmp"));
        let mut file = File::create(&tmp).await?;
        file.write_all(self.render().as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, dir.join(MASTER_PLAYLIST)).await
    }
}

// Quoted-string attributes cannot carry double quotes or line breaks.
fn quoted(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '"' => '\'',
            '\r' | '\n' => ' ',
            c => c,
        })
        .collect()
}

fn resolution_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"RESOLUTION=(\d+)x(\d+)").expect("valid regex"))
}

/// Drops every variant whose advertised height exceeds `max_height`.
///
/// Works on text only; the tag and the URI line after it go together, and
/// tags without a parseable resolution are kept.
pub fn filter_by_max_quality(manifest: &str, max_height: u32) -> String {
    let mut out = String::with_capacity(manifest.len());
    let mut skip_uri = false;

    for line in manifest.lines() {
        if skip_uri {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                // comments between tag and URI go with the tag
                continue;
            }
            skip_uri = false;
            continue;
        }

        if line.starts_with("#EXT-X-STREAM-INF") {
            let height = resolution_re()
                .captures(line)
                .and_then(|caps| caps.get(2))
                .and_then(|m| m.as_str().parse::<u32>().ok());
            if matches!(height, Some(h) if h > max_height) {
                skip_uri = true;
                continue;
            }
        }

        out.push_str(line);
        out.push('\n');
    }

    out
}

/// URI of the first variant listed in a master manifest.
pub fn first_variant_uri(manifest: &str) -> Option<&str> {
    let mut lines = manifest.lines().map(str::trim);
    while let Some(line) = lines.next() {
        if line.starts_with("#EXT-X-STREAM-INF") {
            return lines.find(|l| !l.is_empty() && !l.starts_with('#'));
        }
    }
    None
}
