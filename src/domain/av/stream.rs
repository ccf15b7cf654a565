use super::audio_stream::AudioStream;
use super::subtitle_stream::SubtitleStream;
use super::video_stream::VideoStream;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub trait FromStream {
    fn from_stream(stream_data: &Value) -> Option<Box<Self>>
    where
        Self: Sized;
}

/// What the prober learned about a source file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// First video stream, if any.
    pub video: Option<VideoStream>,
    pub audio: Vec<AudioStream>,
    pub subtitles: Vec<SubtitleStream>,
    /// Container duration in seconds.
    pub duration: Option<f64>,
}

impl MediaInfo {
    /// Builds from `ffprobe -show_format -show_streams -print_format json` output.
    pub fn from_ffprobe(v: &Value) -> Result<Self> {
        let streams = v
            .get("streams")
            .and_then(|streams| streams.as_array())
            .ok_or_else(|| Error::Probe("ffprobe output has no streams".into()))?;

        // ffprobe prints durations as strings
        let duration = v
            .get("format")
            .and_then(|format| format.get("duration"))
            .and_then(|duration| match duration {
                Value::String(s) => s.parse::<f64>().ok(),
                other => other.as_f64(),
            })
            .filter(|d| d.is_finite() && *d > 0.0);

        Ok(MediaInfo {
            video: streams
                .iter()
                .filter_map(VideoStream::from_stream)
                .map(|stream| *stream)
                .next(),
            audio: streams
                .iter()
                .filter_map(AudioStream::from_stream)
                .map(|stream| *stream)
                .collect(),
            subtitles: streams
                .iter()
                .filter_map(SubtitleStream::from_stream)
                .map(|stream| *stream)
                .collect(),
            duration,
        })
    }
}

/// Reads `tags.<key>` from a stream entry, ignoring blanks.
pub(crate) fn tag(stream_data: &Value, key: &str) -> Option<String> {
    stream_data
        .get("tags")
        .and_then(|tags| tags.get(key))
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "streams": [
                {"index": 0, "codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080},
                {"index": 1, "codec_type": "audio", "codec_name": "aac", "tags": {"language": "eng", "title": "Stereo"}},
                {"index": 2, "codec_type": "audio", "codec_name": "ac3", "tags": {"language": "fre"}},
                {"index": 3, "codec_type": "subtitle", "codec_name": "subrip", "tags": {"language": "eng"}},
                {"index": 4, "codec_type": "attachment", "codec_name": "ttf"}
            ],
            "format": {"duration": "5400.250000"}
        })
    }

    #[test]
    fn test_from_ffprobe_collects_streams() {
        let info = MediaInfo::from_ffprobe(&sample()).unwrap();
        let video = info.video.unwrap();
        assert_eq!(video.index, 0);
        assert_eq!(video.height, 1080);
        assert_eq!(info.audio.len(), 2);
        assert_eq!(info.audio[1].index, 2);
        assert_eq!(info.subtitles.len(), 1);
        assert_eq!(info.duration, Some(5400.25));
    }

    #[test]
    fn test_from_ffprobe_without_video() {
        let info = MediaInfo::from_ffprobe(&json!({
            "streams": [{"index": 0, "codec_type": "audio", "codec_name": "mp3"}],
            "format": {}
        }))
        .unwrap();
        assert!(info.video.is_none());
        assert_eq!(info.duration, None);
    }

    #[test]
    fn test_from_ffprobe_rejects_garbage() {
        assert!(MediaInfo::from_ffprobe(&json!({"error": "nope"})).is_err());
    }
}
