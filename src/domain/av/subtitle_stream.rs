use super::stream::{tag, FromStream};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleStream {
    pub index: usize,
    pub codec: String,
    pub language: Option<String>,
    pub title: Option<String>,
}

impl SubtitleStream {
    /// Whether the language tag or the title mark this track as English.
    pub fn is_english(&self) -> bool {
        let mentions_english = |s: &str| {
            s.to_ascii_lowercase()
                .split(|c: char| !c.is_ascii_alphabetic())
                .any(|word| matches!(word, "en" | "eng" | "english"))
        };
        self.language.as_deref().is_some_and(mentions_english)
            || self.title.as_deref().is_some_and(mentions_english)
    }

    /// Text-based subtitle codecs that can be copied straight into SRT.
    pub fn is_text(&self) -> bool {
        matches!(
            self.codec.as_str(),
            "subrip" | "srt" | "ass" | "ssa" | "mov_text" | "webvtt" | "text"
        )
    }
}

impl FromStream for SubtitleStream {
    fn from_stream(stream_data: &Value) -> Option<Box<SubtitleStream>> {
        match stream_data.get("codec_type").and_then(|v| v.as_str()) {
            Some("subtitle") => Some(Box::new(SubtitleStream {
                index: stream_data.get("index")?.as_u64()? as usize,
                codec: stream_data
                    .get("codec_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                language: tag(stream_data, "language"),
                title: tag(stream_data, "title"),
            })),
            _ => None,
        }
    }
}
