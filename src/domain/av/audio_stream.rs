use super::stream::{tag, FromStream};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioStream {
    pub index: usize,
    pub codec: String,
    pub language: Option<String>,
    pub title: Option<String>,
}

impl FromStream for AudioStream {
    fn from_stream(stream_data: &Value) -> Option<Box<AudioStream>> {
        match stream_data.get("codec_type").and_then(|v| v.as_str()) {
            Some("audio") => Some(Box::new(AudioStream {
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

#[cfg(test)]
mod tests {
    use super::AudioStream;
    use super::FromStream;
    use serde_json::json;

    #[test]
    fn test_from_stream_valid_audio() {
        let stream_data = json!({
            "index": 1,
            "codec_type": "audio",
            "codec_name": "aac",
            "tags": {"language": "eng", "title": "Director's commentary"}
        });
        let stream = AudioStream::from_stream(&stream_data).unwrap();
        assert_eq!(stream.index, 1);
        assert_eq!(stream.codec, "aac");
        assert_eq!(stream.language.as_deref(), Some("eng"));
        assert_eq!(stream.title.as_deref(), Some("Director's commentary"));
    }

    #[test]
    fn test_from_stream_without_tags() {
        let stream_data = json!({"index": 2, "codec_type": "audio", "codec_name": "opus"});
        let stream = AudioStream::from_stream(&stream_data).unwrap();
        assert_eq!(stream.language, None);
        assert_eq!(stream.title, None);
    }

    #[test]
    fn test_from_stream_blank_tags_are_ignored() {
        let stream_data = json!({
            "index": 2,
            "codec_type": "audio",
            "codec_name": "opus",
            "tags": {"language": "  ", "title": ""}
        });
        let stream = AudioStream::from_stream(&stream_data).unwrap();
        assert_eq!(stream.language, None);
        assert_eq!(stream.title, None);
    }

    #[test]
    fn test_from_stream_non_audio_codec_type() {
        let stream_data = json!({
            "index": 0,
            "codec_type": "video",
            "codec_name": "h264",
            "width": 640,
            "height": 360
        });
        assert!(AudioStream::from_stream(&stream_data).is_none());
    }
}
