use super::stream::FromStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoStream {
    /// Stream index inside the source container.
    pub index: usize,
    pub codec: String,
    pub width: u32,
    pub height: u32,
}

impl VideoStream {
    /// Output width for a given output height, keeping the source aspect
    /// and rounding to an even number like `scale=-2:h` does.
    pub fn scaled_width(&self, height: u32) -> u32 {
        if self.height == 0 || self.width == 0 {
            return height * 16 / 9 / 2 * 2;
        }
        let exact = f64::from(self.width) * f64::from(height) / f64::from(self.height);
        ((exact / 2.0).round() as u32 * 2).max(2)
    }
}

impl FromStream for VideoStream {
    fn from_stream(stream_data: &Value) -> Option<Box<Self>> {
        match stream_data.get("codec_type").and_then(|v| v.as_str()) {
            Some("video") => {
                // cover art shows up as a video stream
                let attached_pic = stream_data
                    .get("disposition")
                    .and_then(|d| d.get("attached_pic"))
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                if attached_pic == 1 {
                    return None;
                }

                Some(Box::new(VideoStream {
                    index: stream_data.get("index")?.as_u64()? as usize,
                    codec: stream_data
                        .get("codec_name")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown")
                        .to_string(),
                    width: stream_data.get("width")?.as_u64()? as u32,
                    height: stream_data.get("height")?.as_u64()? as u32,
                }))
            }
            _ => None,
        }
    }
}
