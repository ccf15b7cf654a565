//! Source stream metadata as reported by ffprobe.

pub mod audio_stream;
pub mod stream;
pub mod subtitle_stream;
pub mod video_stream;

pub use audio_stream::AudioStream;
pub use stream::{FromStream, MediaInfo};
pub use subtitle_stream::SubtitleStream;
pub use video_stream::VideoStream;
