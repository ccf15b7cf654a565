//! Local adapters: ffmpeg/ffprobe subprocesses, the event hub and HTTP.

pub mod events;
pub mod ffmpeg;
pub mod ffprobe;
pub mod http;
pub mod subtitles;

pub use events::hub::EventHub;
pub use ffmpeg::FfmpegEncoder;
pub use ffprobe::FfprobeProber;
pub use subtitles::FfmpegSubtitleExtractor;
