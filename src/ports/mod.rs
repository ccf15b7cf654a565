//! Ports: the process boundaries the application layer talks through.

pub mod encoder;
pub mod prober;
pub mod subtitles;

pub use encoder::{EncodeHandle, EncodeRequest, Encoder, TrackKind};
pub use prober::MediaProber;
pub use subtitles::SubtitleExtractor;
