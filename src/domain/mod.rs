//! Domain layer: pure types and rules, no process or network access.

pub mod av;
pub mod content;
pub mod hls;
pub mod jobs;
pub mod ladder;

pub use content::ContentId;
pub use ladder::Rendition;
