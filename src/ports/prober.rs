use crate::domain::av::MediaInfo;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProber: Send + Sync {
    /// Inspect a source file and report its streams.
    async fn probe(&self, path: &Path) -> Result<MediaInfo>;
}
