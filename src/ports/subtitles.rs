use crate::domain::ContentId;
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubtitleExtractor: Send + Sync {
    /// Writes the best English subtitle of `source` for `id`.
    ///
    /// Returns the stored file, or `None` when the source has nothing usable.
    async fn extract(&self, id: &ContentId, source: &Path) -> Result<Option<PathBuf>>;
}
