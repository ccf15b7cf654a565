//! Global single-job lock backed by a create-exclusive file.

use crate::domain::ContentId;
use crate::error::Result;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone)]
pub struct JobLock {
    path: PathBuf,
}

/// Held while a job runs. Dropping it removes the lock file.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    released: bool,
}

impl JobLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when another job holds the lock.
    pub async fn try_acquire(&self, id: &ContentId) -> Result<Option<LockGuard>> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await;

        let mut file = match file {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let guard = LockGuard {
            path: self.path.clone(),
            released: false,
        };
        file.write_all(format!("{id}\n").as_bytes()).await?;
        file.flush().await?;
        Ok(Some(guard))
    }

    /// Raw contents of the lock artifact, if a job holds it.
    pub async fn status(&self) -> Option<String> {
        fs::read_to_string(&self.path).await.ok()
    }

    /// The content id currently holding the lock.
    pub async fn holder(&self) -> Option<ContentId> {
        let status = self.status().await?;
        let first = status.lines().next()?.trim();
        ContentId::parse(first).ok()
    }

    /// Removes a lock left behind by a previous process.
    pub async fn clear_stale(&self) -> Result<bool> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::warn!(path = %self.path.display(), "Removed stale job lock");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl LockGuard {
    /// Replaces the artifact contents; last writer wins.
    pub async fn write_status(&self, text: &str) -> Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        fs::write(&tmp, text).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
