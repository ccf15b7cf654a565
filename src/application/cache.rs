//! On-disk stream directories: admission, eviction and crash recovery.

use crate::domain::ContentId;
use crate::error::Result;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Written last; a directory without it is incomplete.
pub const COMPLETION_MARKER: &str = "createdAt.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Output already finished.
    Complete,
    /// Directory exists but was never marked complete.
    InProgress,
    /// Fresh directory created; `evicted` lists what made room for it.
    Admitted { evicted: Vec<String> },
}

#[derive(Debug)]
struct Resident {
    name: String,
    completed_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct StreamCache {
    root: PathBuf,
    capacity: usize,
}

impl StreamCache {
    pub async fn open(root: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            capacity: capacity.max(1),
        })
    }

    pub fn stream_dir(&self, id: &ContentId) -> PathBuf {
        self.root.join(id.as_str())
    }

    pub async fn is_complete(&self, id: &ContentId) -> bool {
        fs::try_exists(self.stream_dir(id).join(COMPLETION_MARKER))
            .await
            .unwrap_or(false)
    }

    async fn completed_at(dir: &Path) -> Option<i64> {
        match fs::read_to_string(dir.join(COMPLETION_MARKER)).await {
            // an unreadable timestamp still counts as complete, just oldest
            Ok(text) => Some(text.trim().parse().unwrap_or(0)),
            Err(_) => None,
        }
    }

    async fn residents(&self) -> Result<Vec<Resident>> {
        let mut residents = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let completed_at = Self::completed_at(&entry.path()).await;
            residents.push(Resident { name, completed_at });
        }
        Ok(residents)
    }

    /// Deletes every directory lacking the completion marker.
    pub async fn reconcile(&self) -> Result<Vec<String>> {
        let mut deleted = Vec::new();
        for resident in self.residents().await? {
            if resident.completed_at.is_some() {
                continue;
            }
            let path = self.root.join(&resident.name);
            match fs::remove_dir_all(&path).await {
                Ok(()) => {
                    tracing::info!(dir = %resident.name, "Removed incomplete stream directory");
                    deleted.push(resident.name);
                }
                Err(e) => {
                    tracing::warn!(dir = %resident.name, error = %e, "Could not remove incomplete stream directory")
                }
            }
        }
        Ok(deleted)
    }

    /// Makes room for `id` and creates its directory.
    pub async fn admit(&self, id: &ContentId) -> Result<Admission> {
        let dir = self.stream_dir(id);
        if fs::try_exists(&dir).await? {
            return Ok(if Self::completed_at(&dir).await.is_some() {
                Admission::Complete
            } else {
                Admission::InProgress
            });
        }

        let mut residents: Vec<Resident> = self
            .residents()
            .await?
            .into_iter()
            .filter(|r| r.name != id.as_str())
            .collect();
        // oldest completion first, unmarked last
        residents.sort_by_key(|r| (r.completed_at.is_none(), r.completed_at));

        let mut evicted = Vec::new();
        let mut candidates = residents.into_iter();
        let mut remaining = candidates.len();
        while remaining >= self.capacity {
            let Some(victim) = candidates.next() else {
                break;
            };
            remaining -= 1;
            match fs::remove_dir_all(self.root.join(&victim.name)).await {
                Ok(()) => {
                    tracing::info!(dir = %victim.name, admitted = %id, "Evicted stream");
                    evicted.push(victim.name);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => evicted.push(victim.name),
                Err(e) => {
                    tracing::warn!(dir = %victim.name, error = %e, "Eviction failed")
                }
            }
        }

        fs::create_dir_all(&dir).await?;
        Ok(Admission::Admitted { evicted })
    }

    /// The only write that makes a directory cache-valid.
    pub async fn mark_complete(&self, id: &ContentId, timestamp_ms: i64) -> Result<()> {
        let dir = self.stream_dir(id);
        let tmp = dir.join(format!(".{COMPLETION_MARKER}.tmp"));
        fs::write(&tmp, timestamp_ms.to_string()).await?;
        fs::rename(&tmp, dir.join(COMPLETION_MARKER)).await?;
        Ok(())
    }

    pub async fn discard(&self, id: &ContentId) -> Result<()> {
        match fs::remove_dir_all(self.stream_dir(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
