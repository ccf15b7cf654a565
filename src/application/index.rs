//! Content id → source path index over the media root.

use crate::domain::ContentId;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "mov", "avi", "webm", "m4v", "ts", "wmv", "flv",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: ContentId,
    pub path: PathBuf,
}

pub struct MediaIndex {
    root: PathBuf,
    index_file: PathBuf,
    entries: RwLock<HashMap<ContentId, PathBuf>>,
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

fn scan(root: &Path) -> HashMap<ContentId, PathBuf> {
    let mut found = HashMap::new();
    for entry in walkdir::WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| {
            // hidden files and directories
            e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.')
        })
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_video(entry.path()) {
            continue;
        }
        let path = std::fs::canonicalize(entry.path()).unwrap_or_else(|_| entry.into_path());
        found.insert(ContentId::from_path(&path), path);
    }
    found
}

impl MediaIndex {
    pub fn new(root: impl Into<PathBuf>, index_file: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index_file: index_file.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Rebuilds the index from the media root and persists it.
    pub async fn rescan(&self) -> Result<usize> {
        if !fs::try_exists(&self.root).await? {
            tracing::warn!(root = %self.root.display(), "Media root does not exist");
        }

        let root = self.root.clone();
        let found = tokio::task::spawn_blocking(move || scan(&root))
            .await
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        let count = found.len();
        *self.entries.write() = found;

        self.persist().await?;
        tracing::info!(root = %self.root.display(), videos = count, "Media index rebuilt");
        Ok(count)
    }

    /// Adds one file outside of a scan.
    pub fn register(&self, path: &Path) -> ContentId {
        let id = ContentId::from_path(path);
        self.entries.write().insert(id.clone(), path.to_path_buf());
        id
    }

    pub fn get(&self, id: &ContentId) -> Option<PathBuf> {
        self.entries.read().get(id).cloned()
    }

    /// Every indexed file, ordered by path.
    pub fn entries(&self) -> Vec<IndexEntry> {
        let mut entries: Vec<IndexEntry> = self
            .entries
            .read()
            .iter()
            .map(|(id, path)| IndexEntry {
                id: id.clone(),
                path: path.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    async fn persist(&self) -> Result<()> {
        let snapshot: BTreeMap<ContentId, PathBuf> = self
            .entries
            .read()
            .iter()
            .map(|(id, path)| (id.clone(), path.clone()))
            .collect();
        let json = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = self.index_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut tmp = self.index_file.clone().into_os_string();
        tmp.push(".tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.index_file).await?;
        Ok(())
    }
}
