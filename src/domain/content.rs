use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Stable identifier of a source file, derived from its absolute path.
///
/// Doubles as the directory name under the stream cache root, so anything
/// coming from outside goes through [`ContentId::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn from_path(path: &Path) -> Self {
        let uuid = Uuid::new_v5(&Uuid::NAMESPACE_URL, path.to_string_lossy().as_bytes());
        Self(uuid.simple().to_string())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= 128
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::Validation(format!("invalid content id: {raw:?}")));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_from_path_is_deterministic() {
        let path = PathBuf::from("/media/films/night.mkv");
        assert_eq!(ContentId::from_path(&path), ContentId::from_path(&path));
        assert_eq!(ContentId::from_path(&path).as_str().len(), 32);
    }

    #[test]
    fn test_from_path_differs_per_file() {
        let a = ContentId::from_path(&PathBuf::from("/media/a.mp4"));
        let b = ContentId::from_path(&PathBuf::from("/media/b.mp4"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_accepts_generated_ids() {
        let id = ContentId::from_path(&PathBuf::from("/media/a.mp4"));
        assert_eq!(ContentId::parse(id.as_str()).unwrap(), id);
    }

    #[test]
    fn test_parse_rejects_traversal() {
        assert!(ContentId::parse("../etc").is_err());
        assert!(ContentId::parse("a/b").is_err());
        assert!(ContentId::parse("").is_err());
    }
}
