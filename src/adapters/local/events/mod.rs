use crate::domain::ContentId;
use serde::{Deserialize, Serialize};

pub mod hub;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEventKind {
    /// The job lock was busy; the run will retry after a backoff.
    Deferred,
    Started,
    ManifestPublished,
    RenditionReady { height: u32 },
    Completed,
    Aborted { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub id: ContentId,
    #[serde(flatten)]
    pub kind: StreamEventKind,
}

impl StreamEvent {
    pub fn new(id: &ContentId, kind: StreamEventKind) -> Self {
        Self {
            id: id.clone(),
            kind,
        }
    }
}
