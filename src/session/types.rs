use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::gateway::{DenialReason, ObjectKey};

use super::preview::PreviewHandle;

/// Client-local task identifier, assigned at selection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle phase of the upload slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum UploadPhase {
    /// No file selected.
    #[default]
    Empty,
    /// Credential request or byte transfer in progress.
    Uploading,
    /// Bytes stored; the key is set.
    Uploaded,
    /// Removal requested, gateway delete in flight.
    Deleting,
    /// A step failed; only re-selection recovers.
    Errored,
}

/// Exclusively owned local bytes plus their content type, held until the
/// upload completes.
#[derive(Debug, Clone)]
pub struct SourceHandle {
    bytes: Bytes,
    content_type: String,
}

impl SourceHandle {
    pub fn new(bytes: Bytes, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A file offered to the slot, before validation.
#[derive(Debug, Clone)]
pub struct FileCandidate {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl FileCandidate {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Bytes,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Why a selection was refused. Rejections never mutate the slot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("file size {size} exceeds the {limit}-byte limit")]
    SizeExceeded { size: u64, limit: u64 },

    #[error("too many files selected ({count}), max is 1")]
    TooManyFiles { count: usize },

    #[error("unsupported content type: {content_type}")]
    UnsupportedType { content_type: String },

    #[error("a transfer is already in flight for this slot")]
    TransferInFlight,
}

/// The single upload slot.
#[derive(Debug, Default)]
pub struct UploadTask {
    pub id: Option<TaskId>,
    pub phase: UploadPhase,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub size: u64,
    pub progress_percent: u8,
    pub key: Option<ObjectKey>,
    pub source: Option<SourceHandle>,
    pub preview: Option<PreviewHandle>,
    pub error: Option<String>,
    pub selected_at: Option<DateTime<Utc>>,
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl UploadTask {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read-only view for presentation. Carries the preview locator, not the
    /// handle, so snapshots can never release a local preview.
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            phase: self.phase,
            file_name: self.file_name.clone(),
            content_type: self.content_type.clone(),
            size: self.size,
            progress_percent: self.progress_percent,
            key: self.key.clone(),
            preview_uri: self.preview.as_ref().map(|p| p.uri().to_string()),
            has_source: self.source.is_some(),
            error: self.error.clone(),
            selected_at: self.selected_at,
            uploaded_at: self.uploaded_at,
        }
    }
}

/// Snapshot of the slot, consumed by the presentation layer.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub id: Option<TaskId>,
    pub phase: UploadPhase,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub size: u64,
    pub progress_percent: u8,
    pub key: Option<ObjectKey>,
    pub preview_uri: Option<String>,
    pub has_source: bool,
    pub error: Option<String>,
    pub selected_at: Option<DateTime<Utc>>,
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// Session events, broadcast to subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Phase transition on the slot.
    PhaseChanged {
        old_phase: UploadPhase,
        new_phase: UploadPhase,
    },

    /// Progress tick while uploading.
    Progress { percent: u8 },

    /// A selection was refused.
    Rejected { reason: Rejection },

    /// Upload finished; the object is stored under `key`.
    Uploaded { key: ObjectKey },

    /// The stored object was deleted and the slot reset.
    Removed { key: ObjectKey },

    /// A credential request, transfer, or delete failed.
    Failed {
        error: String,
        denial: Option<DenialReason>,
    },
}
