//! Wire-level record types shared by the local store and the sync
//! coordinator. Every synced entity travels as a [`SyncRecord`]: id, kind,
//! JSON payload and the `updated_at` used for last-write-wins resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Syncable entity kind. Windows, templates and unlogged blocks are
/// local-only and never appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Activity,
    AdHocTask,
    PauseLog,
    GuidedFlowLog,
    HaidMode,
}

impl RecordKind {
    pub fn all() -> [RecordKind; 5] {
        [
            RecordKind::Activity,
            RecordKind::AdHocTask,
            RecordKind::PauseLog,
            RecordKind::GuidedFlowLog,
            RecordKind::HaidMode,
        ]
    }

    /// Local table backing this kind.
    pub fn table(&self) -> &'static str {
        match self {
            RecordKind::Activity => "activities",
            RecordKind::AdHocTask => "tasks",
            RecordKind::PauseLog => "pause_logs",
            RecordKind::GuidedFlowLog => "flow_logs",
            RecordKind::HaidMode => "haid_mode",
        }
    }
}

/// A record ready for push/pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Matches the local entity id.
    pub id: String,
    pub kind: RecordKind,
    /// Full JSON serialization of the entity.
    pub data: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl SyncRecord {
    pub fn encode<T: Serialize>(
        kind: RecordKind,
        id: &str,
        updated_at: DateTime<Utc>,
        entity: &T,
    ) -> Result<Self, SyncError> {
        Ok(Self {
            id: id.to_string(),
            kind,
            data: serde_json::to_value(entity)?,
            updated_at,
        })
    }

    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, SyncError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

/// Current sync status surfaced to the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SyncOutcome {
    Idle,
    Syncing,
    Success { pushed: usize, pulled: usize },
    Offline { pending: usize },
    Error { message: String, pending: usize },
}
