//! Logical record shapes.
//!
//! Every synced entity carries `owner_id`, `device_id`, `updated_at` and
//! `sync_status`; windows, templates and unlogged blocks are local-only.

mod activity;
mod flow;
mod task;
mod unlogged;

pub use activity::{Activity, ActivityOutcome, ActivitySource, PauseLog, PauseReason};
pub use flow::{
    FlowOccurrenceState, FlowStep, FlowTemplate, GuidedFlowLog, HaidMode, SafetyWindow,
};
pub use task::{AdHocTask, TaskExecutionState};
pub use unlogged::UnloggedBlock;

use serde::{Deserialize, Serialize};

/// Per-record sync marker. Persisted as an integer (0=synced, 1=pending).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Synced,
    #[default]
    Pending,
    Conflict,
}

impl SyncState {
    pub fn to_i64(self) -> i64 {
        match self {
            SyncState::Synced => 0,
            SyncState::Pending => 1,
            SyncState::Conflict => 2,
        }
    }

    pub fn from_i64(v: i64) -> Self {
        match v {
            0 => SyncState::Synced,
            2 => SyncState::Conflict,
            _ => SyncState::Pending,
        }
    }
}
