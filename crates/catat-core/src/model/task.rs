//! Ad-hoc task records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SyncState;

/// Execution state of an ad-hoc task.
///
/// Valid transitions:
/// - pending → inProgress (start; requires a linked companion activity)
/// - inProgress → completed (complete/stop)
/// - inProgress → pending (cancel; clears the linked activity)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum TaskExecutionState {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskExecutionState {
    pub fn can_transition_to(&self, to: &TaskExecutionState) -> bool {
        match self {
            TaskExecutionState::Pending => matches!(to, TaskExecutionState::InProgress),
            TaskExecutionState::InProgress => matches!(
                to,
                TaskExecutionState::Completed | TaskExecutionState::Pending
            ),
            TaskExecutionState::Completed => false, // Terminal state
        }
    }
}

/// A queued one-off task. Starting it borrows the single running slot from
/// whatever activity was active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdHocTask {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub execution_state: TaskExecutionState,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Set while in progress; points at the companion activity.
    pub linked_activity_id: Option<String>,
    pub is_paused: bool,
    pub paused_at: Option<DateTime<Utc>>,
    pub paused_duration_secs: i64,
    /// Optional deadline that fires a reminder.
    pub alarm_time: Option<DateTime<Utc>>,
    /// Guarantees at-most-once reminder delivery per alarm_time.
    pub alarm_triggered: bool,
    pub sort_order: i64,
    pub owner_id: String,
    pub device_id: String,
    pub updated_at: DateTime<Utc>,
    pub sync_status: SyncState,
}
