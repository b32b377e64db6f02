use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed vocabulary of sync triggers.
///
/// Every mutating operation in the engines ends by emitting exactly one of
/// these; the sync coordinator reacts to them. There is no background poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncTrigger {
    ActivityStarted,
    ActivityDone,
    AdHocCreated,
    AdHocCompleted,
    MemoAdded,
    Paused,
    Resumed,
    AppOpened,
    ManualSync,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::ActivityStarted => "activityStarted",
            SyncTrigger::ActivityDone => "activityDone",
            SyncTrigger::AdHocCreated => "adHocCreated",
            SyncTrigger::AdHocCompleted => "adHocCompleted",
            SyncTrigger::MemoAdded => "memoAdded",
            SyncTrigger::Paused => "paused",
            SyncTrigger::Resumed => "resumed",
            SyncTrigger::AppOpened => "appOpened",
            SyncTrigger::ManualSync => "manualSync",
        }
    }
}

/// Change notifications published to subscribers.
///
/// The UI (out of scope here) polls the engines for state and subscribes to
/// this channel for push-style correction events, most importantly the
/// cross-device running-activity correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChangeEvent {
    ActivityStarted {
        activity_id: String,
        name: String,
        at: DateTime<Utc>,
    },
    ActivityPaused {
        activity_id: String,
        at: DateTime<Utc>,
    },
    ActivityResumed {
        activity_id: String,
        paused_secs: i64,
        at: DateTime<Utc>,
    },
    ActivityStopped {
        activity_id: String,
        at: DateTime<Utc>,
    },
    /// A stale running activity was force-closed at startup.
    OrphanClosed {
        activity_id: String,
        synthesized_end: DateTime<Utc>,
    },
    /// Local running state was corrected to match the remote store.
    RunningActivityCorrected {
        local_was: Option<String>,
        remote_is: Option<String>,
        at: DateTime<Utc>,
    },
    TaskStarted {
        task_id: String,
        interrupted_activity_id: Option<String>,
        at: DateTime<Utc>,
    },
    TaskCompleted {
        task_id: String,
        resumable_activity_id: Option<String>,
        at: DateTime<Utc>,
    },
    FlowOffered {
        window_id: String,
        flow_id: String,
        at: DateTime<Utc>,
    },
    FlowAlarm {
        window_id: String,
        at: DateTime<Utc>,
    },
    FlowLogged {
        flow_id: String,
        outcome: String,
        at: DateTime<Utc>,
    },
    SyncFinished {
        pushed: usize,
        pulled: usize,
        at: DateTime<Utc>,
    },
}
