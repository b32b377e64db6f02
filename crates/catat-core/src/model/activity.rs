//! Activity and pause records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::SyncState;

/// How an activity came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ActivitySource {
    #[default]
    Manual,
    GuidedFlow,
    AutoLogged,
}

/// Why an activity was paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PauseReason {
    Rest,
    Errand,
    /// An ad-hoc task borrowed the running slot. `custom_reason` on the
    /// pause log embeds the task title.
    AdHocInterruption,
    Other,
}

/// Activity lifecycle as consumed by the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivityOutcome {
    NotRunning,
    Running,
    Paused,
}

/// A tracked, named time span.
///
/// At most one activity across all of the owner's devices has
/// `is_running = true` at any instant. `is_running` means "actively
/// ticking": pausing clears it, resuming restores it, and an activity is
/// open until `end_time` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub name: String,
    pub category: String,
    pub start_time: DateTime<Utc>,
    /// Absent while the activity is open.
    pub end_time: Option<DateTime<Utc>>,
    pub is_running: bool,
    pub is_paused: bool,
    /// Absent unless currently paused.
    pub paused_at: Option<DateTime<Utc>>,
    /// Cumulative seconds spent paused over the activity's lifetime.
    pub paused_duration_secs: i64,
    pub source: ActivitySource,
    pub linked_flow_id: Option<String>,
    pub memo: Option<String>,
    pub owner_id: String,
    pub device_id: String,
    pub updated_at: DateTime<Utc>,
    pub sync_status: SyncState,
}

impl Activity {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn outcome(&self) -> ActivityOutcome {
        if self.is_paused && self.is_open() {
            ActivityOutcome::Paused
        } else if self.is_running {
            ActivityOutcome::Running
        } else {
            ActivityOutcome::NotRunning
        }
    }

    /// Live elapsed duration, clamped to zero against clock skew.
    ///
    /// `(now - start) - paused_duration - (time since paused_at if paused)`;
    /// for a closed activity, `end_time` replaces `now`.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        let reference = self.end_time.unwrap_or(now);
        let mut elapsed = reference - self.start_time - Duration::seconds(self.paused_duration_secs);
        if self.is_paused {
            if let Some(paused_at) = self.paused_at {
                elapsed = elapsed - (reference - paused_at);
            }
        }
        elapsed.max(Duration::zero())
    }
}

/// One pause interval on an activity. Immutable once `resume_time` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseLog {
    pub id: String,
    pub activity_id: String,
    pub pause_time: DateTime<Utc>,
    /// Absent while the pause is open.
    pub resume_time: Option<DateTime<Utc>>,
    pub reason: PauseReason,
    pub custom_reason: Option<String>,
    pub owner_id: String,
    pub device_id: String,
    pub updated_at: DateTime<Utc>,
    pub sync_status: SyncState,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(now: DateTime<Utc>) -> Activity {
        Activity {
            id: "a1".into(),
            name: "Writing".into(),
            category: "Work".into(),
            start_time: now,
            end_time: None,
            is_running: true,
            is_paused: false,
            paused_at: None,
            paused_duration_secs: 0,
            source: ActivitySource::Manual,
            linked_flow_id: None,
            memo: None,
            owner_id: "o".into(),
            device_id: "d".into(),
            updated_at: now,
            sync_status: SyncState::Pending,
        }
    }

    #[test]
    fn elapsed_subtracts_paused_seconds() {
        let start: DateTime<Utc> = "2025-03-01T09:00:00Z".parse().unwrap();
        let mut a = base(start);
        a.paused_duration_secs = 300;

        let now = start + Duration::minutes(30);
        assert_eq!(a.elapsed(now), Duration::minutes(25));
    }

    #[test]
    fn elapsed_subtracts_open_pause() {
        let start: DateTime<Utc> = "2025-03-01T09:00:00Z".parse().unwrap();
        let mut a = base(start);
        a.is_running = false;
        a.is_paused = true;
        a.paused_at = Some(start + Duration::minutes(10));

        let now = start + Duration::minutes(30);
        assert_eq!(a.elapsed(now), Duration::minutes(10));
    }

    #[test]
    fn elapsed_clamps_to_zero() {
        let start: DateTime<Utc> = "2025-03-01T09:00:00Z".parse().unwrap();
        let mut a = base(start);
        a.paused_duration_secs = 7200; // bad data: more pause than lifetime

        let now = start + Duration::minutes(30);
        assert_eq!(a.elapsed(now), Duration::zero());
    }

    #[test]
    fn closed_activity_uses_end_time() {
        let start: DateTime<Utc> = "2025-03-01T09:00:00Z".parse().unwrap();
        let mut a = base(start);
        a.end_time = Some(start + Duration::hours(1));
        a.is_running = false;
        a.paused_duration_secs = 600;

        // `now` long after close is irrelevant.
        let now = start + Duration::days(2);
        assert_eq!(a.elapsed(now), Duration::minutes(50));
        assert_eq!(a.outcome(), ActivityOutcome::NotRunning);
    }
}
