//! Flow windows, templates and per-day occurrence logs.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::SyncState;

/// A daily recurring clock interval bound to one flow template. Local-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyWindow {
    pub id: String,
    pub start_hour: u32,
    pub start_minute: u32,
    pub end_hour: u32,
    pub end_minute: u32,
    pub linked_flow_id: String,
}

impl SafetyWindow {
    /// Concrete [start, end) bounds for the window on a given day.
    pub fn bounds_on(&self, day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = NaiveTime::from_hms_opt(self.start_hour, self.start_minute, 0)
            .unwrap_or(NaiveTime::MIN);
        let end =
            NaiveTime::from_hms_opt(self.end_hour, self.end_minute, 0).unwrap_or(NaiveTime::MIN);
        (
            day.and_time(start).and_utc(),
            day.and_time(end).and_utc(),
        )
    }

    /// Whether `now` falls inside today's occurrence of this window.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let (start, end) = self.bounds_on(now.date_naive());
        now >= start && now < end
    }

    pub fn duration(&self) -> Duration {
        let (start, end) = self.bounds_on(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
        end - start
    }
}

/// One IF-condition/THEN-action step of a guided flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowStep {
    pub condition: String,
    pub action: String,
    /// Activity name started when this step executes.
    pub activity_name: String,
}

/// An ordered step sequence bound to a safety window. Local-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowTemplate {
    pub id: String,
    pub name: String,
    pub category: String,
    pub steps: Vec<FlowStep>,
}

/// Outcome state of one (template, day) occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlowOccurrenceState {
    NotStarted,
    InProgress,
    Completed,
    Missed,
    SkippedHaid,
}

impl FlowOccurrenceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowOccurrenceState::NotStarted => "notStarted",
            FlowOccurrenceState::InProgress => "inProgress",
            FlowOccurrenceState::Completed => "completed",
            FlowOccurrenceState::Missed => "missed",
            FlowOccurrenceState::SkippedHaid => "skippedHaid",
        }
    }
}

/// One record per window occurrence per day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuidedFlowLog {
    pub id: String,
    pub flow_id: String,
    pub day: NaiveDate,
    /// Stamped by the ON-IT press; absent for missed/skipped occurrences.
    pub triggered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub steps_completed: u32,
    pub total_steps: u32,
    pub was_abandoned: bool,
    pub was_missed: bool,
    pub was_skipped_haid: bool,
    pub owner_id: String,
    pub device_id: String,
    pub updated_at: DateTime<Utc>,
    pub sync_status: SyncState,
}

impl GuidedFlowLog {
    pub fn state(&self) -> FlowOccurrenceState {
        if self.was_skipped_haid {
            FlowOccurrenceState::SkippedHaid
        } else if self.was_missed {
            FlowOccurrenceState::Missed
        } else if self.completed_at.is_some() {
            FlowOccurrenceState::Completed
        } else if self.triggered_at.is_some() {
            FlowOccurrenceState::InProgress
        } else {
            FlowOccurrenceState::NotStarted
        }
    }
}

/// Process-wide menstrual-cycle skip toggle. Synced (one record per owner).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaidMode {
    pub id: String,
    pub is_active: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub last_prompt_date: Option<DateTime<Utc>>,
    pub owner_id: String,
    pub device_id: String,
    pub updated_at: DateTime<Utc>,
    pub sync_status: SyncState,
}

impl HaidMode {
    /// Stable singleton id per owner.
    pub const RECORD_ID: &'static str = "haid-mode";
}
