//! Activity lifecycle engine.
//!
//! Owns the single-running-activity invariant. Start never rejects: a
//! colliding start closes the previous activity and hands it back to the
//! caller. Pause/resume/stop on a missing precondition are silent no-ops;
//! callers that need to distinguish must query first.

use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::Result;
use crate::events::ChangeEvent;
use crate::model::{Activity, ActivitySource, PauseLog, PauseReason, SyncState};
use crate::store::{LocalStore, Notifier};

/// Result of a start call: the new running activity plus whatever was
/// closed to make room.
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub started: Activity,
    pub previous: Option<Activity>,
}

pub struct ActivityEngine {
    store: Rc<LocalStore>,
    clock: Rc<dyn Clock>,
    notifier: Rc<Notifier>,
    owner_id: String,
    device_id: String,
}

impl ActivityEngine {
    pub fn new(
        store: Rc<LocalStore>,
        clock: Rc<dyn Clock>,
        notifier: Rc<Notifier>,
        owner_id: String,
        device_id: String,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
            owner_id,
            device_id,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn current_running_activity(&self) -> Result<Option<Activity>> {
        Ok(self.store.running_activity()?)
    }

    pub fn open_activities(&self) -> Result<Vec<Activity>> {
        Ok(self.store.open_activities()?)
    }

    /// Most recently paused open activity, if any.
    pub fn current_paused_activity(&self) -> Result<Option<Activity>> {
        let mut paused: Vec<Activity> = self
            .store
            .open_activities()?
            .into_iter()
            .filter(|a| a.is_paused)
            .collect();
        paused.sort_by_key(|a| a.paused_at);
        Ok(paused.pop())
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a new activity. A currently running activity is closed and
    /// handed back as `previous` -- exactly one row is running afterwards.
    pub fn start(
        &self,
        name: &str,
        category: &str,
        source: ActivitySource,
    ) -> Result<StartOutcome> {
        self.start_linked(name, category, source, None)
    }

    /// Start an activity linked to a guided-flow log.
    pub fn start_linked(
        &self,
        name: &str,
        category: &str,
        source: ActivitySource,
        linked_flow_id: Option<String>,
    ) -> Result<StartOutcome> {
        let now = self.clock.now();
        let previous = match self.store.running_activity()? {
            Some(running) => Some(self.close(running, now)?),
            None => None,
        };

        let started = Activity {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            category: category.to_string(),
            start_time: now,
            end_time: None,
            is_running: true,
            is_paused: false,
            paused_at: None,
            paused_duration_secs: 0,
            source,
            linked_flow_id,
            memo: None,
            owner_id: self.owner_id.clone(),
            device_id: self.device_id.clone(),
            updated_at: now,
            sync_status: SyncState::Pending,
        };
        self.store.insert_activity(&started)?;
        debug!(activity = %started.id, name, "activity started");
        self.notifier.publish(ChangeEvent::ActivityStarted {
            activity_id: started.id.clone(),
            name: started.name.clone(),
            at: now,
        });
        Ok(StartOutcome { started, previous })
    }

    /// Pause the running activity. No-op when nothing is running or it is
    /// already paused.
    pub fn pause(
        &self,
        reason: PauseReason,
        custom_reason: Option<String>,
    ) -> Result<Option<Activity>> {
        let now = self.clock.now();
        let Some(mut activity) = self.store.running_activity()? else {
            return Ok(None);
        };
        if activity.is_paused {
            return Ok(None);
        }

        activity.is_running = false;
        activity.is_paused = true;
        activity.paused_at = Some(now);
        activity.updated_at = now;
        activity.sync_status = SyncState::Pending;
        self.store.update_activity(&activity)?;

        let log = PauseLog {
            id: Uuid::new_v4().to_string(),
            activity_id: activity.id.clone(),
            pause_time: now,
            resume_time: None,
            reason,
            custom_reason,
            owner_id: self.owner_id.clone(),
            device_id: self.device_id.clone(),
            updated_at: now,
            sync_status: SyncState::Pending,
        };
        self.store.insert_pause_log(&log)?;

        self.notifier.publish(ChangeEvent::ActivityPaused {
            activity_id: activity.id.clone(),
            at: now,
        });
        Ok(Some(activity))
    }

    /// Pause a specific activity, but only while it holds the running
    /// slot. No-op when something else is running -- a caller tracking a
    /// companion activity must not pause an unrelated one.
    pub fn pause_by_id(
        &self,
        activity_id: &str,
        reason: PauseReason,
        custom_reason: Option<String>,
    ) -> Result<Option<Activity>> {
        match self.store.running_activity()? {
            Some(running) if running.id == activity_id => self.pause(reason, custom_reason),
            _ => Ok(None),
        }
    }

    /// Resume the most recently paused activity.
    pub fn resume(&self) -> Result<Option<Activity>> {
        match self.current_paused_activity()? {
            Some(activity) => self.resume_by_id(&activity.id),
            None => Ok(None),
        }
    }

    /// Resume a specific paused activity. Accumulates the closed pause
    /// interval into `paused_duration_secs` and retakes the running slot,
    /// closing any other running activity first.
    pub fn resume_by_id(&self, activity_id: &str) -> Result<Option<Activity>> {
        let now = self.clock.now();
        let Some(mut activity) = self.store.get_activity(activity_id)? else {
            return Ok(None);
        };
        if !activity.is_paused || !activity.is_open() {
            return Ok(None);
        }

        // The slot may be occupied; the resumed activity takes precedence.
        if let Some(running) = self.store.running_activity()? {
            if running.id != activity.id {
                self.close(running, now)?;
            }
        }

        let paused_secs = activity
            .paused_at
            .map(|p| (now - p).num_seconds().max(0))
            .unwrap_or(0);
        activity.paused_duration_secs += paused_secs;
        activity.paused_at = None;
        activity.is_paused = false;
        activity.is_running = true;
        activity.updated_at = now;
        activity.sync_status = SyncState::Pending;
        self.store.update_activity(&activity)?;

        if let Some(mut log) = self.store.open_pause_log(&activity.id)? {
            log.resume_time = Some(now);
            log.updated_at = now;
            log.sync_status = SyncState::Pending;
            self.store.update_pause_log(&log)?;
        }

        self.notifier.publish(ChangeEvent::ActivityResumed {
            activity_id: activity.id.clone(),
            paused_secs,
            at: now,
        });
        Ok(Some(activity))
    }

    /// Stop the running activity. No-op when nothing is running.
    pub fn stop(&self) -> Result<Option<Activity>> {
        let now = self.clock.now();
        match self.store.running_activity()? {
            Some(running) => Ok(Some(self.close(running, now)?)),
            None => Ok(None),
        }
    }

    /// Close a specific open activity, flushing an open pause first.
    /// Used when an ad-hoc task or flow step releases its companion.
    pub fn close_by_id(&self, activity_id: &str) -> Result<Option<Activity>> {
        let now = self.clock.now();
        match self.store.get_activity(activity_id)? {
            Some(activity) if activity.is_open() => Ok(Some(self.close(activity, now)?)),
            _ => Ok(None),
        }
    }

    /// Attach a memo to an activity. No-op if the activity does not exist.
    pub fn attach_memo(&self, activity_id: &str, memo: &str) -> Result<Option<Activity>> {
        let now = self.clock.now();
        let Some(mut activity) = self.store.get_activity(activity_id)? else {
            return Ok(None);
        };
        activity.memo = Some(memo.to_string());
        activity.updated_at = now;
        activity.sync_status = SyncState::Pending;
        self.store.update_activity(&activity)?;
        Ok(Some(activity))
    }

    /// Record an already-finished span (awareness-prompt resolution).
    pub fn log_span(
        &self,
        name: &str,
        category: &str,
        source: ActivitySource,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Activity> {
        let now = self.clock.now();
        let activity = Activity {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            category: category.to_string(),
            start_time: start,
            end_time: Some(end.max(start)),
            is_running: false,
            is_paused: false,
            paused_at: None,
            paused_duration_secs: 0,
            source,
            linked_flow_id: None,
            memo: None,
            owner_id: self.owner_id.clone(),
            device_id: self.device_id.clone(),
            updated_at: now,
            sync_status: SyncState::Pending,
        };
        self.store.insert_activity(&activity)?;
        Ok(activity)
    }

    /// Force-close running activities whose start is older than the cutoff.
    ///
    /// The synthesized end time is `start_time + 1 hour` -- a fixed
    /// placeholder, never derived from real elapsed time, so a crashed
    /// session cannot produce an absurd duration. Run once at process start;
    /// a second run finds nothing running and changes nothing.
    pub fn sanitize_orphans(&self, max_age_hours: i64) -> Result<Vec<Activity>> {
        let now = self.clock.now();
        let cutoff = now - Duration::hours(max_age_hours);
        let mut closed = Vec::new();

        for mut activity in self.store.running_activities()? {
            if activity.start_time >= cutoff {
                continue;
            }
            let synthesized_end = activity.start_time + Duration::hours(1);
            activity.end_time = Some(synthesized_end);
            activity.is_running = false;
            activity.is_paused = false;
            activity.paused_at = None;
            activity.updated_at = now;
            activity.sync_status = SyncState::Pending;
            self.store.update_activity(&activity)?;
            debug!(activity = %activity.id, "orphaned activity closed");
            self.notifier.publish(ChangeEvent::OrphanClosed {
                activity_id: activity.id.clone(),
                synthesized_end,
            });
            closed.push(activity);
        }
        Ok(closed)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn close(&self, mut activity: Activity, now: DateTime<Utc>) -> Result<Activity> {
        if activity.is_paused {
            if let Some(paused_at) = activity.paused_at {
                activity.paused_duration_secs += (now - paused_at).num_seconds().max(0);
            }
            if let Some(mut log) = self.store.open_pause_log(&activity.id)? {
                log.resume_time = Some(now);
                log.updated_at = now;
                log.sync_status = SyncState::Pending;
                self.store.update_pause_log(&log)?;
            }
        }
        activity.end_time = Some(now);
        activity.is_running = false;
        activity.is_paused = false;
        activity.paused_at = None;
        activity.updated_at = now;
        activity.sync_status = SyncState::Pending;
        self.store.update_activity(&activity)?;
        self.notifier.publish(ChangeEvent::ActivityStopped {
            activity_id: activity.id.clone(),
            at: now,
        });
        Ok(activity)
    }
}
