//! Enforced-flow scheduling.
//!
//! Safety windows are evaluated lazily: nothing happens at the instant a
//! window opens or closes. `evaluate` is called on app foreground and on
//! every poll tick, and writes whatever occurrence outcomes the elapsed
//! time implies (offer, missed, skippedHaid). Late opens are therefore
//! indistinguishable from timely ones.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;
use crate::engine::activity::ActivityEngine;
use crate::engine::alarm::AlarmScheduler;
use crate::error::Result;
use crate::events::ChangeEvent;
use crate::model::{
    ActivitySource, FlowTemplate, GuidedFlowLog, HaidMode, SafetyWindow, SyncState,
};
use crate::store::{LocalStore, Notifier};

/// A window currently open with no occurrence outcome yet.
#[derive(Debug, Clone)]
pub struct FlowOffer {
    pub window: SafetyWindow,
    pub template: FlowTemplate,
    pub window_end: DateTime<Utc>,
}

/// Progress of an in-progress occurrence in this process.
#[derive(Debug, Clone)]
struct ActiveStep {
    log_id: String,
    step_index: usize,
    activity_id: String,
}

/// Which side of a simultaneous alarm the user chose to act on. The loser
/// is deferred past the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmChoice {
    Flow,
    Task,
}

pub struct FlowEngine {
    store: Rc<LocalStore>,
    clock: Rc<dyn Clock>,
    notifier: Rc<Notifier>,
    owner_id: String,
    device_id: String,
    alarms: RefCell<AlarmScheduler>,
    active: RefCell<HashMap<String, ActiveStep>>,
    skip_categories: Vec<String>,
    prompt_interval_days: i64,
}

impl FlowEngine {
    pub fn new(
        store: Rc<LocalStore>,
        clock: Rc<dyn Clock>,
        notifier: Rc<Notifier>,
        owner_id: String,
        device_id: String,
        alarm_repeat: Duration,
        skip_categories: Vec<String>,
        prompt_interval_days: i64,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
            owner_id,
            device_id,
            alarms: RefCell::new(AlarmScheduler::new(alarm_repeat)),
            active: RefCell::new(HashMap::new()),
            skip_categories,
            prompt_interval_days,
        }
    }

    // ── Window and template management ───────────────────────────────

    pub fn add_window(&self, window: &SafetyWindow) -> Result<()> {
        Ok(self.store.insert_window(window)?)
    }

    pub fn remove_window(&self, window_id: &str) -> Result<()> {
        self.alarms.borrow_mut().cancel(window_id);
        self.active.borrow_mut().remove(window_id);
        Ok(self.store.delete_window(window_id)?)
    }

    pub fn windows(&self) -> Result<Vec<SafetyWindow>> {
        Ok(self.store.windows()?)
    }

    pub fn add_template(&self, template: &FlowTemplate) -> Result<()> {
        Ok(self.store.insert_template(template)?)
    }

    pub fn templates(&self) -> Result<Vec<FlowTemplate>> {
        Ok(self.store.templates()?)
    }

    // ── Evaluation ───────────────────────────────────────────────────

    /// Settle every window against the current time and return the open
    /// offers. Safe to call at any frequency; outcomes already written are
    /// never revisited.
    pub fn evaluate(&self) -> Result<Vec<FlowOffer>> {
        let now = self.clock.now();
        let day = now.date_naive();
        let haid_active = self.haid_mode()?.is_active;
        let mut offers = Vec::new();

        for window in self.store.windows()? {
            let Some(template) = self.store.get_template(&window.linked_flow_id)? else {
                continue;
            };
            let (start, end) = window.bounds_on(day);
            if now < start {
                continue;
            }

            if let Some(log) = self.store.flow_log_for(&template.id, day)? {
                // Window ran out while the occurrence was still in
                // progress: record the abandonment once.
                if log.triggered_at.is_some()
                    && log.completed_at.is_none()
                    && !log.was_abandoned
                    && now >= end
                {
                    self.abandon_occurrence(&window.id, log, now)?;
                }
                self.alarms.borrow_mut().cancel(&window.id);
                continue;
            }

            if haid_active && self.skip_categories.contains(&template.category) {
                let log = self.write_outcome_log(&template, day, now, Outcome::SkippedHaid)?;
                debug!(flow = %template.id, %day, "occurrence skipped (haid)");
                self.notifier.publish(ChangeEvent::FlowLogged {
                    flow_id: template.id.clone(),
                    outcome: log.state().as_str().to_string(),
                    at: now,
                });
                continue;
            }

            if now >= end {
                self.alarms.borrow_mut().cancel(&window.id);
                let log = self.write_outcome_log(&template, day, now, Outcome::Missed)?;
                debug!(flow = %template.id, %day, "occurrence missed");
                self.notifier.publish(ChangeEvent::FlowLogged {
                    flow_id: template.id.clone(),
                    outcome: log.state().as_str().to_string(),
                    at: now,
                });
                continue;
            }

            // Open and unsettled: offer it and keep the alarm ringing.
            if self.alarms.borrow_mut().arm(&window.id, now) {
                self.notifier.publish(ChangeEvent::FlowOffered {
                    window_id: window.id.clone(),
                    flow_id: template.id.clone(),
                    at: now,
                });
            }
            offers.push(FlowOffer {
                window,
                template,
                window_end: end,
            });
        }
        Ok(offers)
    }

    /// Window ids whose alarm is due. Call after `evaluate` on each tick.
    pub fn poll_alarms(&self) -> Vec<String> {
        let now = self.clock.now();
        let fired = self.alarms.borrow_mut().poll(now);
        for window_id in &fired {
            self.notifier.publish(ChangeEvent::FlowAlarm {
                window_id: window_id.clone(),
                at: now,
            });
        }
        fired
    }

    /// Resolve a flow alarm and a task alarm firing together: the loser is
    /// deferred to five minutes past the window's end.
    pub fn resolve_alarm_clash(
        &self,
        window_id: &str,
        choice: AlarmChoice,
    ) -> Result<Option<DateTime<Utc>>> {
        let Some(window) = self.store.get_window(window_id)? else {
            return Ok(None);
        };
        let now = self.clock.now();
        let (_, end) = window.bounds_on(now.date_naive());
        let deferred_until = end + Duration::minutes(5);
        match choice {
            // Task chosen: push this window's alarm past the window.
            AlarmChoice::Task => {
                self.alarms.borrow_mut().defer_until(window_id, deferred_until);
                Ok(Some(deferred_until))
            }
            // Flow chosen: the caller reschedules the task alarm to the
            // returned instant.
            AlarmChoice::Flow => Ok(Some(deferred_until)),
        }
    }

    // ── Occurrence lifecycle ─────────────────────────────────────────

    /// Acknowledge an offered window ("ON IT"): stop the alarm, open the
    /// occurrence log and start the first step's activity. No-op when the
    /// window is unknown or the occurrence is already settled.
    pub fn acknowledge(
        &self,
        activities: &ActivityEngine,
        window_id: &str,
    ) -> Result<Option<GuidedFlowLog>> {
        let now = self.clock.now();
        let Some(window) = self.store.get_window(window_id)? else {
            return Ok(None);
        };
        let Some(template) = self.store.get_template(&window.linked_flow_id)? else {
            return Ok(None);
        };
        let day = now.date_naive();
        if self.store.flow_log_for(&template.id, day)?.is_some() {
            return Ok(None);
        }
        if template.steps.is_empty() {
            return Ok(None);
        }

        self.alarms.borrow_mut().cancel(window_id);

        let log = GuidedFlowLog {
            id: Uuid::new_v4().to_string(),
            flow_id: template.id.clone(),
            day,
            triggered_at: Some(now),
            completed_at: None,
            steps_completed: 0,
            total_steps: template.steps.len() as u32,
            was_abandoned: false,
            was_missed: false,
            was_skipped_haid: false,
            owner_id: self.owner_id.clone(),
            device_id: self.device_id.clone(),
            updated_at: now,
            sync_status: SyncState::Pending,
        };
        self.store.insert_flow_log(&log)?;

        let step = &template.steps[0];
        let started = activities
            .start_linked(
                &step.activity_name,
                &template.category,
                ActivitySource::GuidedFlow,
                Some(log.id.clone()),
            )?
            .started;
        self.active.borrow_mut().insert(
            window_id.to_string(),
            ActiveStep {
                log_id: log.id.clone(),
                step_index: 0,
                activity_id: started.id,
            },
        );
        debug!(flow = %template.id, "occurrence acknowledged");
        Ok(Some(log))
    }

    /// Complete the current step: close its activity, advance to the next
    /// step or finish the occurrence.
    pub fn complete_step(
        &self,
        activities: &ActivityEngine,
        window_id: &str,
    ) -> Result<Option<GuidedFlowLog>> {
        let now = self.clock.now();
        let Some(active) = self.active.borrow().get(window_id).cloned() else {
            return Ok(None);
        };
        let Some(mut log) = self.store.get_flow_log(&active.log_id)? else {
            return Ok(None);
        };
        let Some(template) = self.store.get_template(&log.flow_id)? else {
            return Ok(None);
        };

        activities.close_by_id(&active.activity_id)?;
        log.steps_completed += 1;
        log.updated_at = now;
        log.sync_status = SyncState::Pending;

        let next_index = active.step_index + 1;
        if next_index >= template.steps.len() {
            log.completed_at = Some(now);
            self.store.update_flow_log(&log)?;
            self.active.borrow_mut().remove(window_id);
            debug!(flow = %log.flow_id, "occurrence completed");
            self.notifier.publish(ChangeEvent::FlowLogged {
                flow_id: log.flow_id.clone(),
                outcome: log.state().as_str().to_string(),
                at: now,
            });
        } else {
            self.store.update_flow_log(&log)?;
            let step = &template.steps[next_index];
            let started = activities
                .start_linked(
                    &step.activity_name,
                    &template.category,
                    ActivitySource::GuidedFlow,
                    Some(log.id.clone()),
                )?
                .started;
            self.active.borrow_mut().insert(
                window_id.to_string(),
                ActiveStep {
                    log_id: log.id.clone(),
                    step_index: next_index,
                    activity_id: started.id,
                },
            );
        }
        Ok(Some(log))
    }

    /// Abandon an in-progress occurrence explicitly.
    pub fn abandon(
        &self,
        activities: &ActivityEngine,
        window_id: &str,
    ) -> Result<Option<GuidedFlowLog>> {
        let now = self.clock.now();
        let Some(active) = self.active.borrow_mut().remove(window_id) else {
            return Ok(None);
        };
        activities.close_by_id(&active.activity_id)?;
        let Some(mut log) = self.store.get_flow_log(&active.log_id)? else {
            return Ok(None);
        };
        log.was_abandoned = true;
        log.updated_at = now;
        log.sync_status = SyncState::Pending;
        self.store.update_flow_log(&log)?;
        Ok(Some(log))
    }

    /// Progress of the in-process occurrence for a window, if any.
    pub fn current_step(&self, window_id: &str) -> Option<usize> {
        self.active.borrow().get(window_id).map(|a| a.step_index)
    }

    // ── Haid mode ────────────────────────────────────────────────────

    pub fn haid_mode(&self) -> Result<HaidMode> {
        match self.store.get_haid_mode()? {
            Some(mode) => Ok(mode),
            None => Ok(HaidMode {
                id: HaidMode::RECORD_ID.to_string(),
                is_active: false,
                start_date: None,
                last_prompt_date: None,
                owner_id: self.owner_id.clone(),
                device_id: self.device_id.clone(),
                updated_at: self.clock.now(),
                sync_status: SyncState::Pending,
            }),
        }
    }

    pub fn set_haid_active(&self, active: bool) -> Result<HaidMode> {
        let now = self.clock.now();
        let mut mode = self.haid_mode()?;
        if mode.is_active != active {
            mode.is_active = active;
            mode.start_date = if active { Some(now) } else { None };
            mode.last_prompt_date = None;
        }
        mode.updated_at = now;
        mode.sync_status = SyncState::Pending;
        self.store.upsert_haid_mode(&mode)?;
        Ok(mode)
    }

    /// Whether the "still active?" check-in is due. Measured from the last
    /// prompt, or from activation before any prompt has happened.
    pub fn haid_prompt_due(&self) -> Result<bool> {
        let mode = self.haid_mode()?;
        if !mode.is_active {
            return Ok(false);
        }
        let since = mode.last_prompt_date.or(mode.start_date);
        match since {
            Some(at) => Ok(self.clock.now() - at >= Duration::days(self.prompt_interval_days)),
            None => Ok(false),
        }
    }

    /// Answer the check-in: either deactivate, or stamp the prompt date so
    /// it stays quiet for another interval.
    pub fn answer_haid_prompt(&self, still_active: bool) -> Result<HaidMode> {
        if !still_active {
            return self.set_haid_active(false);
        }
        let now = self.clock.now();
        let mut mode = self.haid_mode()?;
        mode.last_prompt_date = Some(now);
        mode.updated_at = now;
        mode.sync_status = SyncState::Pending;
        self.store.upsert_haid_mode(&mode)?;
        Ok(mode)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn abandon_occurrence(
        &self,
        window_id: &str,
        mut log: GuidedFlowLog,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(active) = self.active.borrow_mut().remove(window_id) {
            // Closing here, not in the caller: the step activity must not
            // keep running past its window.
            return self.finish_abandon(active, log, now);
        }
        log.was_abandoned = true;
        log.updated_at = now;
        log.sync_status = SyncState::Pending;
        self.store.update_flow_log(&log)?;
        Ok(())
    }

    fn finish_abandon(
        &self,
        active: ActiveStep,
        mut log: GuidedFlowLog,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(activity) = self.store.get_activity(&active.activity_id)? {
            if activity.is_open() {
                let mut activity = activity;
                activity.end_time = Some(now);
                activity.is_running = false;
                activity.is_paused = false;
                activity.paused_at = None;
                activity.updated_at = now;
                activity.sync_status = SyncState::Pending;
                self.store.update_activity(&activity)?;
            }
        }
        log.was_abandoned = true;
        log.updated_at = now;
        log.sync_status = SyncState::Pending;
        self.store.update_flow_log(&log)?;
        Ok(())
    }

    fn write_outcome_log(
        &self,
        template: &FlowTemplate,
        day: NaiveDate,
        now: DateTime<Utc>,
        outcome: Outcome,
    ) -> Result<GuidedFlowLog> {
        let log = GuidedFlowLog {
            id: Uuid::new_v4().to_string(),
            flow_id: template.id.clone(),
            day,
            triggered_at: None,
            completed_at: None,
            steps_completed: 0,
            total_steps: template.steps.len() as u32,
            was_abandoned: false,
            was_missed: matches!(outcome, Outcome::Missed),
            was_skipped_haid: matches!(outcome, Outcome::SkippedHaid),
            owner_id: self.owner_id.clone(),
            device_id: self.device_id.clone(),
            updated_at: now,
            sync_status: SyncState::Pending,
        };
        self.store.insert_flow_log(&log)?;
        Ok(log)
    }
}

enum Outcome {
    Missed,
    SkippedHaid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::{FlowOccurrenceState, FlowStep};

    struct Fixture {
        flows: FlowEngine,
        activities: ActivityEngine,
        clock: Rc<ManualClock>,
        store: Rc<LocalStore>,
    }

    fn fixture(start: &str) -> Fixture {
        let store = Rc::new(LocalStore::open_memory().unwrap());
        let clock = Rc::new(ManualClock::new(start.parse().unwrap()));
        let notifier = Rc::new(Notifier::new());
        let activities = ActivityEngine::new(
            store.clone(),
            clock.clone(),
            notifier.clone(),
            "owner".into(),
            "device-a".into(),
        );
        let flows = FlowEngine::new(
            store.clone(),
            clock.clone(),
            notifier,
            "owner".into(),
            "device-a".into(),
            Duration::minutes(2),
            vec!["prayer".into(), "quran".into()],
            6,
        );
        Fixture {
            flows,
            activities,
            clock,
            store,
        }
    }

    fn seed_dzuhur(f: &Fixture) {
        f.flows
            .add_template(&FlowTemplate {
                id: "dzuhur".into(),
                name: "Dzuhur".into(),
                category: "prayer".into(),
                steps: vec![
                    FlowStep {
                        condition: "window open".into(),
                        action: "wudhu".into(),
                        activity_name: "Wudhu".into(),
                    },
                    FlowStep {
                        condition: "wudhu done".into(),
                        action: "pray".into(),
                        activity_name: "Dzuhur prayer".into(),
                    },
                ],
            })
            .unwrap();
        f.flows
            .add_window(&SafetyWindow {
                id: "w-dzuhur".into(),
                start_hour: 12,
                start_minute: 0,
                end_hour: 12,
                end_minute: 30,
                linked_flow_id: "dzuhur".into(),
            })
            .unwrap();
    }

    #[test]
    fn before_window_nothing_is_offered() {
        let f = fixture("2025-03-01T11:00:00Z");
        seed_dzuhur(&f);
        assert!(f.flows.evaluate().unwrap().is_empty());
        assert!(f.flows.poll_alarms().is_empty());
    }

    #[test]
    fn open_window_offers_and_alarm_repeats_until_acknowledged() {
        let f = fixture("2025-03-01T12:00:00Z");
        seed_dzuhur(&f);

        let offers = f.flows.evaluate().unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].template.id, "dzuhur");

        // Immediate fire, then every two minutes; re-evaluation does not
        // reset the cadence.
        assert_eq!(f.flows.poll_alarms(), vec!["w-dzuhur".to_string()]);
        f.clock.advance(Duration::minutes(1));
        f.flows.evaluate().unwrap();
        assert!(f.flows.poll_alarms().is_empty());
        f.clock.advance(Duration::minutes(1));
        assert_eq!(f.flows.poll_alarms(), vec!["w-dzuhur".to_string()]);

        // Acknowledge: alarm stops, first step activity is running.
        let log = f
            .flows
            .acknowledge(&f.activities, "w-dzuhur")
            .unwrap()
            .unwrap();
        assert_eq!(log.state(), FlowOccurrenceState::InProgress);
        f.clock.advance(Duration::minutes(4));
        assert!(f.flows.poll_alarms().is_empty());

        let running = f.activities.current_running_activity().unwrap().unwrap();
        assert_eq!(running.name, "Wudhu");
        assert_eq!(running.source, ActivitySource::GuidedFlow);
        assert_eq!(running.linked_flow_id.as_deref(), Some(log.id.as_str()));
    }

    #[test]
    fn steps_advance_and_completion_is_terminal() {
        let f = fixture("2025-03-01T12:05:00Z");
        seed_dzuhur(&f);
        f.flows.evaluate().unwrap();
        f.flows.acknowledge(&f.activities, "w-dzuhur").unwrap();

        f.clock.advance(Duration::minutes(3));
        let log = f
            .flows
            .complete_step(&f.activities, "w-dzuhur")
            .unwrap()
            .unwrap();
        assert_eq!(log.steps_completed, 1);
        assert_eq!(log.state(), FlowOccurrenceState::InProgress);
        let running = f.activities.current_running_activity().unwrap().unwrap();
        assert_eq!(running.name, "Dzuhur prayer");

        f.clock.advance(Duration::minutes(5));
        let log = f
            .flows
            .complete_step(&f.activities, "w-dzuhur")
            .unwrap()
            .unwrap();
        assert_eq!(log.state(), FlowOccurrenceState::Completed);
        assert!(f.activities.current_running_activity().unwrap().is_none());

        // Settled: the same window offers nothing more today.
        assert!(f.flows.evaluate().unwrap().is_empty());
        assert!(f.flows.acknowledge(&f.activities, "w-dzuhur").unwrap().is_none());
    }

    #[test]
    fn late_open_past_window_writes_missed_once() {
        let f = fixture("2025-03-01T14:00:00Z");
        seed_dzuhur(&f);

        assert!(f.flows.evaluate().unwrap().is_empty());
        let log = f
            .store
            .flow_log_for("dzuhur", "2025-03-01".parse().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(log.state(), FlowOccurrenceState::Missed);

        // Idempotent across repeated evaluations.
        f.flows.evaluate().unwrap();
        f.flows.evaluate().unwrap();
        let again = f
            .store
            .flow_log_for("dzuhur", "2025-03-01".parse().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(again.id, log.id);
    }

    #[test]
    fn late_open_inside_window_still_offers() {
        let f = fixture("2025-03-01T12:25:00Z");
        seed_dzuhur(&f);
        let offers = f.flows.evaluate().unwrap();
        assert_eq!(offers.len(), 1);
    }

    #[test]
    fn haid_mode_skips_matching_categories() {
        let f = fixture("2025-03-01T12:05:00Z");
        seed_dzuhur(&f);
        f.flows.set_haid_active(true).unwrap();

        assert!(f.flows.evaluate().unwrap().is_empty());
        let log = f
            .store
            .flow_log_for("dzuhur", "2025-03-01".parse().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(log.state(), FlowOccurrenceState::SkippedHaid);
        assert!(f.flows.poll_alarms().is_empty());
    }

    #[test]
    fn haid_prompt_cadence() {
        let f = fixture("2025-03-01T08:00:00Z");
        f.flows.set_haid_active(true).unwrap();
        assert!(!f.flows.haid_prompt_due().unwrap());

        f.clock.advance(Duration::days(6));
        assert!(f.flows.haid_prompt_due().unwrap());

        // "Still active" quiets it for another interval.
        f.flows.answer_haid_prompt(true).unwrap();
        assert!(!f.flows.haid_prompt_due().unwrap());
        f.clock.advance(Duration::days(6));
        assert!(f.flows.haid_prompt_due().unwrap());

        // "No longer active" deactivates.
        let mode = f.flows.answer_haid_prompt(false).unwrap();
        assert!(!mode.is_active);
        assert!(!f.flows.haid_prompt_due().unwrap());
    }

    #[test]
    fn window_expiry_abandons_in_progress_occurrence() {
        let f = fixture("2025-03-01T12:05:00Z");
        seed_dzuhur(&f);
        f.flows.evaluate().unwrap();
        let log = f
            .flows
            .acknowledge(&f.activities, "w-dzuhur")
            .unwrap()
            .unwrap();

        f.clock.advance(Duration::hours(1));
        f.flows.evaluate().unwrap();

        let log = f.store.get_flow_log(&log.id).unwrap().unwrap();
        assert!(log.was_abandoned);
        assert!(log.completed_at.is_none());
        // The step activity was closed at expiry.
        assert!(f.activities.current_running_activity().unwrap().is_none());
    }

    #[test]
    fn alarm_clash_defers_the_loser_past_the_window() {
        let f = fixture("2025-03-01T12:00:00Z");
        seed_dzuhur(&f);
        f.flows.evaluate().unwrap();
        f.flows.poll_alarms();

        // User picks the task: flow alarm defers to window end + 5 min.
        let deferred = f
            .flows
            .resolve_alarm_clash("w-dzuhur", AlarmChoice::Task)
            .unwrap()
            .unwrap();
        assert_eq!(deferred, "2025-03-01T12:35:00Z".parse::<DateTime<Utc>>().unwrap());

        f.clock.set("2025-03-01T12:20:00Z".parse().unwrap());
        assert!(f.flows.poll_alarms().is_empty());
        f.clock.set(deferred);
        assert_eq!(f.flows.poll_alarms(), vec!["w-dzuhur".to_string()]);
    }
}
