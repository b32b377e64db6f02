//! Application facade.
//!
//! Owns the store, the clock, the engines and the sync coordinator, and
//! routes every mutating operation through exactly one sync trigger. The
//! UI layer talks to this type only.

use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::engine::{
    ActivityEngine, AlarmChoice, FlowEngine, FlowOffer, StartOutcome, TaskCompletion,
    TaskCoordinator, UnloggedTracker,
};
use crate::error::{CoreError, Result};
use crate::events::{ChangeEvent, SyncTrigger};
use crate::model::{
    Activity, ActivitySource, AdHocTask, FlowTemplate, GuidedFlowLog, HaidMode, PauseReason,
    SafetyWindow, UnloggedBlock,
};
use crate::store::{LocalStore, Notifier, RemoteStore};
use crate::sync::{get_or_create_device_id, SyncCoordinator, SyncOutcome};

/// Everything that happened during an app-open pass.
#[derive(Debug)]
pub struct OpenReport {
    pub orphans_closed: Vec<Activity>,
    pub offers: Vec<FlowOffer>,
    pub unlogged_found: Vec<UnloggedBlock>,
    pub sync: SyncOutcome,
}

/// Alarms due on one poll tick.
#[derive(Debug)]
pub struct TickReport {
    pub offers: Vec<FlowOffer>,
    pub flow_alarms: Vec<String>,
    pub task_alarms: Vec<AdHocTask>,
}

pub struct App {
    config: Config,
    device_id: String,
    clock: Rc<dyn Clock>,
    notifier: Rc<Notifier>,
    store: Rc<LocalStore>,
    activities: ActivityEngine,
    tasks: TaskCoordinator,
    flows: FlowEngine,
    unlogged: UnloggedTracker,
    sync: SyncCoordinator,
}

impl App {
    /// Open with on-disk store and config, system clock, and the given
    /// remote backend.
    pub fn open(remote: Box<dyn RemoteStore>) -> Result<Self> {
        let config = Config::load()?;
        let store = Rc::new(LocalStore::open()?);
        let device_id =
            get_or_create_device_id().map_err(|e| CoreError::Custom(e.to_string()))?;
        Ok(Self::assemble(
            config,
            store,
            Rc::new(SystemClock),
            remote,
            device_id,
        ))
    }

    /// Assemble from explicit parts. Used by tests and anything embedding
    /// the core with its own store location or clock.
    pub fn with_parts(
        config: Config,
        store: Rc<LocalStore>,
        clock: Rc<dyn Clock>,
        remote: Box<dyn RemoteStore>,
        device_id: String,
    ) -> Self {
        Self::assemble(config, store, clock, remote, device_id)
    }

    fn assemble(
        config: Config,
        store: Rc<LocalStore>,
        clock: Rc<dyn Clock>,
        remote: Box<dyn RemoteStore>,
        device_id: String,
    ) -> Self {
        let notifier = Rc::new(Notifier::new());
        let owner = config.owner_id.clone();
        let activities = ActivityEngine::new(
            store.clone(),
            clock.clone(),
            notifier.clone(),
            owner.clone(),
            device_id.clone(),
        );
        let tasks = TaskCoordinator::new(
            store.clone(),
            clock.clone(),
            notifier.clone(),
            owner.clone(),
            device_id.clone(),
        );
        let flows = FlowEngine::new(
            store.clone(),
            clock.clone(),
            notifier.clone(),
            owner.clone(),
            device_id.clone(),
            Duration::minutes(config.alarm_repeat_minutes),
            config.haid_skip_categories.clone(),
            config.haid_prompt_interval_days,
        );
        let unlogged = UnloggedTracker::new(
            store.clone(),
            clock.clone(),
            config.unlogged_block_minutes,
            config.unlogged_retention_days,
        );
        let sync = SyncCoordinator::new(
            store.clone(),
            clock.clone(),
            notifier.clone(),
            remote,
            owner,
        );
        Self {
            config,
            device_id,
            clock,
            notifier,
            store,
            activities,
            tasks,
            flows,
            unlogged,
            sync,
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Foreground pass: close orphans, settle flow windows, sweep for
    /// unlogged blocks and run an app-opened sync round.
    pub fn opened(&self) -> Result<OpenReport> {
        let orphans_closed = self
            .activities
            .sanitize_orphans(self.config.orphan_max_age_hours)?;
        let offers = self.flows.evaluate()?;
        let sweep_from =
            self.clock.now() - Duration::days(self.config.unlogged_retention_days);
        let unlogged_found = self.unlogged.sweep(sweep_from)?;
        let sync = self.sync.trigger_sync(SyncTrigger::AppOpened)?;
        Ok(OpenReport {
            orphans_closed,
            offers,
            unlogged_found,
            sync,
        })
    }

    /// Periodic poll tick. Marks due task alarms as triggered, so each one
    /// surfaces exactly once.
    pub fn tick(&self) -> Result<TickReport> {
        let offers = self.flows.evaluate()?;
        let flow_alarms = self.flows.poll_alarms();
        let due = self.tasks.due_alarms(self.clock.now())?;
        let mut task_alarms = Vec::new();
        for task in due {
            if self.tasks.mark_alarm_triggered(&task.id)? {
                task_alarms.push(task);
            }
        }
        Ok(TickReport {
            offers,
            flow_alarms,
            task_alarms,
        })
    }

    pub fn subscribe(&self) -> std::sync::mpsc::Receiver<ChangeEvent> {
        self.notifier.subscribe()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ── Activities ───────────────────────────────────────────────────

    pub fn start_activity(&self, name: &str, category: &str) -> Result<StartOutcome> {
        let outcome = self
            .activities
            .start(name, category, ActivitySource::Manual)?;
        self.sync.trigger_sync(SyncTrigger::ActivityStarted)?;
        Ok(outcome)
    }

    pub fn stop_activity(&self) -> Result<Option<Activity>> {
        let stopped = self.activities.stop()?;
        if stopped.is_some() {
            self.sync.trigger_sync(SyncTrigger::ActivityDone)?;
        }
        Ok(stopped)
    }

    pub fn pause_activity(
        &self,
        reason: PauseReason,
        custom_reason: Option<String>,
    ) -> Result<Option<Activity>> {
        let paused = self.activities.pause(reason, custom_reason)?;
        if paused.is_some() {
            self.sync.trigger_sync(SyncTrigger::Paused)?;
        }
        Ok(paused)
    }

    pub fn resume_activity(&self) -> Result<Option<Activity>> {
        let resumed = self.activities.resume()?;
        if resumed.is_some() {
            self.sync.trigger_sync(SyncTrigger::Resumed)?;
        }
        Ok(resumed)
    }

    pub fn resume_activity_by_id(&self, activity_id: &str) -> Result<Option<Activity>> {
        let resumed = self.activities.resume_by_id(activity_id)?;
        if resumed.is_some() {
            self.sync.trigger_sync(SyncTrigger::Resumed)?;
        }
        Ok(resumed)
    }

    pub fn attach_memo(&self, activity_id: &str, memo: &str) -> Result<Option<Activity>> {
        let updated = self.activities.attach_memo(activity_id, memo)?;
        if updated.is_some() {
            self.sync.trigger_sync(SyncTrigger::MemoAdded)?;
        }
        Ok(updated)
    }

    pub fn current_activity(&self) -> Result<Option<Activity>> {
        self.activities.current_running_activity()
    }

    pub fn open_activities(&self) -> Result<Vec<Activity>> {
        self.activities.open_activities()
    }

    pub fn activities_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Activity>> {
        Ok(self.store.activities_between(from, to)?)
    }

    /// Net tracked seconds per category over a range, pauses excluded.
    pub fn duration_by_category(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<(String, i64)>> {
        Ok(self.store.duration_by_category(from, to)?)
    }

    // ── Ad-hoc tasks ─────────────────────────────────────────────────

    pub fn create_task(
        &self,
        title: &str,
        description: Option<String>,
        alarm_time: Option<DateTime<Utc>>,
    ) -> Result<AdHocTask> {
        let task = self.tasks.create(title, description, alarm_time)?;
        self.sync.trigger_sync(SyncTrigger::AdHocCreated)?;
        Ok(task)
    }

    pub fn start_task(&self, task_id: &str) -> Result<Option<AdHocTask>> {
        let started = self.tasks.start(&self.activities, task_id)?;
        if started.is_some() {
            self.sync.trigger_sync(SyncTrigger::ActivityStarted)?;
        }
        Ok(started)
    }

    pub fn complete_task(&self, task_id: &str) -> Result<Option<TaskCompletion>> {
        let completion = self.tasks.complete(&self.activities, task_id)?;
        if completion.is_some() {
            self.sync.trigger_sync(SyncTrigger::AdHocCompleted)?;
        }
        Ok(completion)
    }

    pub fn cancel_task(&self, task_id: &str) -> Result<Option<TaskCompletion>> {
        let cancelled = self.tasks.cancel(&self.activities, task_id)?;
        if cancelled.is_some() {
            self.sync.trigger_sync(SyncTrigger::ActivityDone)?;
        }
        Ok(cancelled)
    }

    pub fn pause_task(&self, task_id: &str) -> Result<Option<AdHocTask>> {
        let paused = self.tasks.pause(&self.activities, task_id)?;
        if paused.is_some() {
            self.sync.trigger_sync(SyncTrigger::Paused)?;
        }
        Ok(paused)
    }

    pub fn resume_task(&self, task_id: &str) -> Result<Option<AdHocTask>> {
        let resumed = self.tasks.resume(&self.activities, task_id)?;
        if resumed.is_some() {
            self.sync.trigger_sync(SyncTrigger::Resumed)?;
        }
        Ok(resumed)
    }

    pub fn set_task_alarm(
        &self,
        task_id: &str,
        alarm_time: Option<DateTime<Utc>>,
    ) -> Result<Option<AdHocTask>> {
        self.tasks.set_alarm(task_id, alarm_time)
    }

    pub fn reorder_task(&self, task_id: &str, sort_order: i64) -> Result<Option<AdHocTask>> {
        self.tasks.set_sort_order(task_id, sort_order)
    }

    pub fn open_tasks(&self) -> Result<Vec<AdHocTask>> {
        self.tasks.open_tasks()
    }

    // ── Guided flows ─────────────────────────────────────────────────

    pub fn add_flow_template(&self, template: &FlowTemplate) -> Result<()> {
        self.flows.add_template(template)
    }

    pub fn add_safety_window(&self, window: &SafetyWindow) -> Result<()> {
        self.flows.add_window(window)
    }

    pub fn remove_safety_window(&self, window_id: &str) -> Result<()> {
        self.flows.remove_window(window_id)
    }

    pub fn safety_windows(&self) -> Result<Vec<SafetyWindow>> {
        self.flows.windows()
    }

    pub fn flow_templates(&self) -> Result<Vec<FlowTemplate>> {
        self.flows.templates()
    }

    pub fn evaluate_flows(&self) -> Result<Vec<FlowOffer>> {
        self.flows.evaluate()
    }

    /// "ON IT": acknowledge an offered window and start its first step.
    pub fn acknowledge_flow(&self, window_id: &str) -> Result<Option<GuidedFlowLog>> {
        let log = self.flows.acknowledge(&self.activities, window_id)?;
        if log.is_some() {
            self.sync.trigger_sync(SyncTrigger::ActivityStarted)?;
        }
        Ok(log)
    }

    pub fn complete_flow_step(&self, window_id: &str) -> Result<Option<GuidedFlowLog>> {
        let log = self.flows.complete_step(&self.activities, window_id)?;
        if log.is_some() {
            self.sync.trigger_sync(SyncTrigger::ActivityDone)?;
        }
        Ok(log)
    }

    pub fn abandon_flow(&self, window_id: &str) -> Result<Option<GuidedFlowLog>> {
        let log = self.flows.abandon(&self.activities, window_id)?;
        if log.is_some() {
            self.sync.trigger_sync(SyncTrigger::ActivityDone)?;
        }
        Ok(log)
    }

    /// Resolve a flow alarm and a task alarm firing at the same moment:
    /// the alarm not chosen is deferred to five minutes past the window.
    pub fn resolve_alarm_clash(
        &self,
        window_id: &str,
        task_id: &str,
        choice: AlarmChoice,
    ) -> Result<()> {
        if let Some(deferred_until) = self.flows.resolve_alarm_clash(window_id, choice)? {
            if choice == AlarmChoice::Flow {
                self.tasks.set_alarm(task_id, Some(deferred_until))?;
            }
        }
        Ok(())
    }

    // ── Haid mode ────────────────────────────────────────────────────

    pub fn haid_mode(&self) -> Result<HaidMode> {
        self.flows.haid_mode()
    }

    pub fn set_haid_active(&self, active: bool) -> Result<HaidMode> {
        let mode = self.flows.set_haid_active(active)?;
        self.sync.trigger_sync(SyncTrigger::ManualSync)?;
        Ok(mode)
    }

    pub fn haid_prompt_due(&self) -> Result<bool> {
        self.flows.haid_prompt_due()
    }

    pub fn answer_haid_prompt(&self, still_active: bool) -> Result<HaidMode> {
        let mode = self.flows.answer_haid_prompt(still_active)?;
        self.sync.trigger_sync(SyncTrigger::ManualSync)?;
        Ok(mode)
    }

    // ── Unlogged time ────────────────────────────────────────────────

    pub fn unlogged_blocks(&self) -> Result<Vec<UnloggedBlock>> {
        self.unlogged.blocks()
    }

    pub fn resolve_unlogged_block(
        &self,
        block_id: &str,
        name: &str,
        category: &str,
    ) -> Result<Option<Activity>> {
        let logged = self
            .unlogged
            .resolve(&self.activities, block_id, name, category)?;
        if logged.is_some() {
            self.sync.trigger_sync(SyncTrigger::ActivityDone)?;
        }
        Ok(logged)
    }

    pub fn dismiss_unlogged_block(&self, block_id: &str) -> Result<()> {
        self.unlogged.dismiss(block_id)
    }

    // ── Sync ─────────────────────────────────────────────────────────

    pub fn sync_now(&self) -> Result<SyncOutcome> {
        self.sync.trigger_sync(SyncTrigger::ManualSync)
    }

    pub fn sync_status(&self) -> SyncOutcome {
        self.sync.status()
    }

    pub fn pending_sync_count(&self) -> Result<usize> {
        self.sync.pending_count()
    }
}
