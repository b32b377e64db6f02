//! Ad-hoc task coordinator.
//!
//! A started task borrows the running slot: the interrupted activity is
//! paused (not closed) and a companion activity is started under the task's
//! title. The interrupted-by mapping lives only in memory; after a restart
//! completing the task simply stops offering a resume.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;
use crate::engine::activity::ActivityEngine;
use crate::error::Result;
use crate::events::ChangeEvent;
use crate::model::{
    Activity, ActivitySource, AdHocTask, PauseReason, SyncState, TaskExecutionState,
};
use crate::store::{LocalStore, Notifier};

/// Category under which companion activities are recorded.
pub const TASK_CATEGORY: &str = "Ad-hoc Task";

#[derive(Debug, Clone)]
pub struct TaskCompletion {
    pub task: AdHocTask,
    /// The activity this task interrupted, offered for resumption. Only
    /// present when the interruption happened in this process and the
    /// activity is still open and paused.
    pub resumable: Option<Activity>,
}

pub struct TaskCoordinator {
    store: Rc<LocalStore>,
    clock: Rc<dyn Clock>,
    notifier: Rc<Notifier>,
    owner_id: String,
    device_id: String,
    // task id -> interrupted activity id, in-memory only
    interrupted_by: RefCell<HashMap<String, String>>,
}

impl TaskCoordinator {
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
            interrupted_by: RefCell::new(HashMap::new()),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Pending and in-progress tasks in sort order.
    pub fn open_tasks(&self) -> Result<Vec<AdHocTask>> {
        Ok(self.store.open_tasks()?)
    }

    pub fn get(&self, task_id: &str) -> Result<Option<AdHocTask>> {
        Ok(self.store.get_task(task_id)?)
    }

    /// Open tasks whose alarm is due and has not fired yet.
    pub fn due_alarms(&self, now: DateTime<Utc>) -> Result<Vec<AdHocTask>> {
        let due = self
            .store
            .open_tasks()?
            .into_iter()
            .filter(|t| !t.alarm_triggered && t.alarm_time.is_some_and(|at| at <= now))
            .collect();
        Ok(due)
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn create(
        &self,
        title: &str,
        description: Option<String>,
        alarm_time: Option<DateTime<Utc>>,
    ) -> Result<AdHocTask> {
        let now = self.clock.now();
        let task = AdHocTask {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            description,
            execution_state: TaskExecutionState::Pending,
            started_at: None,
            completed_at: None,
            linked_activity_id: None,
            is_paused: false,
            paused_at: None,
            paused_duration_secs: 0,
            alarm_time,
            alarm_triggered: false,
            sort_order: self.store.max_sort_order()? + 1,
            owner_id: self.owner_id.clone(),
            device_id: self.device_id.clone(),
            updated_at: now,
            sync_status: SyncState::Pending,
        };
        self.store.insert_task(&task)?;
        debug!(task = %task.id, title, "ad-hoc task created");
        Ok(task)
    }

    /// Start a pending task: pause whatever is running with an
    /// interruption pause log, then start the companion activity.
    /// No-op on a task that is not pending.
    pub fn start(&self, activities: &ActivityEngine, task_id: &str) -> Result<Option<AdHocTask>> {
        let now = self.clock.now();
        let Some(mut task) = self.store.get_task(task_id)? else {
            return Ok(None);
        };
        if !task
            .execution_state
            .can_transition_to(&TaskExecutionState::InProgress)
        {
            return Ok(None);
        }

        let interrupted = activities.pause(
            PauseReason::AdHocInterruption,
            Some(format!("Ad-hoc task: {}", task.title)),
        )?;
        let companion = activities
            .start(&task.title, TASK_CATEGORY, ActivitySource::Manual)?
            .started;

        task.execution_state = TaskExecutionState::InProgress;
        task.started_at = Some(now);
        task.linked_activity_id = Some(companion.id.clone());
        task.updated_at = now;
        task.sync_status = SyncState::Pending;
        self.store.update_task(&task)?;

        let interrupted_id = interrupted.as_ref().map(|a| a.id.clone());
        if let Some(id) = &interrupted_id {
            self.interrupted_by
                .borrow_mut()
                .insert(task.id.clone(), id.clone());
        }
        self.notifier.publish(ChangeEvent::TaskStarted {
            task_id: task.id.clone(),
            interrupted_activity_id: interrupted_id,
            at: now,
        });
        Ok(Some(task))
    }

    /// Complete an in-progress task: close the companion activity and hand
    /// back the interrupted activity as a resume suggestion.
    pub fn complete(
        &self,
        activities: &ActivityEngine,
        task_id: &str,
    ) -> Result<Option<TaskCompletion>> {
        let now = self.clock.now();
        let Some(mut task) = self.store.get_task(task_id)? else {
            return Ok(None);
        };
        if !task
            .execution_state
            .can_transition_to(&TaskExecutionState::Completed)
        {
            return Ok(None);
        }

        if let Some(activity_id) = &task.linked_activity_id {
            activities.close_by_id(activity_id)?;
        }

        task.execution_state = TaskExecutionState::Completed;
        task.completed_at = Some(now);
        task.is_paused = false;
        task.paused_at = None;
        task.updated_at = now;
        task.sync_status = SyncState::Pending;
        self.store.update_task(&task)?;

        let resumable = self.take_resumable(&task.id)?;
        self.notifier.publish(ChangeEvent::TaskCompleted {
            task_id: task.id.clone(),
            resumable_activity_id: resumable.as_ref().map(|a| a.id.clone()),
            at: now,
        });
        Ok(Some(TaskCompletion { task, resumable }))
    }

    /// Cancel an in-progress task back to pending. The companion activity
    /// is closed without the task being marked complete; the interrupted
    /// activity stays paused and is still offered for resumption.
    pub fn cancel(
        &self,
        activities: &ActivityEngine,
        task_id: &str,
    ) -> Result<Option<TaskCompletion>> {
        let now = self.clock.now();
        let Some(mut task) = self.store.get_task(task_id)? else {
            return Ok(None);
        };
        if !task
            .execution_state
            .can_transition_to(&TaskExecutionState::Pending)
        {
            return Ok(None);
        }

        if let Some(activity_id) = &task.linked_activity_id {
            activities.close_by_id(activity_id)?;
        }

        task.execution_state = TaskExecutionState::Pending;
        task.started_at = None;
        task.linked_activity_id = None;
        task.is_paused = false;
        task.paused_at = None;
        task.paused_duration_secs = 0;
        task.updated_at = now;
        task.sync_status = SyncState::Pending;
        self.store.update_task(&task)?;

        let resumable = self.take_resumable(&task.id)?;
        Ok(Some(TaskCompletion { task, resumable }))
    }

    /// Pause an in-progress task and its companion activity in lockstep.
    pub fn pause(&self, activities: &ActivityEngine, task_id: &str) -> Result<Option<AdHocTask>> {
        let now = self.clock.now();
        let Some(mut task) = self.store.get_task(task_id)? else {
            return Ok(None);
        };
        if task.execution_state != TaskExecutionState::InProgress || task.is_paused {
            return Ok(None);
        }

        if let Some(activity_id) = &task.linked_activity_id {
            activities.pause_by_id(
                activity_id,
                PauseReason::Other,
                Some(format!("Task paused: {}", task.title)),
            )?;
        }

        task.is_paused = true;
        task.paused_at = Some(now);
        task.updated_at = now;
        task.sync_status = SyncState::Pending;
        self.store.update_task(&task)?;
        Ok(Some(task))
    }

    /// Resume a paused task and its companion activity. Both accumulate the
    /// same pause interval from their own paused-at stamps.
    pub fn resume(&self, activities: &ActivityEngine, task_id: &str) -> Result<Option<AdHocTask>> {
        let now = self.clock.now();
        let Some(mut task) = self.store.get_task(task_id)? else {
            return Ok(None);
        };
        if !task.is_paused {
            return Ok(None);
        }

        if let Some(activity_id) = &task.linked_activity_id {
            activities.resume_by_id(activity_id)?;
        }

        task.paused_duration_secs += task
            .paused_at
            .map(|p| (now - p).num_seconds().max(0))
            .unwrap_or(0);
        task.paused_at = None;
        task.is_paused = false;
        task.updated_at = now;
        task.sync_status = SyncState::Pending;
        self.store.update_task(&task)?;
        Ok(Some(task))
    }

    /// Set or clear a task's alarm. Rearms delivery.
    pub fn set_alarm(&self, task_id: &str, alarm_time: Option<DateTime<Utc>>) -> Result<Option<AdHocTask>> {
        let Some(mut task) = self.store.get_task(task_id)? else {
            return Ok(None);
        };
        task.alarm_time = alarm_time;
        task.alarm_triggered = false;
        task.updated_at = self.clock.now();
        task.sync_status = SyncState::Pending;
        self.store.update_task(&task)?;
        Ok(Some(task))
    }

    /// Record alarm delivery. Returns true only on the first call per arm,
    /// so duplicate delivery cannot double-notify.
    pub fn mark_alarm_triggered(&self, task_id: &str) -> Result<bool> {
        let Some(mut task) = self.store.get_task(task_id)? else {
            return Ok(false);
        };
        if task.alarm_triggered {
            return Ok(false);
        }
        task.alarm_triggered = true;
        task.updated_at = self.clock.now();
        task.sync_status = SyncState::Pending;
        self.store.update_task(&task)?;
        Ok(true)
    }

    pub fn set_sort_order(&self, task_id: &str, sort_order: i64) -> Result<Option<AdHocTask>> {
        let Some(mut task) = self.store.get_task(task_id)? else {
            return Ok(None);
        };
        task.sort_order = sort_order;
        task.updated_at = self.clock.now();
        task.sync_status = SyncState::Pending;
        self.store.update_task(&task)?;
        Ok(Some(task))
    }

    pub fn delete(&self, task_id: &str) -> Result<()> {
        self.interrupted_by.borrow_mut().remove(task_id);
        Ok(self.store.delete_task(task_id)?)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn take_resumable(&self, task_id: &str) -> Result<Option<Activity>> {
        let Some(activity_id) = self.interrupted_by.borrow_mut().remove(task_id) else {
            return Ok(None);
        };
        let suggestion = self
            .store
            .get_activity(&activity_id)?
            .filter(|a| a.is_open() && a.is_paused);
        Ok(suggestion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    struct Fixture {
        activities: ActivityEngine,
        tasks: TaskCoordinator,
        clock: Rc<ManualClock>,
        store: Rc<LocalStore>,
    }

    fn fixture() -> Fixture {
        let store = Rc::new(LocalStore::open_memory().unwrap());
        let clock = Rc::new(ManualClock::new("2025-03-01T09:00:00Z".parse().unwrap()));
        let notifier = Rc::new(Notifier::new());
        let activities = ActivityEngine::new(
            store.clone(),
            clock.clone(),
            notifier.clone(),
            "owner".into(),
            "device-a".into(),
        );
        let tasks = TaskCoordinator::new(
            store.clone(),
            clock.clone(),
            notifier,
            "owner".into(),
            "device-a".into(),
        );
        Fixture {
            activities,
            tasks,
            clock,
            store,
        }
    }

    #[test]
    fn interruption_pauses_and_completion_offers_resume() {
        let f = fixture();
        let writing = f
            .activities
            .start("Writing report", "Work", ActivitySource::Manual)
            .unwrap()
            .started;

        f.clock.advance(Duration::minutes(30));
        let task = f.tasks.create("Call plumber", None, None).unwrap();
        let task = f.tasks.start(&f.activities, &task.id).unwrap().unwrap();
        assert_eq!(task.execution_state, TaskExecutionState::InProgress);

        // Interrupted activity is paused with an interruption log; the
        // companion holds the running slot.
        let interrupted = f.store.get_activity(&writing.id).unwrap().unwrap();
        assert!(interrupted.is_paused && interrupted.is_open());
        let log = f.store.open_pause_log(&writing.id).unwrap().unwrap();
        assert_eq!(log.reason, PauseReason::AdHocInterruption);
        let running = f.activities.current_running_activity().unwrap().unwrap();
        assert_eq!(Some(running.id.clone()), task.linked_activity_id);
        assert_eq!(running.category, TASK_CATEGORY);

        f.clock.advance(Duration::minutes(10));
        let done = f.tasks.complete(&f.activities, &task.id).unwrap().unwrap();
        assert_eq!(done.task.execution_state, TaskExecutionState::Completed);
        assert_eq!(done.resumable.as_ref().map(|a| a.id.as_str()), Some(writing.id.as_str()));

        // Companion closed; nothing running until the user resumes.
        assert!(f.activities.current_running_activity().unwrap().is_none());

        f.clock.advance(Duration::minutes(5));
        let resumed = f.activities.resume_by_id(&writing.id).unwrap().unwrap();
        // Paused for the 10-minute task plus the 5-minute gap.
        assert_eq!(resumed.paused_duration_secs, 15 * 60);
        assert_eq!(resumed.elapsed(f.clock.now()), Duration::minutes(30));
    }

    #[test]
    fn start_without_running_activity_interrupts_nothing() {
        let f = fixture();
        let task = f.tasks.create("Quick errand", None, None).unwrap();
        let task = f.tasks.start(&f.activities, &task.id).unwrap().unwrap();
        assert!(task.linked_activity_id.is_some());

        let done = f.tasks.complete(&f.activities, &task.id).unwrap().unwrap();
        assert!(done.resumable.is_none());
    }

    #[test]
    fn cancel_reverts_to_pending_and_closes_companion() {
        let f = fixture();
        let task = f.tasks.create("Abortive", None, None).unwrap();
        let task = f.tasks.start(&f.activities, &task.id).unwrap().unwrap();
        let companion_id = task.linked_activity_id.clone().unwrap();

        f.clock.advance(Duration::minutes(2));
        let cancelled = f.tasks.cancel(&f.activities, &task.id).unwrap().unwrap();
        assert_eq!(cancelled.task.execution_state, TaskExecutionState::Pending);
        assert!(cancelled.task.started_at.is_none());
        assert!(cancelled.task.linked_activity_id.is_none());

        let companion = f.store.get_activity(&companion_id).unwrap().unwrap();
        assert!(!companion.is_open());
        // Cancel is a valid start point again.
        assert!(f.tasks.start(&f.activities, &task.id).unwrap().is_some());
    }

    #[test]
    fn completing_a_pending_task_is_noop() {
        let f = fixture();
        let task = f.tasks.create("Never started", None, None).unwrap();
        assert!(f.tasks.complete(&f.activities, &task.id).unwrap().is_none());
    }

    #[test]
    fn pause_resume_lockstep_with_companion() {
        let f = fixture();
        let task = f.tasks.create("Long errand", None, None).unwrap();
        let task = f.tasks.start(&f.activities, &task.id).unwrap().unwrap();
        let companion_id = task.linked_activity_id.clone().unwrap();

        f.clock.advance(Duration::minutes(5));
        let paused = f.tasks.pause(&f.activities, &task.id).unwrap().unwrap();
        assert!(paused.is_paused);
        let companion = f.store.get_activity(&companion_id).unwrap().unwrap();
        assert!(companion.is_paused);

        f.clock.advance(Duration::minutes(3));
        let resumed = f.tasks.resume(&f.activities, &task.id).unwrap().unwrap();
        assert_eq!(resumed.paused_duration_secs, 180);
        let companion = f.store.get_activity(&companion_id).unwrap().unwrap();
        assert_eq!(companion.paused_duration_secs, 180);
        assert!(companion.is_running);
    }

    #[test]
    fn pause_after_companion_displaced_leaves_other_activity_alone() {
        let f = fixture();
        let task = f.tasks.create("Long errand", None, None).unwrap();
        let task = f.tasks.start(&f.activities, &task.id).unwrap().unwrap();
        let companion_id = task.linked_activity_id.clone().unwrap();

        // The user moves on manually; the companion loses the slot.
        f.clock.advance(Duration::minutes(5));
        let email = f
            .activities
            .start("Email", "Work", ActivitySource::Manual)
            .unwrap()
            .started;

        f.clock.advance(Duration::minutes(2));
        let paused = f.tasks.pause(&f.activities, &task.id).unwrap().unwrap();
        assert!(paused.is_paused);

        // Only the companion is lockstepped; "Email" keeps running.
        let email = f.store.get_activity(&email.id).unwrap().unwrap();
        assert!(email.is_running && !email.is_paused);
        let companion = f.store.get_activity(&companion_id).unwrap().unwrap();
        assert!(!companion.is_open() && !companion.is_paused);
    }

    #[test]
    fn alarm_fires_once() {
        let f = fixture();
        let due = f.clock.now() + Duration::minutes(10);
        let task = f.tasks.create("Deadline", None, Some(due)).unwrap();

        assert!(f.tasks.due_alarms(f.clock.now()).unwrap().is_empty());
        f.clock.advance(Duration::minutes(11));
        let due_tasks = f.tasks.due_alarms(f.clock.now()).unwrap();
        assert_eq!(due_tasks.len(), 1);

        assert!(f.tasks.mark_alarm_triggered(&task.id).unwrap());
        assert!(!f.tasks.mark_alarm_triggered(&task.id).unwrap());
        assert!(f.tasks.due_alarms(f.clock.now()).unwrap().is_empty());
    }

    #[test]
    fn new_tasks_append_to_sort_order() {
        let f = fixture();
        let a = f.tasks.create("first", None, None).unwrap();
        let b = f.tasks.create("second", None, None).unwrap();
        assert!(b.sort_order > a.sort_order);

        f.tasks.set_sort_order(&b.id, a.sort_order - 1).unwrap();
        let open = f.tasks.open_tasks().unwrap();
        assert_eq!(open[0].id, b.id);
    }
}
