//! End-to-end scenarios across the engines, the store and sync.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;

use catat_core::{
    AlarmChoice, App, Clock, Config, FlowOccurrenceState, FlowStep, FlowTemplate, InMemoryRemote,
    LocalStore, ManualClock, PauseReason, RemoteStore, SafetyWindow, SyncError, SyncOutcome,
    SyncRecord, TaskExecutionState,
};

/// Shares one in-memory remote between several device apps.
#[derive(Clone)]
struct SharedRemote(Rc<RefCell<InMemoryRemote>>);

impl SharedRemote {
    fn new() -> Self {
        Self(Rc::new(RefCell::new(InMemoryRemote::new())))
    }

    fn set_online(&self, online: bool) {
        self.0.borrow_mut().set_online(online);
    }
}

impl RemoteStore for SharedRemote {
    fn is_available(&self) -> bool {
        self.0.borrow().is_available()
    }

    fn push(&mut self, record: &SyncRecord) -> Result<(), SyncError> {
        self.0.borrow_mut().push(record)
    }

    fn fetch_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<SyncRecord>, SyncError> {
        self.0.borrow().fetch_since(since)
    }

    fn running_activities(
        &self,
        owner_id: &str,
    ) -> Result<Vec<catat_core::Activity>, SyncError> {
        self.0.borrow().running_activities(owner_id)
    }
}

fn t0() -> DateTime<Utc> {
    "2025-03-01T09:00:00Z".parse().unwrap()
}

fn device(remote: &SharedRemote, clock: &Rc<ManualClock>, device_id: &str) -> App {
    App::with_parts(
        Config::default(),
        Rc::new(LocalStore::open_memory().unwrap()),
        clock.clone(),
        Box::new(remote.clone()),
        device_id.to_string(),
    )
}

fn single_app() -> (App, Rc<ManualClock>) {
    let clock = Rc::new(ManualClock::new(t0()));
    let remote = SharedRemote::new();
    (device(&remote, &clock, "catat-solo"), clock)
}

fn seed_dzuhur(app: &App) {
    app.add_flow_template(&FlowTemplate {
        id: "dzuhur".into(),
        name: "Dzuhur".into(),
        category: "prayer".into(),
        steps: vec![
            FlowStep {
                condition: "window open".into(),
                action: "make wudhu".into(),
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
    app.add_safety_window(&SafetyWindow {
        id: "w-dzuhur".into(),
        start_hour: 12,
        start_minute: 0,
        end_hour: 12,
        end_minute: 30,
        linked_flow_id: "dzuhur".into(),
    })
    .unwrap();
}

// ── Scenario: ad-hoc interruption mid-activity ───────────────────────

#[test]
fn adhoc_interruption_round_trip() {
    let (app, clock) = single_app();
    let writing = app.start_activity("Writing report", "work").unwrap().started;

    clock.advance(Duration::minutes(40));
    let task = app.create_task("Fix the sink", None, None).unwrap();
    let task = app.start_task(&task.id).unwrap().unwrap();
    assert_eq!(task.execution_state, TaskExecutionState::InProgress);

    // One running slot: the companion activity holds it, the report is
    // paused, not closed.
    let running = app.current_activity().unwrap().unwrap();
    assert_eq!(Some(running.id.clone()), task.linked_activity_id);
    let open: Vec<_> = app.open_activities().unwrap();
    assert_eq!(open.len(), 2);
    assert!(open.iter().any(|a| a.id == writing.id && a.is_paused));

    clock.advance(Duration::minutes(20));
    let done = app.complete_task(&task.id).unwrap().unwrap();
    let resumable = done.resumable.unwrap();
    assert_eq!(resumable.id, writing.id);

    app.resume_activity_by_id(&resumable.id).unwrap().unwrap();
    clock.advance(Duration::minutes(10));

    let writing = app.current_activity().unwrap().unwrap();
    assert_eq!(writing.name, "Writing report");
    // 40 before + 10 after; the 20-minute task does not count.
    assert_eq!(writing.elapsed(clock.now()), Duration::minutes(50));
}

// ── Scenario: orphaned activity after a crash ────────────────────────

#[test]
fn orphan_closed_with_placeholder_on_open() {
    let (app, clock) = single_app();
    let forgotten = app.start_activity("Deep work", "work").unwrap().started;

    // Device comes back two days later.
    clock.advance(Duration::hours(48));
    let report = app.opened().unwrap();
    assert_eq!(report.orphans_closed.len(), 1);
    assert_eq!(
        report.orphans_closed[0].end_time,
        Some(forgotten.start_time + Duration::hours(1))
    );

    // A second open pass changes nothing.
    let report = app.opened().unwrap();
    assert!(report.orphans_closed.is_empty());
    assert!(app.current_activity().unwrap().is_none());
}

// ── Scenario: guided flow through its window ─────────────────────────

#[test]
fn flow_window_guides_steps_to_completion() {
    let (app, clock) = single_app();
    seed_dzuhur(&app);

    clock.set("2025-03-01T12:03:00Z".parse().unwrap());
    let offers = app.evaluate_flows().unwrap();
    assert_eq!(offers.len(), 1);

    let log = app.acknowledge_flow("w-dzuhur").unwrap().unwrap();
    assert_eq!(log.state(), FlowOccurrenceState::InProgress);
    assert_eq!(app.current_activity().unwrap().unwrap().name, "Wudhu");

    clock.advance(Duration::minutes(3));
    app.complete_flow_step("w-dzuhur").unwrap().unwrap();
    assert_eq!(
        app.current_activity().unwrap().unwrap().name,
        "Dzuhur prayer"
    );

    clock.advance(Duration::minutes(7));
    let log = app.complete_flow_step("w-dzuhur").unwrap().unwrap();
    assert_eq!(log.state(), FlowOccurrenceState::Completed);
    assert_eq!(log.steps_completed, 2);
    assert!(app.current_activity().unwrap().is_none());
}

#[test]
fn missed_and_completed_are_exclusive_per_day() {
    let (app, clock) = single_app();
    seed_dzuhur(&app);

    // Complete it inside the window.
    clock.set("2025-03-01T12:03:00Z".parse().unwrap());
    app.evaluate_flows().unwrap();
    app.acknowledge_flow("w-dzuhur").unwrap().unwrap();
    app.complete_flow_step("w-dzuhur").unwrap();
    app.complete_flow_step("w-dzuhur").unwrap();

    // Long after the window, evaluation must not also write a miss.
    clock.set("2025-03-01T18:00:00Z".parse().unwrap());
    app.evaluate_flows().unwrap();
    let report = app.tick().unwrap();
    assert!(report.flow_alarms.is_empty());
    assert!(app.acknowledge_flow("w-dzuhur").unwrap().is_none());
}

#[test]
fn haid_mode_skips_instead_of_missing() {
    let (app, clock) = single_app();
    seed_dzuhur(&app);
    app.set_haid_active(true).unwrap();

    clock.set("2025-03-01T12:10:00Z".parse().unwrap());
    assert!(app.evaluate_flows().unwrap().is_empty());
    // Settled as skipped: no offer, no alarm, and no miss later.
    clock.set("2025-03-01T18:00:00Z".parse().unwrap());
    assert!(app.evaluate_flows().unwrap().is_empty());
    assert!(app.tick().unwrap().flow_alarms.is_empty());
}

// ── Scenario: alarm clash ────────────────────────────────────────────

#[test]
fn flow_wins_clash_and_task_alarm_is_deferred() {
    let (app, clock) = single_app();
    seed_dzuhur(&app);
    let task = app
        .create_task(
            "Call back",
            None,
            Some("2025-03-01T12:00:00Z".parse().unwrap()),
        )
        .unwrap();

    clock.set("2025-03-01T12:00:00Z".parse().unwrap());
    let report = app.tick().unwrap();
    assert_eq!(report.flow_alarms, vec!["w-dzuhur".to_string()]);
    assert_eq!(report.task_alarms.len(), 1);

    // User picks the flow; the task alarm moves past the window.
    app.resolve_alarm_clash("w-dzuhur", &task.id, AlarmChoice::Flow)
        .unwrap();
    let task = app
        .open_tasks()
        .unwrap()
        .into_iter()
        .find(|t| t.title == "Call back")
        .unwrap();
    assert_eq!(
        task.alarm_time,
        Some("2025-03-01T12:35:00Z".parse().unwrap())
    );
    assert!(!task.alarm_triggered);

    // It fires again at the deferred time, once.
    clock.set("2025-03-01T12:35:00Z".parse().unwrap());
    let report = app.tick().unwrap();
    assert_eq!(report.task_alarms.len(), 1);
    assert!(app.tick().unwrap().task_alarms.is_empty());
}

// ── Scenario: two devices, one running slot ──────────────────────────

#[test]
fn offline_edits_converge_after_reconnect() {
    let clock = Rc::new(ManualClock::new(t0()));
    let remote = SharedRemote::new();
    let phone = device(&remote, &clock, "catat-phone");
    let laptop = device(&remote, &clock, "catat-laptop");

    // Phone logs an activity while offline.
    remote.set_online(false);
    phone.start_activity("Reading", "leisure").unwrap();
    clock.advance(Duration::minutes(25));
    phone.stop_activity().unwrap();
    assert!(matches!(
        phone.sync_status(),
        SyncOutcome::Offline { pending: 1 }
    ));

    // Reconnect: the next trigger drains it, and the laptop pulls it.
    remote.set_online(true);
    phone.sync_now().unwrap();
    assert_eq!(phone.pending_sync_count().unwrap(), 0);

    laptop.sync_now().unwrap();
    let pulled = laptop
        .activities_between(t0() - Duration::hours(1), clock.now() + Duration::hours(1))
        .unwrap();
    assert_eq!(pulled.len(), 1);
    assert_eq!(pulled[0].name, "Reading");
    assert_eq!(pulled[0].device_id, "catat-phone");
}

#[test]
fn concurrent_runners_resolve_to_latest_start() {
    let clock = Rc::new(ManualClock::new(t0()));
    let remote = SharedRemote::new();
    let phone = device(&remote, &clock, "catat-phone");
    let laptop = device(&remote, &clock, "catat-laptop");

    phone.start_activity("Phone work", "work").unwrap();
    clock.advance(Duration::minutes(5));
    laptop.start_activity("Laptop work", "work").unwrap();

    clock.advance(Duration::minutes(1));
    phone.sync_now().unwrap();
    laptop.sync_now().unwrap();
    phone.sync_now().unwrap();

    // The later start wins everywhere; the earlier one is closed.
    let phone_running = phone.current_activity().unwrap();
    let laptop_running = laptop.current_activity().unwrap();
    assert_eq!(
        phone_running.as_ref().map(|a| a.name.clone()),
        Some("Laptop work".to_string())
    );
    assert_eq!(
        laptop_running.as_ref().map(|a| a.name.clone()),
        Some("Laptop work".to_string())
    );
}

#[test]
fn newer_edit_wins_per_record() {
    let clock = Rc::new(ManualClock::new(t0()));
    let remote = SharedRemote::new();
    let phone = device(&remote, &clock, "catat-phone");
    let laptop = device(&remote, &clock, "catat-laptop");

    let activity = phone.start_activity("Draft", "work").unwrap().started;
    clock.advance(Duration::minutes(1));
    phone.stop_activity().unwrap();
    laptop.sync_now().unwrap();

    // Laptop adds a memo later; phone adds one earlier (clock-wise the
    // laptop edit is newer).
    clock.advance(Duration::minutes(1));
    phone.attach_memo(&activity.id, "phone memo").unwrap();
    clock.advance(Duration::minutes(1));
    laptop.attach_memo(&activity.id, "laptop memo").unwrap();

    phone.sync_now().unwrap();
    laptop.sync_now().unwrap();
    phone.sync_now().unwrap();

    let on_phone = phone
        .activities_between(t0() - Duration::hours(1), clock.now() + Duration::hours(1))
        .unwrap();
    assert_eq!(on_phone[0].memo.as_deref(), Some("laptop memo"));
}

// ── Properties ───────────────────────────────────────────────────────

proptest! {
    /// Elapsed plus accumulated pause always equals wall time.
    #[test]
    fn duration_is_conserved(
        segments in prop::collection::vec((1i64..120, 1i64..120), 0..5),
        tail in 1i64..120,
    ) {
        let (app, clock) = single_app();
        app.start_activity("Subject", "work").unwrap();

        let mut wall = 0i64;
        let mut paused = 0i64;
        for (run_mins, pause_mins) in segments {
            clock.advance(Duration::minutes(run_mins));
            wall += run_mins;
            app.pause_activity(PauseReason::Rest, None).unwrap().unwrap();
            clock.advance(Duration::minutes(pause_mins));
            wall += pause_mins;
            paused += pause_mins;
            app.resume_activity().unwrap().unwrap();
        }
        clock.advance(Duration::minutes(tail));
        wall += tail;

        let stopped = app.stop_activity().unwrap().unwrap();
        prop_assert_eq!(stopped.paused_duration_secs, paused * 60);
        prop_assert_eq!(stopped.elapsed(clock.now()), Duration::minutes(wall - paused));
    }

    /// Any interleaving of ops on two devices converges to one shared
    /// running slot and no stranded pending records.
    #[test]
    fn two_devices_always_converge(
        ops in prop::collection::vec((0usize..2, 0usize..4, 1i64..90), 1..12),
    ) {
        let clock = Rc::new(ManualClock::new(t0()));
        let remote = SharedRemote::new();
        let apps = [
            device(&remote, &clock, "catat-a"),
            device(&remote, &clock, "catat-b"),
        ];

        let mut counter = 0usize;
        for (which, op, advance_mins) in ops {
            clock.advance(Duration::minutes(advance_mins));
            let app = &apps[which];
            match op {
                0 => {
                    counter += 1;
                    app.start_activity(&format!("activity-{counter}"), "work").unwrap();
                }
                1 => { app.stop_activity().unwrap(); }
                2 => { app.pause_activity(PauseReason::Rest, None).unwrap(); }
                _ => { app.resume_activity().unwrap(); }
            }
        }

        clock.advance(Duration::minutes(1));
        apps[0].sync_now().unwrap();
        apps[1].sync_now().unwrap();
        apps[0].sync_now().unwrap();
        apps[1].sync_now().unwrap();

        prop_assert_eq!(apps[0].pending_sync_count().unwrap(), 0);
        prop_assert_eq!(apps[1].pending_sync_count().unwrap(), 0);

        let running_a = apps[0].current_activity().unwrap().map(|a| a.id);
        let running_b = apps[1].current_activity().unwrap().map(|a| a.id);
        prop_assert_eq!(running_a, running_b);
    }
}
