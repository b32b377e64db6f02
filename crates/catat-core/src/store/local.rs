//! SQLite-backed local record store.
//!
//! Implements the record-store contract for every entity: typed CRUD,
//! pending-change listing, mark-synced, and last-write-wins upsert from
//! remote. Windows, flow templates and unlogged blocks live in local-only
//! tables without sync columns.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::StoreError;
use crate::model::{
    Activity, ActivitySource, AdHocTask, FlowTemplate, GuidedFlowLog, HaidMode, PauseLog,
    PauseReason, SafetyWindow, SyncState, TaskExecutionState, UnloggedBlock,
};
use crate::sync::types::{RecordKind, SyncRecord};

use super::data_dir;

/// Local store. One connection, caller-serialized access.
pub struct LocalStore {
    conn: Connection,
}

impl LocalStore {
    /// Open the store at `~/.config/catat/catat.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn open() -> Result<Self, StoreError> {
        let path = data_dir()
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?
            .join("catat.db");
        let conn = Connection::open(&path).map_err(|source| StoreError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory store (for tests).
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS activities (
                    id                   TEXT PRIMARY KEY,
                    name                 TEXT NOT NULL,
                    category             TEXT NOT NULL,
                    start_time           TEXT NOT NULL,
                    end_time             TEXT,
                    is_running           INTEGER NOT NULL,
                    is_paused            INTEGER NOT NULL,
                    paused_at            TEXT,
                    paused_duration_secs INTEGER NOT NULL DEFAULT 0,
                    source               TEXT NOT NULL,
                    linked_flow_id       TEXT,
                    memo                 TEXT,
                    owner_id             TEXT NOT NULL,
                    device_id            TEXT NOT NULL,
                    updated_at           TEXT NOT NULL,
                    sync_status          INTEGER NOT NULL DEFAULT 1
                );

                CREATE TABLE IF NOT EXISTS pause_logs (
                    id            TEXT PRIMARY KEY,
                    activity_id   TEXT NOT NULL,
                    pause_time    TEXT NOT NULL,
                    resume_time   TEXT,
                    reason        TEXT NOT NULL,
                    custom_reason TEXT,
                    owner_id      TEXT NOT NULL,
                    device_id     TEXT NOT NULL,
                    updated_at    TEXT NOT NULL,
                    sync_status   INTEGER NOT NULL DEFAULT 1
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id                   TEXT PRIMARY KEY,
                    title                TEXT NOT NULL,
                    description          TEXT,
                    execution_state      TEXT NOT NULL,
                    started_at           TEXT,
                    completed_at         TEXT,
                    linked_activity_id   TEXT,
                    is_paused            INTEGER NOT NULL DEFAULT 0,
                    paused_at            TEXT,
                    paused_duration_secs INTEGER NOT NULL DEFAULT 0,
                    alarm_time           TEXT,
                    alarm_triggered      INTEGER NOT NULL DEFAULT 0,
                    sort_order           INTEGER NOT NULL DEFAULT 0,
                    owner_id             TEXT NOT NULL,
                    device_id            TEXT NOT NULL,
                    updated_at           TEXT NOT NULL,
                    sync_status          INTEGER NOT NULL DEFAULT 1
                );

                CREATE TABLE IF NOT EXISTS flow_logs (
                    id               TEXT PRIMARY KEY,
                    flow_id          TEXT NOT NULL,
                    day              TEXT NOT NULL,
                    triggered_at     TEXT,
                    completed_at     TEXT,
                    steps_completed  INTEGER NOT NULL DEFAULT 0,
                    total_steps      INTEGER NOT NULL DEFAULT 0,
                    was_abandoned    INTEGER NOT NULL DEFAULT 0,
                    was_missed       INTEGER NOT NULL DEFAULT 0,
                    was_skipped_haid INTEGER NOT NULL DEFAULT 0,
                    owner_id         TEXT NOT NULL,
                    device_id        TEXT NOT NULL,
                    updated_at       TEXT NOT NULL,
                    sync_status      INTEGER NOT NULL DEFAULT 1,
                    UNIQUE(flow_id, day)
                );

                CREATE TABLE IF NOT EXISTS haid_mode (
                    id               TEXT PRIMARY KEY,
                    is_active        INTEGER NOT NULL DEFAULT 0,
                    start_date       TEXT,
                    last_prompt_date TEXT,
                    owner_id         TEXT NOT NULL,
                    device_id        TEXT NOT NULL,
                    updated_at       TEXT NOT NULL,
                    sync_status      INTEGER NOT NULL DEFAULT 1
                );

                CREATE TABLE IF NOT EXISTS windows (
                    id             TEXT PRIMARY KEY,
                    start_hour     INTEGER NOT NULL,
                    start_minute   INTEGER NOT NULL,
                    end_hour       INTEGER NOT NULL,
                    end_minute     INTEGER NOT NULL,
                    linked_flow_id TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS flow_templates (
                    id       TEXT PRIMARY KEY,
                    name     TEXT NOT NULL,
                    category TEXT NOT NULL,
                    steps    TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS unlogged_blocks (
                    id          TEXT PRIMARY KEY,
                    block_start TEXT NOT NULL,
                    block_end   TEXT NOT NULL,
                    created_at  TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_activities_running ON activities(is_running);
                CREATE INDEX IF NOT EXISTS idx_activities_start ON activities(start_time);
                CREATE INDEX IF NOT EXISTS idx_pause_logs_activity ON pause_logs(activity_id);
                CREATE INDEX IF NOT EXISTS idx_tasks_state ON tasks(execution_state);
                CREATE INDEX IF NOT EXISTS idx_flow_logs_day ON flow_logs(flow_id, day);",
            )
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    // ── Activities ───────────────────────────────────────────────────

    pub fn insert_activity(&self, a: &Activity) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO activities (id, name, category, start_time, end_time, is_running,
                is_paused, paused_at, paused_duration_secs, source, linked_flow_id, memo,
                owner_id, device_id, updated_at, sync_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                a.id,
                a.name,
                a.category,
                a.start_time.to_rfc3339(),
                a.end_time.map(|t| t.to_rfc3339()),
                a.is_running as i64,
                a.is_paused as i64,
                a.paused_at.map(|t| t.to_rfc3339()),
                a.paused_duration_secs,
                source_str(a.source),
                a.linked_flow_id,
                a.memo,
                a.owner_id,
                a.device_id,
                a.updated_at.to_rfc3339(),
                a.sync_status.to_i64(),
            ],
        )?;
        Ok(())
    }

    pub fn update_activity(&self, a: &Activity) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE activities SET name=?2, category=?3, start_time=?4, end_time=?5,
                is_running=?6, is_paused=?7, paused_at=?8, paused_duration_secs=?9,
                source=?10, linked_flow_id=?11, memo=?12, owner_id=?13, device_id=?14,
                updated_at=?15, sync_status=?16
             WHERE id=?1",
            params![
                a.id,
                a.name,
                a.category,
                a.start_time.to_rfc3339(),
                a.end_time.map(|t| t.to_rfc3339()),
                a.is_running as i64,
                a.is_paused as i64,
                a.paused_at.map(|t| t.to_rfc3339()),
                a.paused_duration_secs,
                source_str(a.source),
                a.linked_flow_id,
                a.memo,
                a.owner_id,
                a.device_id,
                a.updated_at.to_rfc3339(),
                a.sync_status.to_i64(),
            ],
        )?;
        Ok(())
    }

    pub fn get_activity(&self, id: &str) -> Result<Option<Activity>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM activities WHERE id = ?1")?;
        Ok(stmt
            .query_row(params![id], row_to_activity)
            .optional()?)
    }

    pub fn delete_activity(&self, id: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM activities WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// The single activity with `is_running = true`, if any.
    pub fn running_activity(&self) -> Result<Option<Activity>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM activities WHERE is_running = 1 ORDER BY start_time DESC LIMIT 1",
        )?;
        Ok(stmt.query_row([], row_to_activity).optional()?)
    }

    /// All running rows, oldest first. Normally zero or one; more only as a
    /// transient inconsistency resolved by sanitization/reconciliation.
    pub fn running_activities(&self) -> Result<Vec<Activity>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM activities WHERE is_running = 1 ORDER BY start_time ASC")?;
        let rows = stmt.query_map([], row_to_activity)?;
        collect(rows)
    }

    /// Open (no end time) activities: running or paused.
    pub fn open_activities(&self) -> Result<Vec<Activity>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM activities WHERE end_time IS NULL ORDER BY start_time ASC")?;
        let rows = stmt.query_map([], row_to_activity)?;
        collect(rows)
    }

    /// Activities overlapping [from, to).
    pub fn activities_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Activity>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM activities
             WHERE start_time < ?2 AND (end_time IS NULL OR end_time > ?1)
             ORDER BY start_time ASC",
        )?;
        let rows = stmt.query_map(params![from.to_rfc3339(), to.to_rfc3339()], row_to_activity)?;
        collect(rows)
    }

    /// Total tracked seconds per category over closed activities in [from, to).
    /// Spans crossing a boundary count only their portion inside the range.
    pub fn duration_by_category(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        let activities = self.activities_between(from, to)?;
        let mut totals: std::collections::BTreeMap<String, i64> = Default::default();
        for a in activities.iter() {
            let Some(end) = a.end_time else { continue };
            let clipped = (end.min(to) - a.start_time.max(from)).num_seconds().max(0);
            let secs = (clipped - a.paused_duration_secs).max(0);
            *totals.entry(a.category.clone()).or_default() += secs;
        }
        Ok(totals.into_iter().collect())
    }

    // ── Pause logs ───────────────────────────────────────────────────

    pub fn insert_pause_log(&self, p: &PauseLog) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO pause_logs (id, activity_id, pause_time, resume_time, reason,
                custom_reason, owner_id, device_id, updated_at, sync_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                p.id,
                p.activity_id,
                p.pause_time.to_rfc3339(),
                p.resume_time.map(|t| t.to_rfc3339()),
                reason_str(p.reason),
                p.custom_reason,
                p.owner_id,
                p.device_id,
                p.updated_at.to_rfc3339(),
                p.sync_status.to_i64(),
            ],
        )?;
        Ok(())
    }

    pub fn update_pause_log(&self, p: &PauseLog) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE pause_logs SET activity_id=?2, pause_time=?3, resume_time=?4, reason=?5,
                custom_reason=?6, owner_id=?7, device_id=?8, updated_at=?9, sync_status=?10
             WHERE id=?1",
            params![
                p.id,
                p.activity_id,
                p.pause_time.to_rfc3339(),
                p.resume_time.map(|t| t.to_rfc3339()),
                reason_str(p.reason),
                p.custom_reason,
                p.owner_id,
                p.device_id,
                p.updated_at.to_rfc3339(),
                p.sync_status.to_i64(),
            ],
        )?;
        Ok(())
    }

    /// The still-open pause interval for an activity, if any.
    pub fn open_pause_log(&self, activity_id: &str) -> Result<Option<PauseLog>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM pause_logs
             WHERE activity_id = ?1 AND resume_time IS NULL
             ORDER BY pause_time DESC LIMIT 1",
        )?;
        Ok(stmt
            .query_row(params![activity_id], row_to_pause_log)
            .optional()?)
    }

    pub fn pause_logs_for(&self, activity_id: &str) -> Result<Vec<PauseLog>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM pause_logs WHERE activity_id = ?1 ORDER BY pause_time ASC",
        )?;
        let rows = stmt.query_map(params![activity_id], row_to_pause_log)?;
        collect(rows)
    }

    // ── Tasks ────────────────────────────────────────────────────────

    pub fn insert_task(&self, t: &AdHocTask) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO tasks (id, title, description, execution_state, started_at,
                completed_at, linked_activity_id, is_paused, paused_at, paused_duration_secs,
                alarm_time, alarm_triggered, sort_order, owner_id, device_id, updated_at,
                sync_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                t.id,
                t.title,
                t.description,
                exec_state_str(t.execution_state),
                t.started_at.map(|x| x.to_rfc3339()),
                t.completed_at.map(|x| x.to_rfc3339()),
                t.linked_activity_id,
                t.is_paused as i64,
                t.paused_at.map(|x| x.to_rfc3339()),
                t.paused_duration_secs,
                t.alarm_time.map(|x| x.to_rfc3339()),
                t.alarm_triggered as i64,
                t.sort_order,
                t.owner_id,
                t.device_id,
                t.updated_at.to_rfc3339(),
                t.sync_status.to_i64(),
            ],
        )?;
        Ok(())
    }

    pub fn update_task(&self, t: &AdHocTask) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE tasks SET title=?2, description=?3, execution_state=?4, started_at=?5,
                completed_at=?6, linked_activity_id=?7, is_paused=?8, paused_at=?9,
                paused_duration_secs=?10, alarm_time=?11, alarm_triggered=?12, sort_order=?13,
                owner_id=?14, device_id=?15, updated_at=?16, sync_status=?17
             WHERE id=?1",
            params![
                t.id,
                t.title,
                t.description,
                exec_state_str(t.execution_state),
                t.started_at.map(|x| x.to_rfc3339()),
                t.completed_at.map(|x| x.to_rfc3339()),
                t.linked_activity_id,
                t.is_paused as i64,
                t.paused_at.map(|x| x.to_rfc3339()),
                t.paused_duration_secs,
                t.alarm_time.map(|x| x.to_rfc3339()),
                t.alarm_triggered as i64,
                t.sort_order,
                t.owner_id,
                t.device_id,
                t.updated_at.to_rfc3339(),
                t.sync_status.to_i64(),
            ],
        )?;
        Ok(())
    }

    pub fn get_task(&self, id: &str) -> Result<Option<AdHocTask>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT * FROM tasks WHERE id = ?1")?;
        Ok(stmt.query_row(params![id], row_to_task).optional()?)
    }

    pub fn delete_task(&self, id: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Open tasks (pending + in progress) in sort order.
    pub fn open_tasks(&self) -> Result<Vec<AdHocTask>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM tasks WHERE execution_state != 'completed'
             ORDER BY sort_order ASC, updated_at ASC",
        )?;
        let rows = stmt.query_map([], row_to_task)?;
        collect(rows)
    }

    pub fn max_sort_order(&self) -> Result<i64, StoreError> {
        let max: Option<i64> = self
            .conn
            .query_row("SELECT MAX(sort_order) FROM tasks", [], |row| row.get(0))?;
        Ok(max.unwrap_or(0))
    }

    // ── Flow logs ────────────────────────────────────────────────────

    pub fn insert_flow_log(&self, l: &GuidedFlowLog) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO flow_logs (id, flow_id, day, triggered_at, completed_at,
                steps_completed, total_steps, was_abandoned, was_missed, was_skipped_haid,
                owner_id, device_id, updated_at, sync_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                l.id,
                l.flow_id,
                l.day.to_string(),
                l.triggered_at.map(|t| t.to_rfc3339()),
                l.completed_at.map(|t| t.to_rfc3339()),
                l.steps_completed,
                l.total_steps,
                l.was_abandoned as i64,
                l.was_missed as i64,
                l.was_skipped_haid as i64,
                l.owner_id,
                l.device_id,
                l.updated_at.to_rfc3339(),
                l.sync_status.to_i64(),
            ],
        )?;
        Ok(())
    }

    pub fn update_flow_log(&self, l: &GuidedFlowLog) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE flow_logs SET flow_id=?2, day=?3, triggered_at=?4, completed_at=?5,
                steps_completed=?6, total_steps=?7, was_abandoned=?8, was_missed=?9,
                was_skipped_haid=?10, owner_id=?11, device_id=?12, updated_at=?13,
                sync_status=?14
             WHERE id=?1",
            params![
                l.id,
                l.flow_id,
                l.day.to_string(),
                l.triggered_at.map(|t| t.to_rfc3339()),
                l.completed_at.map(|t| t.to_rfc3339()),
                l.steps_completed,
                l.total_steps,
                l.was_abandoned as i64,
                l.was_missed as i64,
                l.was_skipped_haid as i64,
                l.owner_id,
                l.device_id,
                l.updated_at.to_rfc3339(),
                l.sync_status.to_i64(),
            ],
        )?;
        Ok(())
    }

    pub fn get_flow_log(&self, id: &str) -> Result<Option<GuidedFlowLog>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT * FROM flow_logs WHERE id = ?1")?;
        Ok(stmt.query_row(params![id], row_to_flow_log).optional()?)
    }

    /// The occurrence log for one (template, day), if written.
    pub fn flow_log_for(
        &self,
        flow_id: &str,
        day: NaiveDate,
    ) -> Result<Option<GuidedFlowLog>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM flow_logs WHERE flow_id = ?1 AND day = ?2")?;
        Ok(stmt
            .query_row(params![flow_id, day.to_string()], row_to_flow_log)
            .optional()?)
    }

    // ── Haid mode ────────────────────────────────────────────────────

    pub fn get_haid_mode(&self) -> Result<Option<HaidMode>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT * FROM haid_mode WHERE id = ?1")?;
        Ok(stmt
            .query_row(params![HaidMode::RECORD_ID], row_to_haid)
            .optional()?)
    }

    pub fn upsert_haid_mode(&self, h: &HaidMode) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO haid_mode (id, is_active, start_date, last_prompt_date, owner_id,
                device_id, updated_at, sync_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET is_active=?2, start_date=?3, last_prompt_date=?4,
                owner_id=?5, device_id=?6, updated_at=?7, sync_status=?8",
            params![
                h.id,
                h.is_active as i64,
                h.start_date.map(|t| t.to_rfc3339()),
                h.last_prompt_date.map(|t| t.to_rfc3339()),
                h.owner_id,
                h.device_id,
                h.updated_at.to_rfc3339(),
                h.sync_status.to_i64(),
            ],
        )?;
        Ok(())
    }

    // ── Windows & templates (local-only) ─────────────────────────────

    pub fn insert_window(&self, w: &SafetyWindow) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO windows (id, start_hour, start_minute, end_hour,
                end_minute, linked_flow_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                w.id,
                w.start_hour,
                w.start_minute,
                w.end_hour,
                w.end_minute,
                w.linked_flow_id
            ],
        )?;
        Ok(())
    }

    pub fn windows(&self) -> Result<Vec<SafetyWindow>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM windows ORDER BY start_hour, start_minute")?;
        let rows = stmt.query_map([], row_to_window)?;
        collect(rows)
    }

    pub fn get_window(&self, id: &str) -> Result<Option<SafetyWindow>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT * FROM windows WHERE id = ?1")?;
        Ok(stmt.query_row(params![id], row_to_window).optional()?)
    }

    pub fn delete_window(&self, id: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM windows WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn insert_template(&self, t: &FlowTemplate) -> Result<(), StoreError> {
        let steps = serde_json::to_string(&t.steps)
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        self.conn.execute(
            "INSERT OR REPLACE INTO flow_templates (id, name, category, steps)
             VALUES (?1, ?2, ?3, ?4)",
            params![t.id, t.name, t.category, steps],
        )?;
        Ok(())
    }

    pub fn get_template(&self, id: &str) -> Result<Option<FlowTemplate>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM flow_templates WHERE id = ?1")?;
        Ok(stmt.query_row(params![id], row_to_template).optional()?)
    }

    pub fn templates(&self) -> Result<Vec<FlowTemplate>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT * FROM flow_templates ORDER BY name")?;
        let rows = stmt.query_map([], row_to_template)?;
        collect(rows)
    }

    // ── Unlogged blocks (local-only) ─────────────────────────────────

    pub fn insert_unlogged_block(&self, b: &UnloggedBlock) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO unlogged_blocks (id, block_start, block_end, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                b.id,
                b.block_start.to_rfc3339(),
                b.block_end.to_rfc3339(),
                b.created_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn unlogged_blocks(&self) -> Result<Vec<UnloggedBlock>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM unlogged_blocks ORDER BY block_start ASC")?;
        let rows = stmt.query_map([], row_to_block)?;
        collect(rows)
    }

    pub fn get_unlogged_block(&self, id: &str) -> Result<Option<UnloggedBlock>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM unlogged_blocks WHERE id = ?1")?;
        Ok(stmt.query_row(params![id], row_to_block).optional()?)
    }

    pub fn delete_unlogged_block(&self, id: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM unlogged_blocks WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Delete blocks created before the cutoff. Returns the pruned count.
    pub fn prune_unlogged_blocks(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let n = self.conn.execute(
            "DELETE FROM unlogged_blocks WHERE created_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(n)
    }

    // ── Sync primitives ──────────────────────────────────────────────

    /// All records of a kind with `sync_status = pending`, as wire records.
    pub fn list_pending(&self, kind: RecordKind) -> Result<Vec<SyncRecord>, StoreError> {
        let records = match kind {
            RecordKind::Activity => {
                let mut stmt = self
                    .conn
                    .prepare("SELECT * FROM activities WHERE sync_status = 1")?;
                let rows = collect(stmt.query_map([], row_to_activity)?)?;
                rows.iter()
                    .map(|a| SyncRecord::encode(kind, &a.id, a.updated_at, a))
                    .collect::<Result<Vec<_>, _>>()
            }
            RecordKind::AdHocTask => {
                let mut stmt = self
                    .conn
                    .prepare("SELECT * FROM tasks WHERE sync_status = 1")?;
                let rows = collect(stmt.query_map([], row_to_task)?)?;
                rows.iter()
                    .map(|t| SyncRecord::encode(kind, &t.id, t.updated_at, t))
                    .collect::<Result<Vec<_>, _>>()
            }
            RecordKind::PauseLog => {
                let mut stmt = self
                    .conn
                    .prepare("SELECT * FROM pause_logs WHERE sync_status = 1")?;
                let rows = collect(stmt.query_map([], row_to_pause_log)?)?;
                rows.iter()
                    .map(|p| SyncRecord::encode(kind, &p.id, p.updated_at, p))
                    .collect::<Result<Vec<_>, _>>()
            }
            RecordKind::GuidedFlowLog => {
                let mut stmt = self
                    .conn
                    .prepare("SELECT * FROM flow_logs WHERE sync_status = 1")?;
                let rows = collect(stmt.query_map([], row_to_flow_log)?)?;
                rows.iter()
                    .map(|l| SyncRecord::encode(kind, &l.id, l.updated_at, l))
                    .collect::<Result<Vec<_>, _>>()
            }
            RecordKind::HaidMode => {
                let mut stmt = self
                    .conn
                    .prepare("SELECT * FROM haid_mode WHERE sync_status = 1")?;
                let rows = collect(stmt.query_map([], row_to_haid)?)?;
                rows.iter()
                    .map(|h| SyncRecord::encode(kind, &h.id, h.updated_at, h))
                    .collect::<Result<Vec<_>, _>>()
            }
        };
        records.map_err(|e| StoreError::QueryFailed(e.to_string()))
    }

    /// Count of pending rows across every synced table.
    pub fn pending_count(&self) -> Result<usize, StoreError> {
        let mut total = 0usize;
        for kind in RecordKind::all() {
            let n: i64 = self.conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE sync_status = 1",
                    kind.table()
                ),
                [],
                |row| row.get(0),
            )?;
            total += n as usize;
        }
        Ok(total)
    }

    pub fn mark_synced(&self, kind: RecordKind, id: &str) -> Result<(), StoreError> {
        self.conn.execute(
            &format!("UPDATE {} SET sync_status = 0 WHERE id = ?1", kind.table()),
            params![id],
        )?;
        Ok(())
    }

    /// The local `updated_at` for a record, if it exists.
    pub fn local_updated_at(
        &self,
        kind: RecordKind,
        id: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let ts: Option<String> = self
            .conn
            .query_row(
                &format!("SELECT updated_at FROM {} WHERE id = ?1", kind.table()),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match ts {
            Some(ts) => Ok(Some(parse_ts(&ts)?)),
            None => Ok(None),
        }
    }

    /// Apply a remote record under last-write-wins: a strictly newer remote
    /// overwrites the local row unconditionally (including `is_running`);
    /// otherwise nothing changes. Applied rows land as `synced`.
    ///
    /// Returns whether the record was applied.
    pub fn upsert_from_remote(&self, record: &SyncRecord) -> Result<bool, StoreError> {
        if let Some(local_ts) = self.local_updated_at(record.kind, &record.id)? {
            if record.updated_at <= local_ts {
                return Ok(false);
            }
        }

        let decode_err = |e: crate::error::SyncError| StoreError::CorruptRecord {
            table: record.kind.table().to_string(),
            id: record.id.clone(),
            message: e.to_string(),
        };

        let exists = self.local_updated_at(record.kind, &record.id)?.is_some();
        match record.kind {
            RecordKind::Activity => {
                let mut a: Activity = record.decode().map_err(decode_err)?;
                a.sync_status = SyncState::Synced;
                if exists {
                    self.update_activity(&a)?;
                } else {
                    self.insert_activity(&a)?;
                }
            }
            RecordKind::AdHocTask => {
                let mut t: AdHocTask = record.decode().map_err(decode_err)?;
                t.sync_status = SyncState::Synced;
                if exists {
                    self.update_task(&t)?;
                } else {
                    self.insert_task(&t)?;
                }
            }
            RecordKind::PauseLog => {
                let mut p: PauseLog = record.decode().map_err(decode_err)?;
                p.sync_status = SyncState::Synced;
                if exists {
                    self.update_pause_log(&p)?;
                } else {
                    self.insert_pause_log(&p)?;
                }
            }
            RecordKind::GuidedFlowLog => {
                let mut l: GuidedFlowLog = record.decode().map_err(decode_err)?;
                l.sync_status = SyncState::Synced;
                if exists {
                    self.update_flow_log(&l)?;
                } else {
                    self.insert_flow_log(&l)?;
                }
            }
            RecordKind::HaidMode => {
                let mut h: HaidMode = record.decode().map_err(decode_err)?;
                h.sync_status = SyncState::Synced;
                self.upsert_haid_mode(&h)?;
            }
        }
        Ok(true)
    }
}

// ── Row mapping ──────────────────────────────────────────────────────

fn collect<T>(
    rows: rusqlite::MappedRows<'_, impl FnMut(&Row<'_>) -> rusqlite::Result<T>>,
) -> Result<Vec<T>, StoreError> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("bad timestamp '{s}': {e}")))
}

fn ts_col(row: &Row<'_>, idx: &str) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn opt_ts_col(row: &Row<'_>, idx: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(s) => ts_col_from(&s).map(Some),
        None => Ok(None),
    }
}

fn ts_col_from(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn source_from(s: &str) -> ActivitySource {
    match s {
        "guidedFlow" => ActivitySource::GuidedFlow,
        "autoLogged" => ActivitySource::AutoLogged,
        _ => ActivitySource::Manual,
    }
}

fn source_str(s: ActivitySource) -> &'static str {
    match s {
        ActivitySource::Manual => "manual",
        ActivitySource::GuidedFlow => "guidedFlow",
        ActivitySource::AutoLogged => "autoLogged",
    }
}

fn reason_from(s: &str) -> PauseReason {
    match s {
        "rest" => PauseReason::Rest,
        "errand" => PauseReason::Errand,
        "adHocInterruption" => PauseReason::AdHocInterruption,
        _ => PauseReason::Other,
    }
}

fn reason_str(r: PauseReason) -> &'static str {
    match r {
        PauseReason::Rest => "rest",
        PauseReason::Errand => "errand",
        PauseReason::AdHocInterruption => "adHocInterruption",
        PauseReason::Other => "other",
    }
}

fn exec_state_from(s: &str) -> TaskExecutionState {
    match s {
        "inProgress" => TaskExecutionState::InProgress,
        "completed" => TaskExecutionState::Completed,
        _ => TaskExecutionState::Pending,
    }
}

fn exec_state_str(s: TaskExecutionState) -> &'static str {
    match s {
        TaskExecutionState::Pending => "pending",
        TaskExecutionState::InProgress => "inProgress",
        TaskExecutionState::Completed => "completed",
    }
}

fn row_to_activity(row: &Row<'_>) -> rusqlite::Result<Activity> {
    let source: String = row.get("source")?;
    Ok(Activity {
        id: row.get("id")?,
        name: row.get("name")?,
        category: row.get("category")?,
        start_time: ts_col(row, "start_time")?,
        end_time: opt_ts_col(row, "end_time")?,
        is_running: row.get::<_, i64>("is_running")? != 0,
        is_paused: row.get::<_, i64>("is_paused")? != 0,
        paused_at: opt_ts_col(row, "paused_at")?,
        paused_duration_secs: row.get("paused_duration_secs")?,
        source: source_from(&source),
        linked_flow_id: row.get("linked_flow_id")?,
        memo: row.get("memo")?,
        owner_id: row.get("owner_id")?,
        device_id: row.get("device_id")?,
        updated_at: ts_col(row, "updated_at")?,
        sync_status: SyncState::from_i64(row.get("sync_status")?),
    })
}

fn row_to_pause_log(row: &Row<'_>) -> rusqlite::Result<PauseLog> {
    let reason: String = row.get("reason")?;
    Ok(PauseLog {
        id: row.get("id")?,
        activity_id: row.get("activity_id")?,
        pause_time: ts_col(row, "pause_time")?,
        resume_time: opt_ts_col(row, "resume_time")?,
        reason: reason_from(&reason),
        custom_reason: row.get("custom_reason")?,
        owner_id: row.get("owner_id")?,
        device_id: row.get("device_id")?,
        updated_at: ts_col(row, "updated_at")?,
        sync_status: SyncState::from_i64(row.get("sync_status")?),
    })
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<AdHocTask> {
    let state: String = row.get("execution_state")?;
    Ok(AdHocTask {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        execution_state: exec_state_from(&state),
        started_at: opt_ts_col(row, "started_at")?,
        completed_at: opt_ts_col(row, "completed_at")?,
        linked_activity_id: row.get("linked_activity_id")?,
        is_paused: row.get::<_, i64>("is_paused")? != 0,
        paused_at: opt_ts_col(row, "paused_at")?,
        paused_duration_secs: row.get("paused_duration_secs")?,
        alarm_time: opt_ts_col(row, "alarm_time")?,
        alarm_triggered: row.get::<_, i64>("alarm_triggered")? != 0,
        sort_order: row.get("sort_order")?,
        owner_id: row.get("owner_id")?,
        device_id: row.get("device_id")?,
        updated_at: ts_col(row, "updated_at")?,
        sync_status: SyncState::from_i64(row.get("sync_status")?),
    })
}

fn row_to_flow_log(row: &Row<'_>) -> rusqlite::Result<GuidedFlowLog> {
    let day: String = row.get("day")?;
    Ok(GuidedFlowLog {
        id: row.get("id")?,
        flow_id: row.get("flow_id")?,
        day: day.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?,
        triggered_at: opt_ts_col(row, "triggered_at")?,
        completed_at: opt_ts_col(row, "completed_at")?,
        steps_completed: row.get("steps_completed")?,
        total_steps: row.get("total_steps")?,
        was_abandoned: row.get::<_, i64>("was_abandoned")? != 0,
        was_missed: row.get::<_, i64>("was_missed")? != 0,
        was_skipped_haid: row.get::<_, i64>("was_skipped_haid")? != 0,
        owner_id: row.get("owner_id")?,
        device_id: row.get("device_id")?,
        updated_at: ts_col(row, "updated_at")?,
        sync_status: SyncState::from_i64(row.get("sync_status")?),
    })
}

fn row_to_haid(row: &Row<'_>) -> rusqlite::Result<HaidMode> {
    Ok(HaidMode {
        id: row.get("id")?,
        is_active: row.get::<_, i64>("is_active")? != 0,
        start_date: opt_ts_col(row, "start_date")?,
        last_prompt_date: opt_ts_col(row, "last_prompt_date")?,
        owner_id: row.get("owner_id")?,
        device_id: row.get("device_id")?,
        updated_at: ts_col(row, "updated_at")?,
        sync_status: SyncState::from_i64(row.get("sync_status")?),
    })
}

fn row_to_window(row: &Row<'_>) -> rusqlite::Result<SafetyWindow> {
    Ok(SafetyWindow {
        id: row.get("id")?,
        start_hour: row.get("start_hour")?,
        start_minute: row.get("start_minute")?,
        end_hour: row.get("end_hour")?,
        end_minute: row.get("end_minute")?,
        linked_flow_id: row.get("linked_flow_id")?,
    })
}

fn row_to_template(row: &Row<'_>) -> rusqlite::Result<FlowTemplate> {
    let steps: String = row.get("steps")?;
    Ok(FlowTemplate {
        id: row.get("id")?,
        name: row.get("name")?,
        category: row.get("category")?,
        steps: serde_json::from_str(&steps).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?,
    })
}

fn row_to_block(row: &Row<'_>) -> rusqlite::Result<UnloggedBlock> {
    Ok(UnloggedBlock {
        id: row.get("id")?,
        block_start: ts_col(row, "block_start")?,
        block_end: ts_col(row, "block_end")?,
        created_at: ts_col(row, "created_at")?,
    })
}
