//! Unlogged-time awareness.
//!
//! The day is divided into fixed blocks aligned to midnight UTC. A block
//! that has fully elapsed with no activity overlapping it becomes an
//! unlogged block, kept until the user logs it, dismisses it, or it ages
//! out. Detection is a sweep, so it catches up after any amount of
//! downtime.

use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::clock::Clock;
use crate::engine::activity::ActivityEngine;
use crate::error::Result;
use crate::model::{Activity, ActivitySource, UnloggedBlock};
use crate::store::LocalStore;

pub struct UnloggedTracker {
    store: Rc<LocalStore>,
    clock: Rc<dyn Clock>,
    block_minutes: i64,
    retention_days: i64,
}

impl UnloggedTracker {
    pub fn new(
        store: Rc<LocalStore>,
        clock: Rc<dyn Clock>,
        block_minutes: i64,
        retention_days: i64,
    ) -> Self {
        Self {
            store,
            clock,
            block_minutes,
            retention_days,
        }
    }

    pub fn blocks(&self) -> Result<Vec<UnloggedBlock>> {
        Ok(self.store.unlogged_blocks()?)
    }

    /// Sweep `[from, now)` for fully elapsed blocks with no overlapping
    /// activity, record them, then prune blocks past retention. Re-running
    /// over the same range changes nothing: block ids are derived from the
    /// block start, and inserts ignore duplicates.
    pub fn sweep(&self, from: DateTime<Utc>) -> Result<Vec<UnloggedBlock>> {
        let now = self.clock.now();
        let block = Duration::minutes(self.block_minutes);
        let mut cursor = align_down(from, self.block_minutes);
        let activities = self.store.activities_between(cursor, now)?;
        let mut found = Vec::new();

        while cursor + block <= now {
            let block_end = cursor + block;
            let id = block_id(cursor);
            if !overlaps_any(&activities, cursor, block_end)
                && self.store.get_unlogged_block(&id)?.is_none()
            {
                let record = UnloggedBlock {
                    id,
                    block_start: cursor,
                    block_end,
                    created_at: now,
                };
                self.store.insert_unlogged_block(&record)?;
                found.push(record);
            }
            cursor = block_end;
        }

        self.store
            .prune_unlogged_blocks(now - Duration::days(self.retention_days))?;
        Ok(found)
    }

    /// Log a block retroactively as an auto-logged activity covering the
    /// block span, then drop the block.
    pub fn resolve(
        &self,
        activities: &ActivityEngine,
        block_id: &str,
        name: &str,
        category: &str,
    ) -> Result<Option<Activity>> {
        let Some(block) = self.store.get_unlogged_block(block_id)? else {
            return Ok(None);
        };
        let activity = activities.log_span(
            name,
            category,
            ActivitySource::AutoLogged,
            block.block_start,
            block.block_end,
        )?;
        self.store.delete_unlogged_block(block_id)?;
        Ok(Some(activity))
    }

    /// Drop a block without logging anything.
    pub fn dismiss(&self, block_id: &str) -> Result<()> {
        Ok(self.store.delete_unlogged_block(block_id)?)
    }
}

fn align_down(at: DateTime<Utc>, block_minutes: i64) -> DateTime<Utc> {
    let midnight = at
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc();
    let offset_mins = (at - midnight).num_minutes();
    midnight + Duration::minutes(offset_mins - offset_mins % block_minutes)
}

fn block_id(block_start: DateTime<Utc>) -> String {
    format!("unlogged-{}", block_start.format("%Y%m%dT%H%M"))
}

fn overlaps_any(activities: &[Activity], start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    activities.iter().any(|a| {
        let a_end = a.end_time.unwrap_or(end);
        a.start_time < end && a_end > start
    })
}
