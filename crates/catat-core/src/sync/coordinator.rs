//! Event-triggered sync coordinator.
//!
//! There is no periodic schedule: every mutating operation names a trigger
//! and the coordinator runs one push/pull/reconcile round per trigger.
//! Offline is a steady state -- pending records accumulate locally and the
//! next triggered round drains them. Conflict resolution is last-write-wins
//! per whole record; the one exception is the running-activity slot, where
//! the remote view wins outright.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{Result, SyncError};
use crate::events::{ChangeEvent, SyncTrigger};
use crate::model::{Activity, SyncState};
use crate::store::{LocalStore, Notifier, RemoteStore};
use crate::sync::types::{RecordKind, SyncOutcome, SyncRecord};

pub struct SyncCoordinator {
    store: Rc<LocalStore>,
    clock: Rc<dyn Clock>,
    notifier: Rc<Notifier>,
    remote: RefCell<Box<dyn RemoteStore>>,
    owner_id: String,
    last_sync_at: Cell<Option<DateTime<Utc>>>,
    last_outcome: RefCell<SyncOutcome>,
}

impl SyncCoordinator {
    pub fn new(
        store: Rc<LocalStore>,
        clock: Rc<dyn Clock>,
        notifier: Rc<Notifier>,
        remote: Box<dyn RemoteStore>,
        owner_id: String,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
            remote: RefCell::new(remote),
            owner_id,
            last_sync_at: Cell::new(None),
            last_outcome: RefCell::new(SyncOutcome::Idle),
        }
    }

    /// `Syncing` while a round is in flight, otherwise the last round's
    /// outcome.
    pub fn status(&self) -> SyncOutcome {
        self.last_outcome.borrow().clone()
    }

    pub fn pending_count(&self) -> Result<usize> {
        Ok(self.store.pending_count()?)
    }

    /// Run one sync round. Connectivity problems are reported through the
    /// outcome, never as an `Err`; only local store failures bubble up.
    pub fn trigger_sync(&self, trigger: SyncTrigger) -> Result<SyncOutcome> {
        debug!(trigger = trigger.as_str(), "sync triggered");
        *self.last_outcome.borrow_mut() = SyncOutcome::Syncing;

        if !self.remote.borrow().is_available() {
            return self.finish_offline();
        }

        let mut pushed = 0usize;
        let mut rejected = 0usize;
        for kind in RecordKind::all() {
            for record in self.store.list_pending(kind)? {
                match self.remote.borrow_mut().push(&record) {
                    Ok(()) => {
                        self.store.mark_synced(kind, &record.id)?;
                        pushed += 1;
                    }
                    Err(SyncError::Unavailable) => return self.finish_offline(),
                    Err(e) => {
                        // Stays pending; the next trigger retries it.
                        warn!(id = %record.id, error = %e, "push rejected");
                        rejected += 1;
                    }
                }
            }
        }

        let fetched = match self.remote.borrow().fetch_since(self.last_sync_at.get()) {
            Ok(records) => records,
            Err(SyncError::Unavailable) => return self.finish_offline(),
            Err(e) => return self.finish_error(e),
        };
        let mut pulled = 0usize;
        for record in &fetched {
            if self.store.upsert_from_remote(record)? {
                pulled += 1;
            }
        }

        match self.reconcile_running() {
            Ok(extra) => pushed += extra,
            Err(SyncError::Unavailable) => return self.finish_offline(),
            Err(e) => return self.finish_error(e),
        }

        self.last_sync_at.set(Some(self.clock.now()));
        let outcome = if rejected > 0 {
            SyncOutcome::Error {
                message: format!("{rejected} record(s) rejected by remote"),
                pending: self.store.pending_count()?,
            }
        } else {
            SyncOutcome::Success { pushed, pulled }
        };
        *self.last_outcome.borrow_mut() = outcome.clone();
        self.notifier.publish(ChangeEvent::SyncFinished {
            pushed,
            pulled,
            at: self.clock.now(),
        });
        Ok(outcome)
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Repair the single-running-activity invariant across devices.
    ///
    /// When the remote view holds several running activities, the one with
    /// the latest start wins and the rest are force-closed. When the local
    /// running activity disagrees with the surviving remote one, the remote
    /// view wins and the local activity is closed.
    fn reconcile_running(&self) -> std::result::Result<usize, SyncError> {
        let now = self.clock.now();
        let mut remote_running = self.remote.borrow().running_activities(&self.owner_id)?;
        let mut pushed = 0usize;

        let authoritative = remote_running
            .iter()
            .max_by_key(|a| a.start_time)
            .map(|a| a.id.clone());

        for mut activity in remote_running.drain(..) {
            if Some(&activity.id) == authoritative.as_ref() {
                continue;
            }
            close_now(&mut activity, now);
            let record = encode_activity(&activity)?;
            self.remote.borrow_mut().push(&record)?;
            self.store.upsert_from_remote(&record)?;
            pushed += 1;
        }

        if let Some(local) = self.store.running_activity().map_err(SyncError::Store)? {
            let remote_is = authoritative.clone();
            let disagrees = remote_is.as_deref() != Some(local.id.as_str());
            // A local runner the remote has never seen is not a conflict,
            // it is simply not pushed yet.
            let remote_knows_local = self.remote_has_activity(&local.id)?;
            if disagrees && remote_knows_local {
                let mut corrected = local.clone();
                close_now(&mut corrected, now);
                let record = encode_activity(&corrected)?;
                self.remote.borrow_mut().push(&record)?;
                self.store.upsert_from_remote(&record)?;
                pushed += 1;
                debug!(local = %local.id, "running activity corrected from remote");
                self.notifier.publish(ChangeEvent::RunningActivityCorrected {
                    local_was: Some(local.id.clone()),
                    remote_is,
                    at: now,
                });
            }
        }
        Ok(pushed)
    }

    fn remote_has_activity(&self, id: &str) -> std::result::Result<bool, SyncError> {
        let records = self.remote.borrow().fetch_since(None)?;
        Ok(records
            .iter()
            .any(|r| r.kind == RecordKind::Activity && r.id == id))
    }

    fn finish_offline(&self) -> Result<SyncOutcome> {
        let outcome = SyncOutcome::Offline {
            pending: self.store.pending_count()?,
        };
        *self.last_outcome.borrow_mut() = outcome.clone();
        debug!(?outcome, "sync skipped, remote unavailable");
        Ok(outcome)
    }

    fn finish_error(&self, error: SyncError) -> Result<SyncOutcome> {
        let outcome = SyncOutcome::Error {
            message: error.to_string(),
            pending: self.store.pending_count()?,
        };
        *self.last_outcome.borrow_mut() = outcome.clone();
        warn!(error = %error, "sync round failed");
        Ok(outcome)
    }
}

fn close_now(activity: &mut Activity, now: DateTime<Utc>) {
    activity.end_time = Some(now);
    activity.is_running = false;
    activity.is_paused = false;
    activity.paused_at = None;
    activity.updated_at = now;
    activity.sync_status = SyncState::Synced;
}

fn encode_activity(activity: &Activity) -> std::result::Result<SyncRecord, SyncError> {
    SyncRecord::encode(
        RecordKind::Activity,
        &activity.id,
        activity.updated_at,
        activity,
    )
}
