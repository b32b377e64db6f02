//! Remote store boundary.
//!
//! The authoritative backend is an external collaborator; the core only
//! knows this contract. [`InMemoryRemote`] is the double used by tests and
//! offline development -- its availability flag models connectivity loss.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::error::SyncError;
use crate::model::Activity;
use crate::sync::types::{RecordKind, SyncRecord};

/// Contract against the remote-authoritative record store.
pub trait RemoteStore {
    /// Whether connectivity is currently available. "Offline" is a steady
    /// state, not an error.
    fn is_available(&self) -> bool;

    /// Upsert one record remotely.
    fn push(&mut self, record: &SyncRecord) -> Result<(), SyncError>;

    /// Records changed since the given instant (all records when `None`).
    fn fetch_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<SyncRecord>, SyncError>;

    /// The owner's running activities as the remote store sees them.
    /// More than one is a transient inconsistency for the caller to repair.
    fn running_activities(&self, owner_id: &str) -> Result<Vec<Activity>, SyncError>;
}

/// In-memory remote double.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    records: HashMap<(RecordKind, String), SyncRecord>,
    online: bool,
    reject_writes: bool,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            online: true,
            reject_writes: false,
        }
    }

    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    /// Make every push fail while still reporting connectivity.
    pub fn set_reject_writes(&mut self, reject: bool) {
        self.reject_writes = reject;
    }

    /// Seed a record as another device would have pushed it.
    pub fn seed(&mut self, record: SyncRecord) {
        self.records
            .insert((record.kind, record.id.clone()), record);
    }

    pub fn get(&self, kind: RecordKind, id: &str) -> Option<&SyncRecord> {
        self.records.get(&(kind, id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RemoteStore for InMemoryRemote {
    fn is_available(&self) -> bool {
        self.online
    }

    fn push(&mut self, record: &SyncRecord) -> Result<(), SyncError> {
        if !self.online {
            return Err(SyncError::Unavailable);
        }
        if self.reject_writes {
            return Err(SyncError::WriteRejected {
                id: record.id.clone(),
                message: "rejected by test double".into(),
            });
        }
        // Remote applies the same last-write-wins rule.
        let key = (record.kind, record.id.clone());
        match self.records.get(&key) {
            Some(existing) if existing.updated_at >= record.updated_at => {}
            _ => {
                self.records.insert(key, record.clone());
            }
        }
        Ok(())
    }

    fn fetch_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<SyncRecord>, SyncError> {
        if !self.online {
            return Err(SyncError::Unavailable);
        }
        let mut out: Vec<SyncRecord> = self
            .records
            .values()
            .filter(|r| since.map_or(true, |s| r.updated_at > s))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(out)
    }

    fn running_activities(&self, owner_id: &str) -> Result<Vec<Activity>, SyncError> {
        if !self.online {
            return Err(SyncError::Unavailable);
        }
        let mut running = Vec::new();
        for record in self.records.values() {
            if record.kind != RecordKind::Activity {
                continue;
            }
            let activity: Activity = record.decode()?;
            if activity.is_running && activity.owner_id == owner_id {
                running.push(activity);
            }
        }
        running.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(running)
    }
}
