//! Append-only audit trail shared by the lifecycle and settlement engines.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Immutable record of one mutating operation. Entries are appended and
/// never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: Uuid,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    /// Identifier of the entity touched, e.g. a season number or GIRO item id.
    pub entity_ref: String,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Renew,
    ChangeVehicle,
    Terminate,
    Expire,
    UpdateHolder,
    GiroEnqueue,
    GiroSettle,
    GiroResubmit,
}

/// Recorder owning the audit log. Cheap to share behind an `Arc`; appends
/// serialize on an internal mutex.
#[derive(Debug, Default)]
pub struct AuditRecorder {
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        actor: impl Into<String>,
        timestamp: DateTime<Utc>,
        entity_ref: impl Into<String>,
        action: AuditAction,
        before: Option<Value>,
        after: Option<Value>,
    ) -> Uuid {
        let entry = AuditEntry {
            entry_id: Uuid::new_v4(),
            actor: actor.into(),
            timestamp,
            entity_ref: entity_ref.into(),
            action,
            before,
            after,
        };
        let id = entry.entry_id;
        self.entries.lock().unwrap().push(entry);
        id
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn entries_for(&self, entity_ref: &str) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.entity_ref == entity_ref)
            .cloned()
            .collect()
    }

    pub fn entries_by(&self, actor: &str) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.actor == actor)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces the log wholesale. Only the storage module uses this when
    /// restoring a snapshot.
    pub(crate) fn replace_all(&self, entries: Vec<AuditEntry>) {
        *self.entries.lock().unwrap() = entries;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_appends_and_filters() {
        let recorder = AuditRecorder::new();
        let now = Utc::now();
        recorder.record("alice", now, "SN-1", AuditAction::Create, None, None);
        recorder.record("bob", now, "SN-2", AuditAction::Renew, None, None);
        recorder.record("alice", now, "SN-1", AuditAction::Terminate, None, None);

        assert_eq!(recorder.len(), 3);
        assert_eq!(recorder.entries_for("SN-1").len(), 2);
        assert_eq!(recorder.entries_by("bob").len(), 1);
        assert_eq!(
            recorder.entries_for("SN-1")[1].action,
            AuditAction::Terminate
        );
    }
}
