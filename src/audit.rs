// 📜 Audit log - every change to a record is an event
//
// Entries are append-only: the store exposes insert and read, nothing else.

use crate::records::RecordKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    Deleted,
    Submitted,
    Approved,
    Rejected,
    RevisionRequested,
    Resubmitted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "created",
            AuditAction::Updated => "updated",
            AuditAction::Deleted => "deleted",
            AuditAction::Submitted => "submitted",
            AuditAction::Approved => "approved",
            AuditAction::Rejected => "rejected",
            AuditAction::RevisionRequested => "revision_requested",
            AuditAction::Resubmitted => "resubmitted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(AuditAction::Created),
            "updated" => Some(AuditAction::Updated),
            "deleted" => Some(AuditAction::Deleted),
            "submitted" => Some(AuditAction::Submitted),
            "approved" => Some(AuditAction::Approved),
            "rejected" => Some(AuditAction::Rejected),
            "revision_requested" => Some(AuditAction::RevisionRequested),
            "resubmitted" => Some(AuditAction::Resubmitted),
            _ => None,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub user_id: String,
    pub action: AuditAction,
    pub model_type: RecordKind,
    pub model_id: i64,
    pub changes: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        user_id: &str,
        action: AuditAction,
        model_type: RecordKind,
        model_id: i64,
        changes: serde_json::Value,
    ) -> Self {
        AuditEntry {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            action,
            model_type,
            model_id,
            changes,
            created_at: Utc::now(),
        }
    }

    /// Reads a boolean flag out of `changes`, e.g. `auto_approved`
    pub fn flag(&self, key: &str) -> bool {
        self.changes
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_names_roundtrip() {
        for action in [
            AuditAction::Created,
            AuditAction::Updated,
            AuditAction::Deleted,
            AuditAction::Submitted,
            AuditAction::Approved,
            AuditAction::Rejected,
            AuditAction::RevisionRequested,
            AuditAction::Resubmitted,
        ] {
            assert_eq!(AuditAction::parse(action.as_str()), Some(action));
        }
    }

    #[test]
    fn test_entry_flag() {
        let entry = AuditEntry::new(
            "system",
            AuditAction::Approved,
            RecordKind::Tindakan,
            4,
            serde_json::json!({"auto_approved": true}),
        );
        assert!(entry.flag("auto_approved"));
        assert!(!entry.flag("missing"));
        assert_eq!(entry.id.len(), 36);
    }
}
