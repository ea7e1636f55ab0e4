//! Per-mutation audit log for the procedure ledger
//!
//! Each create/update/delete writes one row holding the state of the
//! procedure before the mutation. Undo replays the newest row in reverse.

use super::ledger::LedgerEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of mutation recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    Deleted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "created",
            AuditAction::Updated => "updated",
            AuditAction::Deleted => "deleted",
        }
    }
}

impl From<String> for AuditAction {
    fn from(s: String) -> Self {
        match s.as_str() {
            "created" => AuditAction::Created,
            "deleted" => AuditAction::Deleted,
            _ => AuditAction::Updated,
        }
    }
}

impl From<AuditAction> for String {
    fn from(action: AuditAction) -> Self {
        action.as_str().to_string()
    }
}

/// One audit row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: Uuid,
    pub procedure_id: Uuid,
    pub action: AuditAction,
    /// Procedure state before the mutation; absent for creations
    pub snapshot: Option<LedgerEntry>,
    pub actor_id: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
}

/// What reverting an audit row does to the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoPlan {
    /// Undo a creation
    Remove { procedure_id: Uuid },
    /// Undo an update by writing the previous state back
    Restore(LedgerEntry),
    /// Undo a deletion by inserting the row again
    Reinsert(LedgerEntry),
}

/// Result of an undo, reported back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoOutcome {
    pub procedure_id: Uuid,
    pub patient_id: Uuid,
    pub reverted: AuditAction,
    /// The procedure as it exists after the undo, if it still exists
    pub procedure: Option<LedgerEntry>,
}

impl AuditRecord {
    /// Work out how to revert this row
    ///
    /// Returns `None` for an update or delete row whose snapshot is missing,
    /// which can only happen if the row was written by hand.
    pub fn undo_plan(&self) -> Option<UndoPlan> {
        match self.action {
            AuditAction::Created => Some(UndoPlan::Remove { procedure_id: self.procedure_id }),
            AuditAction::Updated => self.snapshot.clone().map(UndoPlan::Restore),
            AuditAction::Deleted => self.snapshot.clone().map(UndoPlan::Reinsert),
        }
    }
}

/// Ids of audit rows that fall outside the retention depth
///
/// `records` must be ordered newest first. A depth of zero keeps everything.
pub fn expired_records(records: &[AuditRecord], keep: usize) -> Vec<Uuid> {
    if keep == 0 {
        return Vec::new();
    }
    records.iter().skip(keep).map(|r| r.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dental::ledger::ProcedureStatus;
    use chrono::{NaiveDate, TimeZone};

    fn entry() -> LedgerEntry {
        LedgerEntry {
            id: Uuid::from_u128(7),
            patient_id: Uuid::from_u128(1),
            code_id: Uuid::from_u128(2),
            tooth_number: None,
            sub_surfaces: vec![],
            jaw: None,
            bridge_teeth: vec![],
            pontic_teeth: vec![],
            status: ProcedureStatus::Completed,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            quantity: 1,
            paid_cents: 0,
            payment_method: None,
            notes: None,
            sequence: 1,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
        }
    }

    fn record(action: AuditAction, snapshot: Option<LedgerEntry>) -> AuditRecord {
        AuditRecord {
            id: Uuid::new_v4(),
            procedure_id: Uuid::from_u128(7),
            action,
            snapshot,
            actor_id: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_undo_plans() {
        assert_eq!(
            record(AuditAction::Created, None).undo_plan(),
            Some(UndoPlan::Remove { procedure_id: Uuid::from_u128(7) })
        );
        assert_eq!(
            record(AuditAction::Updated, Some(entry())).undo_plan(),
            Some(UndoPlan::Restore(entry()))
        );
        assert_eq!(
            record(AuditAction::Deleted, Some(entry())).undo_plan(),
            Some(UndoPlan::Reinsert(entry()))
        );
        assert_eq!(record(AuditAction::Updated, None).undo_plan(), None);
    }

    #[test]
    fn test_expired_records() {
        let records: Vec<_> = (0..5).map(|_| record(AuditAction::Updated, Some(entry()))).collect();

        let expired = expired_records(&records, 3);
        assert_eq!(expired, vec![records[3].id, records[4].id]);

        assert!(expired_records(&records, 0).is_empty());
        assert!(expired_records(&records, 10).is_empty());
    }
}
