//! In-memory ledger and chart store for service tests

use super::catalog::{seeded_code_id, DISABLED_CODE};
use super::audit::{expired_records, AuditAction, AuditRecord, UndoOutcome, UndoPlan};
use super::ledger::{LedgerEntry, NewProcedure, ProcedureLedger};
use super::service::{ChartStore, StoredChart};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    procedures: Vec<(Uuid, LedgerEntry, bool)>,
    /// Oldest first
    audit: Vec<(Uuid, AuditRecord)>,
    charts: HashMap<(Uuid, Uuid), StoredChart>,
    next_sequence: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn entry_from(id: Uuid, sequence: i64, procedure: &NewProcedure) -> LedgerEntry {
    LedgerEntry {
        id,
        patient_id: procedure.patient_id,
        code_id: procedure.code.id,
        tooth_number: procedure.tooth_number,
        sub_surfaces: procedure.sub_surfaces.clone(),
        jaw: procedure.jaw,
        bridge_teeth: procedure.bridge_teeth.clone(),
        pontic_teeth: procedure.pontic_teeth.clone(),
        status: procedure.status,
        date: procedure.date,
        quantity: procedure.quantity,
        paid_cents: procedure.paid_cents,
        payment_method: procedure.payment_method.clone(),
        notes: procedure.notes.clone(),
        sequence,
        created_at: Utc::now(),
    }
}

fn is_disable(entry: &LedgerEntry) -> bool {
    entry.code_id == seeded_code_id(DISABLED_CODE)
}

impl State {
    fn check_disable_unique(&self, skip: Option<Uuid>, entry: &LedgerEntry, disables: bool) -> Result<()> {
        if !disables {
            return Ok(());
        }
        let clash = self.procedures.iter().any(|(_, other, other_disables)| {
            *other_disables
                && Some(other.id) != skip
                && other.patient_id == entry.patient_id
                && other.tooth_number == entry.tooth_number
                && other.code_id == entry.code_id
        });
        match (clash, entry.tooth_number) {
            (true, Some(tooth)) => Err(AppError::ToothAlreadyDisabled { tooth: tooth.get() }),
            _ => Ok(()),
        }
    }

    fn audit(&mut self, org: Uuid, procedure_id: Uuid, action: AuditAction, snapshot: Option<LedgerEntry>) {
        self.audit.push((
            org,
            AuditRecord {
                id: Uuid::new_v4(),
                procedure_id,
                action,
                snapshot,
                actor_id: None,
                recorded_at: Utc::now(),
            },
        ));
    }

    fn position(&self, org: Uuid, id: Uuid) -> Option<usize> {
        self.procedures
            .iter()
            .position(|(o, entry, _)| *o == org && entry.id == id)
    }
}

#[async_trait]
impl ProcedureLedger for MemoryStore {
    async fn list_procedures(&self, organization_id: Uuid, patient_id: Uuid) -> Result<Vec<LedgerEntry>> {
        let state = self.state.lock().unwrap();
        let mut entries: Vec<_> = state
            .procedures
            .iter()
            .filter(|(o, e, _)| *o == organization_id && e.patient_id == patient_id)
            .map(|(_, e, _)| e.clone())
            .collect();
        entries.sort_by_key(|e| (e.date, e.sequence));
        Ok(entries)
    }

    async fn find_procedure(&self, organization_id: Uuid, id: Uuid) -> Result<Option<LedgerEntry>> {
        let state = self.state.lock().unwrap();
        Ok(state.position(organization_id, id).map(|i| state.procedures[i].1.clone()))
    }

    async fn create_procedure(
        &self,
        organization_id: Uuid,
        procedure: NewProcedure,
        _actor_id: Option<Uuid>,
    ) -> Result<LedgerEntry> {
        let mut state = self.state.lock().unwrap();
        state.next_sequence += 1;
        let entry = entry_from(Uuid::new_v4(), state.next_sequence, &procedure);
        state.check_disable_unique(None, &entry, procedure.disables_tooth())?;

        state.procedures.push((organization_id, entry.clone(), procedure.disables_tooth()));
        state.audit(organization_id, entry.id, AuditAction::Created, None);
        Ok(entry)
    }

    async fn update_procedure(
        &self,
        organization_id: Uuid,
        id: Uuid,
        procedure: NewProcedure,
        _actor_id: Option<Uuid>,
    ) -> Result<LedgerEntry> {
        let mut state = self.state.lock().unwrap();
        let index = state
            .position(organization_id, id)
            .ok_or_else(|| AppError::ProcedureNotFound { id: id.to_string() })?;

        let previous = state.procedures[index].1.clone();
        let mut entry = entry_from(id, previous.sequence, &procedure);
        entry.created_at = previous.created_at;
        state.check_disable_unique(Some(id), &entry, procedure.disables_tooth())?;

        state.procedures[index] = (organization_id, entry.clone(), procedure.disables_tooth());
        state.audit(organization_id, id, AuditAction::Updated, Some(previous));
        Ok(entry)
    }

    async fn delete_procedure(&self, organization_id: Uuid, id: Uuid, _actor_id: Option<Uuid>) -> Result<LedgerEntry> {
        let mut state = self.state.lock().unwrap();
        let index = state
            .position(organization_id, id)
            .ok_or_else(|| AppError::ProcedureNotFound { id: id.to_string() })?;

        let (_, removed, _) = state.procedures.remove(index);
        state.audit(organization_id, id, AuditAction::Deleted, Some(removed.clone()));
        Ok(removed)
    }

    async fn audit_trail(&self, organization_id: Uuid, procedure_id: Uuid) -> Result<Vec<AuditRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .audit
            .iter()
            .rev()
            .filter(|(o, r)| *o == organization_id && r.procedure_id == procedure_id)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn undo_last(&self, organization_id: Uuid, procedure_id: Uuid) -> Result<UndoOutcome> {
        let mut state = self.state.lock().unwrap();
        let audit_index = state
            .audit
            .iter()
            .rposition(|(o, r)| *o == organization_id && r.procedure_id == procedure_id)
            .ok_or_else(|| AppError::NothingToUndo { id: procedure_id.to_string() })?;

        let (_, record) = state.audit.remove(audit_index);
        let plan = record.undo_plan().ok_or_else(|| AppError::Internal {
            message: format!("audit row {} has no snapshot", record.id),
        })?;

        let (patient_id, procedure) = match plan {
            UndoPlan::Remove { procedure_id } => {
                let index = state
                    .position(organization_id, procedure_id)
                    .ok_or_else(|| AppError::ProcedureNotFound { id: procedure_id.to_string() })?;
                let (_, removed, _) = state.procedures.remove(index);
                (removed.patient_id, None)
            }
            UndoPlan::Restore(previous) => {
                let index = state
                    .position(organization_id, previous.id)
                    .ok_or_else(|| AppError::ProcedureNotFound { id: previous.id.to_string() })?;
                state.procedures[index] = (organization_id, previous.clone(), is_disable(&previous));
                (previous.patient_id, Some(previous))
            }
            UndoPlan::Reinsert(previous) => {
                state.check_disable_unique(None, &previous, is_disable(&previous))?;
                state.procedures.push((organization_id, previous.clone(), is_disable(&previous)));
                (previous.patient_id, Some(previous))
            }
        };

        Ok(UndoOutcome {
            procedure_id,
            patient_id,
            reverted: record.action,
            procedure,
        })
    }

    async fn prune_audit(&self, organization_id: Uuid, procedure_id: Uuid, keep: usize) -> Result<u64> {
        let trail = self.audit_trail(organization_id, procedure_id).await?;
        let expired = expired_records(&trail, keep);

        let mut state = self.state.lock().unwrap();
        state.audit.retain(|(_, r)| !expired.contains(&r.id));
        Ok(expired.len() as u64)
    }
}

#[async_trait]
impl ChartStore for MemoryStore {
    async fn load_chart(&self, organization_id: Uuid, patient_id: Uuid) -> Result<Option<StoredChart>> {
        let state = self.state.lock().unwrap();
        Ok(state.charts.get(&(organization_id, patient_id)).cloned())
    }

    async fn store_chart(&self, organization_id: Uuid, patient_id: Uuid, record: StoredChart) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.charts.insert((organization_id, patient_id), record);
        Ok(())
    }
}
