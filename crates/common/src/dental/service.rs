//! Chart persistence wrapper
//!
//! Ties the ledger, the code catalog and the stored chart record together.
//! Every read and every ledger mutation rebuilds the chart from the ledger;
//! the stored chart is a cache with disabled flags stripped.

use super::audit::{AuditRecord, UndoOutcome};
use super::catalog::CodeCatalog;
use super::ledger::{validate_draft, LedgerEntry, ProcedureDraft, ProcedureLedger, ProcedurePatch, ProcedureStatus};
use super::periodontal::{apply_save, PeriodontalSnapshot, PeriodontalSummary, SaveIntent};
use super::reconciler::{hints_from_value, merge_hints, reconcile, ToothChart, ToothHints};
use super::tooth::ToothNumber;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Chart record as persisted per patient
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredChart {
    /// Last reconciled chart, disabled flags stripped. Never read back.
    pub chart: serde_json::Value,
    /// Tooth types recorded by the client that differ from the FDI default
    #[serde(default)]
    pub hints: ToothHints,
    pub periodontal: Vec<PeriodontalSnapshot>,
}

/// Storage for the per-patient chart record
#[async_trait]
pub trait ChartStore: Send + Sync {
    async fn load_chart(&self, organization_id: Uuid, patient_id: Uuid) -> Result<Option<StoredChart>>;

    async fn store_chart(&self, organization_id: Uuid, patient_id: Uuid, record: StoredChart) -> Result<()>;
}

/// Everything the chart UI needs for one patient
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DentalRecord {
    pub chart: ToothChart,
    pub periodontal: Vec<PeriodontalSnapshot>,
    /// Figures from the newest snapshot
    pub periodontal_summary: Option<PeriodontalSummary>,
    pub procedures: Vec<LedgerEntry>,
}

impl DentalRecord {
    fn new(chart: ToothChart, periodontal: Vec<PeriodontalSnapshot>, procedures: Vec<LedgerEntry>) -> Self {
        Self {
            periodontal_summary: periodontal.last().map(PeriodontalSummary::of),
            chart,
            periodontal,
            procedures,
        }
    }
}

/// Body of a chart save
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSave {
    /// Client chart; only tooth keys and tooth types are read from it
    #[serde(default)]
    pub chart: Option<serde_json::Value>,
    #[serde(default)]
    pub periodontal: Option<PeriodontalSnapshot>,
    #[serde(default)]
    pub save: SaveIntent,
}

/// A ledger mutation together with the rebuilt chart
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMutation<T> {
    #[serde(flatten)]
    pub result: T,
    pub chart: ToothChart,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureResult {
    pub procedure: Option<LedgerEntry>,
}

pub struct ChartService<S> {
    store: Arc<S>,
    catalog: Arc<CodeCatalog>,
    audit_retention: usize,
}

impl<S> Clone for ChartService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            catalog: self.catalog.clone(),
            audit_retention: self.audit_retention,
        }
    }
}

impl<S> ChartService<S>
where
    S: ProcedureLedger + ChartStore,
{
    pub fn new(store: Arc<S>, catalog: Arc<CodeCatalog>, audit_retention: usize) -> Self {
        Self {
            store,
            catalog,
            audit_retention,
        }
    }

    pub fn catalog(&self) -> &CodeCatalog {
        &self.catalog
    }

    /// Reconcile the ledger into a chart, recording timing
    fn rebuild(&self, procedures: &[LedgerEntry], hints: &ToothHints) -> ToothChart {
        let start = Instant::now();
        let chart = reconcile(procedures, &self.catalog, hints);
        metrics::record_reconciliation(start.elapsed().as_secs_f64(), chart.len());
        chart
    }

    async fn stored_hints(&self, organization_id: Uuid, patient_id: Uuid) -> Result<(ToothHints, Option<StoredChart>)> {
        let stored = self.store.load_chart(organization_id, patient_id).await?;
        let hints = stored.as_ref().map(|s| s.hints.clone()).unwrap_or_default();
        Ok((hints, stored))
    }

    /// Rebuild the chart after a ledger mutation and refresh the cache
    async fn refresh(&self, organization_id: Uuid, patient_id: Uuid) -> Result<ToothChart> {
        let (hints, stored) = self.stored_hints(organization_id, patient_id).await?;
        let procedures = self.store.list_procedures(organization_id, patient_id).await?;
        let chart = self.rebuild(&procedures, &hints);

        let record = StoredChart {
            chart: serde_json::to_value(chart.without_disabled_flags())?,
            hints,
            periodontal: stored.map(|s| s.periodontal).unwrap_or_default(),
        };
        self.store.store_chart(organization_id, patient_id, record).await?;

        Ok(chart)
    }

    /// Load the full dental record for a patient
    pub async fn load(&self, organization_id: Uuid, patient_id: Uuid) -> Result<DentalRecord> {
        let (hints, stored) = self.stored_hints(organization_id, patient_id).await?;
        let procedures = self.store.list_procedures(organization_id, patient_id).await?;
        let chart = self.rebuild(&procedures, &hints);

        debug!(
            patient_id = %patient_id,
            procedures = procedures.len(),
            teeth = chart.len(),
            "Dental record loaded"
        );

        let periodontal = stored.map(|s| s.periodontal).unwrap_or_default();
        Ok(DentalRecord::new(chart, periodontal, procedures))
    }

    /// Save the chart and optionally a periodontal snapshot
    pub async fn save(&self, organization_id: Uuid, patient_id: Uuid, request: ChartSave) -> Result<DentalRecord> {
        if let Some(ref snapshot) = request.periodontal {
            snapshot.validate()?;
        }

        let (mut hints, stored) = self.stored_hints(organization_id, patient_id).await?;
        if let Some(ref submitted) = request.chart {
            merge_hints(&mut hints, hints_from_value(submitted));
        }

        let procedures = self.store.list_procedures(organization_id, patient_id).await?;
        let chart = self.rebuild(&procedures, &hints);

        let mut periodontal = stored.map(|s| s.periodontal).unwrap_or_default();
        if let Some(snapshot) = request.periodontal {
            apply_save(&mut periodontal, snapshot, request.save);
        }

        let record = StoredChart {
            chart: serde_json::to_value(chart.without_disabled_flags())?,
            hints,
            periodontal: periodontal.clone(),
        };
        self.store.store_chart(organization_id, patient_id, record).await?;

        info!(
            patient_id = %patient_id,
            save = ?request.save,
            snapshots = periodontal.len(),
            "Dental chart saved"
        );

        Ok(DentalRecord::new(chart, periodontal, procedures))
    }

    async fn prune(&self, organization_id: Uuid, procedure_id: Uuid) -> Result<()> {
        if self.audit_retention > 0 {
            let pruned = self
                .store
                .prune_audit(organization_id, procedure_id, self.audit_retention)
                .await?;
            if pruned > 0 {
                debug!(procedure_id = %procedure_id, pruned, "Audit rows pruned");
            }
        }
        Ok(())
    }

    /// Validate and record a new procedure
    pub async fn create_procedure(
        &self,
        organization_id: Uuid,
        patient_id: Uuid,
        draft: ProcedureDraft,
        actor_id: Option<Uuid>,
    ) -> Result<ChartMutation<ProcedureResult>> {
        let procedure = validate_draft(&self.catalog, patient_id, draft, Utc::now().date_naive())?;
        let code = procedure.code.code.clone();

        let entry = self.store.create_procedure(organization_id, procedure, actor_id).await?;
        self.prune(organization_id, entry.id).await?;
        metrics::record_procedure_mutation("create", &code);

        info!(
            procedure_id = %entry.id,
            patient_id = %patient_id,
            code = %code,
            tooth = ?entry.tooth_number.map(ToothNumber::get),
            "Procedure recorded"
        );

        let chart = self.refresh(organization_id, patient_id).await?;
        Ok(ChartMutation {
            result: ProcedureResult { procedure: Some(entry) },
            chart,
        })
    }

    /// Apply a patch to an existing procedure
    pub async fn update_procedure(
        &self,
        organization_id: Uuid,
        procedure_id: Uuid,
        patch: ProcedurePatch,
        actor_id: Option<Uuid>,
    ) -> Result<ChartMutation<ProcedureResult>> {
        let existing = self
            .store
            .find_procedure(organization_id, procedure_id)
            .await?
            .ok_or_else(|| AppError::ProcedureNotFound { id: procedure_id.to_string() })?;

        let draft = patch.apply(existing.to_draft(&self.catalog)?);
        let procedure = validate_draft(&self.catalog, existing.patient_id, draft, existing.date)?;
        let code = procedure.code.code.clone();

        let entry = self
            .store
            .update_procedure(organization_id, procedure_id, procedure, actor_id)
            .await?;
        self.prune(organization_id, procedure_id).await?;
        metrics::record_procedure_mutation("update", &code);

        info!(procedure_id = %procedure_id, code = %code, "Procedure updated");

        let chart = self.refresh(organization_id, entry.patient_id).await?;
        Ok(ChartMutation {
            result: ProcedureResult { procedure: Some(entry) },
            chart,
        })
    }

    /// Remove a procedure from the ledger
    pub async fn delete_procedure(
        &self,
        organization_id: Uuid,
        procedure_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> Result<ChartMutation<ProcedureResult>> {
        let removed = self
            .store
            .delete_procedure(organization_id, procedure_id, actor_id)
            .await?;
        self.prune(organization_id, procedure_id).await?;

        let code = self
            .catalog
            .get(&removed.code_id)
            .map(|c| c.code.clone())
            .unwrap_or_default();
        metrics::record_procedure_mutation("delete", &code);

        info!(procedure_id = %procedure_id, patient_id = %removed.patient_id, "Procedure deleted");

        let chart = self.refresh(organization_id, removed.patient_id).await?;
        Ok(ChartMutation {
            result: ProcedureResult { procedure: None },
            chart,
        })
    }

    /// The patient's ledger in replay order
    pub async fn procedures(&self, organization_id: Uuid, patient_id: Uuid) -> Result<Vec<LedgerEntry>> {
        self.store.list_procedures(organization_id, patient_id).await
    }

    pub async fn audit_trail(&self, organization_id: Uuid, procedure_id: Uuid) -> Result<Vec<AuditRecord>> {
        self.store.audit_trail(organization_id, procedure_id).await
    }

    /// Revert the newest mutation of a procedure
    pub async fn undo(&self, organization_id: Uuid, procedure_id: Uuid) -> Result<ChartMutation<UndoOutcome>> {
        let outcome = self.store.undo_last(organization_id, procedure_id).await?;
        metrics::record_procedure_mutation("undo", outcome.reverted.as_str());

        info!(
            procedure_id = %procedure_id,
            reverted = ?outcome.reverted,
            "Procedure mutation undone"
        );

        let chart = self.refresh(organization_id, outcome.patient_id).await?;
        Ok(ChartMutation { result: outcome, chart })
    }

    /// Mark a tooth absent with the reserved disable code
    pub async fn disable_tooth(
        &self,
        organization_id: Uuid,
        patient_id: Uuid,
        tooth: ToothNumber,
        actor_id: Option<Uuid>,
    ) -> Result<ChartMutation<ProcedureResult>> {
        let code = self.catalog.disable_code().ok_or_else(|| AppError::Configuration {
            message: "reserved DISABLED procedure code is not seeded".to_string(),
        })?;

        let draft = ProcedureDraft {
            code: code.code.clone(),
            tooth_number: Some(i32::from(tooth)),
            status: Some(ProcedureStatus::Completed),
            ..Default::default()
        };

        self.create_procedure(organization_id, patient_id, draft, actor_id).await
    }

    /// Remove the reserved disable procedure from a tooth
    pub async fn enable_tooth(
        &self,
        organization_id: Uuid,
        patient_id: Uuid,
        tooth: ToothNumber,
        actor_id: Option<Uuid>,
    ) -> Result<ChartMutation<ProcedureResult>> {
        let disable_id = self.catalog.disable_code().map(|c| c.id);
        let procedures = self.store.list_procedures(organization_id, patient_id).await?;

        let disabling = procedures
            .iter()
            .find(|p| Some(p.code_id) == disable_id && p.tooth_number == Some(tooth))
            .ok_or_else(|| AppError::NotFound {
                resource_type: "disabled tooth".to_string(),
                id: tooth.to_string(),
            })?;

        self.delete_procedure(organization_id, disabling.id, actor_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dental::testing::MemoryStore;
    use crate::dental::catalog::default_codes;
    use crate::dental::audit::AuditAction;
    use crate::dental::periodontal::PerioMeasurement;
    use crate::dental::tooth::{Surface, ToothType};
    use std::collections::BTreeMap;

    const ORG: Uuid = Uuid::from_u128(1);
    const PATIENT: Uuid = Uuid::from_u128(2);

    fn service() -> ChartService<MemoryStore> {
        let catalog = Arc::new(CodeCatalog::new(default_codes()));
        ChartService::new(Arc::new(MemoryStore::default()), catalog, 3)
    }

    fn tooth(raw: u8) -> ToothNumber {
        ToothNumber::new(raw).unwrap()
    }

    fn filling(t: i32, surfaces: &[&str]) -> ProcedureDraft {
        ProcedureDraft {
            code: "V92".to_string(),
            tooth_number: Some(t),
            sub_surfaces: surfaces.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn snapshot(depth: u8) -> PeriodontalSnapshot {
        let mut teeth = BTreeMap::new();
        teeth.insert(
            tooth(16),
            PerioMeasurement {
                pocket_depths: [depth; 6],
                ..Default::default()
            },
        );
        PeriodontalSnapshot {
            recorded_at: Utc::now(),
            teeth,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_create_procedure_rebuilds_chart() {
        let svc = service();
        let created = svc
            .create_procedure(ORG, PATIENT, filling(36, &["mesial", "occlusal"]), None)
            .await
            .unwrap();

        let state = created.chart.get(tooth(36)).unwrap();
        assert_eq!(state.surfaces.len(), 2);
        assert!(created.result.procedure.is_some());

        let record = svc.load(ORG, PATIENT).await.unwrap();
        assert_eq!(record.procedures.len(), 1);
        assert_eq!(record.chart, created.chart);
    }

    #[tokio::test]
    async fn test_validation_errors_reach_caller() {
        let svc = service();
        let err = svc
            .create_procedure(ORG, PATIENT, ProcedureDraft { code: "H11".into(), ..Default::default() }, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MissingField { ref field } if field == "tooth_number"));
    }

    #[tokio::test]
    async fn test_disable_twice_conflicts() {
        let svc = service();
        svc.disable_tooth(ORG, PATIENT, tooth(21), None).await.unwrap();

        let err = svc.disable_tooth(ORG, PATIENT, tooth(21), None).await.unwrap_err();
        assert!(matches!(err, AppError::ToothAlreadyDisabled { tooth: 21 }));
    }

    #[tokio::test]
    async fn test_enable_tooth_restores_fillings() {
        let svc = service();
        svc.create_procedure(ORG, PATIENT, filling(21, &["mesial", "distal"]), None)
            .await
            .unwrap();

        let disabled = svc.disable_tooth(ORG, PATIENT, tooth(21), None).await.unwrap();
        let state = disabled.chart.get(tooth(21)).unwrap();
        assert!(state.is_disabled);
        assert!(state.surfaces.is_empty());

        let enabled = svc.enable_tooth(ORG, PATIENT, tooth(21), None).await.unwrap();
        let state = enabled.chart.get(tooth(21)).unwrap();
        assert!(!state.is_disabled);
        assert!(state.surfaces.contains_key(&Surface::Mesial));

        let err = svc.enable_tooth(ORG, PATIENT, tooth(21), None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_cache_never_stores_disabled_flags() {
        let svc = service();
        svc.disable_tooth(ORG, PATIENT, tooth(11), None).await.unwrap();

        let stored = svc.store.load_chart(ORG, PATIENT).await.unwrap().unwrap();
        assert_eq!(stored.chart["11"]["isDisabled"], serde_json::json!(false));

        let record = svc.load(ORG, PATIENT).await.unwrap();
        assert!(record.chart.get(tooth(11)).unwrap().is_disabled);
    }

    #[tokio::test]
    async fn test_stale_cache_cannot_disable_tooth() {
        let svc = service();
        let stale = StoredChart {
            chart: serde_json::json!({ "22": { "isDisabled": true, "toothType": "anterior" } }),
            ..Default::default()
        };
        svc.store.store_chart(ORG, PATIENT, stale).await.unwrap();

        let record = svc.load(ORG, PATIENT).await.unwrap();
        assert!(record.chart.is_empty());
    }

    #[tokio::test]
    async fn test_update_and_undo() {
        let svc = service();
        let created = svc
            .create_procedure(ORG, PATIENT, filling(46, &["occlusal"]), None)
            .await
            .unwrap();
        let id = created.result.procedure.unwrap().id;

        let patch = ProcedurePatch {
            code: Some("V72".into()),
            ..Default::default()
        };
        let updated = svc.update_procedure(ORG, id, patch, None).await.unwrap();
        let fill = updated.chart.get(tooth(46)).unwrap().surfaces[&Surface::Occlusal];
        assert_eq!(fill, crate::dental::catalog::SurfaceFill::Amalgam);

        let undone = svc.undo(ORG, id).await.unwrap();
        assert_eq!(undone.result.reverted, AuditAction::Updated);
        let fill = undone.chart.get(tooth(46)).unwrap().surfaces[&Surface::Occlusal];
        assert_eq!(fill, crate::dental::catalog::SurfaceFill::Composite);

        let undone = svc.undo(ORG, id).await.unwrap();
        assert_eq!(undone.result.reverted, AuditAction::Created);
        assert!(undone.chart.get(tooth(46)).is_none());

        let err = svc.undo(ORG, id).await.unwrap_err();
        assert!(matches!(err, AppError::NothingToUndo { .. }));
    }

    #[tokio::test]
    async fn test_undo_delete_reinserts() {
        let svc = service();
        let created = svc
            .create_procedure(ORG, PATIENT, filling(17, &["distal"]), None)
            .await
            .unwrap();
        let id = created.result.procedure.unwrap().id;

        let deleted = svc.delete_procedure(ORG, id, None).await.unwrap();
        assert!(deleted.chart.get(tooth(17)).is_none());

        let undone = svc.undo(ORG, id).await.unwrap();
        assert_eq!(undone.result.reverted, AuditAction::Deleted);
        assert_eq!(undone.chart, created.chart);
    }

    #[tokio::test]
    async fn test_audit_retention() {
        let svc = service();
        let created = svc
            .create_procedure(ORG, PATIENT, filling(26, &["buccal"]), None)
            .await
            .unwrap();
        let id = created.result.procedure.unwrap().id;

        for note in ["a", "b", "c", "d"] {
            let patch = ProcedurePatch {
                notes: Some(note.to_string()),
                ..Default::default()
            };
            svc.update_procedure(ORG, id, patch, None).await.unwrap();
        }

        let trail = svc.audit_trail(ORG, id).await.unwrap();
        assert_eq!(trail.len(), 3);
        assert!(trail.iter().all(|r| r.action == AuditAction::Updated));
        assert_eq!(trail[0].snapshot.as_ref().unwrap().notes.as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_other_organization_cannot_touch_procedure() {
        let svc = service();
        let created = svc
            .create_procedure(ORG, PATIENT, filling(26, &["buccal"]), None)
            .await
            .unwrap();
        let id = created.result.procedure.unwrap().id;

        let err = svc.delete_procedure(Uuid::from_u128(77), id, None).await.unwrap_err();
        assert!(matches!(err, AppError::ProcedureNotFound { .. }));
    }

    #[tokio::test]
    async fn test_save_applies_periodontal_rule_and_hints() {
        let svc = service();

        let first = ChartSave {
            chart: Some(serde_json::json!({ "18": { "toothType": "premolar", "isDisabled": true } })),
            periodontal: Some(snapshot(3)),
            save: SaveIntent::Explicit,
        };
        let record = svc.save(ORG, PATIENT, first).await.unwrap();
        assert_eq!(record.periodontal.len(), 1);
        assert!(record.periodontal_summary.is_some());
        let state = record.chart.get(tooth(18)).unwrap();
        assert_eq!(state.tooth_type, ToothType::Premolar);
        assert!(!state.is_disabled);

        let auto = ChartSave {
            chart: None,
            periodontal: Some(snapshot(5)),
            save: SaveIntent::Auto,
        };
        let record = svc.save(ORG, PATIENT, auto).await.unwrap();
        assert_eq!(record.periodontal.len(), 1);
        assert_eq!(record.periodontal[0].teeth[&tooth(16)].pocket_depths, [5; 6]);

        let explicit = ChartSave {
            chart: None,
            periodontal: Some(snapshot(4)),
            save: SaveIntent::Explicit,
        };
        let record = svc.save(ORG, PATIENT, explicit).await.unwrap();
        assert_eq!(record.periodontal.len(), 2);

        // Hints persist across loads
        let loaded = svc.load(ORG, PATIENT).await.unwrap();
        assert_eq!(loaded.chart.get(tooth(18)).unwrap().tooth_type, ToothType::Premolar);
        assert_eq!(loaded.periodontal.len(), 2);

        // Submitting the default type clears the hint
        let reset = ChartSave {
            chart: Some(serde_json::json!({ "18": { "toothType": "molar" } })),
            ..Default::default()
        };
        let record = svc.save(ORG, PATIENT, reset).await.unwrap();
        assert!(record.chart.get(tooth(18)).is_none());
    }

    #[tokio::test]
    async fn test_deleted_procedure_leaves_no_trace() {
        let keep = filling(36, &["mesial"]);

        let edited = service();
        let created = edited
            .create_procedure(ORG, PATIENT, filling(46, &["occlusal"]), None)
            .await
            .unwrap();
        edited.create_procedure(ORG, PATIENT, keep.clone(), None).await.unwrap();
        edited
            .delete_procedure(ORG, created.result.procedure.unwrap().id, None)
            .await
            .unwrap();
        let after_delete = edited.load(ORG, PATIENT).await.unwrap();

        let pristine = service();
        pristine.create_procedure(ORG, PATIENT, keep, None).await.unwrap();
        let never_had_it = pristine.load(ORG, PATIENT).await.unwrap();

        assert!(after_delete.chart.get(tooth(46)).is_none());
        assert_eq!(after_delete.chart, never_had_it.chart);
    }

    #[tokio::test]
    async fn test_disable_marking_cannot_be_cancelled() {
        let svc = service();
        let disabled = svc.disable_tooth(ORG, PATIENT, tooth(21), None).await.unwrap();
        let id = disabled.result.procedure.unwrap().id;

        let patch = ProcedurePatch {
            status: Some(ProcedureStatus::Cancelled),
            ..Default::default()
        };
        let err = svc.update_procedure(ORG, id, patch, None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let record = svc.load(ORG, PATIENT).await.unwrap();
        assert!(record.chart.get(tooth(21)).unwrap().is_disabled);
    }

    #[tokio::test]
    async fn test_save_rejects_implausible_snapshot() {
        let svc = service();
        let request = ChartSave {
            chart: None,
            periodontal: Some(snapshot(30)),
            save: SaveIntent::Explicit,
        };
        assert!(svc.save(ORG, PATIENT, request).await.is_err());
    }
}
