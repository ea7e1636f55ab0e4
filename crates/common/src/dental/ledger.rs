//! Procedure ledger
//!
//! The ledger is the list of dental procedures performed on a patient and
//! the single source of truth for the chart. This module holds the domain
//! record, request-side validation against the code catalog, and the
//! [`ProcedureLedger`] seam implemented by the database repository.

use super::audit::{AuditRecord, UndoOutcome};
use super::catalog::{CodeCatalog, ProcedureCategory, ProcedureCode};
use super::tooth::{Jaw, Surface, ToothNumber};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Procedure status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcedureStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl From<String> for ProcedureStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PENDING" => ProcedureStatus::Pending,
            "IN_PROGRESS" => ProcedureStatus::InProgress,
            "COMPLETED" => ProcedureStatus::Completed,
            "CANCELLED" => ProcedureStatus::Cancelled,
            _ => ProcedureStatus::Pending,
        }
    }
}

impl From<ProcedureStatus> for String {
    fn from(status: ProcedureStatus) -> Self {
        match status {
            ProcedureStatus::Pending => "PENDING".to_string(),
            ProcedureStatus::InProgress => "IN_PROGRESS".to_string(),
            ProcedureStatus::Completed => "COMPLETED".to_string(),
            ProcedureStatus::Cancelled => "CANCELLED".to_string(),
        }
    }
}

/// One procedure as stored in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub code_id: Uuid,
    pub tooth_number: Option<ToothNumber>,
    #[serde(default)]
    pub sub_surfaces: Vec<Surface>,
    pub jaw: Option<Jaw>,
    #[serde(default)]
    pub bridge_teeth: Vec<ToothNumber>,
    #[serde(default)]
    pub pontic_teeth: Vec<ToothNumber>,
    pub status: ProcedureStatus,
    pub date: NaiveDate,
    pub quantity: i32,
    pub paid_cents: i64,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    /// Insertion sequence, tie-break for procedures on the same date
    pub sequence: i64,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Rebuild the request shape of this entry so a patch can be validated
    /// with the same rules as a fresh procedure.
    pub fn to_draft(&self, catalog: &CodeCatalog) -> Result<ProcedureDraft> {
        let code = catalog.get(&self.code_id).ok_or_else(|| AppError::Internal {
            message: format!("procedure {} references unknown code {}", self.id, self.code_id),
        })?;

        Ok(ProcedureDraft {
            code: code.code.clone(),
            tooth_number: self.tooth_number.map(i32::from),
            sub_surfaces: self.sub_surfaces.iter().map(|s| s.as_str().to_string()).collect(),
            jaw: self.jaw,
            bridge_teeth: self.bridge_teeth.iter().map(|t| i32::from(*t)).collect(),
            pontic_teeth: self.pontic_teeth.iter().map(|t| i32::from(*t)).collect(),
            status: Some(self.status),
            date: Some(self.date),
            quantity: Some(self.quantity),
            paid_cents: Some(self.paid_cents),
            payment_method: self.payment_method.clone(),
            notes: self.notes.clone(),
        })
    }
}

/// Unvalidated procedure as submitted by a client
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureDraft {
    pub code: String,
    pub tooth_number: Option<i32>,
    #[serde(default)]
    pub sub_surfaces: Vec<String>,
    pub jaw: Option<Jaw>,
    #[serde(default)]
    pub bridge_teeth: Vec<i32>,
    #[serde(default)]
    pub pontic_teeth: Vec<i32>,
    pub status: Option<ProcedureStatus>,
    pub date: Option<NaiveDate>,
    pub quantity: Option<i32>,
    pub paid_cents: Option<i64>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

/// Partial update of an existing procedure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedurePatch {
    pub code: Option<String>,
    pub tooth_number: Option<i32>,
    pub sub_surfaces: Option<Vec<String>>,
    pub jaw: Option<Jaw>,
    pub bridge_teeth: Option<Vec<i32>>,
    pub pontic_teeth: Option<Vec<i32>>,
    pub status: Option<ProcedureStatus>,
    pub date: Option<NaiveDate>,
    pub quantity: Option<i32>,
    pub paid_cents: Option<i64>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

impl ProcedurePatch {
    pub fn apply(self, mut draft: ProcedureDraft) -> ProcedureDraft {
        if let Some(code) = self.code {
            draft.code = code;
        }
        if let Some(tooth) = self.tooth_number {
            draft.tooth_number = Some(tooth);
        }
        if let Some(surfaces) = self.sub_surfaces {
            draft.sub_surfaces = surfaces;
        }
        if let Some(jaw) = self.jaw {
            draft.jaw = Some(jaw);
        }
        if let Some(teeth) = self.bridge_teeth {
            // A new span re-anchors on its first tooth unless a tooth is given
            if self.tooth_number.is_none() {
                draft.tooth_number = None;
            }
            draft.bridge_teeth = teeth;
        }
        if let Some(teeth) = self.pontic_teeth {
            draft.pontic_teeth = teeth;
        }
        if self.status.is_some() {
            draft.status = self.status;
        }
        if self.date.is_some() {
            draft.date = self.date;
        }
        if self.quantity.is_some() {
            draft.quantity = self.quantity;
        }
        if self.paid_cents.is_some() {
            draft.paid_cents = self.paid_cents;
        }
        if self.payment_method.is_some() {
            draft.payment_method = self.payment_method;
        }
        if self.notes.is_some() {
            draft.notes = self.notes;
        }
        draft
    }
}

/// A procedure that passed validation and is ready for the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProcedure {
    pub patient_id: Uuid,
    pub code: ProcedureCode,
    pub tooth_number: Option<ToothNumber>,
    pub sub_surfaces: Vec<Surface>,
    pub jaw: Option<Jaw>,
    pub bridge_teeth: Vec<ToothNumber>,
    pub pontic_teeth: Vec<ToothNumber>,
    pub status: ProcedureStatus,
    pub date: NaiveDate,
    pub quantity: i32,
    pub paid_cents: i64,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

impl NewProcedure {
    /// Whether this procedure falls under the one-per-tooth disable constraint
    pub fn disables_tooth(&self) -> bool {
        self.code.is_reserved_disable()
    }
}

fn parse_teeth(raw: &[i32], field: &str) -> Result<Vec<ToothNumber>> {
    let mut teeth = Vec::with_capacity(raw.len());
    for value in raw {
        let tooth = ToothNumber::from_i32(*value).map_err(|e| AppError::Validation {
            message: e.to_string(),
            field: Some(field.to_string()),
        })?;
        if !teeth.contains(&tooth) {
            teeth.push(tooth);
        }
    }
    Ok(teeth)
}

/// Validate a draft against the code catalog
///
/// Every requirement flag on the code is checked here so that the
/// reconciler only ever sees well-formed procedures.
pub fn validate_draft(
    catalog: &CodeCatalog,
    patient_id: Uuid,
    draft: ProcedureDraft,
    today: NaiveDate,
) -> Result<NewProcedure> {
    if draft.code.trim().is_empty() {
        return Err(AppError::MissingField { field: "code".to_string() });
    }

    let code = catalog
        .by_code(&draft.code)
        .cloned()
        .ok_or_else(|| AppError::UnknownProcedureCode { code: draft.code.clone() })?;

    let tooth_number = draft
        .tooth_number
        .map(ToothNumber::from_i32)
        .transpose()
        .map_err(|e| AppError::Validation {
            message: e.to_string(),
            field: Some("tooth_number".to_string()),
        })?;

    let mut sub_surfaces: Vec<Surface> = Vec::with_capacity(draft.sub_surfaces.len());
    for raw in &draft.sub_surfaces {
        let surface = raw.parse::<Surface>().map_err(|e| AppError::Validation {
            message: e.to_string(),
            field: Some("sub_surfaces".to_string()),
        })?;
        if !sub_surfaces.contains(&surface) {
            sub_surfaces.push(surface);
        }
    }

    let bridge_teeth = parse_teeth(&draft.bridge_teeth, "bridge_teeth")?;
    let pontic_teeth = parse_teeth(&draft.pontic_teeth, "pontic_teeth")?;

    let tooth_given = tooth_number.is_some() || !bridge_teeth.is_empty();
    if code.requires_tooth && !tooth_given {
        return Err(AppError::MissingField { field: "tooth_number".to_string() });
    }

    if code.requires_surface && sub_surfaces.is_empty() && code.primary_surface.is_none() {
        return Err(AppError::MissingField { field: "sub_surfaces".to_string() });
    }

    if code.requires_jaw && draft.jaw.is_none() {
        return Err(AppError::MissingField { field: "jaw".to_string() });
    }

    if code.category == ProcedureCategory::Bridge {
        if bridge_teeth.len() < 2 {
            return Err(AppError::Validation {
                message: "a bridge spans at least two teeth".to_string(),
                field: Some("bridge_teeth".to_string()),
            });
        }
        if let Some(stray) = pontic_teeth.iter().find(|t| !bridge_teeth.contains(t)) {
            return Err(AppError::Validation {
                message: format!("pontic {} is not part of the bridge span", stray),
                field: Some("pontic_teeth".to_string()),
            });
        }
        if pontic_teeth.len() == bridge_teeth.len() {
            return Err(AppError::Validation {
                message: "a bridge needs at least one abutment".to_string(),
                field: Some("pontic_teeth".to_string()),
            });
        }
        if let Some(anchor) = tooth_number.filter(|t| !bridge_teeth.contains(t)) {
            return Err(AppError::Validation {
                message: format!("tooth {} is not part of the bridge span", anchor),
                field: Some("tooth_number".to_string()),
            });
        }
    } else if !bridge_teeth.is_empty() || !pontic_teeth.is_empty() {
        return Err(AppError::Validation {
            message: format!("code {} is not a bridge code", code.code),
            field: Some("bridge_teeth".to_string()),
        });
    }

    let status = draft.status.unwrap_or(ProcedureStatus::Completed);
    if code.is_reserved_disable() && status == ProcedureStatus::Cancelled {
        return Err(AppError::Validation {
            message: "the DISABLED marking cannot be cancelled; re-enable the tooth instead".to_string(),
            field: Some("status".to_string()),
        });
    }

    let quantity = draft.quantity.unwrap_or(1);
    if quantity < 1 {
        return Err(AppError::Validation {
            message: "quantity must be at least 1".to_string(),
            field: Some("quantity".to_string()),
        });
    }

    let paid_cents = draft.paid_cents.unwrap_or(0);
    if paid_cents < 0 {
        return Err(AppError::Validation {
            message: "paid amount cannot be negative".to_string(),
            field: Some("paid_cents".to_string()),
        });
    }

    // Bridge procedures are anchored on their first tooth when none is given
    let tooth_number = tooth_number.or_else(|| bridge_teeth.first().copied());

    Ok(NewProcedure {
        patient_id,
        code,
        tooth_number,
        sub_surfaces,
        jaw: draft.jaw,
        bridge_teeth,
        pontic_teeth,
        status,
        date: draft.date.unwrap_or(today),
        quantity,
        paid_cents,
        payment_method: draft.payment_method,
        notes: draft.notes,
    })
}

/// Access to the procedure ledger
///
/// Every mutation records an audit row holding the pre-mutation state.
/// All lookups are scoped by organization.
#[async_trait]
pub trait ProcedureLedger: Send + Sync {
    /// Procedures for a patient ordered by (date, sequence)
    async fn list_procedures(&self, organization_id: Uuid, patient_id: Uuid) -> Result<Vec<LedgerEntry>>;

    async fn find_procedure(&self, organization_id: Uuid, id: Uuid) -> Result<Option<LedgerEntry>>;

    async fn create_procedure(
        &self,
        organization_id: Uuid,
        procedure: NewProcedure,
        actor_id: Option<Uuid>,
    ) -> Result<LedgerEntry>;

    async fn update_procedure(
        &self,
        organization_id: Uuid,
        id: Uuid,
        procedure: NewProcedure,
        actor_id: Option<Uuid>,
    ) -> Result<LedgerEntry>;

    async fn delete_procedure(
        &self,
        organization_id: Uuid,
        id: Uuid,
        actor_id: Option<Uuid>,
    ) -> Result<LedgerEntry>;

    /// Audit rows for a procedure, newest first
    async fn audit_trail(&self, organization_id: Uuid, procedure_id: Uuid) -> Result<Vec<AuditRecord>>;

    /// Revert the newest mutation of a procedure and drop its audit row
    async fn undo_last(&self, organization_id: Uuid, procedure_id: Uuid) -> Result<UndoOutcome>;

    /// Keep only the newest `keep` audit rows for a procedure
    async fn prune_audit(&self, organization_id: Uuid, procedure_id: Uuid, keep: usize) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dental::catalog::default_codes;

    fn catalog() -> CodeCatalog {
        CodeCatalog::new(default_codes())
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn draft(code: &str) -> ProcedureDraft {
        ProcedureDraft {
            code: code.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_filling() {
        let mut d = draft("V92");
        d.tooth_number = Some(36);
        d.sub_surfaces = vec!["M".into(), "occlusal".into(), "m".into()];

        let procedure = validate_draft(&catalog(), Uuid::nil(), d, today()).unwrap();
        assert_eq!(procedure.tooth_number.unwrap().get(), 36);
        assert_eq!(procedure.sub_surfaces, vec![Surface::Mesial, Surface::Occlusal]);
        assert_eq!(procedure.status, ProcedureStatus::Completed);
        assert_eq!(procedure.date, today());
        assert_eq!(procedure.quantity, 1);
        assert!(!procedure.disables_tooth());
    }

    #[test]
    fn test_unknown_code() {
        let err = validate_draft(&catalog(), Uuid::nil(), draft("Q99"), today()).unwrap_err();
        assert!(matches!(err, AppError::UnknownProcedureCode { ref code } if code == "Q99"));
    }

    #[test]
    fn test_missing_tooth() {
        let err = validate_draft(&catalog(), Uuid::nil(), draft("H11"), today()).unwrap_err();
        assert!(matches!(err, AppError::MissingField { ref field } if field == "tooth_number"));
    }

    #[test]
    fn test_missing_surface() {
        let mut d = draft("V91");
        d.tooth_number = Some(11);
        let err = validate_draft(&catalog(), Uuid::nil(), d, today()).unwrap_err();
        assert!(matches!(err, AppError::MissingField { ref field } if field == "sub_surfaces"));
    }

    #[test]
    fn test_primary_surface_satisfies_surface_requirement() {
        let mut d = draft("V30");
        d.tooth_number = Some(46);
        assert!(validate_draft(&catalog(), Uuid::nil(), d, today()).is_ok());
    }

    #[test]
    fn test_missing_jaw() {
        let err = validate_draft(&catalog(), Uuid::nil(), draft("M03"), today()).unwrap_err();
        assert!(matches!(err, AppError::MissingField { ref field } if field == "jaw"));

        let mut d = draft("M03");
        d.jaw = Some(Jaw::Lower);
        assert!(validate_draft(&catalog(), Uuid::nil(), d, today()).is_ok());
    }

    #[test]
    fn test_out_of_range_tooth() {
        let mut d = draft("H11");
        d.tooth_number = Some(55);
        let err = validate_draft(&catalog(), Uuid::nil(), d, today()).unwrap_err();
        assert!(matches!(err, AppError::Validation { field: Some(ref f), .. } if f == "tooth_number"));
    }

    #[test]
    fn test_bridge_validation() {
        let mut d = draft("R40");
        d.bridge_teeth = vec![14, 15, 16];
        d.pontic_teeth = vec![15];
        let procedure = validate_draft(&catalog(), Uuid::nil(), d, today()).unwrap();
        assert_eq!(procedure.tooth_number.unwrap().get(), 14);

        let mut stray = draft("R40");
        stray.bridge_teeth = vec![14, 16];
        stray.pontic_teeth = vec![15];
        assert!(validate_draft(&catalog(), Uuid::nil(), stray, today()).is_err());

        let mut short = draft("R40");
        short.bridge_teeth = vec![14];
        assert!(validate_draft(&catalog(), Uuid::nil(), short, today()).is_err());

        let mut not_bridge = draft("R24");
        not_bridge.tooth_number = Some(11);
        not_bridge.bridge_teeth = vec![11, 12];
        assert!(validate_draft(&catalog(), Uuid::nil(), not_bridge, today()).is_err());
    }

    #[test]
    fn test_bridge_anchor_must_be_in_span() {
        let mut d = draft("R40");
        d.tooth_number = Some(11);
        d.bridge_teeth = vec![14, 15, 16];
        d.pontic_teeth = vec![15];
        let err = validate_draft(&catalog(), Uuid::nil(), d, today()).unwrap_err();
        assert!(matches!(err, AppError::Validation { field: Some(ref f), .. } if f == "tooth_number"));
    }

    #[test]
    fn test_patched_span_re_anchors() {
        let mut d = draft("R40");
        d.tooth_number = Some(14);
        d.bridge_teeth = vec![14, 15, 16];
        d.pontic_teeth = vec![15];

        let patch = ProcedurePatch {
            bridge_teeth: Some(vec![24, 25, 26]),
            pontic_teeth: Some(vec![25]),
            ..Default::default()
        };
        let procedure = validate_draft(&catalog(), Uuid::nil(), patch.apply(d), today()).unwrap();
        assert_eq!(procedure.tooth_number.unwrap().get(), 24);
    }

    #[test]
    fn test_disable_marking_cannot_be_cancelled() {
        let mut d = draft("DISABLED");
        d.tooth_number = Some(21);
        d.status = Some(ProcedureStatus::Cancelled);
        let err = validate_draft(&catalog(), Uuid::nil(), d, today()).unwrap_err();
        assert!(matches!(err, AppError::Validation { field: Some(ref f), .. } if f == "status"));
    }

    #[test]
    fn test_quantity_must_be_positive() {
        let mut d = draft("C11");
        d.quantity = Some(0);
        let err = validate_draft(&catalog(), Uuid::nil(), d, today()).unwrap_err();
        assert!(matches!(err, AppError::Validation { field: Some(ref f), .. } if f == "quantity"));
    }

    #[test]
    fn test_patch_keeps_unchanged_fields() {
        let mut d = draft("V92");
        d.tooth_number = Some(36);
        d.sub_surfaces = vec!["mesial".into(), "occlusal".into()];
        d.notes = Some("deep lesion".into());

        let patch = ProcedurePatch {
            sub_surfaces: Some(vec!["distal".into()]),
            status: Some(ProcedureStatus::Cancelled),
            ..Default::default()
        };

        let merged = patch.apply(d);
        assert_eq!(merged.tooth_number, Some(36));
        assert_eq!(merged.sub_surfaces, vec!["distal".to_string()]);
        assert_eq!(merged.status, Some(ProcedureStatus::Cancelled));
        assert_eq!(merged.notes.as_deref(), Some("deep lesion"));
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(ProcedureStatus::from("IN_PROGRESS".to_string()), ProcedureStatus::InProgress);
        assert_eq!(String::from(ProcedureStatus::Cancelled), "CANCELLED");
        assert_eq!(
            serde_json::to_string(&ProcedureStatus::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
    }
}
