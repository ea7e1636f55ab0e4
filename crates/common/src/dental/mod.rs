//! Dental charting domain
//!
//! The procedure ledger is the source of truth for a patient's chart. The
//! reconciler replays it into per-tooth state; the service wraps both with
//! the stored chart cache and the periodontal snapshot log.

pub mod audit;
pub mod catalog;
pub mod ledger;
pub mod periodontal;
pub mod reconciler;
pub mod service;
pub mod tooth;

#[cfg(test)]
pub(crate) mod testing;

pub use audit::{AuditAction, AuditRecord, UndoOutcome, UndoPlan};
pub use catalog::{default_codes, CodeCatalog, Material, ProcedureCategory, ProcedureCode, SurfaceFill, DISABLED_CODE};
pub use ledger::{
    validate_draft, LedgerEntry, NewProcedure, ProcedureDraft, ProcedureLedger, ProcedurePatch, ProcedureStatus,
};
pub use periodontal::{PerioMeasurement, PeriodontalSnapshot, PeriodontalSummary, SaveIntent};
pub use reconciler::{reconcile, ToothChart, ToothHints, ToothState};
pub use service::{ChartMutation, ChartSave, ChartService, ChartStore, DentalRecord, ProcedureResult, StoredChart};
pub use tooth::{Jaw, Surface, ToothNumber, ToothType};
