//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling and transaction support.

use crate::db::models::*;
use crate::db::DbPool;
use crate::dental::audit::{expired_records, AuditAction, AuditRecord, UndoOutcome, UndoPlan};
use crate::dental::catalog::{CodeCatalog, ProcedureCategory};
use crate::dental::ledger::{LedgerEntry, NewProcedure, ProcedureLedger};
use crate::dental::service::{ChartStore, StoredChart};
use crate::dental::tooth::ToothNumber;
use crate::errors::{AppError, Result};
use crate::schedule::OverrideSlot;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set, SqlErr, TransactionTrait,
};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

/// Partial unique index allowing one reserved disable procedure per tooth
const DISABLED_TOOTH_INDEX: &str = "uq_dental_procedures_disabled_tooth";

/// The conflict a failed write stands for, if it hit the disable index
fn disable_conflict(sql_err: Option<SqlErr>, tooth: Option<ToothNumber>) -> Option<AppError> {
    match (sql_err, tooth) {
        (Some(SqlErr::UniqueConstraintViolation(message)), Some(tooth))
            if message.contains(DISABLED_TOOTH_INDEX) =>
        {
            Some(AppError::ToothAlreadyDisabled { tooth: tooth.get() })
        }
        _ => None,
    }
}

/// Translate a write error, mapping the disable index violation
fn map_write_error(err: DbErr, tooth: Option<ToothNumber>) -> AppError {
    disable_conflict(err.sql_err(), tooth).unwrap_or(AppError::Database(err))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(Into::into)
}

/// Build the ledger row for an entry, keeping its id and sequence
fn entry_model(organization_id: Uuid, entry: &LedgerEntry, disables_tooth: bool) -> Result<DentalProcedureActiveModel> {
    Ok(DentalProcedureActiveModel {
        id: Set(entry.id),
        organization_id: Set(organization_id),
        patient_id: Set(entry.patient_id),
        code_id: Set(entry.code_id),
        tooth_number: Set(entry.tooth_number.map(i32::from)),
        sub_surfaces: Set(to_json(&entry.sub_surfaces)?),
        jaw: Set(entry.jaw.map(|j| j.as_str().to_string())),
        bridge_teeth: Set(to_json(&entry.bridge_teeth)?),
        pontic_teeth: Set(to_json(&entry.pontic_teeth)?),
        status: Set(entry.status.into()),
        date: Set(entry.date),
        quantity: Set(entry.quantity),
        paid_cents: Set(entry.paid_cents),
        payment_method: Set(entry.payment_method.clone()),
        notes: Set(entry.notes.clone()),
        sequence: Set(entry.sequence),
        disables_tooth: Set(disables_tooth),
        created_at: Set(entry.created_at.into()),
        updated_at: Set(Utc::now().into()),
    })
}

/// Copy the validated fields of a procedure onto a row
fn apply_procedure(model: &mut DentalProcedureActiveModel, procedure: &NewProcedure) -> Result<()> {
    model.patient_id = Set(procedure.patient_id);
    model.code_id = Set(procedure.code.id);
    model.tooth_number = Set(procedure.tooth_number.map(i32::from));
    model.sub_surfaces = Set(to_json(&procedure.sub_surfaces)?);
    model.jaw = Set(procedure.jaw.map(|j| j.as_str().to_string()));
    model.bridge_teeth = Set(to_json(&procedure.bridge_teeth)?);
    model.pontic_teeth = Set(to_json(&procedure.pontic_teeth)?);
    model.status = Set(procedure.status.into());
    model.date = Set(procedure.date);
    model.quantity = Set(procedure.quantity);
    model.paid_cents = Set(procedure.paid_cents);
    model.payment_method = Set(procedure.payment_method.clone());
    model.notes = Set(procedure.notes.clone());
    model.disables_tooth = Set(procedure.disables_tooth());
    model.updated_at = Set(Utc::now().into());
    Ok(())
}

async fn write_audit<C: ConnectionTrait>(
    conn: &C,
    organization_id: Uuid,
    procedure_id: Uuid,
    action: AuditAction,
    snapshot: Option<&LedgerEntry>,
    actor_id: Option<Uuid>,
) -> Result<()> {
    let row = ProcedureAuditActiveModel {
        id: Set(Uuid::new_v4()),
        organization_id: Set(organization_id),
        procedure_id: Set(procedure_id),
        action: Set(action.into()),
        snapshot: Set(snapshot.map(to_json).transpose()?),
        actor_id: Set(actor_id),
        recorded_at: Set(Utc::now().into()),
        ..Default::default()
    };
    row.insert(conn).await?;
    Ok(())
}

async fn find_procedure_row<C: ConnectionTrait>(
    conn: &C,
    organization_id: Uuid,
    id: Uuid,
) -> Result<DentalProcedure> {
    DentalProcedureEntity::find_by_id(id)
        .filter(DentalProcedureColumn::OrganizationId.eq(organization_id))
        .one(conn)
        .await?
        .ok_or_else(|| AppError::ProcedureNotFound { id: id.to_string() })
}

async fn is_disable_code<C: ConnectionTrait>(conn: &C, code_id: Uuid) -> Result<bool> {
    let code = ProcedureCodeEntity::find_by_id(code_id).one(conn).await?;
    Ok(code.is_some_and(|c| ProcedureCategory::from(c.category) == ProcedureCategory::Disabled))
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Organization Operations
    // ========================================================================

    /// Find organization by ID
    pub async fn find_organization_by_id(&self, id: Uuid) -> Result<Option<Organization>> {
        OrganizationEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Procedure Code Operations
    // ========================================================================

    /// Load the full code catalog
    pub async fn load_catalog(&self) -> Result<CodeCatalog> {
        let rows = ProcedureCodeEntity::find()
            .order_by_asc(ProcedureCodeColumn::Code)
            .all(self.read_conn())
            .await?;

        let codes = rows
            .into_iter()
            .map(ProcedureCodeRow::into_code)
            .collect::<Result<Vec<_>>>()?;

        Ok(CodeCatalog::new(codes))
    }

    // ========================================================================
    // Patient Operations
    // ========================================================================

    /// Create a new patient
    pub async fn create_patient(
        &self,
        organization_id: Uuid,
        first_name: String,
        last_name: String,
        date_of_birth: Option<NaiveDate>,
        email: Option<String>,
        phone: Option<String>,
    ) -> Result<Patient> {
        let now = Utc::now();

        let patient = PatientActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(organization_id),
            first_name: Set(first_name),
            last_name: Set(last_name),
            date_of_birth: Set(date_of_birth),
            email: Set(email),
            phone: Set(phone),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        patient.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find patient by ID
    pub async fn find_patient_by_id(&self, id: Uuid) -> Result<Option<Patient>> {
        PatientEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Schedule Operations
    // ========================================================================

    /// Create a new schedule
    pub async fn create_schedule(
        &self,
        organization_id: Uuid,
        name: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Schedule> {
        let schedule = ScheduleActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(organization_id),
            name: Set(name),
            start_date: Set(start_date),
            end_date: Set(end_date),
            created_at: Set(Utc::now().into()),
        };

        schedule.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find schedule by ID
    pub async fn find_schedule_by_id(&self, id: Uuid) -> Result<Option<Schedule>> {
        ScheduleEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Overrides for a schedule ordered by date and room
    pub async fn list_overrides(&self, schedule_id: Uuid) -> Result<Vec<ScheduleOverride>> {
        ScheduleOverrideEntity::find()
            .filter(ScheduleOverrideColumn::ScheduleId.eq(schedule_id))
            .order_by_asc(ScheduleOverrideColumn::Date)
            .order_by_asc(ScheduleOverrideColumn::RoomNumber)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Upsert expanded overrides in one transaction
    ///
    /// Rows are keyed on (schedule, date, room, practitioner); an existing
    /// row has its times and availability replaced.
    pub async fn upsert_overrides(&self, slots: &[OverrideSlot]) -> Result<usize> {
        let txn = self.write_conn().begin().await?;

        for slot in slots {
            let row = ScheduleOverrideActiveModel {
                id: Set(Uuid::new_v4()),
                schedule_id: Set(slot.schedule_id),
                date: Set(slot.date),
                room_number: Set(slot.room_number),
                practitioner_id: Set(slot.practitioner_id),
                start_time: Set(slot.start_time),
                end_time: Set(slot.end_time),
                is_available: Set(slot.is_available),
                updated_at: Set(Utc::now().into()),
            };

            ScheduleOverrideEntity::insert(row)
                .on_conflict(
                    OnConflict::columns([
                        ScheduleOverrideColumn::ScheduleId,
                        ScheduleOverrideColumn::Date,
                        ScheduleOverrideColumn::RoomNumber,
                        ScheduleOverrideColumn::PractitionerId,
                    ])
                    .update_columns([
                        ScheduleOverrideColumn::StartTime,
                        ScheduleOverrideColumn::EndTime,
                        ScheduleOverrideColumn::IsAvailable,
                        ScheduleOverrideColumn::UpdatedAt,
                    ])
                    .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(slots.len())
    }
}

// ========================================================================
// Procedure Ledger
// ========================================================================

#[async_trait]
impl ProcedureLedger for Repository {
    async fn list_procedures(&self, organization_id: Uuid, patient_id: Uuid) -> Result<Vec<LedgerEntry>> {
        DentalProcedureEntity::find()
            .filter(DentalProcedureColumn::OrganizationId.eq(organization_id))
            .filter(DentalProcedureColumn::PatientId.eq(patient_id))
            .order_by_asc(DentalProcedureColumn::Date)
            .order_by_asc(DentalProcedureColumn::Sequence)
            .all(self.read_conn())
            .await?
            .into_iter()
            .map(DentalProcedure::into_entry)
            .collect()
    }

    async fn find_procedure(&self, organization_id: Uuid, id: Uuid) -> Result<Option<LedgerEntry>> {
        DentalProcedureEntity::find_by_id(id)
            .filter(DentalProcedureColumn::OrganizationId.eq(organization_id))
            .one(self.read_conn())
            .await?
            .map(DentalProcedure::into_entry)
            .transpose()
    }

    async fn create_procedure(
        &self,
        organization_id: Uuid,
        procedure: NewProcedure,
        actor_id: Option<Uuid>,
    ) -> Result<LedgerEntry> {
        let now = Utc::now();
        let txn = self.write_conn().begin().await?;

        // sequence stays NotSet so the database assigns it
        let mut row = DentalProcedureActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(organization_id),
            created_at: Set(now.into()),
            ..Default::default()
        };
        apply_procedure(&mut row, &procedure)?;

        let inserted = row
            .insert(&txn)
            .await
            .map_err(|e| map_write_error(e, procedure.tooth_number))?;

        write_audit(&txn, organization_id, inserted.id, AuditAction::Created, None, actor_id).await?;
        txn.commit().await?;

        inserted.into_entry()
    }

    async fn update_procedure(
        &self,
        organization_id: Uuid,
        id: Uuid,
        procedure: NewProcedure,
        actor_id: Option<Uuid>,
    ) -> Result<LedgerEntry> {
        let txn = self.write_conn().begin().await?;

        let existing = find_procedure_row(&txn, organization_id, id).await?;
        let previous = existing.clone().into_entry()?;

        let mut row: DentalProcedureActiveModel = existing.into();
        apply_procedure(&mut row, &procedure)?;

        let updated = row
            .update(&txn)
            .await
            .map_err(|e| map_write_error(e, procedure.tooth_number))?;

        write_audit(&txn, organization_id, id, AuditAction::Updated, Some(&previous), actor_id).await?;
        txn.commit().await?;

        updated.into_entry()
    }

    async fn delete_procedure(&self, organization_id: Uuid, id: Uuid, actor_id: Option<Uuid>) -> Result<LedgerEntry> {
        let txn = self.write_conn().begin().await?;

        let existing = find_procedure_row(&txn, organization_id, id).await?;
        let removed = existing.into_entry()?;

        DentalProcedureEntity::delete_by_id(id).exec(&txn).await?;
        write_audit(&txn, organization_id, id, AuditAction::Deleted, Some(&removed), actor_id).await?;
        txn.commit().await?;

        Ok(removed)
    }

    async fn audit_trail(&self, organization_id: Uuid, procedure_id: Uuid) -> Result<Vec<AuditRecord>> {
        ProcedureAuditEntity::find()
            .filter(ProcedureAuditColumn::OrganizationId.eq(organization_id))
            .filter(ProcedureAuditColumn::ProcedureId.eq(procedure_id))
            .order_by_desc(ProcedureAuditColumn::RecordedAt)
            .order_by_desc(ProcedureAuditColumn::Seq)
            .all(self.read_conn())
            .await?
            .into_iter()
            .map(ProcedureAudit::into_record)
            .collect()
    }

    async fn undo_last(&self, organization_id: Uuid, procedure_id: Uuid) -> Result<UndoOutcome> {
        let txn = self.write_conn().begin().await?;

        let newest = ProcedureAuditEntity::find()
            .filter(ProcedureAuditColumn::OrganizationId.eq(organization_id))
            .filter(ProcedureAuditColumn::ProcedureId.eq(procedure_id))
            .order_by_desc(ProcedureAuditColumn::RecordedAt)
            .order_by_desc(ProcedureAuditColumn::Seq)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NothingToUndo { id: procedure_id.to_string() })?;

        let audit_id = newest.id;
        let record = newest.into_record()?;
        let plan = record.undo_plan().ok_or_else(|| AppError::Internal {
            message: format!("audit row {} has no snapshot", audit_id),
        })?;

        let (patient_id, procedure) = match plan {
            UndoPlan::Remove { procedure_id } => {
                let existing = find_procedure_row(&txn, organization_id, procedure_id).await?;
                DentalProcedureEntity::delete_by_id(procedure_id).exec(&txn).await?;
                (existing.patient_id, None)
            }
            UndoPlan::Restore(previous) => {
                find_procedure_row(&txn, organization_id, previous.id).await?;
                let disables = is_disable_code(&txn, previous.code_id).await?;
                entry_model(organization_id, &previous, disables)?
                    .update(&txn)
                    .await
                    .map_err(|e| map_write_error(e, previous.tooth_number))?;
                (previous.patient_id, Some(previous))
            }
            UndoPlan::Reinsert(previous) => {
                let disables = is_disable_code(&txn, previous.code_id).await?;
                entry_model(organization_id, &previous, disables)?
                    .insert(&txn)
                    .await
                    .map_err(|e| map_write_error(e, previous.tooth_number))?;
                (previous.patient_id, Some(previous))
            }
        };

        ProcedureAuditEntity::delete_by_id(audit_id).exec(&txn).await?;
        txn.commit().await?;

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
        if expired.is_empty() {
            return Ok(0);
        }

        let result = ProcedureAuditEntity::delete_many()
            .filter(ProcedureAuditColumn::Id.is_in(expired))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected)
    }
}

// ========================================================================
// Chart Store
// ========================================================================

#[async_trait]
impl ChartStore for Repository {
    async fn load_chart(&self, organization_id: Uuid, patient_id: Uuid) -> Result<Option<StoredChart>> {
        DentalChartEntity::find_by_id(patient_id)
            .filter(DentalChartColumn::OrganizationId.eq(organization_id))
            .one(self.read_conn())
            .await?
            .map(DentalChart::into_stored)
            .transpose()
    }

    async fn store_chart(&self, organization_id: Uuid, patient_id: Uuid, record: StoredChart) -> Result<()> {
        let row = DentalChartActiveModel {
            patient_id: Set(patient_id),
            organization_id: Set(organization_id),
            chart: Set(record.chart),
            tooth_hints: Set(to_json(&record.hints)?),
            periodontal: Set(to_json(&record.periodontal)?),
            updated_at: Set(Utc::now().into()),
        };

        DentalChartEntity::insert(row)
            .on_conflict(
                OnConflict::column(DentalChartColumn::PatientId)
                    .update_columns([
                        DentalChartColumn::Chart,
                        DentalChartColumn::ToothHints,
                        DentalChartColumn::Periodontal,
                        DentalChartColumn::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.write_conn())
            .await?;

        Ok(())
    }
}
