//! Initial schema
//!
//! Organizations and patients, the procedure code catalog, the procedure
//! ledger with its audit log, the per-patient chart record and schedules.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: TENANCY
        // ============================================================
        db.execute_unprepared(ORGANIZATIONS_SQL).await?;
        db.execute_unprepared(PATIENTS_SQL).await?;

        // ============================================================
        // PART 2: CODE CATALOG
        // ============================================================
        db.execute_unprepared(PROCEDURE_CODES_SQL).await?;

        // ============================================================
        // PART 3: LEDGER & AUDIT
        // ============================================================
        db.execute_unprepared(DENTAL_PROCEDURES_SQL).await?;
        db.execute_unprepared(PROCEDURE_AUDIT_SQL).await?;

        // ============================================================
        // PART 4: CHART RECORD
        // ============================================================
        db.execute_unprepared(DENTAL_CHARTS_SQL).await?;

        // ============================================================
        // PART 5: SCHEDULES
        // ============================================================
        db.execute_unprepared(SCHEDULES_SQL).await?;
        db.execute_unprepared(SCHEDULE_OVERRIDES_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

const ORGANIZATIONS_SQL: &str = r#"
CREATE TABLE organizations (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

const PATIENTS_SQL: &str = r#"
CREATE TABLE patients (
    id UUID PRIMARY KEY,
    organization_id UUID NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    date_of_birth DATE,
    email TEXT,
    phone TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX idx_patients_organization ON patients(organization_id);
"#;

const PROCEDURE_CODES_SQL: &str = r#"
CREATE TABLE procedure_codes (
    id UUID PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL,
    category TEXT NOT NULL CHECK (category IN (
        'filling', 'sealing', 'crown', 'bridge', 'extraction', 'disabled',
        'implant', 'root_canal', 'scaling', 'consultation', 'imaging', 'other'
    )),
    material TEXT,
    primary_surface TEXT,
    requires_tooth BOOLEAN NOT NULL DEFAULT FALSE,
    requires_surface BOOLEAN NOT NULL DEFAULT FALSE,
    requires_jaw BOOLEAN NOT NULL DEFAULT FALSE,
    is_per_element BOOLEAN NOT NULL DEFAULT FALSE,
    rate_cents BIGINT NOT NULL DEFAULT 0 CHECK (rate_cents >= 0)
);
"#;

const DENTAL_PROCEDURES_SQL: &str = r#"
CREATE TABLE dental_procedures (
    id UUID PRIMARY KEY,
    organization_id UUID NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    patient_id UUID NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    code_id UUID NOT NULL REFERENCES procedure_codes(id),
    tooth_number INTEGER CHECK (tooth_number BETWEEN 11 AND 48),
    sub_surfaces JSONB NOT NULL DEFAULT '[]',
    jaw TEXT CHECK (jaw IN ('upper', 'lower')),
    bridge_teeth JSONB NOT NULL DEFAULT '[]',
    pontic_teeth JSONB NOT NULL DEFAULT '[]',
    status TEXT NOT NULL DEFAULT 'COMPLETED' CHECK (status IN (
        'PENDING', 'IN_PROGRESS', 'COMPLETED', 'CANCELLED'
    )),
    date DATE NOT NULL,
    quantity INTEGER NOT NULL DEFAULT 1 CHECK (quantity >= 1),
    paid_cents BIGINT NOT NULL DEFAULT 0 CHECK (paid_cents >= 0),
    payment_method TEXT,
    notes TEXT,
    sequence BIGSERIAL NOT NULL,
    disables_tooth BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX idx_dental_procedures_patient
    ON dental_procedures(organization_id, patient_id, date, sequence);

-- One reserved disable procedure per tooth
CREATE UNIQUE INDEX uq_dental_procedures_disabled_tooth
    ON dental_procedures(patient_id, tooth_number, code_id)
    WHERE disables_tooth;
"#;

const PROCEDURE_AUDIT_SQL: &str = r#"
CREATE TABLE procedure_audit (
    id UUID PRIMARY KEY,
    organization_id UUID NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    procedure_id UUID NOT NULL,
    action TEXT NOT NULL CHECK (action IN ('created', 'updated', 'deleted')),
    snapshot JSONB,
    actor_id UUID,
    recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    seq BIGSERIAL NOT NULL
);

CREATE INDEX idx_procedure_audit_procedure
    ON procedure_audit(organization_id, procedure_id, recorded_at DESC, seq DESC);
"#;

const DENTAL_CHARTS_SQL: &str = r#"
CREATE TABLE dental_charts (
    patient_id UUID PRIMARY KEY REFERENCES patients(id) ON DELETE CASCADE,
    organization_id UUID NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    chart JSONB NOT NULL DEFAULT '{}',
    tooth_hints JSONB NOT NULL DEFAULT '{}',
    periodontal JSONB NOT NULL DEFAULT '[]',
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

const SCHEDULES_SQL: &str = r#"
CREATE TABLE schedules (
    id UUID PRIMARY KEY,
    organization_id UUID NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    start_date DATE NOT NULL,
    end_date DATE NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CHECK (end_date >= start_date)
);
"#;

const SCHEDULE_OVERRIDES_SQL: &str = r#"
CREATE TABLE schedule_overrides (
    id UUID PRIMARY KEY,
    schedule_id UUID NOT NULL REFERENCES schedules(id) ON DELETE CASCADE,
    date DATE NOT NULL,
    room_number INTEGER NOT NULL,
    practitioner_id UUID NOT NULL,
    start_time TIME,
    end_time TIME,
    is_available BOOLEAN NOT NULL DEFAULT FALSE,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT uq_schedule_overrides_slot
        UNIQUE (schedule_id, date, room_number, practitioner_id)
);
"#;

const DROP_ALL_SQL: &str = r#"
DROP TABLE IF EXISTS schedule_overrides;
DROP TABLE IF EXISTS schedules;
DROP TABLE IF EXISTS dental_charts;
DROP TABLE IF EXISTS procedure_audit;
DROP TABLE IF EXISTS dental_procedures;
DROP TABLE IF EXISTS procedure_codes;
DROP TABLE IF EXISTS patients;
DROP TABLE IF EXISTS organizations;
"#;
