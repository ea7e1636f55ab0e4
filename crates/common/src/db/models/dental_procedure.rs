//! Dental procedure entity (the ledger)

use crate::dental::ledger::{LedgerEntry, ProcedureStatus};
use crate::dental::tooth::{Jaw, Surface, ToothNumber};
use crate::errors::Result as AppResult;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "dental_procedures")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub organization_id: Uuid,

    pub patient_id: Uuid,

    pub code_id: Uuid,

    pub tooth_number: Option<i32>,

    /// JSON array of surface names
    #[sea_orm(column_type = "JsonBinary")]
    pub sub_surfaces: Json,

    #[sea_orm(column_type = "Text", nullable)]
    pub jaw: Option<String>,

    #[sea_orm(column_type = "JsonBinary")]
    pub bridge_teeth: Json,

    #[sea_orm(column_type = "JsonBinary")]
    pub pontic_teeth: Json,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub date: Date,

    pub quantity: i32,

    pub paid_cents: i64,

    #[sea_orm(column_type = "Text", nullable)]
    pub payment_method: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,

    /// bigserial; assigned by the database on insert
    pub sequence: i64,

    /// Set for the reserved disable code; backs the partial unique index
    pub disables_tooth: bool,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Convert the row into a ledger entry
    pub fn into_entry(self) -> AppResult<LedgerEntry> {
        let sub_surfaces: Vec<Surface> = serde_json::from_value(self.sub_surfaces)?;
        let bridge_teeth: Vec<ToothNumber> = serde_json::from_value(self.bridge_teeth)?;
        let pontic_teeth: Vec<ToothNumber> = serde_json::from_value(self.pontic_teeth)?;

        Ok(LedgerEntry {
            id: self.id,
            patient_id: self.patient_id,
            code_id: self.code_id,
            tooth_number: self.tooth_number.map(ToothNumber::from_i32).transpose()?,
            sub_surfaces,
            jaw: self.jaw.as_deref().map(str::parse::<Jaw>).transpose()?,
            bridge_teeth,
            pontic_teeth,
            status: ProcedureStatus::from(self.status),
            date: self.date,
            quantity: self.quantity,
            paid_cents: self.paid_cents,
            payment_method: self.payment_method,
            notes: self.notes,
            sequence: self.sequence,
            created_at: self.created_at.into(),
        })
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::patient::Entity",
        from = "Column::PatientId",
        to = "super::patient::Column::Id"
    )]
    Patient,

    #[sea_orm(
        belongs_to = "super::procedure_code::Entity",
        from = "Column::CodeId",
        to = "super::procedure_code::Column::Id"
    )]
    Code,
}

impl Related<super::patient::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Patient.def()
    }
}

impl Related<super::procedure_code::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Code.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
