//! Procedure audit entity, one row per ledger mutation

use crate::dental::audit::{AuditAction, AuditRecord};
use crate::errors::Result as AppResult;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "procedure_audit")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub organization_id: Uuid,

    /// Not a foreign key: rows outlive deleted procedures
    pub procedure_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub action: String,

    /// Pre-mutation procedure; null for creations
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub snapshot: Option<Json>,

    pub actor_id: Option<Uuid>,

    pub recorded_at: DateTimeWithTimeZone,

    /// Database-assigned, breaks ties between rows with the same timestamp
    pub seq: i64,
}

impl Model {
    pub fn into_record(self) -> AppResult<AuditRecord> {
        let snapshot = self.snapshot.map(serde_json::from_value).transpose()?;

        Ok(AuditRecord {
            id: self.id,
            procedure_id: self.procedure_id,
            action: AuditAction::from(self.action),
            snapshot,
            actor_id: self.actor_id,
            recorded_at: self.recorded_at.into(),
        })
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
