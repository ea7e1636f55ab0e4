//! Stored chart record, one per patient

use crate::dental::service::StoredChart;
use crate::errors::Result as AppResult;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "dental_charts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub patient_id: Uuid,

    pub organization_id: Uuid,

    /// Cache of the last reconciled chart
    #[sea_orm(column_type = "JsonBinary")]
    pub chart: Json,

    /// Client-recorded tooth types that differ from the FDI default
    #[sea_orm(column_type = "JsonBinary")]
    pub tooth_hints: Json,

    /// Snapshot log, oldest first
    #[sea_orm(column_type = "JsonBinary")]
    pub periodontal: Json,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn into_stored(self) -> AppResult<StoredChart> {
        let periodontal = match self.periodontal {
            Json::Null => Vec::new(),
            value => serde_json::from_value(value)?,
        };

        let hints = match self.tooth_hints {
            Json::Null => Default::default(),
            value => serde_json::from_value(value)?,
        };

        Ok(StoredChart {
            chart: self.chart,
            hints,
            periodontal,
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
}

impl Related<super::patient::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Patient.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dental::{ToothNumber, ToothType};

    #[test]
    fn test_row_into_stored_chart() {
        let row = Model {
            patient_id: Uuid::from_u128(2),
            organization_id: Uuid::from_u128(1),
            chart: serde_json::json!({ "18": { "isDisabled": false } }),
            tooth_hints: serde_json::json!({ "18": "premolar" }),
            periodontal: Json::Null,
            updated_at: chrono::Utc::now().fixed_offset(),
        };

        let stored = row.into_stored().unwrap();
        assert!(stored.periodontal.is_empty());
        assert_eq!(
            stored.hints.get(&ToothNumber::new(18).unwrap()),
            Some(&ToothType::Premolar)
        );
    }
}
