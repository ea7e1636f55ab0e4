//! Procedure code entity (reference data)

use crate::dental::catalog::{Material, ProcedureCategory, ProcedureCode};
use crate::dental::tooth::Surface;
use crate::errors::{AppError, Result as AppResult};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "procedure_codes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text", unique)]
    pub code: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    #[sea_orm(column_type = "Text")]
    pub category: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub material: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub primary_surface: Option<String>,

    pub requires_tooth: bool,

    pub requires_surface: bool,

    pub requires_jaw: bool,

    pub is_per_element: bool,

    pub rate_cents: i64,
}

impl Model {
    /// Convert the row into the catalog's code type
    pub fn into_code(self) -> AppResult<ProcedureCode> {
        let material = self
            .material
            .as_deref()
            .map(str::parse::<Material>)
            .transpose()
            .map_err(|message| AppError::Configuration {
                message: format!("procedure code {}: {}", self.code, message),
            })?;

        let primary_surface = self
            .primary_surface
            .as_deref()
            .map(str::parse::<Surface>)
            .transpose()?;

        Ok(ProcedureCode {
            id: self.id,
            code: self.code,
            description: self.description,
            category: ProcedureCategory::from(self.category),
            material,
            primary_surface,
            requires_tooth: self.requires_tooth,
            requires_surface: self.requires_surface,
            requires_jaw: self.requires_jaw,
            is_per_element: self.is_per_element,
            rate_cents: self.rate_cents,
        })
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::dental_procedure::Entity")]
    Procedures,
}

impl Related<super::dental_procedure::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Procedures.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
