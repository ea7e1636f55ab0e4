//! Seed the procedure code catalog
//!
//! Re-running updates descriptions, flags and rates in place; ids are
//! derived from the code so they are stable across databases.

use dentforge_common::db::models::{ProcedureCodeActiveModel, ProcedureCodeColumn, ProcedureCodeEntity};
use dentforge_common::dental::default_codes;
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set};

#[derive(DeriveMigrationName)]
pub struct Migration;

fn seed_rows() -> Vec<ProcedureCodeActiveModel> {
    default_codes()
        .into_iter()
        .map(|code| ProcedureCodeActiveModel {
            id: Set(code.id),
            code: Set(code.code),
            description: Set(code.description),
            category: Set(code.category.into()),
            material: Set(code.material.map(|m| m.as_str().to_string())),
            primary_surface: Set(code.primary_surface.map(|s| s.as_str().to_string())),
            requires_tooth: Set(code.requires_tooth),
            requires_surface: Set(code.requires_surface),
            requires_jaw: Set(code.requires_jaw),
            is_per_element: Set(code.is_per_element),
            rate_cents: Set(code.rate_cents),
        })
        .collect()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        ProcedureCodeEntity::insert_many(seed_rows())
            .on_conflict(
                OnConflict::column(ProcedureCodeColumn::Code)
                    .update_columns([
                        ProcedureCodeColumn::Description,
                        ProcedureCodeColumn::Category,
                        ProcedureCodeColumn::Material,
                        ProcedureCodeColumn::PrimarySurface,
                        ProcedureCodeColumn::RequiresTooth,
                        ProcedureCodeColumn::RequiresSurface,
                        ProcedureCodeColumn::RequiresJaw,
                        ProcedureCodeColumn::IsPerElement,
                        ProcedureCodeColumn::RateCents,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        let codes: Vec<String> = default_codes().into_iter().map(|c| c.code).collect();

        ProcedureCodeEntity::delete_many()
            .filter(ProcedureCodeColumn::Code.is_in(codes))
            .exec(db)
            .await?;

        Ok(())
    }
}
