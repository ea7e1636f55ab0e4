//! Procedure ledger handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use super::patients::authorize_patient;
use crate::AppState;
use dentforge_common::{
    auth::{AuthContext, WRITE_SCOPE},
    dental::{AuditRecord, ChartMutation, LedgerEntry, ProcedureDraft, ProcedurePatch, ProcedureResult, UndoOutcome},
    errors::Result,
};

#[derive(Serialize)]
pub struct ProceduresResponse {
    pub procedures: Vec<LedgerEntry>,
    pub total: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResponse {
    pub procedure_id: Uuid,
    pub entries: Vec<AuditRecord>,
}

/// The patient's ledger in replay order
pub async fn list_procedures(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<ProceduresResponse>> {
    authorize_patient(&state, &auth, patient_id).await?;

    let procedures = state.charts.procedures(auth.organization_id, patient_id).await?;
    Ok(Json(ProceduresResponse {
        total: procedures.len(),
        procedures,
    }))
}

/// Record a procedure and return the rebuilt chart
pub async fn create_procedure(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
    Json(draft): Json<ProcedureDraft>,
) -> Result<(StatusCode, Json<ChartMutation<ProcedureResult>>)> {
    auth.require_scope(WRITE_SCOPE)?;
    authorize_patient(&state, &auth, patient_id).await?;

    let result = state
        .charts
        .create_procedure(auth.organization_id, patient_id, draft, Some(auth.user_id))
        .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

/// Patch a procedure and return the rebuilt chart
pub async fn update_procedure(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(procedure_id): Path<Uuid>,
    Json(patch): Json<ProcedurePatch>,
) -> Result<Json<ChartMutation<ProcedureResult>>> {
    auth.require_scope(WRITE_SCOPE)?;
    let result = state
        .charts
        .update_procedure(auth.organization_id, procedure_id, patch, Some(auth.user_id))
        .await?;

    Ok(Json(result))
}

/// Delete a procedure and return the rebuilt chart
pub async fn delete_procedure(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(procedure_id): Path<Uuid>,
) -> Result<Json<ChartMutation<ProcedureResult>>> {
    auth.require_scope(WRITE_SCOPE)?;
    let result = state
        .charts
        .delete_procedure(auth.organization_id, procedure_id, Some(auth.user_id))
        .await?;

    Ok(Json(result))
}

/// Audit trail, newest first
pub async fn get_audit(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(procedure_id): Path<Uuid>,
) -> Result<Json<AuditResponse>> {
    let entries = state.charts.audit_trail(auth.organization_id, procedure_id).await?;

    Ok(Json(AuditResponse { procedure_id, entries }))
}

/// Revert the newest mutation of a procedure
pub async fn undo_procedure(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(procedure_id): Path<Uuid>,
) -> Result<Json<ChartMutation<UndoOutcome>>> {
    auth.require_scope(WRITE_SCOPE)?;
    let result = state.charts.undo(auth.organization_id, procedure_id).await?;

    tracing::info!(
        procedure_id = %procedure_id,
        user_id = %auth.user_id,
        request_id = %auth.request_id,
        "Undo applied"
    );

    Ok(Json(result))
}
