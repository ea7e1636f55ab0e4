//! Dental chart handlers

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use super::patients::authorize_patient;
use crate::AppState;
use dentforge_common::{
    auth::{AuthContext, WRITE_SCOPE},
    dental::{ChartMutation, ChartSave, DentalRecord, ProcedureResult, ToothNumber},
    errors::Result,
};

/// Chart, periodontal log and ledger for a patient
pub async fn get_dental(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<DentalRecord>> {
    authorize_patient(&state, &auth, patient_id).await?;

    let record = state.charts.load(auth.organization_id, patient_id).await?;
    Ok(Json(record))
}

/// Save the chart and a periodontal snapshot
pub async fn save_dental(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
    Json(request): Json<ChartSave>,
) -> Result<Json<DentalRecord>> {
    auth.require_scope(WRITE_SCOPE)?;
    authorize_patient(&state, &auth, patient_id).await?;

    let record = state.charts.save(auth.organization_id, patient_id, request).await?;
    Ok(Json(record))
}

/// Mark a tooth absent
pub async fn disable_tooth(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((patient_id, tooth)): Path<(Uuid, u8)>,
) -> Result<Json<ChartMutation<ProcedureResult>>> {
    auth.require_scope(WRITE_SCOPE)?;
    let tooth = ToothNumber::new(tooth)?;
    authorize_patient(&state, &auth, patient_id).await?;

    let result = state
        .charts
        .disable_tooth(auth.organization_id, patient_id, tooth, Some(auth.user_id))
        .await?;

    tracing::info!(patient_id = %patient_id, tooth = %tooth, "Tooth disabled");
    Ok(Json(result))
}

/// Undo a tooth's disabled marking
pub async fn enable_tooth(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((patient_id, tooth)): Path<(Uuid, u8)>,
) -> Result<Json<ChartMutation<ProcedureResult>>> {
    auth.require_scope(WRITE_SCOPE)?;
    let tooth = ToothNumber::new(tooth)?;
    authorize_patient(&state, &auth, patient_id).await?;

    let result = state
        .charts
        .enable_tooth(auth.organization_id, patient_id, tooth, Some(auth.user_id))
        .await?;

    tracing::info!(patient_id = %patient_id, tooth = %tooth, "Tooth enabled");
    Ok(Json(result))
}
