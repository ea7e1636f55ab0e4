//! Patient record handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use dentforge_common::{
    auth::{AuthContext, WRITE_SCOPE},
    db::{models::Patient, Repository},
    errors::{AppError, Result},
};

/// Request to create a patient
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePatientRequest {
    #[validate(length(min = 1, max = 200))]
    pub first_name: String,

    #[validate(length(min = 1, max = 200))]
    pub last_name: String,

    pub date_of_birth: Option<NaiveDate>,

    #[validate(email)]
    pub email: Option<String>,

    #[validate(length(max = 50))]
    pub phone: Option<String>,
}

/// Load a patient and check it belongs to the caller's organization
pub(crate) async fn authorize_patient(state: &AppState, auth: &AuthContext, patient_id: Uuid) -> Result<Patient> {
    let repo = Repository::new(state.db.clone());

    let patient = repo
        .find_patient_by_id(patient_id)
        .await?
        .ok_or_else(|| AppError::PatientNotFound {
            id: patient_id.to_string(),
        })?;

    auth.ensure_organization(patient.organization_id)?;
    Ok(patient)
}

/// Create a patient in the caller's organization
pub async fn create_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CreatePatientRequest>,
) -> Result<(StatusCode, Json<Patient>)> {
    auth.require_scope(WRITE_SCOPE)?;
    request.validate()?;

    let repo = Repository::new(state.db.clone());

    repo.find_organization_by_id(auth.organization_id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource_type: "organization".to_string(),
            id: auth.organization_id.to_string(),
        })?;

    let patient = repo
        .create_patient(
            auth.organization_id,
            request.first_name,
            request.last_name,
            request.date_of_birth,
            request.email,
            request.phone,
        )
        .await?;

    tracing::info!(
        patient_id = %patient.id,
        organization_id = %auth.organization_id,
        request_id = %auth.request_id,
        "Patient created"
    );

    Ok((StatusCode::CREATED, Json(patient)))
}

/// Get a patient
pub async fn get_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Patient>> {
    let patient = authorize_patient(&state, &auth, patient_id).await?;
    Ok(Json(patient))
}
