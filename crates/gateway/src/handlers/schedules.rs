//! Schedule and override handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use dentforge_common::{
    auth::{AuthContext, WRITE_SCOPE},
    db::{
        models::{Schedule, ScheduleOverride},
        Repository,
    },
    errors::{AppError, Result},
    metrics,
    schedule::{CreateScheduleRequest, WeekdayOverrideRequest},
};

#[derive(Serialize)]
pub struct OverridesResponse {
    pub overrides: Vec<ScheduleOverride>,
    pub total: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpansionResponse {
    pub schedule_id: Uuid,
    pub upserted: usize,
    pub dates: Vec<chrono::NaiveDate>,
}

async fn authorize_schedule(repo: &Repository, auth: &AuthContext, schedule_id: Uuid) -> Result<Schedule> {
    let schedule = repo
        .find_schedule_by_id(schedule_id)
        .await?
        .ok_or_else(|| AppError::ScheduleNotFound {
            id: schedule_id.to_string(),
        })?;

    auth.ensure_organization(schedule.organization_id)?;
    Ok(schedule)
}

/// Create a schedule
pub async fn create_schedule(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<Schedule>)> {
    auth.require_scope(WRITE_SCOPE)?;
    request.validate()?;
    request.check_range()?;

    let repo = Repository::new(state.db.clone());
    let schedule = repo
        .create_schedule(auth.organization_id, request.name, request.start_date, request.end_date)
        .await?;

    tracing::info!(schedule_id = %schedule.id, "Schedule created");
    Ok((StatusCode::CREATED, Json(schedule)))
}

/// Overrides for a schedule
pub async fn list_overrides(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<OverridesResponse>> {
    let repo = Repository::new(state.db.clone());
    authorize_schedule(&repo, &auth, schedule_id).await?;

    let overrides = repo.list_overrides(schedule_id).await?;
    Ok(Json(OverridesResponse {
        total: overrides.len(),
        overrides,
    }))
}

/// Expand a weekday rule over the schedule range and upsert the overrides
pub async fn expand_weekday_overrides(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(schedule_id): Path<Uuid>,
    Json(request): Json<WeekdayOverrideRequest>,
) -> Result<Json<ExpansionResponse>> {
    auth.require_scope(WRITE_SCOPE)?;
    request.validate()?;

    let repo = Repository::new(state.db.clone());
    let schedule = authorize_schedule(&repo, &auth, schedule_id).await?;

    let slots = request.expand(schedule.id, schedule.start_date, schedule.end_date)?;
    let upserted = repo.upsert_overrides(&slots).await?;
    metrics::record_schedule_overrides(upserted);

    tracing::info!(
        schedule_id = %schedule_id,
        weekday = %request.weekday,
        upserted,
        "Weekday overrides expanded"
    );

    Ok(Json(ExpansionResponse {
        schedule_id,
        upserted,
        dates: slots.into_iter().map(|s| s.date).collect(),
    }))
}
