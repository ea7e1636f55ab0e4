//! Procedure code catalog handler

use crate::AppState;
use axum::{extract::State, Json};
use dentforge_common::{auth::AuthContext, dental::ProcedureCode};
use serde::Serialize;

#[derive(Serialize)]
pub struct CodesResponse {
    pub codes: Vec<ProcedureCode>,
    pub total: usize,
}

/// List every procedure code, sorted by code
pub async fn list_codes(State(state): State<AppState>, _auth: AuthContext) -> Json<CodesResponse> {
    let codes: Vec<ProcedureCode> = state.charts.catalog().codes().into_iter().cloned().collect();

    Json(CodesResponse {
        total: codes.len(),
        codes,
    })
}
