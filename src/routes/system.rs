use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::dto::attempt_dto::{SubmitAttemptResponse, SweepResponse};
use crate::error::Result;
use crate::AppState;

/// Scheduler hook for one attempt whose timer has run out.
#[axum::debug_handler]
pub async fn auto_submit(
    State(state): State<AppState>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Json<SubmitAttemptResponse>> {
    let outcome = state.attempt_service.auto_submit(attempt_id).await?;
    Ok(Json(outcome.into_response(attempt_id)))
}

#[axum::debug_handler]
pub async fn sweep_expired(State(state): State<AppState>) -> Result<Json<SweepResponse>> {
    Ok(Json(state.attempt_service.sweep_expired().await?))
}
