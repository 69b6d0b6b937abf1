use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::attempt_dto::{
    ClockSyncRequest, PresentedQuestion, RemainingTimeResponse, ResultView, SaveAnswerRequest,
    SaveAnswerResponse, StartAttemptResponse, SubmitAttemptResponse,
};
use crate::error::Result;
use crate::middleware::auth::Claims;
use crate::services::timer_service::ClockSync;
use crate::AppState;

#[axum::debug_handler]
pub async fn start_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<Uuid>,
) -> Result<Response> {
    let student_id = claims.student_id()?;
    let outcome = state
        .attempt_service
        .start_or_resume(student_id, assessment_id)
        .await?;
    let status = match outcome {
        StartAttemptResponse::Started(_) => StatusCode::CREATED,
        _ => StatusCode::OK,
    };
    Ok((status, Json(outcome)).into_response())
}

#[axum::debug_handler]
pub async fn get_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((attempt_id, question_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<PresentedQuestion>> {
    let student_id = claims.student_id()?;
    let question = state
        .attempt_service
        .render_question(student_id, attempt_id, question_id)
        .await?;
    Ok(Json(question))
}

#[axum::debug_handler]
pub async fn save_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((attempt_id, question_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<Json<SaveAnswerResponse>> {
    payload.validate()?;
    let student_id = claims.student_id()?;
    let timestamp = state
        .attempt_service
        .save_answer(student_id, attempt_id, question_id, payload.answer)
        .await?;
    Ok(Json(SaveAnswerResponse {
        saved: true,
        question_id,
        timestamp,
    }))
}

#[axum::debug_handler]
pub async fn submit_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Json<SubmitAttemptResponse>> {
    let student_id = claims.student_id()?;
    let outcome = state.attempt_service.submit(student_id, attempt_id).await?;
    Ok(Json(outcome.into_response(attempt_id)))
}

#[axum::debug_handler]
pub async fn remaining_time(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Json<RemainingTimeResponse>> {
    let student_id = claims.student_id()?;
    let response = state
        .attempt_service
        .remaining_time(student_id, attempt_id)
        .await?;
    Ok(Json(response))
}

#[axum::debug_handler]
pub async fn sync_clock(
    State(state): State<AppState>,
    Json(payload): Json<ClockSyncRequest>,
) -> Result<Json<ClockSync>> {
    payload.validate()?;
    Ok(Json(state.timer_service.sync_clock(payload.client_time_ms)))
}

#[axum::debug_handler]
pub async fn get_result(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<Uuid>,
) -> Result<Json<ResultView>> {
    let student_id = claims.student_id()?;
    let view = state
        .attempt_service
        .result_for(student_id, assessment_id)
        .await?;
    Ok(Json(view))
}
