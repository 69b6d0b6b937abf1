pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post, put},
    BoxError, Router,
};
use serde_json::json;
use sqlx::PgPool;
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::services::attempt_service::{AttemptService, AttemptSettings};
use crate::services::timer_service::TimerService;
use crate::utils::time::{Clock, SystemClock};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub attempt_service: AttemptService,
    pub timer_service: TimerService,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(pool: PgPool, config: &Config) -> Self {
        Self::with_clock(pool, config, Arc::new(SystemClock))
    }

    /// Builds the state around an explicit clock; tests pass a fixed one.
    pub fn with_clock(pool: PgPool, config: &Config, clock: Arc<dyn Clock>) -> Self {
        let attempt_service = AttemptService::new(
            pool.clone(),
            clock.clone(),
            AttemptSettings::from_config(config),
        );
        let timer_service = TimerService::new(clock, config.clock_sync_interval_secs);
        Self {
            pool,
            attempt_service,
            timer_service,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

async fn handle_timeout(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        tracing::warn!("request timed out");
        (
            StatusCode::REQUEST_TIMEOUT,
            Json(json!({ "error": "timeout", "message": "Request timed out" })),
        )
    } else {
        tracing::error!(error = %err, "unhandled middleware error");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "internal_error", "message": "An unexpected error occurred" })),
        )
    }
}

pub fn build_router(state: AppState) -> Router {
    let timeout = state.request_timeout;

    let student_api = Router::new()
        .route(
            "/api/assessments/:assessment_id/attempts",
            post(routes::attempt::start_attempt),
        )
        .route(
            "/api/assessments/:assessment_id/result",
            get(routes::attempt::get_result),
        )
        .route(
            "/api/attempts/:attempt_id/questions/:question_id",
            get(routes::attempt::get_question),
        )
        .route(
            "/api/attempts/:attempt_id/answers/:question_id",
            put(routes::attempt::save_answer),
        )
        .route(
            "/api/attempts/:attempt_id/submit",
            post(routes::attempt::submit_attempt),
        )
        .route(
            "/api/attempts/:attempt_id/time",
            get(routes::attempt::remaining_time),
        )
        .route("/api/clock/sync", post(routes::attempt::sync_clock))
        .layer(axum::middleware::from_fn(middleware::auth::require_student));

    let system_api = Router::new()
        .route(
            "/api/system/attempts/:attempt_id/auto-submit",
            post(routes::system::auto_submit),
        )
        .route(
            "/api/system/attempts/sweep-expired",
            post(routes::system::sweep_expired),
        )
        .layer(axum::middleware::from_fn(
            middleware::auth::require_system_secret,
        ));

    Router::new()
        .route("/health", get(routes::health::health))
        .merge(student_api)
        .merge(system_api)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout))
                .layer(TimeoutLayer::new(timeout)),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
