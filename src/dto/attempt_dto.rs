use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::answer::AnswerValue;
use crate::models::result::AssessmentResult;
use crate::services::grade_scale::{waec_grade, GradeScale};
use crate::services::grading_service::{percentage, QuestionScore};
use crate::services::timer_service::TimerState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresentedOption {
    pub id: Uuid,
    pub text: String,
}

/// A question as the student sees it; no answer key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresentedQuestion {
    pub id: Uuid,
    pub number: usize,
    pub question_type: String,
    pub question_text: String,
    pub max_score: Decimal,
    pub answer_mode: Option<String>,
    pub answer_count: Option<i32>,
    pub options: Vec<PresentedOption>,
    pub saved_answer: Option<AnswerValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PresentedAttempt {
    pub attempt_id: Uuid,
    pub assessment_id: Uuid,
    pub title: String,
    pub subject: String,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub timer: TimerState,
    pub remaining_seconds: Option<i64>,
    pub server_time: DateTime<Utc>,
    pub questions: Vec<PresentedQuestion>,
}

/// Outcome of starting or resuming an attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StartAttemptResponse {
    Started(PresentedAttempt),
    Resumed(PresentedAttempt),
    RedirectAttempt {
        attempt_id: Uuid,
        assessment_id: Uuid,
        redirect_to: String,
    },
    RedirectResult {
        assessment_id: Uuid,
        result_id: Uuid,
        redirect_to: String,
    },
}

fn answer_within_limits(value: &AnswerValue) -> Result<(), ValidationError> {
    let too_long = match value {
        AnswerValue::Single(s) => s.len() > 10_000,
        AnswerValue::Multi(values) => values.len() > 50 || values.iter().any(|v| v.len() > 1_000),
    };
    if too_long {
        return Err(ValidationError::new("answer_too_long"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SaveAnswerRequest {
    #[validate(custom(function = "answer_within_limits"))]
    pub answer: AnswerValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveAnswerResponse {
    pub saved: bool,
    pub question_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultView {
    pub result_id: Uuid,
    pub attempt_id: Uuid,
    pub assessment_id: Uuid,
    pub status: String,
    pub score: Decimal,
    pub max_score: Decimal,
    pub percentage: Decimal,
    pub grade: String,
    pub grade_description: String,
    /// Same percentage on the report-card scale.
    pub report_card_grade: String,
    pub completed_at: DateTime<Utc>,
}

impl From<&AssessmentResult> for ResultView {
    fn from(r: &AssessmentResult) -> Self {
        let pct = percentage(r.score, r.max_score);
        let band = waec_grade(pct);
        Self {
            result_id: r.id,
            attempt_id: r.attempt_id,
            assessment_id: r.assessment_id,
            status: r.status.clone(),
            score: r.score,
            max_score: r.max_score,
            percentage: pct.round_dp(2),
            grade: band.grade.to_string(),
            grade_description: band.description.to_string(),
            report_card_grade: GradeScale::report_card().classify(pct).grade.to_string(),
            completed_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitAttemptResponse {
    pub attempt_id: Uuid,
    pub already_submitted: bool,
    pub result: ResultView,
    /// Per-question scores; only present when this call did the grading.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Vec<QuestionScore>>,
    pub redirect_to: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemainingTimeResponse {
    pub attempt_id: Uuid,
    pub status: String,
    pub timer: TimerState,
    pub remaining_seconds: Option<i64>,
    pub server_time: DateTime<Utc>,
    pub auto_submitted: bool,
    pub result: Option<ResultView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClockSyncRequest {
    #[validate(range(min = 0))]
    pub client_time_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepResponse {
    pub checked: usize,
    pub auto_submitted: usize,
    pub failed: usize,
}

pub fn result_path(assessment_id: Uuid) -> String {
    format!("/api/assessments/{}/result", assessment_id)
}

/// Where a student continues an in-progress attempt.
pub fn resume_path(assessment_id: Uuid) -> String {
    format!("/api/assessments/{}/attempts", assessment_id)
}
