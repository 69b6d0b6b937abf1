use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AssessmentResult {
    pub id: Uuid,
    pub attempt_id: Uuid,
    pub student_id: Uuid,
    pub assessment_id: Uuid,
    pub status: String,
    pub score: Decimal,
    pub max_score: Decimal,
    pub created_at: DateTime<Utc>,
}
