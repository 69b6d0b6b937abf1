use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Assessment {
    pub id: Uuid,
    pub class_id: Uuid,
    pub title: String,
    pub subject: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Minutes; `None` means no deadline (manual submit only).
    pub duration_minutes: Option<i32>,
    pub allow_late_submission: bool,
    pub late_submission_days: i32,
    pub shuffle_questions: bool,
    pub shuffle_options: bool,
    pub use_question_limit: bool,
    pub questions_to_answer: Option<i32>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Assessment {
    /// Pool size when question pooling is switched on.
    pub fn pool_size(&self) -> Option<usize> {
        if !self.use_question_limit {
            return None;
        }
        self.questions_to_answer.map(|n| n.max(0) as usize)
    }
}
