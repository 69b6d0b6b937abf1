use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::reset::AnswerMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attempt {
    pub id: Uuid,
    pub student_id: Uuid,
    pub assessment_id: Uuid,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub question_order: Option<Json<Vec<Uuid>>>,
    pub option_orders: Json<HashMap<Uuid, Vec<Uuid>>>,
    pub answer_metadata: Option<JsonValue>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Attempt {
    pub fn status(&self) -> AttemptStatus {
        if self.status == AttemptStatus::InProgress.as_str() {
            AttemptStatus::InProgress
        } else {
            AttemptStatus::Completed
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status() == AttemptStatus::InProgress
    }

    pub fn metadata(&self) -> AnswerMetadata {
        AnswerMetadata::from_json(self.answer_metadata.as_ref())
    }

    pub fn fixed_order(&self) -> Option<&[Uuid]> {
        self.question_order.as_ref().map(|o| o.0.as_slice())
    }

    pub fn option_order(&self, question_id: Uuid) -> Option<&[Uuid]> {
        self.option_orders.0.get(&question_id).map(Vec::as_slice)
    }
}
