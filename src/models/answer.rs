use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnswerRow {
    pub id: Uuid,
    pub student_id: Uuid,
    pub assessment_id: Uuid,
    pub question_id: Uuid,
    pub answer_text: String,
    pub score: Option<Decimal>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A student's response to one question.
///
/// Multi-value answers are stored newline-joined; that join only exists in
/// `encode`/`decode` and nowhere else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Single(String),
    Multi(Vec<String>),
}

impl AnswerValue {
    pub fn encode(&self) -> String {
        match self {
            AnswerValue::Single(s) => s.clone(),
            AnswerValue::Multi(values) => values
                .iter()
                .map(|v| v.replace(['\r', '\n'], " "))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn decode(stored: &str, multi_value: bool) -> Self {
        if multi_value {
            AnswerValue::Multi(
                stored
                    .split('\n')
                    .map(|s| s.trim_end_matches('\r').to_string())
                    .collect(),
            )
        } else {
            AnswerValue::Single(stored.to_string())
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            AnswerValue::Single(s) => s.trim().is_empty(),
            AnswerValue::Multi(values) => values.iter().all(|v| v.trim().is_empty()),
        }
    }
}
