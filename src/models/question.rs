use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Mcq,
    ShortAnswer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    Exact,
    AnyMatch,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: Uuid,
    pub assessment_id: Uuid,
    pub position: i32,
    pub question_type: String,
    pub question_text: String,
    pub max_score: Decimal,
    pub answer_mode: Option<String>,
    pub answer_count: Option<i32>,
    pub correct_answer: Option<String>,
    pub valid_answers: Option<JsonValue>,
}

impl Question {
    pub fn kind(&self) -> QuestionType {
        match self.question_type.as_str() {
            "mcq" | "multiple_choice" => QuestionType::Mcq,
            _ => QuestionType::ShortAnswer,
        }
    }

    pub fn answer_mode(&self) -> AnswerMode {
        match self.answer_mode.as_deref() {
            Some("any_match") => AnswerMode::AnyMatch,
            _ => AnswerMode::Exact,
        }
    }

    /// Whether a saved answer for this question carries several values.
    pub fn is_multi_value(&self) -> bool {
        self.kind() == QuestionType::ShortAnswer && self.answer_mode() == AnswerMode::AnyMatch
    }

    /// Accepted values for an any-match question. Stored either as a JSON
    /// array or, for older rows, as a newline/comma separated string.
    pub fn valid_answer_list(&self) -> Vec<String> {
        let from_json = match &self.valid_answers {
            Some(JsonValue::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(JsonValue::String(s)) => split_list(s),
            _ => Vec::new(),
        };
        if !from_json.is_empty() {
            return from_json;
        }
        self.correct_answer.as_deref().map(split_list).unwrap_or_default()
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c| c == '\n' || c == ',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuestionOption {
    pub id: Uuid,
    pub question_id: Uuid,
    pub position: i32,
    pub option_text: String,
    pub is_correct: bool,
}
