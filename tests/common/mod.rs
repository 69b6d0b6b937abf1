#![allow(dead_code)]

use std::env;
use std::sync::Arc;

use assessment_backend::dto::attempt_dto::{PresentedAttempt, StartAttemptResponse};
use assessment_backend::services::attempt_service::{AttemptService, AttemptSettings};
use assessment_backend::utils::time::FixedClock;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret_key";
pub const SYSTEM_SECRET: &str = "system_test_secret";

/// Shared config plus a migrated pool. DATABASE_URL comes from the
/// environment or `.env`.
pub async fn setup() -> PgPool {
    dotenvy::dotenv().ok();
    env::set_var("SERVER_ADDRESS", "127.0.0.1:0");
    env::set_var("JWT_SECRET", JWT_SECRET);
    env::set_var("SYSTEM_SECRET", SYSTEM_SECRET);

    assessment_backend::config::ensure_config().expect("init config");
    let pool = assessment_backend::database::pool::create_pool()
        .await
        .expect("pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

/// Whole-second "now"; the database keeps microseconds, chrono keeps nanos.
pub fn now_secs() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

pub fn service(pool: &PgPool, clock: Arc<FixedClock>) -> AttemptService {
    AttemptService::new(
        pool.clone(),
        clock,
        AttemptSettings {
            random_seed: Some(7),
            retry_attempts: 3,
        },
    )
}

#[derive(Debug, Clone)]
pub struct AssessmentOpts {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
    pub allow_late_submission: bool,
    pub late_submission_days: i32,
    pub shuffle_questions: bool,
    pub shuffle_options: bool,
    pub questions_to_answer: Option<i32>,
    pub subject: String,
}

impl AssessmentOpts {
    /// Open from an hour before `now` until a day after.
    pub fn open_at(now: DateTime<Utc>) -> Self {
        Self {
            start_time: now - Duration::hours(1),
            end_time: now + Duration::days(1),
            duration_minutes: None,
            allow_late_submission: false,
            late_submission_days: 0,
            shuffle_questions: false,
            shuffle_options: false,
            questions_to_answer: None,
            subject: "Mathematics".into(),
        }
    }
}

pub async fn seed_class(pool: &PgPool) -> Uuid {
    sqlx::query_scalar("INSERT INTO classes (name) VALUES ($1) RETURNING id")
        .bind(format!("JSS2-{}", Uuid::new_v4()))
        .fetch_one(pool)
        .await
        .expect("seed class")
}

/// A student, on the roster of `class_id` when given.
pub async fn seed_student(pool: &PgPool, class_id: Option<Uuid>) -> Uuid {
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO students (full_name, admission_number) VALUES ($1, $2) RETURNING id",
    )
    .bind("Ada Okafor")
    .bind(format!("ADM-{}", Uuid::new_v4()))
    .fetch_one(pool)
    .await
    .expect("seed student");
    if let Some(class_id) = class_id {
        sqlx::query("INSERT INTO class_enrollments (student_id, class_id) VALUES ($1, $2)")
            .bind(id)
            .bind(class_id)
            .execute(pool)
            .await
            .expect("enroll student");
    }
    id
}

pub async fn seed_assessment(pool: &PgPool, class_id: Uuid, opts: &AssessmentOpts) -> Uuid {
    sqlx::query_scalar(
        r#"
        INSERT INTO assessments (
            class_id, title, subject, start_time, end_time, duration_minutes,
            allow_late_submission, late_submission_days, shuffle_questions, shuffle_options,
            use_question_limit, questions_to_answer
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING id
        "#,
    )
    .bind(class_id)
    .bind("First Term CA")
    .bind(&opts.subject)
    .bind(opts.start_time)
    .bind(opts.end_time)
    .bind(opts.duration_minutes)
    .bind(opts.allow_late_submission)
    .bind(opts.late_submission_days)
    .bind(opts.shuffle_questions)
    .bind(opts.shuffle_options)
    .bind(opts.questions_to_answer.is_some())
    .bind(opts.questions_to_answer)
    .fetch_one(pool)
    .await
    .expect("seed assessment")
}

pub struct SeededMcq {
    pub id: Uuid,
    pub options: Vec<Uuid>,
    pub correct: Uuid,
}

/// An MCQ with `option_count` options; the first one is correct.
pub async fn seed_mcq(
    pool: &PgPool,
    assessment_id: Uuid,
    position: i32,
    max_score: i64,
    option_count: usize,
) -> SeededMcq {
    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO questions (assessment_id, position, question_type, question_text, max_score)
        VALUES ($1, $2, 'mcq', $3, $4)
        RETURNING id
        "#,
    )
    .bind(assessment_id)
    .bind(position)
    .bind(format!("Question {}", position))
    .bind(Decimal::from(max_score))
    .fetch_one(pool)
    .await
    .expect("seed mcq");

    let mut options = Vec::with_capacity(option_count);
    for i in 0..option_count {
        let option_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO question_options (question_id, position, option_text, is_correct)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(i as i32)
        .bind(format!("Option {}", i))
        .bind(i == 0)
        .fetch_one(pool)
        .await
        .expect("seed option");
        options.push(option_id);
    }
    SeededMcq {
        id,
        correct: options[0],
        options,
    }
}

pub async fn seed_exact(pool: &PgPool, assessment_id: Uuid, position: i32, expected: &str) -> Uuid {
    sqlx::query_scalar(
        r#"
        INSERT INTO questions (assessment_id, position, question_type, question_text, max_score, answer_mode, correct_answer)
        VALUES ($1, $2, 'short_answer', 'Capital of Nigeria?', 2, 'exact', $3)
        RETURNING id
        "#,
    )
    .bind(assessment_id)
    .bind(position)
    .bind(expected)
    .fetch_one(pool)
    .await
    .expect("seed exact question")
}

pub async fn seed_any_match(
    pool: &PgPool,
    assessment_id: Uuid,
    position: i32,
    valid: &[&str],
    answer_count: i32,
    max_score: i64,
) -> Uuid {
    sqlx::query_scalar(
        r#"
        INSERT INTO questions (assessment_id, position, question_type, question_text, max_score, answer_mode, answer_count, valid_answers)
        VALUES ($1, $2, 'short_answer', 'Name some European capitals', $3, 'any_match', $4, $5)
        RETURNING id
        "#,
    )
    .bind(assessment_id)
    .bind(position)
    .bind(Decimal::from(max_score))
    .bind(answer_count)
    .bind(json!(valid))
    .fetch_one(pool)
    .await
    .expect("seed any-match question")
}

pub fn presented(outcome: &StartAttemptResponse) -> &PresentedAttempt {
    match outcome {
        StartAttemptResponse::Started(p) | StartAttemptResponse::Resumed(p) => p,
        other => panic!("expected a presented attempt, got {:?}", other),
    }
}

pub async fn in_progress_count(pool: &PgPool, student_id: Uuid) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM attempts WHERE student_id = $1 AND status = 'in_progress'",
    )
    .bind(student_id)
    .fetch_one(pool)
    .await
    .expect("count attempts")
}
