use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::config::Config;
use crate::database::retry::with_retry;
use crate::dto::attempt_dto::{
    result_path, resume_path, PresentedAttempt, PresentedOption, PresentedQuestion,
    RemainingTimeResponse, ResultView, StartAttemptResponse, SubmitAttemptResponse, SweepResponse,
};
use crate::error::{Error, Result};
use crate::models::answer::AnswerValue;
use crate::models::assessment::Assessment;
use crate::models::attempt::{Attempt, AttemptStatus};
use crate::models::question::{Question, QuestionOption, QuestionType};
use crate::models::reset::AnswerMetadata;
use crate::models::result::AssessmentResult;
use crate::services::availability::assessment_availability;
use crate::services::enrollment_service::EnrollmentService;
use crate::services::grading_service::{GradableQuestion, GradeSummary, GradingService};
use crate::services::pool_service::{check_pool_feasible, PoolService};
use crate::services::timer_service::{closed_timer_state, timer_state};
use crate::utils::time::Clock;

const ONE_IN_PROGRESS_INDEX: &str = "attempts_one_in_progress_per_student";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    Manual,
    Deadline,
    System,
}

impl SubmitTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmitTrigger::Manual => "manual",
            SubmitTrigger::Deadline => "deadline",
            SubmitTrigger::System => "system",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub result: AssessmentResult,
    /// The attempt was already completed; `result` is the existing row.
    pub already_submitted: bool,
    pub summary: Option<GradeSummary>,
}

impl SubmitOutcome {
    pub fn into_response(self, attempt_id: Uuid) -> SubmitAttemptResponse {
        SubmitAttemptResponse {
            attempt_id,
            already_submitted: self.already_submitted,
            redirect_to: result_path(self.result.assessment_id),
            result: ResultView::from(&self.result),
            breakdown: self.summary.map(|s| s.questions),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttemptSettings {
    pub random_seed: Option<u64>,
    pub retry_attempts: u32,
}

impl AttemptSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            random_seed: config.random_seed,
            retry_attempts: config.store_retry_attempts,
        }
    }
}

impl Default for AttemptSettings {
    fn default() -> Self {
        Self {
            random_seed: None,
            retry_attempts: 3,
        }
    }
}

#[derive(Clone)]
pub struct AttemptService {
    pool: PgPool,
    clock: Arc<dyn Clock>,
    pool_service: PoolService,
    enrollment: EnrollmentService,
    retry_attempts: u32,
}

impl AttemptService {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>, settings: AttemptSettings) -> Self {
        Self {
            pool_service: PoolService::new(pool.clone(), settings.random_seed),
            enrollment: EnrollmentService::new(pool.clone()),
            retry_attempts: settings.retry_attempts,
            pool,
            clock,
        }
    }

    pub async fn start_or_resume(
        &self,
        student_id: Uuid,
        assessment_id: Uuid,
    ) -> Result<StartAttemptResponse> {
        let now = self.clock.now();
        let assessment = fetch_assessment(&self.pool, assessment_id).await?;

        let Some(path) = self.enrollment.access_path(student_id, &assessment, now).await? else {
            tracing::warn!(%student_id, %assessment_id, "student is not enrolled for assessment");
            return Err(Error::AccessDenied(
                "You are not enrolled for this assessment".to_string(),
            ));
        };

        if let Some(active) = fetch_in_progress(&self.pool, student_id).await? {
            if active.assessment_id != assessment_id {
                tracing::warn!(
                    %student_id,
                    requested = %assessment_id,
                    active_attempt = %active.id,
                    "another attempt is in progress, redirecting"
                );
                return Ok(redirect_to_attempt(&active));
            }
            return self.resume(active, assessment).await;
        }

        if let Some(result) = fetch_latest_result(&self.pool, student_id, assessment_id).await? {
            tracing::info!(%student_id, %assessment_id, result_id = %result.id, "assessment already graded");
            return Ok(redirect_to_result(&result));
        }

        let availability = assessment_availability(&assessment, now);
        if !availability.admits_attempts() {
            tracing::warn!(%student_id, %assessment_id, ?availability, "assessment window closed");
            return Err(Error::AccessDenied(format!(
                "Assessment is not open for attempts ({})",
                availability.as_str()
            )));
        }

        let bank = fetch_bank(&self.pool, assessment_id).await?;
        check_pool_feasible(&assessment, bank.len())?;

        // A losing insert re-reads the current state. If the winner already
        // finished and left no result behind, the insert is tried once more.
        let mut retried = false;
        let attempt = loop {
            match insert_attempt(&self.pool, student_id, &assessment, now).await {
                Ok(attempt) => break attempt,
                Err(e) if e.is_unique_violation(ONE_IN_PROGRESS_INDEX) => {
                    if let Some(winner) = fetch_in_progress(&self.pool, student_id).await? {
                        if winner.assessment_id != assessment_id {
                            tracing::warn!(%student_id, active_attempt = %winner.id, "lost creation race to another assessment");
                            return Ok(redirect_to_attempt(&winner));
                        }
                        tracing::info!(%student_id, attempt_id = %winner.id, "lost creation race, resuming");
                        return self.resume(winner, assessment).await;
                    }
                    if let Some(result) =
                        fetch_latest_result(&self.pool, student_id, assessment_id).await?
                    {
                        tracing::info!(%student_id, result_id = %result.id, "lost creation race to a finished attempt");
                        return Ok(redirect_to_result(&result));
                    }
                    if retried {
                        return Err(e);
                    }
                    retried = true;
                }
                Err(e) => return Err(e),
            }
        };

        tracing::info!(
            %student_id,
            %assessment_id,
            attempt_id = %attempt.id,
            ?path,
            "attempt started"
        );
        let presented = self.present(&attempt, &assessment, bank).await?;
        Ok(StartAttemptResponse::Started(presented))
    }

    async fn resume(&self, attempt: Attempt, assessment: Assessment) -> Result<StartAttemptResponse> {
        let mut attempt = attempt;
        if attempt.metadata().awaiting_timer_start() {
            attempt = self.start_deferred_timer(&attempt).await?;
        }

        if timer_state(&attempt, &assessment, self.clock.now()).is_expired() {
            let outcome = self.finalize(attempt.id, SubmitTrigger::Deadline).await?;
            return Ok(redirect_to_result(&outcome.result));
        }

        tracing::info!(attempt_id = %attempt.id, "attempt resumed");
        let bank = fetch_bank(&self.pool, assessment.id).await?;
        let presented = self.present(&attempt, &assessment, bank).await?;
        Ok(StartAttemptResponse::Resumed(presented))
    }

    /// Starts the clock of a partially reset attempt on the student's first
    /// view after the reset.
    async fn start_deferred_timer(&self, attempt: &Attempt) -> Result<Attempt> {
        let now = self.clock.now();
        let mut meta = attempt.metadata();
        meta.mark_timer_started(now);

        let updated = sqlx::query_as::<_, Attempt>(
            r#"
            UPDATE attempts
            SET start_time = $2, answer_metadata = $3, updated_at = $2
            WHERE id = $1
              AND status = 'in_progress'
              AND COALESCE(answer_metadata ->> 'timer_started', 'false') <> 'true'
            RETURNING *
            "#,
        )
        .bind(attempt.id)
        .bind(now)
        .bind(meta.to_json())
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(a) => {
                tracing::info!(attempt_id = %a.id, "timer started after partial reset");
                Ok(a)
            }
            None => fetch_attempt(&self.pool, attempt.id).await,
        }
    }

    async fn present(
        &self,
        attempt: &Attempt,
        assessment: &Assessment,
        bank: Vec<Question>,
    ) -> Result<PresentedAttempt> {
        let order = self
            .pool_service
            .ensure_question_order(attempt, assessment, &bank)
            .await?;
        let mut options = fetch_options(&self.pool, &order).await?;
        let answers = fetch_answers(&self.pool, attempt.student_id, assessment.id).await?;
        let by_id: HashMap<Uuid, Question> = bank.into_iter().map(|q| (q.id, q)).collect();

        let mut questions = Vec::with_capacity(order.len());
        for qid in &order {
            let Some(q) = by_id.get(qid) else { continue };
            let opts = options.remove(qid).unwrap_or_default();
            let opts = self
                .pool_service
                .ensure_option_order(attempt, assessment, q, opts)
                .await?;
            questions.push(present_question(questions.len() + 1, q, opts, answers.get(qid)));
        }

        let now = self.clock.now();
        let timer = timer_state(attempt, assessment, now);
        Ok(PresentedAttempt {
            attempt_id: attempt.id,
            assessment_id: assessment.id,
            title: assessment.title.clone(),
            subject: assessment.subject.clone(),
            status: attempt.status.clone(),
            start_time: attempt.start_time,
            remaining_seconds: timer.remaining_seconds(),
            timer,
            server_time: now,
            questions,
        })
    }

    /// Renders one question of an in-progress attempt, drawing its option
    /// order on first view.
    pub async fn render_question(
        &self,
        student_id: Uuid,
        attempt_id: Uuid,
        question_id: Uuid,
    ) -> Result<PresentedQuestion> {
        let attempt = fetch_attempt(&self.pool, attempt_id).await?;
        ensure_owner(&attempt, student_id)?;
        if !attempt.is_in_progress() {
            return Err(Error::AttemptNotActive);
        }
        let assessment = fetch_assessment(&self.pool, attempt.assessment_id).await?;
        let bank = fetch_bank(&self.pool, assessment.id).await?;
        let order = self
            .pool_service
            .ensure_question_order(&attempt, &assessment, &bank)
            .await?;
        let Some(number) = order.iter().position(|id| *id == question_id) else {
            return Err(Error::NotFound("Question is not part of this attempt".into()));
        };
        let question = bank
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| Error::NotFound("Question not found".into()))?;

        let opts = fetch_options(&self.pool, &[question_id])
            .await?
            .remove(&question_id)
            .unwrap_or_default();
        let opts = self
            .pool_service
            .ensure_option_order(&attempt, &assessment, question, opts)
            .await?;
        let answers = fetch_answers(&self.pool, student_id, assessment.id).await?;
        Ok(present_question(number + 1, question, opts, answers.get(&question_id)))
    }

    /// Upserts one answer. Returns the save timestamp.
    pub async fn save_answer(
        &self,
        student_id: Uuid,
        attempt_id: Uuid,
        question_id: Uuid,
        answer: AnswerValue,
    ) -> Result<DateTime<Utc>> {
        let attempt = fetch_attempt(&self.pool, attempt_id).await?;
        ensure_owner(&attempt, student_id)?;
        if !attempt.is_in_progress() {
            tracing::warn!(%attempt_id, %question_id, "save rejected, attempt not in progress");
            return Err(Error::AttemptNotActive);
        }

        let assessment = fetch_assessment(&self.pool, attempt.assessment_id).await?;
        let now = self.clock.now();
        if timer_state(&attempt, &assessment, now).is_expired() {
            tracing::info!(%attempt_id, "deadline passed before save, auto-submitting");
            self.finalize(attempt.id, SubmitTrigger::Deadline).await?;
            return Err(Error::AttemptNotActive);
        }

        let question = sqlx::query_as::<_, Question>(
            r#"SELECT * FROM questions WHERE id = $1 AND assessment_id = $2"#,
        )
        .bind(question_id)
        .bind(assessment.id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::BadRequest("Question does not belong to this assessment".into()))?;

        if let Some(order) = attempt.fixed_order() {
            if !order.contains(&question_id) {
                return Err(Error::BadRequest("Question is not part of this attempt".into()));
            }
        }

        let answer = self.normalize_answer(&question, answer).await?;
        let stored = answer.encode();
        let (pool, stored, assessment_id) = (&self.pool, stored.as_str(), assessment.id);

        with_retry("save_answer", self.retry_attempts, || async move {
            let mut tx = pool.begin().await?;
            let status: String =
                sqlx::query_scalar(r#"SELECT status FROM attempts WHERE id = $1 FOR SHARE"#)
                    .bind(attempt_id)
                    .fetch_one(&mut *tx)
                    .await?;
            if status != AttemptStatus::InProgress.as_str() {
                return Err(Error::AttemptNotActive);
            }
            sqlx::query(
                r#"
                INSERT INTO answers (student_id, assessment_id, question_id, answer_text, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $5)
                ON CONFLICT (student_id, assessment_id, question_id)
                DO UPDATE SET answer_text = EXCLUDED.answer_text, updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(student_id)
            .bind(assessment_id)
            .bind(question_id)
            .bind(stored)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok::<(), Error>(())
        })
        .await?;

        tracing::debug!(%attempt_id, %question_id, "answer saved");
        Ok(now)
    }

    /// Checks the answer's shape against the question.
    async fn normalize_answer(&self, question: &Question, answer: AnswerValue) -> Result<AnswerValue> {
        let answer = match (answer, question.is_multi_value()) {
            (AnswerValue::Multi(_), false) => {
                return Err(Error::BadRequest("This question takes a single answer".into()))
            }
            (AnswerValue::Single(s), true) => AnswerValue::Multi(vec![s]),
            (a, _) => a,
        };

        if question.kind() == QuestionType::Mcq && !answer.is_blank() {
            let AnswerValue::Single(raw) = &answer else {
                return Err(Error::BadRequest("This question takes a single answer".into()));
            };
            let option_id = Uuid::parse_str(raw.trim())
                .map_err(|_| Error::BadRequest("Answer must be an option id".into()))?;
            let known: bool = sqlx::query_scalar(
                r#"SELECT EXISTS(SELECT 1 FROM question_options WHERE id = $1 AND question_id = $2)"#,
            )
            .bind(option_id)
            .bind(question.id)
            .fetch_one(&self.pool)
            .await?;
            if !known {
                return Err(Error::BadRequest("Option does not belong to this question".into()));
            }
            return Ok(AnswerValue::Single(option_id.to_string()));
        }
        Ok(answer)
    }

    pub async fn submit(&self, student_id: Uuid, attempt_id: Uuid) -> Result<SubmitOutcome> {
        let attempt = fetch_attempt(&self.pool, attempt_id).await?;
        ensure_owner(&attempt, student_id)?;
        self.finalize(attempt_id, SubmitTrigger::Manual).await
    }

    /// System-triggered submission; ignores ownership and the deadline.
    pub async fn auto_submit(&self, attempt_id: Uuid) -> Result<SubmitOutcome> {
        self.finalize(attempt_id, SubmitTrigger::System).await
    }

    /// Grades the attempt and records its Result. Safe to call repeatedly and
    /// concurrently: only the first caller grades, later ones get that Result.
    pub async fn finalize(&self, attempt_id: Uuid, trigger: SubmitTrigger) -> Result<SubmitOutcome> {
        let outcome = with_retry("finalize_attempt", self.retry_attempts, || {
            self.finalize_once(attempt_id)
        })
        .await?;

        if outcome.already_submitted {
            tracing::info!(%attempt_id, trigger = trigger.as_str(), "attempt already submitted");
        } else {
            tracing::info!(
                %attempt_id,
                trigger = trigger.as_str(),
                score = %outcome.result.score,
                max_score = %outcome.result.max_score,
                "attempt graded"
            );
        }
        Ok(outcome)
    }

    async fn finalize_once(&self, attempt_id: Uuid) -> Result<SubmitOutcome> {
        let mut tx = self.pool.begin().await?;

        let attempt = sqlx::query_as::<_, Attempt>(r#"SELECT * FROM attempts WHERE id = $1 FOR UPDATE"#)
            .bind(attempt_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::NotFound("Attempt not found".into()))?;

        if !attempt.is_in_progress() {
            let existing = sqlx::query_as::<_, AssessmentResult>(
                r#"SELECT * FROM results WHERE attempt_id = $1"#,
            )
            .bind(attempt_id)
            .fetch_optional(&mut *tx)
            .await?;
            tx.commit().await?;
            return existing
                .map(|result| SubmitOutcome {
                    result,
                    already_submitted: true,
                    summary: None,
                })
                .ok_or_else(|| Error::Internal("completed attempt has no result".into()));
        }

        let assessment = fetch_assessment(&mut *tx, attempt.assessment_id).await?;
        let bank = fetch_bank(&mut *tx, assessment.id).await?;
        let seen = self
            .pool_service
            .ensure_question_order_locked(&mut tx, &attempt, &assessment, &bank)
            .await?;
        let options = fetch_options(&mut *tx, &seen).await?;
        let answers = fetch_answers(&mut *tx, attempt.student_id, assessment.id).await?;

        let by_id: HashMap<Uuid, &Question> = bank.iter().map(|q| (q.id, q)).collect();
        let gradable: Vec<GradableQuestion<'_>> = seen
            .iter()
            .filter_map(|id| by_id.get(id).copied())
            .map(|q| GradableQuestion {
                question: q,
                options: options.get(&q.id).map(Vec::as_slice).unwrap_or(&[]),
            })
            .collect();
        let summary = GradingService::grade(&gradable, &answers);

        let (ids, scores): (Vec<Uuid>, Vec<Decimal>) = summary
            .questions
            .iter()
            .filter(|s| answers.contains_key(&s.question_id))
            .map(|s| (s.question_id, s.score))
            .unzip();
        sqlx::query(
            r#"
            UPDATE answers a
            SET score = s.score
            FROM UNNEST($3::uuid[], $4::numeric[]) AS s(question_id, score)
            WHERE a.student_id = $1 AND a.assessment_id = $2 AND a.question_id = s.question_id
            "#,
        )
        .bind(attempt.student_id)
        .bind(assessment.id)
        .bind(&ids)
        .bind(&scores)
        .execute(&mut *tx)
        .await?;

        let now = self.clock.now();
        // A conflicting row can only belong to an attempt reopened by a reset.
        let result = sqlx::query_as::<_, AssessmentResult>(
            r#"
            INSERT INTO results (attempt_id, student_id, assessment_id, status, score, max_score, created_at)
            VALUES ($1, $2, $3, 'completed', $4, $5, $6)
            ON CONFLICT (attempt_id) DO UPDATE
            SET status = 'completed', score = EXCLUDED.score, max_score = EXCLUDED.max_score,
                created_at = EXCLUDED.created_at
            RETURNING *
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.student_id)
        .bind(assessment.id)
        .bind(summary.score)
        .bind(summary.max_score)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"UPDATE attempts SET status = 'completed', end_time = $2, updated_at = $2 WHERE id = $1"#,
        )
        .bind(attempt.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(SubmitOutcome {
            result,
            already_submitted: false,
            summary: Some(summary),
        })
    }

    /// Authoritative remaining time. Crossing the deadline auto-submits.
    pub async fn remaining_time(
        &self,
        student_id: Uuid,
        attempt_id: Uuid,
    ) -> Result<RemainingTimeResponse> {
        let attempt = fetch_attempt(&self.pool, attempt_id).await?;
        ensure_owner(&attempt, student_id)?;
        let assessment = fetch_assessment(&self.pool, attempt.assessment_id).await?;
        let now = self.clock.now();

        if !attempt.is_in_progress() {
            let result = sqlx::query_as::<_, AssessmentResult>(
                r#"SELECT * FROM results WHERE attempt_id = $1"#,
            )
            .bind(attempt_id)
            .fetch_optional(&self.pool)
            .await?;
            return Ok(RemainingTimeResponse {
                attempt_id,
                timer: closed_timer_state(&attempt, &assessment),
                status: attempt.status,
                remaining_seconds: Some(0),
                server_time: now,
                auto_submitted: false,
                result: result.as_ref().map(ResultView::from),
            });
        }

        let timer = timer_state(&attempt, &assessment, now);
        if timer.is_expired() {
            let outcome = self.finalize(attempt_id, SubmitTrigger::Deadline).await?;
            return Ok(RemainingTimeResponse {
                attempt_id,
                status: AttemptStatus::Completed.as_str().to_string(),
                timer,
                remaining_seconds: Some(0),
                server_time: now,
                auto_submitted: !outcome.already_submitted,
                result: Some(ResultView::from(&outcome.result)),
            });
        }

        Ok(RemainingTimeResponse {
            attempt_id,
            status: attempt.status,
            remaining_seconds: timer.remaining_seconds(),
            timer,
            server_time: now,
            auto_submitted: false,
            result: None,
        })
    }

    /// Auto-submits every in-progress attempt whose deadline has passed.
    pub async fn sweep_expired(&self) -> Result<SweepResponse> {
        let candidates = sqlx::query_as::<_, Attempt>(
            r#"
            SELECT a.* FROM attempts a
            JOIN assessments s ON s.id = a.assessment_id
            WHERE a.status = 'in_progress'
              AND (s.duration_minutes IS NOT NULL OR a.answer_metadata IS NOT NULL)
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let now = self.clock.now();
        let mut assessments: HashMap<Uuid, Assessment> = HashMap::new();
        let mut report = SweepResponse {
            checked: candidates.len(),
            auto_submitted: 0,
            failed: 0,
        };

        for attempt in candidates {
            if !assessments.contains_key(&attempt.assessment_id) {
                match fetch_assessment(&self.pool, attempt.assessment_id).await {
                    Ok(a) => {
                        assessments.insert(a.id, a);
                    }
                    Err(e) => {
                        tracing::error!(attempt_id = %attempt.id, error = ?e, "assessment lookup failed during sweep");
                        report.failed += 1;
                        continue;
                    }
                }
            }
            let Some(assessment) = assessments.get(&attempt.assessment_id) else {
                continue;
            };
            if !timer_state(&attempt, assessment, now).is_expired() {
                continue;
            }
            match self.finalize(attempt.id, SubmitTrigger::Deadline).await {
                Ok(outcome) if !outcome.already_submitted => report.auto_submitted += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(attempt_id = %attempt.id, error = ?e, "auto-submit failed");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            checked = report.checked,
            auto_submitted = report.auto_submitted,
            failed = report.failed,
            "expired attempt sweep finished"
        );
        Ok(report)
    }

    pub async fn result_for(&self, student_id: Uuid, assessment_id: Uuid) -> Result<ResultView> {
        let result = fetch_latest_result(&self.pool, student_id, assessment_id)
            .await?
            .ok_or_else(|| Error::NotFound("No result for this assessment".into()))?;
        Ok(ResultView::from(&result))
    }
}

fn ensure_owner(attempt: &Attempt, student_id: Uuid) -> Result<()> {
    if attempt.student_id != student_id {
        tracing::warn!(attempt_id = %attempt.id, %student_id, "attempt accessed by non-owner");
        return Err(Error::Forbidden("Attempt does not belong to this student".into()));
    }
    Ok(())
}

fn redirect_to_attempt(active: &Attempt) -> StartAttemptResponse {
    StartAttemptResponse::RedirectAttempt {
        attempt_id: active.id,
        assessment_id: active.assessment_id,
        redirect_to: resume_path(active.assessment_id),
    }
}

fn redirect_to_result(result: &AssessmentResult) -> StartAttemptResponse {
    StartAttemptResponse::RedirectResult {
        assessment_id: result.assessment_id,
        result_id: result.id,
        redirect_to: result_path(result.assessment_id),
    }
}

fn present_question(
    number: usize,
    question: &Question,
    options: Vec<QuestionOption>,
    saved: Option<&String>,
) -> PresentedQuestion {
    PresentedQuestion {
        id: question.id,
        number,
        question_type: question.question_type.clone(),
        question_text: question.question_text.clone(),
        max_score: question.max_score,
        answer_mode: question.answer_mode.clone(),
        answer_count: question.answer_count,
        options: options
            .into_iter()
            .map(|o| PresentedOption {
                id: o.id,
                text: o.option_text,
            })
            .collect(),
        saved_answer: saved.map(|text| AnswerValue::decode(text, question.is_multi_value())),
    }
}

async fn fetch_assessment<'e, E: PgExecutor<'e>>(exec: E, id: Uuid) -> Result<Assessment> {
    sqlx::query_as::<_, Assessment>(r#"SELECT * FROM assessments WHERE id = $1"#)
        .bind(id)
        .fetch_optional(exec)
        .await?
        .ok_or_else(|| Error::NotFound("Assessment not found".into()))
}

async fn fetch_attempt<'e, E: PgExecutor<'e>>(exec: E, id: Uuid) -> Result<Attempt> {
    sqlx::query_as::<_, Attempt>(r#"SELECT * FROM attempts WHERE id = $1"#)
        .bind(id)
        .fetch_optional(exec)
        .await?
        .ok_or_else(|| Error::NotFound("Attempt not found".into()))
}

async fn fetch_in_progress<'e, E: PgExecutor<'e>>(
    exec: E,
    student_id: Uuid,
) -> Result<Option<Attempt>> {
    let attempt = sqlx::query_as::<_, Attempt>(
        r#"SELECT * FROM attempts WHERE student_id = $1 AND status = 'in_progress' LIMIT 1"#,
    )
    .bind(student_id)
    .fetch_optional(exec)
    .await?;
    Ok(attempt)
}

async fn fetch_latest_result<'e, E: PgExecutor<'e>>(
    exec: E,
    student_id: Uuid,
    assessment_id: Uuid,
) -> Result<Option<AssessmentResult>> {
    let result = sqlx::query_as::<_, AssessmentResult>(
        r#"
        SELECT * FROM results
        WHERE student_id = $1 AND assessment_id = $2 AND status = 'completed'
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(student_id)
    .bind(assessment_id)
    .fetch_optional(exec)
    .await?;
    Ok(result)
}

async fn fetch_bank<'e, E: PgExecutor<'e>>(exec: E, assessment_id: Uuid) -> Result<Vec<Question>> {
    let questions = sqlx::query_as::<_, Question>(
        r#"SELECT * FROM questions WHERE assessment_id = $1 ORDER BY position, id"#,
    )
    .bind(assessment_id)
    .fetch_all(exec)
    .await?;
    Ok(questions)
}

async fn fetch_options<'e, E: PgExecutor<'e>>(
    exec: E,
    question_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<QuestionOption>>> {
    let rows = sqlx::query_as::<_, QuestionOption>(
        r#"SELECT * FROM question_options WHERE question_id = ANY($1) ORDER BY position, id"#,
    )
    .bind(question_ids)
    .fetch_all(exec)
    .await?;
    let mut grouped: HashMap<Uuid, Vec<QuestionOption>> = HashMap::new();
    for opt in rows {
        grouped.entry(opt.question_id).or_default().push(opt);
    }
    Ok(grouped)
}

async fn fetch_answers<'e, E: PgExecutor<'e>>(
    exec: E,
    student_id: Uuid,
    assessment_id: Uuid,
) -> Result<HashMap<Uuid, String>> {
    let rows: Vec<(Uuid, String)> = sqlx::query_as(
        r#"SELECT question_id, answer_text FROM answers WHERE student_id = $1 AND assessment_id = $2"#,
    )
    .bind(student_id)
    .bind(assessment_id)
    .fetch_all(exec)
    .await?;
    Ok(rows.into_iter().collect())
}

async fn insert_attempt<'e, E: PgExecutor<'e>>(
    exec: E,
    student_id: Uuid,
    assessment: &Assessment,
    now: DateTime<Utc>,
) -> Result<Attempt> {
    // Remember the duration in force at start so a later edit cannot move the deadline.
    let metadata = assessment.duration_minutes.map(|minutes| {
        let meta = AnswerMetadata {
            original_duration_minutes: Some(minutes),
            ..AnswerMetadata::default()
        };
        meta.to_json()
    });
    let attempt = sqlx::query_as::<_, Attempt>(
        r#"
        INSERT INTO attempts (student_id, assessment_id, status, start_time, option_orders, answer_metadata, created_at, updated_at)
        VALUES ($1, $2, 'in_progress', $3, $4, $5, $3, $3)
        RETURNING *
        "#,
    )
    .bind(student_id)
    .bind(assessment.id)
    .bind(now)
    .bind(json!({}))
    .bind(metadata)
    .fetch_one(exec)
    .await?;
    Ok(attempt)
}
