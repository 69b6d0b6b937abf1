use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::assessment::Assessment;
use crate::models::attempt::Attempt;
use crate::models::question::{Question, QuestionOption, QuestionType};

/// Fails when the bank cannot fill the configured pool.
pub fn check_pool_feasible(assessment: &Assessment, bank_len: usize) -> Result<()> {
    match assessment.pool_size() {
        Some(k) if bank_len < k => Err(Error::InsufficientQuestions {
            available: bank_len as i64,
            required: k as i64,
        }),
        _ => Ok(()),
    }
}

/// Uniform draw of `k` ids without replacement. The draw comes out in random
/// order; unless `shuffle` is set it is put back into bank order.
pub fn draw_pool<R: Rng + ?Sized>(
    bank: &[Uuid],
    k: usize,
    shuffle: bool,
    rng: &mut R,
) -> Result<Vec<Uuid>> {
    if bank.len() < k {
        return Err(Error::InsufficientQuestions {
            available: bank.len() as i64,
            required: k as i64,
        });
    }
    let mut picked = rand::seq::index::sample(rng, bank.len(), k).into_vec();
    if !shuffle {
        picked.sort_unstable();
    }
    Ok(picked.into_iter().map(|i| bank[i]).collect())
}

/// The order to persist for a fresh attempt, or `None` when the attempt
/// simply follows the bank.
pub fn plan_question_order<R: Rng + ?Sized>(
    assessment: &Assessment,
    bank: &[Uuid],
    rng: &mut R,
) -> Result<Option<Vec<Uuid>>> {
    if let Some(k) = assessment.pool_size() {
        return draw_pool(bank, k, assessment.shuffle_questions, rng).map(Some);
    }
    if assessment.shuffle_questions {
        let mut order = bank.to_vec();
        order.shuffle(rng);
        return Ok(Some(order));
    }
    Ok(None)
}

pub fn shuffled_options<R: Rng + ?Sized>(options: &[QuestionOption], rng: &mut R) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = options.iter().map(|o| o.id).collect();
    ids.shuffle(rng);
    ids
}

/// Question ids the attempt actually shows, in display order. A persisted
/// order wins; ids no longer in the bank are dropped.
pub fn seen_question_ids(attempt: &Attempt, bank: &[Question]) -> Vec<Uuid> {
    match attempt.fixed_order() {
        Some(order) => order
            .iter()
            .copied()
            .filter(|id| bank.iter().any(|q| q.id == *id))
            .collect(),
        None => bank.iter().map(|q| q.id).collect(),
    }
}

/// Reorders `items` by `order`; anything missing from `order` keeps its
/// relative place at the end.
pub fn apply_order<T, F>(mut items: Vec<T>, order: &[Uuid], id_of: F) -> Vec<T>
where
    F: Fn(&T) -> Uuid,
{
    let rank: HashMap<Uuid, usize> = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    items.sort_by_key(|item| rank.get(&id_of(item)).copied().unwrap_or(usize::MAX));
    items
}

fn fold_uuid(id: Uuid) -> u64 {
    let v = id.as_u128();
    (v as u64) ^ ((v >> 64) as u64)
}

/// Question pool selection and presentation order, fixed once per attempt.
#[derive(Clone)]
pub struct PoolService {
    pool: PgPool,
    seed: Option<u64>,
}

impl PoolService {
    pub fn new(pool: PgPool, seed: Option<u64>) -> Self {
        Self { pool, seed }
    }

    /// RNG for one attempt (and optionally one question within it).
    /// Deterministic when a seed is configured.
    pub fn rng_for(&self, attempt_id: Uuid, question_id: Option<Uuid>) -> StdRng {
        match self.seed {
            Some(seed) => {
                let salt = question_id.map(fold_uuid).unwrap_or(0);
                StdRng::seed_from_u64(seed ^ fold_uuid(attempt_id) ^ salt.rotate_left(17))
            }
            None => StdRng::from_entropy(),
        }
    }

    /// Returns the attempt's question ids in display order, persisting a
    /// pooled or shuffled order the first time it is needed.
    pub async fn ensure_question_order(
        &self,
        attempt: &Attempt,
        assessment: &Assessment,
        bank: &[Question],
    ) -> Result<Vec<Uuid>> {
        if attempt.fixed_order().is_some() {
            return Ok(seen_question_ids(attempt, bank));
        }
        let bank_ids: Vec<Uuid> = bank.iter().map(|q| q.id).collect();
        let mut rng = self.rng_for(attempt.id, None);
        let Some(order) = plan_question_order(assessment, &bank_ids, &mut rng)? else {
            return Ok(bank_ids);
        };

        let stored = self.store_question_order(attempt.id, &order).await?;
        if stored != order {
            tracing::info!(attempt_id = %attempt.id, "question order already fixed by a concurrent request");
        } else {
            tracing::info!(attempt_id = %attempt.id, questions = order.len(), "question order fixed");
        }
        Ok(stored
            .into_iter()
            .filter(|id| bank_ids.contains(id))
            .collect())
    }

    /// Writes `order` only if none is stored yet, then returns whichever
    /// order the attempt ended up with.
    async fn store_question_order(&self, attempt_id: Uuid, order: &[Uuid]) -> Result<Vec<Uuid>> {
        let written: Option<Json<Vec<Uuid>>> = sqlx::query_scalar(
            r#"
            UPDATE attempts
            SET question_order = $2, updated_at = NOW()
            WHERE id = $1 AND question_order IS NULL
            RETURNING question_order
            "#,
        )
        .bind(attempt_id)
        .bind(Json(order))
        .fetch_optional(&self.pool)
        .await?;

        if let Some(Json(order)) = written {
            return Ok(order);
        }

        let existing: Option<Json<Vec<Uuid>>> =
            sqlx::query_scalar(r#"SELECT question_order FROM attempts WHERE id = $1"#)
                .bind(attempt_id)
                .fetch_one(&self.pool)
                .await?;
        existing
            .map(|Json(o)| o)
            .ok_or_else(|| Error::Internal("question order vanished after conditional write".into()))
    }

    /// Same decision as `ensure_question_order`, inside a transaction that
    /// already holds the attempt row lock.
    pub async fn ensure_question_order_locked(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        attempt: &Attempt,
        assessment: &Assessment,
        bank: &[Question],
    ) -> Result<Vec<Uuid>> {
        if attempt.fixed_order().is_some() {
            return Ok(seen_question_ids(attempt, bank));
        }
        let bank_ids: Vec<Uuid> = bank.iter().map(|q| q.id).collect();
        let mut rng = self.rng_for(attempt.id, None);
        let Some(order) = plan_question_order(assessment, &bank_ids, &mut rng)? else {
            return Ok(bank_ids);
        };
        sqlx::query(r#"UPDATE attempts SET question_order = $2, updated_at = NOW() WHERE id = $1"#)
            .bind(attempt.id)
            .bind(Json(&order))
            .execute(&mut **tx)
            .await?;
        Ok(order)
    }

    /// Options of one question in display order. With `shuffle_options` set,
    /// an MCQ's option order is drawn on first render and reused afterwards.
    pub async fn ensure_option_order(
        &self,
        attempt: &Attempt,
        assessment: &Assessment,
        question: &Question,
        options: Vec<QuestionOption>,
    ) -> Result<Vec<QuestionOption>> {
        if !assessment.shuffle_options || question.kind() != QuestionType::Mcq || options.len() < 2
        {
            return Ok(options);
        }
        if let Some(order) = attempt.option_order(question.id) {
            return Ok(apply_order(options, order, |o| o.id));
        }

        let mut rng = self.rng_for(attempt.id, Some(question.id));
        let order = shuffled_options(&options, &mut rng);
        let stored = self.store_option_order(attempt.id, question.id, &order).await?;
        Ok(apply_order(options, &stored, |o| o.id))
    }

    async fn store_option_order(
        &self,
        attempt_id: Uuid,
        question_id: Uuid,
        order: &[Uuid],
    ) -> Result<Vec<Uuid>> {
        let key = question_id.to_string();
        let written: Option<Json<Vec<Uuid>>> = sqlx::query_scalar(
            r#"
            UPDATE attempts
            SET option_orders = jsonb_set(option_orders, ARRAY[$2::text], $3::jsonb, true),
                updated_at = NOW()
            WHERE id = $1 AND NOT (option_orders ? $2::text)
            RETURNING option_orders -> $2::text
            "#,
        )
        .bind(attempt_id)
        .bind(&key)
        .bind(Json(order))
        .fetch_optional(&self.pool)
        .await?;

        if let Some(Json(order)) = written {
            return Ok(order);
        }

        let existing: Option<Json<Vec<Uuid>>> =
            sqlx::query_scalar(r#"SELECT option_orders -> $2::text FROM attempts WHERE id = $1"#)
                .bind(attempt_id)
                .bind(&key)
                .fetch_one(&self.pool)
                .await?;
        existing
            .map(|Json(o)| o)
            .ok_or_else(|| Error::Internal("option order vanished after conditional write".into()))
    }
}
