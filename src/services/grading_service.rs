use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::models::answer::AnswerValue;
use crate::models::question::{AnswerMode, Question, QuestionOption, QuestionType};
use crate::services::grade_scale::{waec_grade, GradeBand};

/// What a question accepts as correct, resolved from its row and options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerKey {
    Choice { correct_option: Option<Uuid> },
    Exact { expected: String },
    AnyMatch { valid: Vec<String>, answer_count: usize },
}

impl AnswerKey {
    pub fn for_question(question: &Question, options: &[QuestionOption]) -> Self {
        match question.kind() {
            QuestionType::Mcq => AnswerKey::Choice {
                correct_option: options.iter().find(|o| o.is_correct).map(|o| o.id),
            },
            QuestionType::ShortAnswer => match question.answer_mode() {
                AnswerMode::Exact => AnswerKey::Exact {
                    expected: question.correct_answer.clone().unwrap_or_default(),
                },
                AnswerMode::AnyMatch => {
                    let valid = question.valid_answer_list();
                    let answer_count = question
                        .answer_count
                        .filter(|n| *n > 0)
                        .map(|n| n as usize)
                        .unwrap_or(valid.len());
                    AnswerKey::AnyMatch {
                        valid,
                        answer_count,
                    }
                }
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionScore {
    pub question_id: Uuid,
    pub score: Decimal,
    pub max_score: Decimal,
    pub answered: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GradeSummary {
    pub questions: Vec<QuestionScore>,
    pub score: Decimal,
    pub max_score: Decimal,
    pub percentage: Decimal,
    pub grade: GradeBand,
}

/// A question in the set the student was shown, with its options.
pub struct GradableQuestion<'a> {
    pub question: &'a Question,
    pub options: &'a [QuestionOption],
}

pub struct GradingService;

impl GradingService {
    /// Grades exactly the given questions. Unanswered questions score 0 and
    /// still count toward the maximum.
    pub fn grade(
        questions: &[GradableQuestion<'_>],
        stored_answers: &HashMap<Uuid, String>,
    ) -> GradeSummary {
        let mut total = Decimal::ZERO;
        let mut max_total = Decimal::ZERO;
        let mut scored = Vec::with_capacity(questions.len());

        for gq in questions {
            let q = gq.question;
            let max_score = q.max_score.max(Decimal::ZERO);
            let answer = stored_answers
                .get(&q.id)
                .map(|text| AnswerValue::decode(text, q.is_multi_value()))
                .filter(|a| !a.is_blank());
            let key = AnswerKey::for_question(q, gq.options);
            let score = score_answer(&key, max_score, answer.as_ref());

            total += score;
            max_total += max_score;
            scored.push(QuestionScore {
                question_id: q.id,
                score: score.round_dp(2),
                max_score,
                answered: answer.is_some(),
            });
        }

        // Fractional any-match scores are summed at full precision.
        let total = total.round_dp(2);
        let percentage = percentage(total, max_total);
        GradeSummary {
            questions: scored,
            score: total,
            max_score: max_total,
            percentage,
            grade: waec_grade(percentage),
        }
    }
}

pub fn score_answer(key: &AnswerKey, max_score: Decimal, answer: Option<&AnswerValue>) -> Decimal {
    let Some(answer) = answer else {
        return Decimal::ZERO;
    };
    match key {
        AnswerKey::Choice { correct_option } => {
            let selected = first_value(answer).and_then(|s| Uuid::parse_str(s.trim()).ok());
            match (selected, correct_option) {
                (Some(sel), Some(correct)) if sel == *correct => max_score,
                _ => Decimal::ZERO,
            }
        }
        AnswerKey::Exact { expected } => match first_value(answer) {
            Some(given) if exact_match(given, expected) => max_score,
            _ => Decimal::ZERO,
        },
        AnswerKey::AnyMatch {
            valid,
            answer_count,
        } => {
            if *answer_count == 0 {
                return Decimal::ZERO;
            }
            let matched = distinct_matches(answer, valid).min(*answer_count);
            max_score * Decimal::from(matched as u64) / Decimal::from(*answer_count as u64)
        }
    }
}

fn first_value(answer: &AnswerValue) -> Option<&str> {
    match answer {
        AnswerValue::Single(s) => Some(s.as_str()),
        AnswerValue::Multi(values) => values
            .iter()
            .map(String::as_str)
            .find(|v| !v.trim().is_empty()),
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Trimmed, whitespace-collapsed, case-insensitive equality.
pub fn exact_match(given: &str, expected: &str) -> bool {
    let expected = normalize(expected);
    !expected.is_empty() && normalize(given) == expected
}

/// Number of distinct submitted values that appear in `valid`,
/// compared case-insensitively.
pub fn distinct_matches(answer: &AnswerValue, valid: &[String]) -> usize {
    let valid: HashSet<String> = valid.iter().map(|v| normalize(v)).collect();
    let submitted: HashSet<String> = match answer {
        AnswerValue::Single(s) => std::iter::once(normalize(s)).collect(),
        AnswerValue::Multi(values) => values.iter().map(|v| normalize(v)).collect(),
    };
    submitted
        .iter()
        .filter(|v| !v.is_empty() && valid.contains(*v))
        .count()
}

pub fn percentage(score: Decimal, max_score: Decimal) -> Decimal {
    if max_score <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    score / max_score * Decimal::ONE_HUNDRED
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn question(kind: &str, max: i64) -> Question {
        Question {
            id: Uuid::new_v4(),
            assessment_id: Uuid::nil(),
            position: 0,
            question_type: kind.into(),
            question_text: "q".into(),
            max_score: Decimal::from(max),
            answer_mode: None,
            answer_count: None,
            correct_answer: None,
            valid_answers: None,
        }
    }

    fn option(question_id: Uuid, correct: bool) -> QuestionOption {
        QuestionOption {
            id: Uuid::new_v4(),
            question_id,
            position: 0,
            option_text: "opt".into(),
            is_correct: correct,
        }
    }

    fn any_match(valid: &[&str], count: i32, max: i64) -> Question {
        let mut q = question("short_answer", max);
        q.answer_mode = Some("any_match".into());
        q.answer_count = Some(count);
        q.valid_answers = Some(json!(valid));
        q
    }

    #[test]
    fn mcq_scores_only_the_correct_option_id() {
        let q = question("mcq", 2);
        let right = option(q.id, true);
        let wrong = option(q.id, false);
        let key = AnswerKey::for_question(&q, &[wrong.clone(), right.clone()]);
        let pick = |id: Uuid| AnswerValue::Single(id.to_string());

        assert_eq!(score_answer(&key, q.max_score, Some(&pick(right.id))), Decimal::from(2));
        assert_eq!(score_answer(&key, q.max_score, Some(&pick(wrong.id))), Decimal::ZERO);
        assert_eq!(
            score_answer(&key, q.max_score, Some(&AnswerValue::Single("garbage".into()))),
            Decimal::ZERO
        );
    }

    #[test]
    fn exact_mode_ignores_case_and_surrounding_space() {
        assert!(exact_match("  Photosynthesis ", "photosynthesis"));
        assert!(exact_match("Lake  Chad", "lake chad"));
        assert!(!exact_match("photo synthesis", "photosynthesis"));
        assert!(!exact_match("", ""));
    }

    #[test]
    fn any_match_duplicates_never_inflate_the_score() {
        let q = any_match(&["paris", "london"], 3, 3);
        let key = AnswerKey::for_question(&q, &[]);
        let answer = AnswerValue::Multi(vec![
            "Paris".into(),
            "paris".into(),
            "London".into(),
            "madrid".into(),
        ]);
        assert_eq!(distinct_matches(&answer, &["paris".into(), "london".into()]), 2);
        assert_eq!(score_answer(&key, q.max_score, Some(&answer)), Decimal::from(2));
    }

    #[test]
    fn any_match_caps_at_answer_count() {
        let q = any_match(&["red", "green", "blue"], 2, 4);
        let key = AnswerKey::for_question(&q, &[]);
        let answer = AnswerValue::Multi(vec!["red".into(), "green".into(), "blue".into()]);
        assert_eq!(score_answer(&key, q.max_score, Some(&answer)), Decimal::from(4));
    }

    #[test]
    fn any_match_without_count_uses_valid_set_size() {
        let mut q = any_match(&["a", "b", "c", "d"], 0, 8);
        q.answer_count = None;
        let key = AnswerKey::for_question(&q, &[]);
        let answer = AnswerValue::Multi(vec!["A".into()]);
        assert_eq!(score_answer(&key, q.max_score, Some(&answer)), Decimal::from(2));
    }

    #[test]
    fn aggregate_counts_unanswered_against_the_student() {
        let q1 = question("mcq", 1);
        let opts1 = vec![option(q1.id, true), option(q1.id, false)];
        let mut q2 = question("short_answer", 3);
        q2.correct_answer = Some("Abuja".into());
        let q3 = any_match(&["x", "y"], 2, 2);

        let mut answers = HashMap::new();
        answers.insert(q1.id, opts1[0].id.to_string());
        answers.insert(q3.id, "x\nX\nz".to_string());

        let gradable = [
            GradableQuestion { question: &q1, options: &opts1 },
            GradableQuestion { question: &q2, options: &[] },
            GradableQuestion { question: &q3, options: &[] },
        ];
        let summary = GradingService::grade(&gradable, &answers);

        assert_eq!(summary.score, Decimal::from(2));
        assert_eq!(summary.max_score, Decimal::from(6));
        assert!(!summary.questions[1].answered);
        assert_eq!(summary.questions[1].score, Decimal::ZERO);
        assert_eq!(summary.grade.grade, "F9");
    }

    #[test]
    fn fractional_any_match_scores_round_only_in_the_total() {
        let questions: Vec<Question> = (0..3).map(|_| any_match(&["a", "b", "c"], 3, 1)).collect();
        let answers: HashMap<Uuid, String> =
            questions.iter().map(|q| (q.id, "a".to_string())).collect();
        let gradable: Vec<GradableQuestion<'_>> = questions
            .iter()
            .map(|q| GradableQuestion { question: q, options: &[] })
            .collect();

        let summary = GradingService::grade(&gradable, &answers);
        assert_eq!(summary.score, Decimal::ONE);
        assert_eq!(summary.max_score, Decimal::from(3));
        assert_eq!(summary.questions[0].score, Decimal::new(33, 2));
    }

    #[test]
    fn percentage_of_an_empty_paper_is_zero() {
        assert_eq!(percentage(Decimal::ZERO, Decimal::ZERO), Decimal::ZERO);
        assert_eq!(
            percentage(Decimal::from(3), Decimal::from(4)),
            Decimal::from(75)
        );
    }
}
