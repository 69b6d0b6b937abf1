use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::assessment::Assessment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentPath {
    Roster,
    SpecialEnrollment,
}

/// Answers "may this student sit this assessment" from the class roster or
/// an active special enrollment for the assessment's class and subject.
#[derive(Clone)]
pub struct EnrollmentService {
    pool: PgPool,
}

impl EnrollmentService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn access_path(
        &self,
        student_id: Uuid,
        assessment: &Assessment,
        now: DateTime<Utc>,
    ) -> Result<Option<EnrollmentPath>> {
        let on_roster: bool = sqlx::query_scalar(
            r#"SELECT EXISTS(SELECT 1 FROM class_enrollments WHERE student_id = $1 AND class_id = $2)"#,
        )
        .bind(student_id)
        .bind(assessment.class_id)
        .fetch_one(&self.pool)
        .await?;
        if on_roster {
            return Ok(Some(EnrollmentPath::Roster));
        }

        let special: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM special_enrollments
                WHERE student_id = $1
                  AND class_id = $2
                  AND (subject IS NULL OR LOWER(subject) = LOWER($3))
                  AND is_active
                  AND (expires_at IS NULL OR expires_at > $4)
            )
            "#,
        )
        .bind(student_id)
        .bind(assessment.class_id)
        .bind(&assessment.subject)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(special.then_some(EnrollmentPath::SpecialEnrollment))
    }
}
