use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::assessment::Assessment;

/// Where an assessment's attempt window stands at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    NotYetOpen,
    Open,
    LateGraceOpen,
    Closed,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::NotYetOpen => "not_yet_open",
            Availability::Open => "open",
            Availability::LateGraceOpen => "late_grace_open",
            Availability::Closed => "closed",
        }
    }

    pub fn admits_attempts(&self) -> bool {
        matches!(self, Availability::Open | Availability::LateGraceOpen)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LatePolicy {
    pub allowed: bool,
    pub grace_days: i64,
}

pub fn availability(
    now: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    late: LatePolicy,
) -> Availability {
    if now < start {
        return Availability::NotYetOpen;
    }
    if now <= end {
        return Availability::Open;
    }
    if late.allowed && late.grace_days > 0 && now <= end + Duration::days(late.grace_days) {
        return Availability::LateGraceOpen;
    }
    Availability::Closed
}

pub fn assessment_availability(assessment: &Assessment, now: DateTime<Utc>) -> Availability {
    availability(
        now,
        assessment.start_time,
        assessment.end_time,
        LatePolicy {
            allowed: assessment.allow_late_submission,
            grace_days: i64::from(assessment.late_submission_days),
        },
    )
}
