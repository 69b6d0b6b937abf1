use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::assessment::Assessment;
use crate::models::attempt::Attempt;
use crate::models::reset::AnswerMetadata;
use crate::utils::time::{to_millis, Clock};

/// Duration resolution order: reset override, then the recorded original,
/// then the assessment's own duration.
pub fn effective_duration_minutes(
    meta: &AnswerMetadata,
    assessment_duration: Option<i32>,
) -> Option<i64> {
    meta.custom_duration_minutes
        .or(meta.original_duration_minutes)
        .or(assessment_duration.filter(|m| *m > 0))
        .map(i64::from)
}

/// Whole seconds left before the deadline, rounded up so a fraction of a
/// second still on the clock reads as 1.
pub fn remaining_seconds(start: DateTime<Utc>, duration_minutes: i64, now: DateTime<Utc>) -> i64 {
    let deadline = start + Duration::minutes(duration_minutes);
    let millis = (deadline - now).num_milliseconds().max(0);
    (millis + 999) / 1000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TimerState {
    /// No duration configured; manual submit only.
    NoDeadline,
    /// Partial reset, the student has not reopened the attempt yet.
    AwaitingStart { duration_seconds: i64 },
    Running {
        deadline: DateTime<Utc>,
        remaining_seconds: i64,
    },
    Expired { deadline: DateTime<Utc> },
    /// Submitted before the deadline; `deadline` is absent without a duration.
    Completed {
        submitted_at: Option<DateTime<Utc>>,
        deadline: Option<DateTime<Utc>>,
    },
}

impl TimerState {
    pub fn remaining_seconds(&self) -> Option<i64> {
        match self {
            TimerState::NoDeadline => None,
            TimerState::AwaitingStart { duration_seconds } => Some(*duration_seconds),
            TimerState::Running {
                remaining_seconds, ..
            } => Some(*remaining_seconds),
            TimerState::Expired { .. } | TimerState::Completed { .. } => Some(0),
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, TimerState::Expired { .. })
    }
}

/// Computed from the attempt's stored start time on every call.
pub fn timer_state(attempt: &Attempt, assessment: &Assessment, now: DateTime<Utc>) -> TimerState {
    let meta = attempt.metadata();
    let Some(minutes) = effective_duration_minutes(&meta, assessment.duration_minutes) else {
        return TimerState::NoDeadline;
    };
    if meta.awaiting_timer_start() {
        return TimerState::AwaitingStart {
            duration_seconds: minutes * 60,
        };
    }
    let deadline = attempt.start_time + Duration::minutes(minutes);
    if now >= deadline {
        TimerState::Expired { deadline }
    } else {
        TimerState::Running {
            deadline,
            remaining_seconds: remaining_seconds(attempt.start_time, minutes, now),
        }
    }
}

/// Timer view of an attempt that is no longer in progress. A submission at
/// or past the deadline reads as `Expired`.
pub fn closed_timer_state(attempt: &Attempt, assessment: &Assessment) -> TimerState {
    let meta = attempt.metadata();
    let deadline = effective_duration_minutes(&meta, assessment.duration_minutes)
        .map(|minutes| attempt.start_time + Duration::minutes(minutes));
    match (deadline, attempt.end_time) {
        (Some(deadline), Some(ended)) if ended >= deadline => TimerState::Expired { deadline },
        (deadline, submitted_at) => TimerState::Completed {
            submitted_at,
            deadline,
        },
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClockSync {
    pub server_time: DateTime<Utc>,
    pub server_time_ms: i64,
    /// Server minus client, in milliseconds. Advisory only.
    pub offset_ms: i64,
    pub next_sync_in_seconds: u64,
}

#[derive(Clone)]
pub struct TimerService {
    clock: Arc<dyn Clock>,
    sync_interval_secs: u64,
}

impl TimerService {
    pub fn new(clock: Arc<dyn Clock>, sync_interval_secs: u64) -> Self {
        Self {
            clock,
            sync_interval_secs,
        }
    }

    pub fn sync_clock(&self, client_time_ms: Option<i64>) -> ClockSync {
        let server_time = self.clock.now();
        let server_time_ms = to_millis(server_time);
        ClockSync {
            server_time,
            server_time_ms,
            offset_ms: client_time_ms
                .map(|client| server_time_ms - client)
                .unwrap_or(0),
            next_sync_in_seconds: self.sync_interval_secs,
        }
    }

    #[cfg(test)]
    fn state(&self, attempt: &Attempt, assessment: &Assessment) -> TimerState {
        timer_state(attempt, assessment, self.clock.now())
    }
}
