use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Reset bookkeeping stored in `attempts.answer_metadata`.
///
/// The reset action that writes these fields lives outside this service, so
/// unknown keys are carried through untouched and numeric fields accept the
/// string form as well.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_reason: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_minutes",
        skip_serializing_if = "Option::is_none"
    )]
    pub custom_duration_minutes: Option<i32>,
    #[serde(
        default,
        deserialize_with = "lenient_minutes",
        skip_serializing_if = "Option::is_none"
    )]
    pub original_duration_minutes: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_started: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_start_time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetKind {
    Full,
    Partial {
        reason: Option<String>,
        custom_duration_minutes: Option<i32>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetInfo {
    pub kind: ResetKind,
    pub timer_started: bool,
}

impl ResetInfo {
    /// A partial reset whose student has not reopened the assessment yet.
    pub fn awaiting_timer_start(&self) -> bool {
        matches!(self.kind, ResetKind::Partial { .. }) && !self.timer_started
    }
}

impl AnswerMetadata {
    /// Decodes a raw column value. Malformed metadata is treated as empty.
    pub fn from_json(raw: Option<&JsonValue>) -> Self {
        match raw {
            Some(JsonValue::Null) | None => Self::default(),
            Some(v) => serde_json::from_value(v.clone()).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring malformed answer_metadata");
                Self::default()
            }),
        }
    }

    pub fn reset_info(&self) -> Option<ResetInfo> {
        let kind = match self.reset_type.as_deref()?.trim() {
            "partial" => ResetKind::Partial {
                reason: self.reset_reason.clone(),
                custom_duration_minutes: self.custom_duration_minutes,
            },
            "full" => ResetKind::Full,
            other => {
                tracing::warn!(reset_type = other, "unknown reset_type, treating as full reset");
                ResetKind::Full
            }
        };
        Some(ResetInfo {
            kind,
            timer_started: self.timer_started.unwrap_or(false),
        })
    }

    pub fn awaiting_timer_start(&self) -> bool {
        self.reset_info()
            .map(|r| r.awaiting_timer_start())
            .unwrap_or(false)
    }

    pub fn mark_timer_started(&mut self, at: DateTime<Utc>) {
        self.timer_started = Some(true);
        self.actual_start_time = Some(at);
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

fn lenient_minutes<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match raw {
        Some(JsonValue::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .and_then(|v| i32::try_from(v).ok()),
        Some(JsonValue::String(s)) => s.trim().parse::<i32>().ok(),
        _ => None,
    }
    .filter(|m| *m > 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_reset_without_timer_awaits_start() {
        let meta = AnswerMetadata::from_json(Some(&json!({
            "reset_type": "partial",
            "reset_reason": "power outage",
            "custom_duration_minutes": "25"
        })));
        let info = meta.reset_info().unwrap();
        assert_eq!(
            info.kind,
            ResetKind::Partial {
                reason: Some("power outage".into()),
                custom_duration_minutes: Some(25),
            }
        );
        assert!(info.awaiting_timer_start());
    }

    #[test]
    fn started_timer_is_no_longer_awaiting() {
        let mut meta = AnswerMetadata::from_json(Some(&json!({ "reset_type": "partial" })));
        let at = Utc::now();
        meta.mark_timer_started(at);
        assert!(!meta.awaiting_timer_start());
        assert_eq!(meta.actual_start_time, Some(at));
    }

    #[test]
    fn full_reset_never_defers_timer() {
        let meta = AnswerMetadata::from_json(Some(&json!({ "reset_type": "full" })));
        assert_eq!(meta.reset_info().unwrap().kind, ResetKind::Full);
        assert!(!meta.awaiting_timer_start());
    }

    #[test]
    fn unknown_keys_survive_a_round_trip() {
        let raw = json!({ "reset_type": "partial", "reset_by": "teacher-7" });
        let meta = AnswerMetadata::from_json(Some(&raw));
        assert_eq!(meta.to_json()["reset_by"], "teacher-7");
    }

    #[test]
    fn malformed_metadata_decodes_as_empty() {
        let meta = AnswerMetadata::from_json(Some(&json!("not an object")));
        assert_eq!(meta, AnswerMetadata::default());
        assert!(meta.reset_info().is_none());
    }

    #[test]
    fn non_positive_durations_are_ignored() {
        let meta = AnswerMetadata::from_json(Some(&json!({ "custom_duration_minutes": 0 })));
        assert_eq!(meta.custom_duration_minutes, None);
    }
}
