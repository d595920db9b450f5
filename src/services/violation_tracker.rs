use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::database::store::{empty_metadata, SessionStore};
use crate::error::Result;
use crate::models::proctoring_event::{
    EventType, NewProctoringEvent, ProctoringEvent, Severity,
};

#[derive(Debug, Clone)]
pub struct ProctoringPolicy {
    pub severities: HashMap<EventType, Severity>,
    pub high_weight: f64,
    pub medium_weight: f64,
    pub low_weight: f64,
    /// HIGH events needed to cancel; also the denominator of warning messages.
    pub high_cancel_threshold: u32,
    pub medium_cancel_threshold: u32,
}

impl Default for ProctoringPolicy {
    fn default() -> Self {
        Self {
            severities: EventType::ALL
                .into_iter()
                .map(|t| (t, default_severity(t)))
                .collect(),
            high_weight: 1.0,
            medium_weight: 0.5,
            low_weight: 0.0,
            high_cancel_threshold: 3,
            medium_cancel_threshold: 6,
        }
    }
}

fn default_severity(event_type: EventType) -> Severity {
    match event_type {
        EventType::NoFaceDetected | EventType::MultipleFaces => Severity::High,
        EventType::LookingAway => Severity::Medium,
        EventType::FaceDetected | EventType::Unrecognized => Severity::Low,
    }
}

impl ProctoringPolicy {
    pub fn severity_of(&self, event_type: EventType) -> Severity {
        self.severities
            .get(&event_type)
            .copied()
            .unwrap_or_else(|| default_severity(event_type))
    }

    pub fn weight(&self, severity: Severity) -> f64 {
        match severity {
            Severity::High => self.high_weight,
            Severity::Medium => self.medium_weight,
            Severity::Low => self.low_weight,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ViolationCounts {
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub total: u32,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum WarningLevel {
    #[default]
    None,
    First,
    Second,
    Final,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ViolationEvaluation {
    pub counts: ViolationCounts,
    pub weighted_score: f64,
    pub should_cancel: bool,
    pub warning_level: WarningLevel,
    pub message: Option<String>,
}

impl ViolationEvaluation {
    pub fn needs_warning(&self) -> bool {
        self.should_cancel || self.warning_level != WarningLevel::None
    }
}

pub fn evaluate_events(policy: &ProctoringPolicy, events: &[ProctoringEvent]) -> ViolationEvaluation {
    let mut counts = ViolationCounts::default();
    let mut weighted_score = 0.0;
    let mut latest_high = None;

    for event in events {
        match event.severity {
            Severity::High => {
                counts.high += 1;
                latest_high = Some(event.event_type);
            }
            Severity::Medium => counts.medium += 1,
            Severity::Low => counts.low += 1,
        }
        weighted_score += policy.weight(event.severity);
    }
    counts.total = counts.high + counts.medium + counts.low;

    let threshold = policy.high_cancel_threshold.max(1);
    let warning_level = match counts.high {
        0 => WarningLevel::None,
        n if n >= threshold => WarningLevel::Final,
        1 => WarningLevel::First,
        _ => WarningLevel::Second,
    };
    let cancel_on_high = counts.high >= threshold;
    let cancel_on_medium = counts.medium >= policy.medium_cancel_threshold.max(1);
    let should_cancel = cancel_on_high || cancel_on_medium;

    let reason = latest_high.map(EventType::describe).unwrap_or("violation");
    let message = if cancel_on_high {
        Some(format!(
            "Final warning {}/{}: your exam has been cancelled after repeated violations ({}).",
            threshold, threshold, reason
        ))
    } else if cancel_on_medium {
        Some(format!(
            "Your exam has been cancelled: looking away from the screen detected {} times.",
            counts.medium
        ))
    } else {
        match warning_level {
            WarningLevel::First => Some(format!(
                "Warning {}/{}: {}. Keep your face clearly visible to the camera.",
                counts.high, threshold, reason
            )),
            WarningLevel::Second => Some(format!(
                "Warning {}/{}: {}. One more violation will cancel your exam.",
                counts.high, threshold, reason
            )),
            _ => None,
        }
    };

    ViolationEvaluation {
        counts,
        weighted_score,
        should_cancel,
        warning_level: if cancel_on_medium { WarningLevel::Final } else { warning_level },
        message,
    }
}

#[derive(Clone)]
pub struct ViolationTracker {
    store: Arc<dyn SessionStore>,
    policy: Arc<ProctoringPolicy>,
}

impl ViolationTracker {
    pub fn new(store: Arc<dyn SessionStore>, policy: ProctoringPolicy) -> Self {
        Self {
            store,
            policy: Arc::new(policy),
        }
    }

    pub async fn record_event(
        &self,
        session_id: Uuid,
        event_type: EventType,
        metadata: Option<JsonValue>,
        at: DateTime<Utc>,
    ) -> Result<ProctoringEvent> {
        let metadata = match metadata {
            Some(JsonValue::Null) | None => empty_metadata(),
            Some(value) => value,
        };
        let event = self
            .store
            .append_event(NewProctoringEvent {
                session_id,
                event_type,
                severity: self.policy.severity_of(event_type),
                metadata,
                created_at: at,
            })
            .await?;
        tracing::debug!(
            session_id = %session_id,
            event_type = %event.event_type,
            severity = event.severity.as_str(),
            "proctoring event recorded"
        );
        Ok(event)
    }

    pub async fn evaluate(&self, session_id: Uuid) -> Result<ViolationEvaluation> {
        let events = self.store.list_events(session_id).await?;
        Ok(evaluate_events(&self.policy, &events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::InMemoryStore;
    use crate::models::exam_session::{NewSession, SessionStatus};
    use crate::services::answer_ledger::AnswerLedger;
    use crate::utils::time::from_rfc3339;
    use serde_json::json;

    fn event(event_type: EventType) -> ProctoringEvent {
        let policy = ProctoringPolicy::default();
        ProctoringEvent {
            id: Uuid::new_v4(),
            session_id: Uuid::nil(),
            event_type,
            severity: policy.severity_of(event_type),
            metadata: json!({}),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn high_events_walk_the_warning_ladder() {
        let policy = ProctoringPolicy::default();
        let mut events = vec![event(EventType::NoFaceDetected)];

        let first = evaluate_events(&policy, &events);
        assert_eq!(first.warning_level, WarningLevel::First);
        assert!(!first.should_cancel);
        assert!(first.message.as_deref().unwrap().starts_with("Warning 1/3"));

        events.push(event(EventType::MultipleFaces));
        let second = evaluate_events(&policy, &events);
        assert_eq!(second.warning_level, WarningLevel::Second);
        assert!(!second.should_cancel);
        assert!(second.message.as_deref().unwrap().contains("multiple faces"));

        events.push(event(EventType::NoFaceDetected));
        let third = evaluate_events(&policy, &events);
        assert_eq!(third.warning_level, WarningLevel::Final);
        assert!(third.should_cancel);
        assert!(third.message.as_deref().unwrap().starts_with("Final warning 3/3"));
    }

    #[test]
    fn final_warning_count_is_capped_at_threshold() {
        let policy = ProctoringPolicy::default();
        let events: Vec<_> = (0..4).map(|_| event(EventType::NoFaceDetected)).collect();
        let eval = evaluate_events(&policy, &events);
        assert_eq!(eval.counts.high, 4);
        assert!(eval.message.as_deref().unwrap().starts_with("Final warning 3/3"));
    }

    #[test]
    fn medium_events_do_not_advance_the_ladder() {
        let policy = ProctoringPolicy::default();
        let events: Vec<_> = (0..5).map(|_| event(EventType::LookingAway)).collect();
        let eval = evaluate_events(&policy, &events);
        assert_eq!(eval.counts.medium, 5);
        assert_eq!(eval.warning_level, WarningLevel::None);
        assert!(!eval.should_cancel);
        assert!((eval.weighted_score - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn medium_threshold_cancels() {
        let policy = ProctoringPolicy::default();
        let events: Vec<_> = (0..6).map(|_| event(EventType::LookingAway)).collect();
        let eval = evaluate_events(&policy, &events);
        assert!(eval.should_cancel);
        assert_eq!(eval.warning_level, WarningLevel::Final);
    }

    #[test]
    fn low_events_are_counted_but_harmless() {
        let policy = ProctoringPolicy::default();
        let events: Vec<_> = (0..20).map(|_| event(EventType::FaceDetected)).collect();
        let eval = evaluate_events(&policy, &events);
        assert_eq!(eval.counts.low, 20);
        assert_eq!(eval.counts.total, 20);
        assert!(!eval.needs_warning());
        assert_eq!(eval.weighted_score, 0.0);
    }

    #[test]
    fn overrides_change_severity() {
        let mut policy = ProctoringPolicy::default();
        policy.severities.insert(EventType::LookingAway, Severity::High);
        assert_eq!(policy.severity_of(EventType::LookingAway), Severity::High);
        assert_eq!(policy.severity_of(EventType::Unrecognized), Severity::Low);
    }

    #[tokio::test]
    async fn recording_is_refused_after_finish() {
        let store = Arc::new(InMemoryStore::new());
        let started_at = from_rfc3339("2026-03-01T09:00:00Z").unwrap();
        let (session, _) = store
            .create_session(NewSession {
                participant_id: "p-1".into(),
                exam_id: Uuid::new_v4(),
                started_at,
                duration_minutes: 10,
                max_score: 0,
                questions_snapshot: Vec::new(),
            })
            .await
            .unwrap();
        let tracker = ViolationTracker::new(store.clone(), ProctoringPolicy::default());

        let recorded = tracker
            .record_event(session.id, EventType::LookingAway, None, started_at)
            .await
            .unwrap();
        assert_eq!(recorded.metadata, json!({}));

        store
            .finalize_session(session.id, SessionStatus::Finished, started_at, &AnswerLedger::score)
            .await
            .unwrap();
        let err = tracker
            .record_event(session.id, EventType::NoFaceDetected, None, started_at)
            .await
            .unwrap_err();
        assert!(err.is_state_conflict());
        assert_eq!(tracker.evaluate(session.id).await.unwrap().counts.total, 1);
    }
}
