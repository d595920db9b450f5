use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::answer::Answer;
use crate::models::exam_session::SessionStatus;
use crate::models::proctoring_event::{EventType, ProctoringEvent, Severity};
use crate::models::question::QuestionView;
use crate::services::answer_ledger::Progress;
use crate::services::grading_service::GradedAnswer;
use crate::services::violation_tracker::ViolationEvaluation;

/// Status and timing attached to every session response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionView {
    pub session_id: Uuid,
    pub exam_id: Uuid,
    pub status: SessionStatus,
    pub attempt_number: i32,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub remaining_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StartSessionResponse {
    pub session: SessionView,
    /// True when an existing IN_PROGRESS session was returned.
    pub resumed: bool,
    pub questions: Vec<QuestionView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuestionsResponse {
    pub session: SessionView,
    pub questions: Vec<QuestionView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SubmitAnswerRequest {
    pub question_id: i32,
    /// `null` clears the answer.
    #[validate(range(min = 0))]
    pub selected_option: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitAnswerResponse {
    pub session: SessionView,
    pub answer: Answer,
    pub progress: Progress,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitExamResponse {
    pub session: SessionView,
    pub score: i32,
    pub max_score: i32,
    pub percentage: f64,
    pub elapsed_seconds: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReviewResponse {
    pub session: SessionView,
    pub score: i32,
    pub max_score: i32,
    pub answers: Vec<GradedAnswer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub session: SessionView,
    pub progress: Progress,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct LogViolationRequest {
    #[validate(length(min = 1, max = 64))]
    pub event_type: String,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AnalyzeFrameRequest {
    /// Base64 image, optionally as a `data:` URL.
    #[validate(length(min = 1))]
    pub image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordedEvent {
    pub id: Uuid,
    pub event_type: EventType,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

impl From<&ProctoringEvent> for RecordedEvent {
    fn from(event: &ProctoringEvent) -> Self {
        Self {
            id: event.id,
            event_type: event.event_type,
            severity: event.severity,
            created_at: event.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ViolationResponse {
    pub session: SessionView,
    /// Absent when the frame could not be classified.
    pub event: Option<RecordedEvent>,
    pub evaluation: ViolationEvaluation,
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SweepResponse {
    pub scanned: usize,
    pub reaped: Vec<Uuid>,
}
