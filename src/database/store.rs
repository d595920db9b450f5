use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::answer::Answer;
use crate::models::exam::Exam;
use crate::models::exam_session::{ExamSession, NewSession, SessionStatus};
use crate::models::proctoring_event::{NewProctoringEvent, ProctoringEvent};

pub type Scorer = dyn Fn(&ExamSession, &[Answer]) -> i32 + Send + Sync;

#[derive(Debug, Clone)]
pub struct Finalized {
    pub session: ExamSession,
    /// False when the session was already terminal and nothing was written.
    pub applied: bool,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find_session(&self, session_id: Uuid) -> Result<Option<ExamSession>>;

    async fn find_active_session(
        &self,
        participant_id: &str,
        exam_id: Uuid,
    ) -> Result<Option<ExamSession>>;

    async fn count_attempts(&self, participant_id: &str, exam_id: Uuid) -> Result<i64>;

    /// Returns the already open session with `false` instead of inserting.
    async fn create_session(&self, new: NewSession) -> Result<(ExamSession, bool)>;

    async fn upsert_answer(
        &self,
        session_id: Uuid,
        question_id: i32,
        selected_option: Option<i32>,
        answered_at: DateTime<Utc>,
    ) -> Result<Answer>;

    async fn list_answers(&self, session_id: Uuid) -> Result<Vec<Answer>>;

    async fn append_event(&self, event: NewProctoringEvent) -> Result<ProctoringEvent>;

    async fn list_events(&self, session_id: Uuid) -> Result<Vec<ProctoringEvent>>;

    async fn finalize_session(
        &self,
        session_id: Uuid,
        status: SessionStatus,
        at: DateTime<Utc>,
        scorer: &Scorer,
    ) -> Result<Finalized>;

    async fn list_in_progress(&self) -> Result<Vec<ExamSession>>;
}

#[async_trait]
pub trait ExamCatalog: Send + Sync {
    async fn get_exam(&self, exam_id: Uuid) -> Result<Option<Exam>>;
}

pub(crate) fn empty_metadata() -> JsonValue {
    JsonValue::Object(Default::default())
}
