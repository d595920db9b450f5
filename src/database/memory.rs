use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{ExamCatalog, Finalized, Scorer, SessionStore};
use crate::error::{Error, Result};
use crate::models::answer::Answer;
use crate::models::exam::Exam;
use crate::models::exam_session::{ExamSession, NewSession, SessionStatus};
use crate::models::proctoring_event::{NewProctoringEvent, ProctoringEvent};

#[derive(Debug)]
struct SessionCell {
    // Writers hold the read side while applying; finalize holds the write side.
    record: RwLock<ExamSession>,
    answers: Mutex<HashMap<i32, Answer>>,
    events: Mutex<Vec<ProctoringEvent>>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    sessions: Mutex<HashMap<Uuid, Arc<SessionCell>>>,
    exams: Mutex<HashMap<Uuid, Exam>>,
    create_lock: tokio::sync::Mutex<()>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_exam(&self, exam: Exam) {
        self.exams
            .lock()
            .expect("exam catalog mutex poisoned")
            .insert(exam.id, exam);
    }

    fn cell(&self, session_id: Uuid) -> Option<Arc<SessionCell>> {
        self.sessions
            .lock()
            .expect("session map mutex poisoned")
            .get(&session_id)
            .cloned()
    }

    fn cells(&self) -> Vec<Arc<SessionCell>> {
        self.sessions
            .lock()
            .expect("session map mutex poisoned")
            .values()
            .cloned()
            .collect()
    }

    fn require_cell(&self, session_id: Uuid) -> Result<Arc<SessionCell>> {
        self.cell(session_id)
            .ok_or_else(|| Error::NotFound("Session not found".to_string()))
    }

    async fn sessions_for(&self, participant_id: &str, exam_id: Uuid) -> Vec<ExamSession> {
        let mut found = Vec::new();
        for cell in self.cells() {
            let record = cell.record.read().await;
            if record.participant_id == participant_id && record.exam_id == exam_id {
                found.push(record.clone());
            }
        }
        found
    }
}

fn not_in_progress(status: SessionStatus) -> Error {
    Error::conflict(
        format!("Session is no longer in progress (status: {})", status),
        status,
    )
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn find_session(&self, session_id: Uuid) -> Result<Option<ExamSession>> {
        match self.cell(session_id) {
            Some(cell) => Ok(Some(cell.record.read().await.clone())),
            None => Ok(None),
        }
    }

    async fn find_active_session(
        &self,
        participant_id: &str,
        exam_id: Uuid,
    ) -> Result<Option<ExamSession>> {
        Ok(self
            .sessions_for(participant_id, exam_id)
            .await
            .into_iter()
            .find(|s| s.status == SessionStatus::InProgress))
    }

    async fn count_attempts(&self, participant_id: &str, exam_id: Uuid) -> Result<i64> {
        Ok(self.sessions_for(participant_id, exam_id).await.len() as i64)
    }

    async fn create_session(&self, new: NewSession) -> Result<(ExamSession, bool)> {
        let _guard = self.create_lock.lock().await;

        let existing = self.sessions_for(&new.participant_id, new.exam_id).await;
        if let Some(active) = existing
            .iter()
            .find(|s| s.status == SessionStatus::InProgress)
        {
            return Ok((active.clone(), false));
        }

        let session = ExamSession {
            id: Uuid::new_v4(),
            participant_id: new.participant_id,
            exam_id: new.exam_id,
            status: SessionStatus::InProgress,
            attempt_number: existing.len() as i32 + 1,
            started_at: new.started_at,
            submitted_at: None,
            score: None,
            max_score: new.max_score,
            duration_minutes: new.duration_minutes,
            questions_snapshot: new.questions_snapshot,
        };
        let cell = Arc::new(SessionCell {
            record: RwLock::new(session.clone()),
            answers: Mutex::new(HashMap::new()),
            events: Mutex::new(Vec::new()),
        });
        self.sessions
            .lock()
            .expect("session map mutex poisoned")
            .insert(session.id, cell);
        Ok((session, true))
    }

    async fn upsert_answer(
        &self,
        session_id: Uuid,
        question_id: i32,
        selected_option: Option<i32>,
        answered_at: DateTime<Utc>,
    ) -> Result<Answer> {
        let cell = self.require_cell(session_id)?;
        let record = cell.record.read().await;
        if record.status != SessionStatus::InProgress {
            return Err(not_in_progress(record.status));
        }

        let answer = Answer {
            session_id,
            question_id,
            selected_option,
            answered_at,
        };
        cell.answers
            .lock()
            .expect("answer map mutex poisoned")
            .insert(question_id, answer.clone());
        Ok(answer)
    }

    async fn list_answers(&self, session_id: Uuid) -> Result<Vec<Answer>> {
        let cell = self.require_cell(session_id)?;
        let mut answers: Vec<Answer> = cell
            .answers
            .lock()
            .expect("answer map mutex poisoned")
            .values()
            .cloned()
            .collect();
        answers.sort_by_key(|a| a.question_id);
        Ok(answers)
    }

    async fn append_event(&self, event: NewProctoringEvent) -> Result<ProctoringEvent> {
        let cell = self.require_cell(event.session_id)?;
        let record = cell.record.read().await;
        if record.status != SessionStatus::InProgress {
            return Err(not_in_progress(record.status));
        }

        let stored = ProctoringEvent {
            id: Uuid::new_v4(),
            session_id: event.session_id,
            event_type: event.event_type,
            severity: event.severity,
            metadata: event.metadata,
            created_at: event.created_at,
        };
        cell.events
            .lock()
            .expect("event log mutex poisoned")
            .push(stored.clone());
        Ok(stored)
    }

    async fn list_events(&self, session_id: Uuid) -> Result<Vec<ProctoringEvent>> {
        let cell = self.require_cell(session_id)?;
        let events = cell
            .events
            .lock()
            .expect("event log mutex poisoned")
            .clone();
        Ok(events)
    }

    async fn finalize_session(
        &self,
        session_id: Uuid,
        status: SessionStatus,
        at: DateTime<Utc>,
        scorer: &Scorer,
    ) -> Result<Finalized> {
        let cell = self.require_cell(session_id)?;
        let mut record = cell.record.write().await;
        if record.status.is_terminal() {
            return Ok(Finalized {
                session: record.clone(),
                applied: false,
            });
        }

        let answers: Vec<Answer> = cell
            .answers
            .lock()
            .expect("answer map mutex poisoned")
            .values()
            .cloned()
            .collect();
        record.score = Some(scorer(&record, &answers));
        record.status = status;
        record.submitted_at = Some(at);
        Ok(Finalized {
            session: record.clone(),
            applied: true,
        })
    }

    async fn list_in_progress(&self) -> Result<Vec<ExamSession>> {
        let mut active = Vec::new();
        for cell in self.cells() {
            let record = cell.record.read().await;
            if record.status == SessionStatus::InProgress {
                active.push(record.clone());
            }
        }
        Ok(active)
    }
}

#[async_trait]
impl ExamCatalog for InMemoryStore {
    async fn get_exam(&self, exam_id: Uuid) -> Result<Option<Exam>> {
        Ok(self
            .exams
            .lock()
            .expect("exam catalog mutex poisoned")
            .get(&exam_id)
            .cloned())
    }
}
