use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::database::store::SessionStore;
use crate::error::{Error, Result};
use crate::models::exam::Exam;
use crate::models::exam_session::{ExamSession, NewSession, SessionStatus};
use crate::services::answer_ledger::AnswerLedger;
use crate::services::session_clock::SessionClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    SubmitAnswer,
    RecordViolation,
    Submit,
    Expire,
    CancelForViolations,
    Reap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stay,
    Move(SessionStatus),
    AlreadyFinal(SessionStatus),
}

pub fn transition(current: SessionStatus, event: SessionEvent) -> Result<Transition> {
    use SessionEvent::*;

    match (current, event) {
        (SessionStatus::InProgress, SubmitAnswer | RecordViolation) => Ok(Transition::Stay),
        (SessionStatus::InProgress, Submit) => Ok(Transition::Move(SessionStatus::Finished)),
        (SessionStatus::InProgress, Expire | Reap) => Ok(Transition::Move(SessionStatus::Timeout)),
        (SessionStatus::InProgress, CancelForViolations) => {
            Ok(Transition::Move(SessionStatus::Cancelled))
        }
        (terminal, Submit | Expire | Reap | CancelForViolations) => {
            Ok(Transition::AlreadyFinal(terminal))
        }
        (terminal, SubmitAnswer | RecordViolation) => Err(Error::conflict(
            format!("Session is no longer in progress (status: {})", terminal),
            terminal,
        )),
    }
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub session: ExamSession,
    /// True only for the caller whose write committed the transition.
    pub transitioned: bool,
}

#[derive(Clone)]
pub struct SessionStateMachine {
    store: Arc<dyn SessionStore>,
    clock: SessionClock,
}

impl SessionStateMachine {
    pub fn new(store: Arc<dyn SessionStore>, clock: SessionClock) -> Self {
        Self { store, clock }
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    pub async fn start(
        &self,
        participant_id: &str,
        exam: &Exam,
        now: DateTime<Utc>,
    ) -> Result<(ExamSession, bool)> {
        let (session, created) = self
            .store
            .create_session(NewSession {
                participant_id: participant_id.to_string(),
                exam_id: exam.id,
                started_at: now,
                duration_minutes: exam.duration_minutes,
                max_score: exam.max_score(),
                questions_snapshot: exam.questions.clone(),
            })
            .await?;
        if created {
            tracing::info!(
                session_id = %session.id,
                exam_id = %exam.id,
                attempt = session.attempt_number,
                "exam session started"
            );
        }
        Ok((session, created))
    }

    pub fn is_expired(&self, session: &ExamSession, now: DateTime<Utc>) -> bool {
        !session.status.is_terminal()
            && !self
                .clock
                .within_time_limit(session.started_at, session.duration_minutes, now)
    }

    pub fn guard(&self, session: &ExamSession, event: SessionEvent) -> Result<()> {
        match transition(session.status, event)? {
            Transition::Stay => Ok(()),
            _ => Err(Error::Internal(format!(
                "{:?} is not a mutating event",
                event
            ))),
        }
    }

    /// Lazy timeout check; run before any operation touches the session.
    pub async fn enforce_deadline(
        &self,
        session: ExamSession,
        now: DateTime<Utc>,
    ) -> Result<ExamSession> {
        if self.is_expired(&session, now) {
            Ok(self.fire(session, SessionEvent::Expire, now).await?.session)
        } else {
            Ok(session)
        }
    }

    pub async fn submit_exam(&self, session: ExamSession, now: DateTime<Utc>) -> Result<Outcome> {
        self.fire(session, SessionEvent::Submit, now).await
    }

    pub async fn cancel_for_violations(
        &self,
        session: ExamSession,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        self.fire(session, SessionEvent::CancelForViolations, now).await
    }

    /// Losers of a race get the winner's stored result back.
    pub async fn fire(
        &self,
        session: ExamSession,
        event: SessionEvent,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        let target = match transition(session.status, event)? {
            Transition::Move(target) => target,
            Transition::AlreadyFinal(_) => {
                return Ok(Outcome {
                    session,
                    transitioned: false,
                })
            }
            Transition::Stay => {
                return Err(Error::Internal(format!(
                    "{:?} does not finalize a session",
                    event
                )))
            }
        };

        let finalized = self
            .store
            .finalize_session(session.id, target, now, &AnswerLedger::score)
            .await?;

        if finalized.applied {
            tracing::info!(
                session_id = %finalized.session.id,
                from = %session.status,
                to = %finalized.session.status,
                score = ?finalized.session.score,
                "exam session finalized"
            );
        } else {
            tracing::debug!(
                session_id = %finalized.session.id,
                status = %finalized.session.status,
                "session already finalized by a concurrent request"
            );
        }

        Ok(Outcome {
            session: finalized.session,
            transitioned: finalized.applied,
        })
    }
}
