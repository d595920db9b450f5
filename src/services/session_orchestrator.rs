use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::database::store::{ExamCatalog, SessionStore};
use crate::dto::session_dto::{
    QuestionsResponse, RecordedEvent, ReviewResponse, SessionView, StartSessionResponse,
    StatusResponse, SubmitAnswerResponse, SubmitExamResponse, ViolationResponse,
};
use crate::error::{Error, Result};
use crate::models::exam_session::{ExamSession, SessionStatus};
use crate::models::proctoring_event::{EventType, ProctoringEvent};
use crate::models::question::QuestionView;
use crate::services::answer_ledger::AnswerLedger;
use crate::services::classifier_service::{validate_frame, FrameClassifier};
use crate::services::grading_service::{self, GradingService};
use crate::services::notification_service::{ViolationWarning, WarningNotifier};
use crate::services::session_clock::SessionClock;
use crate::services::state_machine::{SessionEvent, SessionStateMachine};
use crate::services::violation_tracker::{ViolationEvaluation, ViolationTracker};
use crate::utils::time::Clock;

#[derive(Clone)]
pub struct SessionOrchestrator {
    store: Arc<dyn SessionStore>,
    catalog: Arc<dyn ExamCatalog>,
    clock: Arc<dyn Clock>,
    machine: SessionStateMachine,
    ledger: AnswerLedger,
    tracker: ViolationTracker,
    classifier: Arc<dyn FrameClassifier>,
    notifier: Arc<dyn WarningNotifier>,
    max_frame_bytes: usize,
}

impl SessionOrchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        catalog: Arc<dyn ExamCatalog>,
        clock: Arc<dyn Clock>,
        classifier: Arc<dyn FrameClassifier>,
        notifier: Arc<dyn WarningNotifier>,
        engine: EngineConfig,
    ) -> Self {
        let machine = SessionStateMachine::new(store.clone(), SessionClock::new(engine.session));
        let ledger = AnswerLedger::new(store.clone());
        let tracker = ViolationTracker::new(store.clone(), engine.proctoring);
        Self {
            store,
            catalog,
            clock,
            machine,
            ledger,
            tracker,
            classifier,
            notifier,
            max_frame_bytes: engine.max_frame_bytes,
        }
    }

    pub fn state_machine(&self) -> &SessionStateMachine {
        &self.machine
    }

    fn view(&self, session: &ExamSession, now: DateTime<Utc>) -> SessionView {
        let clock = self.machine.clock();
        SessionView {
            session_id: session.id,
            exam_id: session.exam_id,
            status: session.status,
            attempt_number: session.attempt_number,
            started_at: session.started_at,
            deadline: clock.deadline(session.started_at, session.duration_minutes),
            submitted_at: session.submitted_at,
            remaining_seconds: if session.status.is_terminal() {
                0
            } else {
                clock.remaining_seconds(session.started_at, session.duration_minutes, now)
            },
        }
    }

    fn questions(session: &ExamSession) -> Vec<QuestionView> {
        session.questions_snapshot.iter().map(QuestionView::from).collect()
    }

    async fn load_owned(
        &self,
        session_id: Uuid,
        participant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ExamSession> {
        let session = self
            .store
            .find_session(session_id)
            .await?
            .ok_or_else(|| Error::NotFound("Session not found".to_string()))?;
        if !session.is_owned_by(participant_id) {
            warn!(session_id = %session_id, participant_id, "session access denied");
            return Err(Error::Forbidden(
                "You do not have access to this session".to_string(),
            ));
        }
        self.machine.enforce_deadline(session, now).await
    }

    pub async fn start_or_resume(
        &self,
        participant_id: &str,
        exam_id: Uuid,
    ) -> Result<StartSessionResponse> {
        let now = self.clock.now();

        if let Some(active) = self.store.find_active_session(participant_id, exam_id).await? {
            let active = self.machine.enforce_deadline(active, now).await?;
            if !active.status.is_terminal() {
                return Ok(StartSessionResponse {
                    session: self.view(&active, now),
                    resumed: true,
                    questions: Self::questions(&active),
                });
            }
        }

        let exam = self
            .catalog
            .get_exam(exam_id)
            .await?
            .ok_or_else(|| Error::NotFound("Exam not found".to_string()))?;
        if !exam.is_active {
            return Err(Error::StateConflict {
                message: "Exam is not open for attempts".to_string(),
                status: None,
            });
        }
        if exam.questions.is_empty() {
            return Err(Error::StateConflict {
                message: "Exam has no questions".to_string(),
                status: None,
            });
        }
        let attempts = self.store.count_attempts(participant_id, exam_id).await?;
        if !exam.allows_attempt(attempts + 1) {
            return Err(Error::StateConflict {
                message: "Attempt limit reached for this exam".to_string(),
                status: None,
            });
        }

        let (session, created) = self.machine.start(participant_id, &exam, now).await?;
        let session = if created {
            session
        } else {
            self.machine.enforce_deadline(session, now).await?
        };
        if session.status.is_terminal() {
            // A concurrent start's session expired under us; the caller retries.
            return Err(Error::conflict(
                "Previous attempt just ended, please retry",
                session.status,
            ));
        }

        Ok(StartSessionResponse {
            session: self.view(&session, now),
            resumed: !created,
            questions: Self::questions(&session),
        })
    }

    pub async fn get_questions(
        &self,
        session_id: Uuid,
        participant_id: &str,
    ) -> Result<QuestionsResponse> {
        let now = self.clock.now();
        let session = self.load_owned(session_id, participant_id, now).await?;
        Ok(QuestionsResponse {
            session: self.view(&session, now),
            questions: Self::questions(&session),
        })
    }

    pub async fn submit_answer(
        &self,
        session_id: Uuid,
        participant_id: &str,
        question_id: i32,
        selected_option: Option<i32>,
    ) -> Result<SubmitAnswerResponse> {
        let now = self.clock.now();
        let session = self.load_owned(session_id, participant_id, now).await?;
        self.machine.guard(&session, SessionEvent::SubmitAnswer)?;

        let answer = self
            .ledger
            .submit(&session, question_id, selected_option, now)
            .await?;
        let progress = self.ledger.progress(&session).await?;
        Ok(SubmitAnswerResponse {
            session: self.view(&session, now),
            answer,
            progress,
        })
    }

    pub async fn submit_exam(
        &self,
        session_id: Uuid,
        participant_id: &str,
    ) -> Result<SubmitExamResponse> {
        let now = self.clock.now();
        let session = self.load_owned(session_id, participant_id, now).await?;
        let outcome = self.machine.submit_exam(session, now).await?;
        let session = outcome.session;

        let score = session.score.unwrap_or(0);
        let percentage = grading_service::percentage(score, session.max_score);
        let ended_at = session.submitted_at.unwrap_or(now);
        let message = match session.status {
            SessionStatus::Finished => "Exam submitted".to_string(),
            SessionStatus::Timeout => "Time limit exceeded; your saved answers were graded".to_string(),
            SessionStatus::Cancelled => "Exam was cancelled due to proctoring violations".to_string(),
            SessionStatus::InProgress => "Exam is still in progress".to_string(),
        };
        if outcome.transitioned {
            info!(session_id = %session.id, participant_id, score, "exam submitted");
        }

        Ok(SubmitExamResponse {
            session: self.view(&session, now),
            score,
            max_score: session.max_score,
            percentage,
            elapsed_seconds: self
                .machine
                .clock()
                .elapsed_seconds(session.started_at, ended_at),
            message,
        })
    }

    pub async fn get_answers(
        &self,
        session_id: Uuid,
        participant_id: &str,
    ) -> Result<ReviewResponse> {
        let now = self.clock.now();
        let session = self.load_owned(session_id, participant_id, now).await?;
        if !session.status.is_terminal() {
            return Err(Error::conflict(
                "Answers can be reviewed only after the exam has ended",
                session.status,
            ));
        }

        let answers = self.ledger.answers(session.id).await?;
        let report = GradingService::grade(&session.questions_snapshot, &answers);
        Ok(ReviewResponse {
            session: self.view(&session, now),
            score: session.score.unwrap_or(report.earned_points),
            max_score: session.max_score,
            answers: report.graded,
        })
    }

    pub async fn log_violation(
        &self,
        session_id: Uuid,
        participant_id: &str,
        event_type: &str,
        metadata: Option<JsonValue>,
    ) -> Result<ViolationResponse> {
        let now = self.clock.now();
        let session = self.load_owned(session_id, participant_id, now).await?;
        self.machine.guard(&session, SessionEvent::RecordViolation)?;

        let event = self
            .tracker
            .record_event(session.id, EventType::classify(event_type), metadata, now)
            .await?;
        self.escalate(session, event, now).await
    }

    pub async fn analyze_frame(
        &self,
        session_id: Uuid,
        participant_id: &str,
        frame: &str,
    ) -> Result<ViolationResponse> {
        let now = self.clock.now();
        let session = self.load_owned(session_id, participant_id, now).await?;
        self.machine.guard(&session, SessionEvent::RecordViolation)?;
        let frame = validate_frame(frame, self.max_frame_bytes)?;

        let classification = match self.classifier.classify(&frame).await {
            Ok(classification) => classification,
            Err(err) => {
                warn!(session_id = %session.id, error = %err, "frame classification unavailable");
                let evaluation = self.tracker.evaluate(session.id).await?;
                return Ok(ViolationResponse {
                    session: self.view(&session, now),
                    event: None,
                    evaluation,
                    degraded: true,
                });
            }
        };

        let metadata = json!({
            "source": "classifier",
            "face_count": classification.face_count,
            "confidence": classification.confidence,
        });
        let event = self
            .tracker
            .record_event(session.id, classification.event_type, Some(metadata), now)
            .await?;
        self.escalate(session, event, now).await
    }

    async fn escalate(
        &self,
        session: ExamSession,
        event: ProctoringEvent,
        now: DateTime<Utc>,
    ) -> Result<ViolationResponse> {
        let evaluation = self.tracker.evaluate(session.id).await?;
        // Only the call that actually cancels sends the final warning.
        let (session, notify) = if evaluation.should_cancel {
            let outcome = self.machine.cancel_for_violations(session, now).await?;
            if outcome.transitioned {
                warn!(
                    session_id = %outcome.session.id,
                    high = evaluation.counts.high,
                    medium = evaluation.counts.medium,
                    "exam cancelled for proctoring violations"
                );
            }
            (outcome.session, outcome.transitioned)
        } else {
            (session, evaluation.needs_warning())
        };

        if notify {
            self.notifier.notify(self.warning(&session, &evaluation, now));
        }

        Ok(ViolationResponse {
            session: self.view(&session, now),
            event: Some(RecordedEvent::from(&event)),
            evaluation,
            degraded: false,
        })
    }

    fn warning(
        &self,
        session: &ExamSession,
        evaluation: &ViolationEvaluation,
        now: DateTime<Utc>,
    ) -> ViolationWarning {
        ViolationWarning {
            session_id: session.id,
            participant_id: session.participant_id.clone(),
            warning_level: evaluation.warning_level,
            message: evaluation.message.clone(),
            counts: evaluation.counts,
            status: session.status,
            created_at: now,
        }
    }

    pub async fn status(&self, session_id: Uuid, participant_id: &str) -> Result<StatusResponse> {
        let now = self.clock.now();
        let session = self.load_owned(session_id, participant_id, now).await?;
        let progress = self.ledger.progress(&session).await?;
        Ok(StatusResponse {
            session: self.view(&session, now),
            progress,
        })
    }
}
