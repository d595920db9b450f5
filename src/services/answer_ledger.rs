use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use chrono::{DateTime, Utc};

use crate::database::store::SessionStore;
use crate::error::{Error, Result};
use crate::models::answer::Answer;
use crate::models::exam_session::ExamSession;
use crate::services::grading_service::GradingService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Progress {
    pub answered: usize,
    pub total: usize,
    pub percentage: u32,
}

impl Progress {
    pub fn compute(session: &ExamSession, answers: &[Answer]) -> Self {
        let snapshot: HashSet<i32> = session.questions_snapshot.iter().map(|q| q.id).collect();
        let answered = answers
            .iter()
            .filter(|a| a.selected_option.is_some() && snapshot.contains(&a.question_id))
            .map(|a| a.question_id)
            .collect::<HashSet<_>>()
            .len();
        let total = snapshot.len();
        let percentage = if total == 0 {
            0
        } else {
            ((answered as f64 / total as f64) * 100.0).round() as u32
        };
        Self {
            answered,
            total,
            percentage,
        }
    }
}

#[derive(Clone)]
pub struct AnswerLedger {
    store: Arc<dyn SessionStore>,
}

impl AnswerLedger {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub async fn submit(
        &self,
        session: &ExamSession,
        question_id: i32,
        selected_option: Option<i32>,
        at: DateTime<Utc>,
    ) -> Result<Answer> {
        let question = session.question(question_id).ok_or_else(|| {
            Error::conflict("Invalid question for this session", session.status)
        })?;
        if let Some(option) = selected_option {
            if !question.has_option(option) {
                return Err(Error::BadRequest(format!(
                    "Option {} does not exist for question {}",
                    option, question_id
                )));
            }
        }

        self.store
            .upsert_answer(session.id, question_id, selected_option, at)
            .await
    }

    pub async fn answers(&self, session_id: Uuid) -> Result<Vec<Answer>> {
        self.store.list_answers(session_id).await
    }

    pub async fn progress(&self, session: &ExamSession) -> Result<Progress> {
        let answers = self.answers(session.id).await?;
        Ok(Progress::compute(session, &answers))
    }

    pub fn score(session: &ExamSession, answers: &[Answer]) -> i32 {
        GradingService::grade(&session.questions_snapshot, answers).earned_points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::InMemoryStore;
    use crate::models::exam_session::{NewSession, SessionStatus};
    use crate::models::question::Question;
    use crate::utils::time::from_rfc3339;

    fn snapshot() -> Vec<Question> {
        (1..=3)
            .map(|id| Question {
                id,
                content: format!("Question {}", id),
                options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
                correct_answer: id - 1,
                default_score: id,
            })
            .collect()
    }

    async fn setup() -> (Arc<InMemoryStore>, AnswerLedger, ExamSession) {
        let store = Arc::new(InMemoryStore::new());
        let (session, _) = store
            .create_session(NewSession {
                participant_id: "p-1".into(),
                exam_id: Uuid::new_v4(),
                started_at: from_rfc3339("2026-03-01T09:00:00Z").unwrap(),
                duration_minutes: 30,
                max_score: 6,
                questions_snapshot: snapshot(),
            })
            .await
            .unwrap();
        let ledger = AnswerLedger::new(store.clone());
        (store, ledger, session)
    }

    #[tokio::test]
    async fn last_write_wins_per_question() {
        let (_store, ledger, session) = setup().await;
        let at = session.started_at;
        ledger.submit(&session, 2, Some(0), at).await.unwrap();
        ledger.submit(&session, 2, Some(1), at).await.unwrap();

        let answers = ledger.answers(session.id).await.unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].selected_option, Some(1));
    }

    #[tokio::test]
    async fn rejects_question_outside_snapshot() {
        let (_store, ledger, session) = setup().await;
        let err = ledger
            .submit(&session, 42, Some(0), session.started_at)
            .await
            .unwrap_err();
        assert!(err.is_state_conflict());
    }

    #[tokio::test]
    async fn rejects_unknown_option() {
        let (_store, ledger, session) = setup().await;
        let err = ledger
            .submit(&session, 1, Some(9), session.started_at)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn progress_ignores_cleared_answers() {
        let (_store, ledger, session) = setup().await;
        let at = session.started_at;
        ledger.submit(&session, 1, Some(0), at).await.unwrap();
        ledger.submit(&session, 3, None, at).await.unwrap();

        let progress = ledger.progress(&session).await.unwrap();
        assert_eq!(progress.answered, 1);
        assert_eq!(progress.total, 3);
        assert_eq!(progress.percentage, 33);
    }

    #[tokio::test]
    async fn score_is_reproducible_from_answers() {
        let (_store, ledger, session) = setup().await;
        let at = session.started_at;
        ledger.submit(&session, 1, Some(0), at).await.unwrap();
        ledger.submit(&session, 2, Some(1), at).await.unwrap();
        ledger.submit(&session, 3, Some(0), at).await.unwrap();

        let answers = ledger.answers(session.id).await.unwrap();
        assert_eq!(AnswerLedger::score(&session, &answers), 3);
        assert_eq!(AnswerLedger::score(&session, &answers), 3);
    }

    #[tokio::test]
    async fn terminal_session_rejects_writes() {
        let (store, ledger, session) = setup().await;
        store
            .finalize_session(session.id, SessionStatus::Finished, session.started_at, &AnswerLedger::score)
            .await
            .unwrap();
        let err = ledger
            .submit(&session, 1, Some(0), session.started_at)
            .await
            .unwrap_err();
        assert!(err.is_state_conflict());
    }

    #[tokio::test]
    async fn concurrent_writes_store_one_submitted_value() {
        let (_store, ledger, session) = setup().await;
        let mut handles = Vec::new();
        for option in 0..4 {
            let ledger = ledger.clone();
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .submit(&session, 1, Some(option), session.started_at)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let answers = ledger.answers(session.id).await.unwrap();
        assert_eq!(answers.len(), 1);
        assert!(matches!(answers[0].selected_option, Some(0..=3)));
    }
}
