use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::store::{ExamCatalog, Finalized, Scorer, SessionStore};
use crate::error::{Error, Result};
use crate::models::answer::Answer;
use crate::models::exam::Exam;
use crate::models::exam_session::{ExamSession, NewSession, SessionStatus};
use crate::models::proctoring_event::{NewProctoringEvent, ProctoringEvent};
use crate::models::question::Question;

const SESSION_COLUMNS: &str = "id, participant_id, exam_id, status, attempt_number, started_at, \
     submitted_at, score, max_score, duration_minutes, questions_snapshot";

#[derive(Debug, FromRow)]
struct SessionRow {
    id: Uuid,
    participant_id: String,
    exam_id: Uuid,
    status: String,
    attempt_number: i32,
    started_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    score: Option<i32>,
    max_score: i32,
    duration_minutes: i32,
    questions_snapshot: Json<Vec<Question>>,
}

impl TryFrom<SessionRow> for ExamSession {
    type Error = Error;

    fn try_from(row: SessionRow) -> Result<Self> {
        Ok(ExamSession {
            id: row.id,
            participant_id: row.participant_id,
            exam_id: row.exam_id,
            status: row.status.parse().map_err(Error::Internal)?,
            attempt_number: row.attempt_number,
            started_at: row.started_at,
            submitted_at: row.submitted_at,
            score: row.score,
            max_score: row.max_score,
            duration_minutes: row.duration_minutes,
            questions_snapshot: row.questions_snapshot.0,
        })
    }
}

#[derive(Debug, FromRow)]
struct EventRow {
    id: Uuid,
    session_id: Uuid,
    event_type: String,
    severity: String,
    metadata: JsonValue,
    created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for ProctoringEvent {
    type Error = Error;

    fn try_from(row: EventRow) -> Result<Self> {
        Ok(ProctoringEvent {
            id: row.id,
            session_id: row.session_id,
            event_type: row.event_type.parse().map_err(Error::Internal)?,
            severity: row.severity.parse().map_err(Error::Internal)?,
            metadata: row.metadata,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ExamRow {
    id: Uuid,
    title: String,
    duration_minutes: i32,
    max_attempts: Option<i32>,
    is_active: bool,
    questions: Json<Vec<Question>>,
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_in_progress(
        tx: &mut Transaction<'_, Postgres>,
        session_id: Uuid,
    ) -> Result<()> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM exam_sessions WHERE id = $1 FOR SHARE")
                .bind(session_id)
                .fetch_optional(&mut **tx)
                .await?;
        let status: SessionStatus = status
            .ok_or_else(|| Error::NotFound("Session not found".to_string()))?
            .parse()
            .map_err(Error::Internal)?;
        if status != SessionStatus::InProgress {
            return Err(Error::conflict(
                format!("Session is no longer in progress (status: {})", status),
                status,
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn find_session(&self, session_id: Uuid) -> Result<Option<ExamSession>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM exam_sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ExamSession::try_from).transpose()
    }

    async fn find_active_session(
        &self,
        participant_id: &str,
        exam_id: Uuid,
    ) -> Result<Option<ExamSession>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM exam_sessions \
             WHERE participant_id = $1 AND exam_id = $2 AND status = 'in_progress'",
            SESSION_COLUMNS
        ))
        .bind(participant_id)
        .bind(exam_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ExamSession::try_from).transpose()
    }

    async fn count_attempts(&self, participant_id: &str, exam_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM exam_sessions WHERE participant_id = $1 AND exam_id = $2",
        )
        .bind(participant_id)
        .bind(exam_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn create_session(&self, new: NewSession) -> Result<(ExamSession, bool)> {
        // The partial unique index on (participant_id, exam_id) WHERE in_progress
        // turns a duplicate start into a no-op insert.
        let inserted = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            INSERT INTO exam_sessions (
                id, participant_id, exam_id, status, attempt_number, started_at,
                max_score, duration_minutes, questions_snapshot
            )
            SELECT $1, $2, $3, 'in_progress',
                   (SELECT COUNT(*) + 1 FROM exam_sessions WHERE participant_id = $2 AND exam_id = $3),
                   $4, $5, $6, $7
            ON CONFLICT DO NOTHING
            RETURNING {}
            "#,
            SESSION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&new.participant_id)
        .bind(new.exam_id)
        .bind(new.started_at)
        .bind(new.max_score)
        .bind(new.duration_minutes)
        .bind(Json(&new.questions_snapshot))
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok((row.try_into()?, true));
        }

        match self
            .find_active_session(&new.participant_id, new.exam_id)
            .await?
        {
            Some(existing) => Ok((existing, false)),
            None => Err(Error::StateConflict {
                message: "Concurrent session start detected, please retry".to_string(),
                status: None,
            }),
        }
    }

    async fn upsert_answer(
        &self,
        session_id: Uuid,
        question_id: i32,
        selected_option: Option<i32>,
        answered_at: DateTime<Utc>,
    ) -> Result<Answer> {
        let mut tx = self.pool.begin().await?;
        Self::lock_in_progress(&mut tx, session_id).await?;

        let answer = sqlx::query_as::<_, Answer>(
            r#"
            INSERT INTO session_answers (session_id, question_id, selected_option, answered_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (session_id, question_id)
            DO UPDATE SET selected_option = EXCLUDED.selected_option,
                          answered_at = EXCLUDED.answered_at
            RETURNING session_id, question_id, selected_option, answered_at
            "#,
        )
        .bind(session_id)
        .bind(question_id)
        .bind(selected_option)
        .bind(answered_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(answer)
    }

    async fn list_answers(&self, session_id: Uuid) -> Result<Vec<Answer>> {
        let answers = sqlx::query_as::<_, Answer>(
            r#"SELECT session_id, question_id, selected_option, answered_at
               FROM session_answers WHERE session_id = $1 ORDER BY question_id"#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(answers)
    }

    async fn append_event(&self, event: NewProctoringEvent) -> Result<ProctoringEvent> {
        let mut tx = self.pool.begin().await?;
        Self::lock_in_progress(&mut tx, event.session_id).await?;

        let row = sqlx::query_as::<_, EventRow>(
            r#"
            INSERT INTO proctoring_events (id, session_id, event_type, severity, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, session_id, event_type, severity, metadata, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.session_id)
        .bind(event.event_type.as_str())
        .bind(event.severity.as_str())
        .bind(&event.metadata)
        .bind(event.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn list_events(&self, session_id: Uuid) -> Result<Vec<ProctoringEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"SELECT id, session_id, event_type, severity, metadata, created_at
               FROM proctoring_events WHERE session_id = $1 ORDER BY created_at, id"#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ProctoringEvent::try_from).collect()
    }

    async fn finalize_session(
        &self,
        session_id: Uuid,
        status: SessionStatus,
        at: DateTime<Utc>,
        scorer: &Scorer,
    ) -> Result<Finalized> {
        let mut tx = self.pool.begin().await?;

        // FOR UPDATE waits out writers holding FOR SHARE.
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM exam_sessions WHERE id = $1 FOR UPDATE",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound("Session not found".to_string()))?;
        let session = ExamSession::try_from(row)?;

        if session.status.is_terminal() {
            tx.commit().await?;
            return Ok(Finalized {
                session,
                applied: false,
            });
        }

        let answers = sqlx::query_as::<_, Answer>(
            r#"SELECT session_id, question_id, selected_option, answered_at
               FROM session_answers WHERE session_id = $1"#,
        )
        .bind(session_id)
        .fetch_all(&mut *tx)
        .await?;
        let score = scorer(&session, &answers);

        let updated = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            UPDATE exam_sessions
            SET status = $2, submitted_at = $3, score = $4, updated_at = NOW()
            WHERE id = $1 AND status = 'in_progress'
            RETURNING {}
            "#,
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .bind(status.as_str())
        .bind(at)
        .bind(score)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Finalized {
            session: updated.try_into()?,
            applied: true,
        })
    }

    async fn list_in_progress(&self) -> Result<Vec<ExamSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM exam_sessions WHERE status = 'in_progress' ORDER BY started_at",
            SESSION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ExamSession::try_from).collect()
    }
}

#[async_trait]
impl ExamCatalog for PgStore {
    async fn get_exam(&self, exam_id: Uuid) -> Result<Option<Exam>> {
        let row = sqlx::query_as::<_, ExamRow>(
            r#"SELECT id, title, duration_minutes, max_attempts, is_active, questions
               FROM exams WHERE id = $1"#,
        )
        .bind(exam_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Exam {
            id: r.id,
            title: r.title,
            duration_minutes: r.duration_minutes,
            max_attempts: r.max_attempts,
            is_active: r.is_active,
            questions: r.questions.0,
        }))
    }
}
