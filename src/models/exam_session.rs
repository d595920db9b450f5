use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use super::question::Question;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    InProgress,
    Finished,
    Timeout,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Finished => "finished",
            SessionStatus::Timeout => "timeout",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(SessionStatus::InProgress),
            "finished" => Ok(SessionStatus::Finished),
            "timeout" => Ok(SessionStatus::Timeout),
            "cancelled" => Ok(SessionStatus::Cancelled),
            other => Err(format!("unknown session status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamSession {
    pub id: Uuid,
    pub participant_id: String,
    pub exam_id: Uuid,
    pub status: SessionStatus,
    pub attempt_number: i32,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub score: Option<i32>,
    pub max_score: i32,
    /// Duration frozen at start; later exam edits do not move the deadline.
    pub duration_minutes: i32,
    pub questions_snapshot: Vec<Question>,
}

impl ExamSession {
    pub fn is_owned_by(&self, participant_id: &str) -> bool {
        self.participant_id == participant_id
    }

    pub fn question(&self, question_id: i32) -> Option<&Question> {
        self.questions_snapshot.iter().find(|q| q.id == question_id)
    }
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub participant_id: String,
    pub exam_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub max_score: i32,
    pub questions_snapshot: Vec<Question>,
}
