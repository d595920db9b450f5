use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::question::Question;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exam {
    pub id: Uuid,
    pub title: String,
    pub duration_minutes: i32,
    /// Number of attempts a participant may start; `None` means unlimited.
    pub max_attempts: Option<i32>,
    pub is_active: bool,
    pub questions: Vec<Question>,
}

impl Exam {
    pub fn max_score(&self) -> i32 {
        self.questions.iter().map(|q| q.default_score).sum()
    }

    pub fn allows_attempt(&self, attempt_number: i64) -> bool {
        match self.max_attempts {
            Some(max) => attempt_number <= max as i64,
            None => true,
        }
    }
}
