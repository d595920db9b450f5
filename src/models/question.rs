use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i32,
    pub content: String,
    pub options: Vec<String>,
    pub correct_answer: i32,
    #[serde(default = "default_score")]
    pub default_score: i32,
}

fn default_score() -> i32 {
    1
}

impl Question {
    pub fn has_option(&self, option: i32) -> bool {
        option >= 0 && (option as usize) < self.options.len()
    }

    pub fn is_correct(&self, selected: Option<i32>) -> bool {
        selected == Some(self.correct_answer)
    }
}

/// Participant-facing projection of a [`Question`]; never carries the correct answer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuestionView {
    pub id: i32,
    pub content: String,
    pub options: Vec<String>,
    pub default_score: i32,
}

impl From<&Question> for QuestionView {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            content: q.content.clone(),
            options: q.options.clone(),
            default_score: q.default_score,
        }
    }
}
