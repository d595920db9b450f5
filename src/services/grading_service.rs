use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::answer::Answer;
use crate::models::question::Question;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GradedAnswer {
    pub question_id: i32,
    pub question_text: String,
    pub selected_option: Option<i32>,
    pub candidate_answer: Option<String>,
    pub correct_answer: i32,
    pub correct_answer_text: Option<String>,
    pub is_correct: bool,
    pub points_earned: i32,
    pub max_points: i32,
    pub answered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeReport {
    pub earned_points: i32,
    pub max_points: i32,
    pub graded: Vec<GradedAnswer>,
}

pub fn percentage(earned: i32, max: i32) -> f64 {
    if max > 0 {
        (earned as f64 / max as f64) * 100.0
    } else {
        0.0
    }
}

pub struct GradingService;

impl GradingService {
    pub fn grade(questions: &[Question], answers: &[Answer]) -> GradeReport {
        let mut earned_points = 0;
        let mut max_points = 0;
        let mut graded = Vec::with_capacity(questions.len());

        for q in questions {
            max_points += q.default_score;
            let answer = answers.iter().find(|a| a.question_id == q.id);
            let selected = answer.and_then(|a| a.selected_option);
            let is_correct = q.is_correct(selected);
            let points_earned = if is_correct { q.default_score } else { 0 };
            earned_points += points_earned;

            graded.push(GradedAnswer {
                question_id: q.id,
                question_text: q.content.clone(),
                selected_option: selected,
                candidate_answer: selected
                    .and_then(|idx| usize::try_from(idx).ok())
                    .and_then(|idx| q.options.get(idx).cloned()),
                correct_answer: q.correct_answer,
                correct_answer_text: usize::try_from(q.correct_answer)
                    .ok()
                    .and_then(|idx| q.options.get(idx).cloned()),
                is_correct,
                points_earned,
                max_points: q.default_score,
                answered_at: answer.map(|a| a.answered_at),
            });
        }

        GradeReport {
            earned_points,
            max_points,
            graded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn question(id: i32, correct: i32, score: i32) -> Question {
        Question {
            id,
            content: format!("Q{}", id),
            options: vec!["a".into(), "b".into(), "c".into()],
            correct_answer: correct,
            default_score: score,
        }
    }

    fn answer(question_id: i32, selected: Option<i32>) -> Answer {
        Answer {
            session_id: Uuid::nil(),
            question_id,
            selected_option: selected,
            answered_at: Utc::now(),
        }
    }

    #[test]
    fn grades_only_matching_options() {
        let questions = vec![question(1, 0, 2), question(2, 2, 3), question(3, 1, 5)];
        let answers = vec![answer(1, Some(0)), answer(2, Some(1)), answer(3, None)];

        let report = GradingService::grade(&questions, &answers);
        assert_eq!(report.earned_points, 2);
        assert_eq!(report.max_points, 10);
        assert!(report.graded[0].is_correct);
        assert_eq!(report.graded[0].candidate_answer.as_deref(), Some("a"));
        assert!(!report.graded[1].is_correct);
        assert_eq!(report.graded[2].selected_option, None);
        assert!((percentage(report.earned_points, report.max_points) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ignores_answers_outside_snapshot() {
        let questions = vec![question(1, 0, 1)];
        let answers = vec![answer(99, Some(0))];
        let report = GradingService::grade(&questions, &answers);
        assert_eq!(report.earned_points, 0);
        assert_eq!(report.graded.len(), 1);
    }

    #[test]
    fn empty_exam_has_zero_percentage() {
        let report = GradingService::grade(&[], &[]);
        assert_eq!(percentage(report.earned_points, report.max_points), 0.0);
    }
}
