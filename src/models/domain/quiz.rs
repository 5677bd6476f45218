use serde::{Deserialize, Serialize};

use crate::models::domain::quiz_question::QuizQuestion;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Quiz {
    pub id: String,
    pub course_id: String,
    pub module_id: String,
    pub lesson_id: Option<String>, // Set when the quiz closes out a single lesson
    pub title: String,
    pub passing_score: i32, // Percentage, 0..=100
    pub max_attempts: Option<i32>,
    pub time_limit_minutes: Option<i32>,
    pub is_required: bool,
    pub is_published: bool,
    pub questions: Vec<QuizQuestion>,
}

impl Quiz {
    /// Only required, published quizzes take part in gating and completion.
    pub fn is_gating(&self) -> bool {
        self.is_required && self.is_published
    }

    pub fn total_points(&self) -> i32 {
        self.questions.iter().map(|q| q.points.max(0)).sum()
    }

    pub fn time_limit_seconds(&self) -> Option<i64> {
        self.time_limit_minutes
            .filter(|minutes| *minutes > 0)
            .map(|minutes| i64::from(minutes) * 60)
    }
}

/// The first gating quiz attached to a module, if any.
pub fn gating_quiz<'a>(quizzes: &'a [Quiz], module_id: &str) -> Option<&'a Quiz> {
    quizzes
        .iter()
        .filter(|quiz| quiz.module_id == module_id && quiz.is_gating())
        .min_by(|a, b| a.id.cmp(&b.id))
}
