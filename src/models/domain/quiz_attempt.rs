use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::domain::quiz_question::AnswerValue;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct QuizAttempt {
    pub id: String,
    pub user_id: String,
    pub quiz_id: String,
    pub attempt_number: i32,
    pub status: QuizAttemptStatus,
    pub answers: BTreeMap<String, AnswerValue>,
    pub question_results: Vec<QuestionResult>,
    pub points_earned: i32,
    pub total_points: i32,
    pub score: f64,
    pub passing_score: i32,
    pub passed: bool,
    pub elapsed_seconds: Option<i64>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, Copy)]
#[serde(rename_all = "snake_case")]
pub enum QuizAttemptStatus {
    Graded,
    Expired, // Submitted after the time limit; counts as a failed attempt
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct QuestionResult {
    pub question_id: String,
    pub answered: bool,
    pub is_correct: bool,
    pub points_earned: i32,
    pub points_possible: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_attempt(passed: bool, points_earned: i32) -> QuizAttempt {
        QuizAttempt {
            id: "attempt-1".to_string(),
            user_id: "user-1".to_string(),
            quiz_id: "quiz-1".to_string(),
            attempt_number: 1,
            status: QuizAttemptStatus::Graded,
            answers: BTreeMap::from([("q-1".to_string(), AnswerValue::Text("a".to_string()))]),
            question_results: vec![QuestionResult {
                question_id: "q-1".to_string(),
                answered: true,
                is_correct: points_earned > 0,
                points_earned,
                points_possible: 1,
            }],
            points_earned,
            total_points: 1,
            score: f64::from(points_earned) * 100.0,
            passing_score: 70,
            passed,
            elapsed_seconds: Some(42),
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn quiz_attempt_round_trip_serialization_preserves_grading_fields() {
        let attempt = make_attempt(true, 1);

        let json = serde_json::to_string(&attempt).expect("attempt should serialize");
        let parsed: QuizAttempt = serde_json::from_str(&json).expect("attempt should deserialize");

        assert_eq!(parsed.points_earned, 1);
        assert_eq!(parsed.status, QuizAttemptStatus::Graded);
        assert!(parsed.passed);
        assert!(parsed.question_results[0].is_correct);
    }

    #[test]
    fn expired_status_serializes_in_snake_case() {
        let json = serde_json::to_string(&QuizAttemptStatus::Expired).expect("serialize");
        assert_eq!(json, "\"expired\"");
    }
}
