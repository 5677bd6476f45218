#[cfg(test)]
pub mod fixtures {
    use crate::models::domain::{
        course::{Course, CourseModule, Lesson},
        enrollment::{Enrollment, EnrollmentStatus},
        quiz::Quiz,
        quiz_question::{AnswerValue, QuizQuestion, QuizQuestionType},
    };

    pub const COURSE_ID: &str = "course-rust";
    pub const USER_ID: &str = "learner-1";

    pub fn course() -> Course {
        Course {
            id: COURSE_ID.to_string(),
            title: "Practical Rust".to_string(),
            is_published: true,
        }
    }

    /// Module gated on its predecessor.
    pub fn module(id: &str, title: &str, order_index: i32) -> CourseModule {
        CourseModule {
            id: id.to_string(),
            course_id: COURSE_ID.to_string(),
            title: title.to_string(),
            order_index,
            requires_previous_completion: true,
            is_published: true,
        }
    }

    pub fn lesson(id: &str, module_id: &str, order_index: i32) -> Lesson {
        Lesson {
            id: id.to_string(),
            module_id: module_id.to_string(),
            title: format!("Lesson {}", id),
            order_index,
        }
    }

    /// Required quiz of four true/false questions worth one point each, all `true`.
    pub fn gating_quiz(id: &str, module_id: &str) -> Quiz {
        Quiz {
            id: id.to_string(),
            course_id: COURSE_ID.to_string(),
            module_id: module_id.to_string(),
            lesson_id: None,
            title: format!("Checkpoint {}", module_id),
            passing_score: 70,
            max_attempts: None,
            time_limit_minutes: None,
            is_required: true,
            is_published: true,
            questions: (1..=4)
                .map(|n| QuizQuestion {
                    id: format!("q{}", n),
                    prompt: format!("Statement {}", n),
                    question_type: QuizQuestionType::TrueFalse,
                    correct_answer: AnswerValue::Flag(true),
                    points: 1,
                    order_index: n,
                })
                .collect(),
        }
    }

    pub fn active_enrollment() -> Enrollment {
        Enrollment::new(
            USER_ID,
            COURSE_ID,
            "Practical Rust",
            "Ada Learner",
            EnrollmentStatus::Active,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;

    #[test]
    fn test_fixtures_gating_quiz() {
        let quiz = gating_quiz("quiz-a", "m-a");
        assert!(quiz.is_gating());
        assert_eq!(quiz.total_points(), 4);
    }

    #[test]
    fn test_fixtures_active_enrollment() {
        let enrollment = active_enrollment();
        assert!(enrollment.status.grants_access());
        assert_eq!(enrollment.course_id, COURSE_ID);
    }
}
