use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::models::domain::{quiz_question::AnswerValue, task_progress::TaskProgressInput};

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct LessonProgressDelta {
    #[validate(range(min = 0, max = 100))]
    pub progress_percentage: Option<i32>,

    pub is_completed: Option<bool>,

    /// Added to the running total, not a replacement.
    #[validate(range(min = 0, max = 1440))]
    pub time_spent_minutes: Option<i32>,

    #[validate(range(min = 0))]
    pub last_position_seconds: Option<i32>,

    #[validate(length(max = 5000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ModuleProgressDelta {
    #[validate(range(min = 0, max = 100))]
    pub progress_percentage: Option<i32>,

    pub is_completed: Option<bool>,

    #[validate(range(min = 0, max = 1440))]
    pub time_spent_minutes: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SubmitQuizAttemptInput {
    /// Question id to answer; missing questions grade as incorrect.
    pub answers: BTreeMap<String, AnswerValue>,

    /// Reported by the client; compared with the quiz time limit.
    #[validate(range(min = 0))]
    pub elapsed_seconds: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct TaskValidationInput {
    #[validate(range(min = 0, max = 10000))]
    pub total_tasks: Option<i32>,

    #[validate(range(min = 0, max = 10000))]
    pub completed_tasks: Option<i32>,

    #[validate(range(min = 0.0, max = 100.0))]
    pub completion_percentage: Option<f64>,

    pub validated: Option<bool>,

    #[validate(length(max = 2000))]
    pub manual_notes: Option<String>,
}

impl From<TaskValidationInput> for TaskProgressInput {
    fn from(input: TaskValidationInput) -> Self {
        TaskProgressInput {
            total_tasks: input.total_tasks,
            completed_tasks: input.completed_tasks,
            completion_percentage: input.completion_percentage,
            validated: input.validated,
            manual_notes: input.manual_notes,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EnrollRequest {
    #[validate(length(min = 1, max = 100))]
    pub user_id: String,

    #[validate(length(min = 1, max = 100))]
    pub course_id: String,

    #[validate(length(min = 1, max = 200))]
    pub learner_name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct IssueCertificateRequest {
    /// Overrides the configured validity window.
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RevokeCertificateRequest {
    #[validate(length(min = 1, max = 1000))]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct AnnotateCertificateRequest {
    #[validate(length(max = 5000))]
    pub reviewer_notes: Option<String>,

    pub metadata: Option<serde_json::Value>,
}

/// Every write into the engine arrives as one of these.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    LessonProgress {
        lesson_id: String,
        delta: LessonProgressDelta,
    },
    ModuleProgress {
        module_id: String,
        delta: ModuleProgressDelta,
    },
    CompleteModule {
        module_id: String,
    },
    QuizSubmission {
        quiz_id: String,
        input: SubmitQuizAttemptInput,
    },
    TaskValidation {
        course_id: String,
        reviewer_id: String,
        input: TaskValidationInput,
    },
}

impl ProgressEvent {
    pub fn validate_payload(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            ProgressEvent::LessonProgress { delta, .. } => delta.validate(),
            ProgressEvent::ModuleProgress { delta, .. } => delta.validate(),
            ProgressEvent::CompleteModule { .. } => Ok(()),
            ProgressEvent::QuizSubmission { input, .. } => input.validate(),
            ProgressEvent::TaskValidation { input, .. } => input.validate(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::LessonProgress { .. } => "lesson_progress",
            ProgressEvent::ModuleProgress { .. } => "module_progress",
            ProgressEvent::CompleteModule { .. } => "complete_module",
            ProgressEvent::QuizSubmission { .. } => "quiz_submission",
            ProgressEvent::TaskValidation { .. } => "task_validation",
        }
    }
}
