use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::domain::task_progress::TaskProgress;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    Pending,
    #[serde(alias = "SUCCESS")]
    Active,
    Completed,
}

impl EnrollmentStatus {
    /// Pending enrollments have not cleared payment and cannot make progress.
    pub fn grants_access(&self) -> bool {
        matches!(self, EnrollmentStatus::Active | EnrollmentStatus::Completed)
    }
}

/// Aggregate progress written by the course recomputation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProgressSnapshot {
    pub modules_completed: i32,
    pub total_modules: i32,
    pub completion_percentage: i32,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl ProgressSnapshot {
    pub fn is_complete(&self) -> bool {
        self.total_modules > 0 && self.completion_percentage >= 100
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Enrollment {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub course_title: String,
    pub learner_name: String,
    pub status: EnrollmentStatus,
    pub progress: ProgressSnapshot,
    pub task_progress: TaskProgress,
    pub certificate_downloadable: bool,
    pub certificate_unlocked_at: Option<DateTime<Utc>>,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl Enrollment {
    pub fn new(
        user_id: &str,
        course_id: &str,
        course_title: &str,
        learner_name: &str,
        status: EnrollmentStatus,
    ) -> Self {
        let now = Utc::now();
        Enrollment {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            course_title: course_title.to_string(),
            learner_name: learner_name.to_string(),
            status,
            progress: ProgressSnapshot::default(),
            task_progress: TaskProgress::default(),
            certificate_downloadable: false,
            certificate_unlocked_at: None,
            enrolled_at: now,
            completed_at: None,
            version: 0,
            updated_at: now,
        }
    }
}
