use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::domain::{
    certification::{Certification, CertificationStatus, CertificationTrigger},
    enrollment::EnrollmentStatus,
    progress::ProgressStatus,
    quiz_attempt::QuizAttempt,
    task_progress::TaskProgress,
};

/// Derived accessibility of a module; never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleAccess {
    pub module_id: String,
    pub accessible: bool,
    pub reason: Option<String>,
    pub required_module_id: Option<String>,
    pub required_quiz_id: Option<String>,
}

impl ModuleAccess {
    pub fn unlocked(module_id: &str) -> Self {
        ModuleAccess {
            module_id: module_id.to_string(),
            accessible: true,
            reason: None,
            required_module_id: None,
            required_quiz_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LessonView {
    pub lesson_id: String,
    pub title: String,
    pub order_index: i32,
    pub status: ProgressStatus,
    pub progress_percentage: i32,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_position_seconds: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleQuizView {
    pub quiz_id: String,
    pub title: String,
    pub passing_score: i32,
    pub passed: bool,
    pub best_score: Option<f64>,
    pub attempts_used: i32,
    pub max_attempts: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleProgressView {
    pub module_id: String,
    pub title: String,
    pub order_index: i32,
    pub access: ModuleAccess,
    pub status: ProgressStatus,
    pub progress_percentage: i32,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub time_spent_minutes: i32,
    pub lessons_completed: i32,
    pub total_lessons: i32,
    pub lessons: Vec<LessonView>,
    pub quiz: Option<ModuleQuizView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CertificationSummary {
    pub certification_id: String,
    pub certificate_number: String,
    pub status: CertificationStatus,
    pub trigger: CertificationTrigger,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&Certification> for CertificationSummary {
    fn from(cert: &Certification) -> Self {
        CertificationSummary {
            certification_id: cert.id.clone(),
            certificate_number: cert.certificate_number.clone(),
            status: cert.status,
            trigger: cert.trigger,
            issued_at: cert.issued_at,
            expires_at: cert.expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseProgressView {
    pub course_id: String,
    pub course_title: String,
    pub enrollment_status: EnrollmentStatus,
    pub modules_completed: i32,
    pub total_modules: i32,
    pub completion_percentage: i32,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub total_time_spent_minutes: i32,
    pub modules: Vec<ModuleProgressView>,
    pub task_progress: TaskProgress,
    pub certificate_downloadable: bool,
    pub certification: Option<CertificationSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CertificateEligibility {
    pub eligible: bool,
    pub reason: Option<String>,
    pub completion_percentage: i32,
    pub task_completion_percentage: f64,
    /// Titles of modules whose required quiz is still unpassed.
    pub failed_quizzes: Vec<String>,
    pub certification: Option<CertificationSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardCourse {
    pub course_id: String,
    pub course_title: String,
    pub enrollment_status: EnrollmentStatus,
    pub completion_percentage: i32,
    pub modules_completed: i32,
    pub total_modules: i32,
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// First accessible module not yet completed.
    pub next_module_id: Option<String>,
    pub certificate_downloadable: bool,
    pub certificate_status: Option<CertificationStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub user_id: String,
    pub total_courses: usize,
    pub completed_courses: usize,
    pub in_progress_courses: usize,
    pub certificates_issued: usize,
    pub courses: Vec<DashboardCourse>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CertificationStatistics {
    pub total: u64,
    pub pending: u64,
    pub issued: u64,
    pub revoked: u64,
}

/// Public answer to "is this certificate genuine".
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub valid: bool,
    pub reason: Option<String>,
    pub certificate_number: Option<String>,
    pub learner_name: Option<String>,
    pub course_title: Option<String>,
    pub status: Option<CertificationStatus>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl VerificationResult {
    pub fn not_found() -> Self {
        VerificationResult {
            valid: false,
            reason: Some("No certificate matches this verification code".to_string()),
            certificate_number: None,
            learner_name: None,
            course_title: None,
            status: None,
            issued_at: None,
            expires_at: None,
        }
    }
}

/// What a single progress event changed.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEventOutcome {
    pub course_id: String,
    pub module_id: Option<String>,
    pub module_completed: bool,
    pub course_completion_percentage: i32,
    pub course_completed: bool,
    pub certification_created: bool,
    pub certification: Option<CertificationSummary>,
    pub quiz_attempt: Option<QuizAttempt>,
}
