pub mod certification_issuer;
pub mod course_progress_service;
pub mod notification_service;
pub mod progress_aggregator;
pub mod quiz_grader;
pub mod retry;
pub mod unlock_gate;

pub use course_progress_service::{CourseProgressService, ProgressDependencies};
