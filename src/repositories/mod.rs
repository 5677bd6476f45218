pub mod catalog_repository;
pub mod certification_repository;
pub mod enrollment_repository;
pub mod progress_repository;
pub mod quiz_attempt_repository;

pub use catalog_repository::{CatalogRepository, MongoCatalogRepository};
pub use certification_repository::{CertificationRepository, MongoCertificationRepository};
pub use enrollment_repository::{EnrollmentRepository, MongoEnrollmentRepository};
pub use progress_repository::{MongoProgressRepository, ProgressRepository};
pub use quiz_attempt_repository::{MongoQuizAttemptRepository, QuizAttemptRepository};
