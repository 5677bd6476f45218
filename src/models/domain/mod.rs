pub mod certification;
pub mod course;
pub mod enrollment;
pub mod progress;
pub mod quiz;
pub mod quiz_attempt;
pub mod quiz_question;
pub mod task_progress;

pub use certification::{Certification, CertificationStatus, CertificationTrigger};
pub use course::{Course, CourseModule, Lesson};
pub use enrollment::{Enrollment, EnrollmentStatus, ProgressSnapshot};
pub use progress::{LessonProgress, ModuleProgress, ProgressStatus};
pub use quiz::Quiz;
pub use quiz_attempt::{QuizAttempt, QuizAttemptStatus};
pub use quiz_question::{AnswerValue, QuizQuestion, QuizQuestionType};
pub use task_progress::{TaskProgress, TaskProgressInput};
