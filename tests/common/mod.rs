#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::RwLock;

use course_progress_engine::{
    config::Config,
    errors::{AppError, AppResult},
    models::domain::{
        course::{sort_modules, Course, CourseModule, Lesson},
        enrollment::{Enrollment, EnrollmentStatus},
        progress::{LessonProgress, ModuleProgress},
        quiz::Quiz,
        quiz_attempt::QuizAttempt,
        quiz_question::{AnswerValue, QuizQuestion, QuizQuestionType},
        Certification, CertificationStatus,
    },
    repositories::{
        CatalogRepository, CertificationRepository, EnrollmentRepository, ProgressRepository,
        QuizAttemptRepository,
    },
    services::{
        notification_service::{NotificationEvent, Notifier},
        CourseProgressService, ProgressDependencies,
    },
};

pub const COURSE_ID: &str = "course-rust";
pub const LEARNER: &str = "learner-1";
pub const REVIEWER: &str = "reviewer-1";

pub fn config() -> Config {
    Config {
        mongo_conn_string: SecretString::from("mongodb://localhost:27017".to_string()),
        mongo_db_name: "course-progress-test".to_string(),
        operation_timeout_ms: 5_000,
        max_conflict_retries: 20,
        conflict_backoff_ms: 1,
        certificate_validity_days: Some(365),
        certificate_number_prefix: "RUST".to_string(),
        task_unlock_threshold: 90.0,
        notification_webhook_url: None,
    }
}

#[derive(Default, Clone)]
pub struct InMemoryCatalog {
    pub courses: Vec<Course>,
    pub modules: Vec<CourseModule>,
    pub lessons: Vec<Lesson>,
    pub quizzes: Vec<Quiz>,
}

impl InMemoryCatalog {
    pub fn course(mut self, id: &str, title: &str) -> Self {
        self.courses.push(Course {
            id: id.to_string(),
            title: title.to_string(),
            is_published: true,
        });
        self
    }

    pub fn module(mut self, id: &str, title: &str, order_index: i32) -> Self {
        self.modules.push(CourseModule {
            id: id.to_string(),
            course_id: COURSE_ID.to_string(),
            title: title.to_string(),
            order_index,
            requires_previous_completion: true,
            is_published: true,
        });
        self
    }

    pub fn lesson(mut self, id: &str, module_id: &str, order_index: i32) -> Self {
        self.lessons.push(Lesson {
            id: id.to_string(),
            module_id: module_id.to_string(),
            title: format!("Lesson {}", id),
            order_index,
        });
        self
    }

    pub fn quiz(mut self, quiz: Quiz) -> Self {
        self.quizzes.push(quiz);
        self
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn find_course(&self, course_id: &str) -> AppResult<Option<Course>> {
        Ok(self.courses.iter().find(|c| c.id == course_id).cloned())
    }

    async fn list_modules(&self, course_id: &str) -> AppResult<Vec<CourseModule>> {
        let mut modules: Vec<_> = self
            .modules
            .iter()
            .filter(|m| m.course_id == course_id && m.is_published)
            .cloned()
            .collect();
        sort_modules(&mut modules);
        Ok(modules)
    }

    async fn find_module(&self, module_id: &str) -> AppResult<Option<CourseModule>> {
        Ok(self.modules.iter().find(|m| m.id == module_id).cloned())
    }

    async fn list_lessons(&self, module_id: &str) -> AppResult<Vec<Lesson>> {
        let mut lessons: Vec<_> = self
            .lessons
            .iter()
            .filter(|l| l.module_id == module_id)
            .cloned()
            .collect();
        lessons.sort_by(|a, b| a.order_index.cmp(&b.order_index).then_with(|| a.id.cmp(&b.id)));
        Ok(lessons)
    }

    async fn find_lesson(&self, lesson_id: &str) -> AppResult<Option<Lesson>> {
        Ok(self.lessons.iter().find(|l| l.id == lesson_id).cloned())
    }

    async fn list_quizzes(&self, course_id: &str) -> AppResult<Vec<Quiz>> {
        Ok(self
            .quizzes
            .iter()
            .filter(|q| q.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn find_quiz(&self, quiz_id: &str) -> AppResult<Option<Quiz>> {
        Ok(self.quizzes.iter().find(|q| q.id == quiz_id).cloned())
    }
}

/// Four true/false questions worth one point each; the correct answer is always `true`.
pub fn true_false_quiz(id: &str, module_id: &str, title: &str) -> Quiz {
    Quiz {
        id: id.to_string(),
        course_id: COURSE_ID.to_string(),
        module_id: module_id.to_string(),
        lesson_id: None,
        title: title.to_string(),
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

/// `correct` of the four answers right.
pub fn answers(correct: usize) -> std::collections::BTreeMap<String, AnswerValue> {
    (1..=4)
        .map(|n| (format!("q{}", n), AnswerValue::Flag(n <= correct)))
        .collect()
}

/// "Ownership" (two lessons, gated by quiz-a) followed by "Traits" (one lesson).
pub fn quiz_gated_course() -> InMemoryCatalog {
    InMemoryCatalog::default()
        .course(COURSE_ID, "Practical Rust")
        .module("m-a", "Ownership", 0)
        .module("m-b", "Traits", 1)
        .lesson("l-a1", "m-a", 0)
        .lesson("l-a2", "m-a", 1)
        .lesson("l-b1", "m-b", 0)
        .quiz(true_false_quiz("quiz-a", "m-a", "Ownership checkpoint"))
}

/// `count` modules of one lesson each, no quizzes.
pub fn linear_course(count: usize) -> InMemoryCatalog {
    (1..=count).fold(
        InMemoryCatalog::default().course(COURSE_ID, "Practical Rust"),
        |catalog, n| {
            catalog
                .module(&format!("m-{}", n), &format!("Module {}", n), n as i32)
                .lesson(&format!("l-{}", n), &format!("m-{}", n), 0)
        },
    )
}

type Key = (String, String);

#[derive(Default)]
pub struct InMemoryProgressRepository {
    modules: RwLock<HashMap<Key, ModuleProgress>>,
    lessons: RwLock<HashMap<Key, LessonProgress>>,
}

#[async_trait]
impl ProgressRepository for InMemoryProgressRepository {
    async fn find_module_progress(
        &self,
        user_id: &str,
        module_id: &str,
    ) -> AppResult<Option<ModuleProgress>> {
        let modules = self.modules.read().await;
        Ok(modules
            .get(&(user_id.to_string(), module_id.to_string()))
            .cloned())
    }

    async fn list_module_progress(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> AppResult<Vec<ModuleProgress>> {
        let modules = self.modules.read().await;
        Ok(modules
            .values()
            .filter(|p| p.user_id == user_id && p.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn insert_module_progress(&self, progress: ModuleProgress) -> AppResult<ModuleProgress> {
        let mut modules = self.modules.write().await;
        let key = (progress.user_id.clone(), progress.module_id.clone());
        if modules.contains_key(&key) {
            return Err(AppError::AlreadyExists(format!(
                "Module progress for '{}' already exists",
                progress.module_id
            )));
        }
        modules.insert(key, progress.clone());
        Ok(progress)
    }

    async fn update_module_progress(&self, progress: ModuleProgress) -> AppResult<ModuleProgress> {
        let mut modules = self.modules.write().await;
        let key = (progress.user_id.clone(), progress.module_id.clone());
        let stored_version = modules.get(&key).map(|p| p.version);
        if stored_version != Some(progress.version) {
            return Err(AppError::ConflictRetryable(format!(
                "Module progress '{}' changed since version {}",
                progress.id, progress.version
            )));
        }
        let mut next = progress;
        next.version += 1;
        modules.insert(key, next.clone());
        Ok(next)
    }

    async fn find_lesson_progress(
        &self,
        user_id: &str,
        lesson_id: &str,
    ) -> AppResult<Option<LessonProgress>> {
        let lessons = self.lessons.read().await;
        Ok(lessons
            .get(&(user_id.to_string(), lesson_id.to_string()))
            .cloned())
    }

    async fn list_lesson_progress_for_module(
        &self,
        user_id: &str,
        module_id: &str,
    ) -> AppResult<Vec<LessonProgress>> {
        let lessons = self.lessons.read().await;
        Ok(lessons
            .values()
            .filter(|p| p.user_id == user_id && p.module_id == module_id)
            .cloned()
            .collect())
    }

    async fn list_lesson_progress(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> AppResult<Vec<LessonProgress>> {
        let lessons = self.lessons.read().await;
        Ok(lessons
            .values()
            .filter(|p| p.user_id == user_id && p.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn insert_lesson_progress(&self, progress: LessonProgress) -> AppResult<LessonProgress> {
        let mut lessons = self.lessons.write().await;
        let key = (progress.user_id.clone(), progress.lesson_id.clone());
        if lessons.contains_key(&key) {
            return Err(AppError::AlreadyExists(format!(
                "Lesson progress for '{}' already exists",
                progress.lesson_id
            )));
        }
        lessons.insert(key, progress.clone());
        Ok(progress)
    }

    async fn update_lesson_progress(&self, progress: LessonProgress) -> AppResult<LessonProgress> {
        let mut lessons = self.lessons.write().await;
        let key = (progress.user_id.clone(), progress.lesson_id.clone());
        let stored_version = lessons.get(&key).map(|p| p.version);
        if stored_version != Some(progress.version) {
            return Err(AppError::ConflictRetryable(format!(
                "Lesson progress '{}' changed since version {}",
                progress.id, progress.version
            )));
        }
        let mut next = progress;
        next.version += 1;
        lessons.insert(key, next.clone());
        Ok(next)
    }
}

#[derive(Default)]
pub struct InMemoryQuizAttemptRepository {
    attempts: RwLock<Vec<QuizAttempt>>,
}

#[async_trait]
impl QuizAttemptRepository for InMemoryQuizAttemptRepository {
    async fn create(&self, attempt: QuizAttempt) -> AppResult<QuizAttempt> {
        let mut attempts = self.attempts.write().await;
        let taken = attempts.iter().any(|a| {
            a.quiz_id == attempt.quiz_id
                && a.user_id == attempt.user_id
                && a.attempt_number == attempt.attempt_number
        });
        if taken {
            return Err(AppError::AlreadyExists(format!(
                "Attempt {} on quiz '{}' already exists",
                attempt.attempt_number, attempt.quiz_id
            )));
        }
        attempts.push(attempt.clone());
        Ok(attempt)
    }

    async fn find_by_user_and_quiz(
        &self,
        user_id: &str,
        quiz_id: &str,
    ) -> AppResult<Vec<QuizAttempt>> {
        let attempts = self.attempts.read().await;
        let mut items: Vec<_> = attempts
            .iter()
            .filter(|a| a.user_id == user_id && a.quiz_id == quiz_id)
            .cloned()
            .collect();
        items.sort_by_key(|a| a.attempt_number);
        Ok(items)
    }

    async fn find_by_user_and_quizzes(
        &self,
        user_id: &str,
        quiz_ids: &[String],
    ) -> AppResult<Vec<QuizAttempt>> {
        let attempts = self.attempts.read().await;
        Ok(attempts
            .iter()
            .filter(|a| a.user_id == user_id && quiz_ids.contains(&a.quiz_id))
            .cloned()
            .collect())
    }

    async fn count_user_attempts(&self, user_id: &str, quiz_id: &str) -> AppResult<usize> {
        Ok(self.find_by_user_and_quiz(user_id, quiz_id).await?.len())
    }

    async fn has_passed(&self, user_id: &str, quiz_id: &str) -> AppResult<bool> {
        Ok(self
            .find_by_user_and_quiz(user_id, quiz_id)
            .await?
            .iter()
            .any(|a| a.passed))
    }
}

#[derive(Default)]
pub struct InMemoryEnrollmentRepository {
    enrollments: RwLock<HashMap<Key, Enrollment>>,
    /// Number of upcoming `update` calls to fail with a write conflict.
    pub conflicts_to_inject: AtomicU32,
}

impl InMemoryEnrollmentRepository {
    pub async fn get(&self, user_id: &str, course_id: &str) -> Option<Enrollment> {
        self.enrollments
            .read()
            .await
            .get(&(user_id.to_string(), course_id.to_string()))
            .cloned()
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryEnrollmentRepository {
    async fn find_by_user_and_course(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> AppResult<Option<Enrollment>> {
        Ok(self.get(user_id, course_id).await)
    }

    async fn list_by_user(&self, user_id: &str) -> AppResult<Vec<Enrollment>> {
        let enrollments = self.enrollments.read().await;
        let mut items: Vec<_> = enrollments
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.course_id.cmp(&b.course_id));
        Ok(items)
    }

    async fn create(&self, enrollment: Enrollment) -> AppResult<Enrollment> {
        let mut enrollments = self.enrollments.write().await;
        let key = (enrollment.user_id.clone(), enrollment.course_id.clone());
        if enrollments.contains_key(&key) {
            return Err(AppError::AlreadyExists(format!(
                "User '{}' is already enrolled in '{}'",
                enrollment.user_id, enrollment.course_id
            )));
        }
        enrollments.insert(key, enrollment.clone());
        Ok(enrollment)
    }

    async fn update(&self, enrollment: Enrollment) -> AppResult<Enrollment> {
        let injected = self
            .conflicts_to_inject
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(AppError::ConflictRetryable(format!(
                "Enrollment '{}' changed concurrently",
                enrollment.id
            )));
        }

        let mut enrollments = self.enrollments.write().await;
        let key = (enrollment.user_id.clone(), enrollment.course_id.clone());
        let stored_version = enrollments.get(&key).map(|e| e.version);
        if stored_version != Some(enrollment.version) {
            return Err(AppError::ConflictRetryable(format!(
                "Enrollment '{}' changed since version {}",
                enrollment.id, enrollment.version
            )));
        }
        let mut next = enrollment;
        next.version += 1;
        enrollments.insert(key, next.clone());
        Ok(next)
    }
}

#[derive(Default)]
pub struct InMemoryCertificationRepository {
    certifications: RwLock<HashMap<String, Certification>>,
}

impl InMemoryCertificationRepository {
    pub async fn all(&self) -> Vec<Certification> {
        self.certifications.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl CertificationRepository for InMemoryCertificationRepository {
    async fn find_by_id(&self, id: &str) -> AppResult<Option<Certification>> {
        Ok(self.certifications.read().await.get(id).cloned())
    }

    async fn find_by_user_and_course(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> AppResult<Option<Certification>> {
        let certifications = self.certifications.read().await;
        Ok(certifications
            .values()
            .find(|c| c.user_id == user_id && c.course_id == course_id)
            .cloned())
    }

    async fn find_by_verification_code(&self, code: &str) -> AppResult<Option<Certification>> {
        let certifications = self.certifications.read().await;
        Ok(certifications
            .values()
            .find(|c| c.verification_code == code)
            .cloned())
    }

    async fn create(&self, certification: Certification) -> AppResult<Certification> {
        let mut certifications = self.certifications.write().await;
        let duplicate = certifications.values().any(|c| {
            (c.user_id == certification.user_id && c.course_id == certification.course_id)
                || c.verification_code == certification.verification_code
        });
        if duplicate {
            return Err(AppError::AlreadyExists(format!(
                "Certification for user '{}' in course '{}' already exists",
                certification.user_id, certification.course_id
            )));
        }
        certifications.insert(certification.id.clone(), certification.clone());
        Ok(certification)
    }

    async fn update(&self, certification: Certification) -> AppResult<Certification> {
        let mut certifications = self.certifications.write().await;
        let stored_version = certifications.get(&certification.id).map(|c| c.version);
        if stored_version != Some(certification.version) {
            return Err(AppError::ConflictRetryable(format!(
                "Certification '{}' changed since version {}",
                certification.id, certification.version
            )));
        }
        let mut next = certification;
        next.version += 1;
        certifications.insert(next.id.clone(), next.clone());
        Ok(next)
    }

    async fn list_by_user(&self, user_id: &str) -> AppResult<Vec<Certification>> {
        let certifications = self.certifications.read().await;
        Ok(certifications
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn count_by_status(&self, status: Option<CertificationStatus>) -> AppResult<u64> {
        let certifications = self.certifications.read().await;
        Ok(certifications
            .values()
            .filter(|c| status.map(|s| c.status == s).unwrap_or(true))
            .count() as u64)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingNotifier {
    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .map(|events| events.iter().map(NotificationEvent::name).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: NotificationEvent) -> AppResult<()> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
        Ok(())
    }
}

pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, event: NotificationEvent) -> AppResult<()> {
        Err(AppError::InternalError(format!(
            "mail relay refused {}",
            event.name()
        )))
    }
}

/// Lets spawned notification tasks run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

pub struct Harness {
    pub service: CourseProgressService,
    pub catalog: Arc<InMemoryCatalog>,
    pub progress: Arc<InMemoryProgressRepository>,
    pub attempts: Arc<InMemoryQuizAttemptRepository>,
    pub enrollments: Arc<InMemoryEnrollmentRepository>,
    pub certifications: Arc<InMemoryCertificationRepository>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(catalog: InMemoryCatalog) -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        Self::with_notifier(catalog, notifier.clone(), notifier)
    }

    pub fn with_notifier(
        catalog: InMemoryCatalog,
        active_notifier: Arc<dyn Notifier>,
        recorder: Arc<RecordingNotifier>,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let progress = Arc::new(InMemoryProgressRepository::default());
        let attempts = Arc::new(InMemoryQuizAttemptRepository::default());
        let enrollments = Arc::new(InMemoryEnrollmentRepository::default());
        let certifications = Arc::new(InMemoryCertificationRepository::default());

        let service = CourseProgressService::new(
            ProgressDependencies {
                catalog: catalog.clone(),
                progress: progress.clone(),
                attempts: attempts.clone(),
                enrollments: enrollments.clone(),
                certifications: certifications.clone(),
                notifier: active_notifier,
            },
            &config(),
        );

        Self {
            service,
            catalog,
            progress,
            attempts,
            enrollments,
            certifications,
            notifier: recorder,
        }
    }

    /// Enrolls the default learner through the service.
    pub async fn enroll(&self) -> Enrollment {
        self.service
            .enroll(course_progress_engine::models::dto::request::EnrollRequest {
                user_id: LEARNER.to_string(),
                course_id: COURSE_ID.to_string(),
                learner_name: "Ada Learner".to_string(),
            })
            .await
            .expect("enroll learner")
    }

    /// Seeds an enrollment directly, bypassing the service.
    pub async fn seed_enrollment(&self, status: EnrollmentStatus) -> Enrollment {
        let enrollment = Enrollment::new(LEARNER, COURSE_ID, "Practical Rust", "Ada Learner", status);
        self.enrollments
            .create(enrollment)
            .await
            .expect("seed enrollment")
    }

    pub async fn enrollment(&self) -> Enrollment {
        self.enrollments
            .get(LEARNER, COURSE_ID)
            .await
            .expect("learner is enrolled")
    }
}
