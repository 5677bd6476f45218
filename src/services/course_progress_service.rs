use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use chrono::Utc;
use validator::Validate;

use crate::{
    config::Config,
    errors::{AppError, AppResult},
    models::{
        domain::{
            certification::{Certification, CertificationStatus, CertificationTrigger},
            course::{CourseModule, Lesson},
            enrollment::{Enrollment, EnrollmentStatus},
            progress::{LessonProgress, ModuleProgress, ProgressStatus},
            quiz::{gating_quiz, Quiz},
            quiz_attempt::QuizAttempt,
            task_progress::{TaskProgress, TaskProgressInput},
        },
        dto::{
            request::{
                AnnotateCertificateRequest, EnrollRequest, IssueCertificateRequest,
                LessonProgressDelta, ModuleProgressDelta, ProgressEvent, RevokeCertificateRequest,
                SubmitQuizAttemptInput, TaskValidationInput,
            },
            response::{
                CertificateEligibility, CertificationStatistics, CertificationSummary,
                CourseProgressView, DashboardCourse, DashboardView, LessonView, ModuleAccess,
                ModuleProgressView, ModuleQuizView, ProgressEventOutcome, VerificationResult,
            },
        },
    },
    repositories::{
        CatalogRepository, CertificationRepository, EnrollmentRepository, ProgressRepository,
        QuizAttemptRepository,
    },
    services::{
        certification_issuer::{CertificationIssuer, IssuanceOutcome},
        notification_service::{dispatch, NotificationEvent, Notifier},
        progress_aggregator::{build_snapshot, CourseRecompute, ProgressAggregator},
        quiz_grader::QuizGrader,
        retry::RetryPolicy,
        unlock_gate::{self, GateContext},
    },
};

/// Storage and side channels the service is built from.
pub struct ProgressDependencies {
    pub catalog: Arc<dyn CatalogRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub attempts: Arc<dyn QuizAttemptRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub certifications: Arc<dyn CertificationRepository>,
    pub notifier: Arc<dyn Notifier>,
}

/// Per-learner view of one course that the gate and the read models share.
struct CourseState {
    modules: Vec<CourseModule>,
    progress: HashMap<String, ModuleProgress>,
    quizzes: Vec<Quiz>,
    attempts: Vec<QuizAttempt>,
    passed_quizzes: HashSet<String>,
}

impl CourseState {
    fn gate(&self) -> GateContext<'_> {
        GateContext {
            modules: &self.modules,
            progress: &self.progress,
            quizzes: &self.quizzes,
            passed_quizzes: &self.passed_quizzes,
        }
    }

    fn progress_rows(&self) -> Vec<ModuleProgress> {
        self.progress.values().cloned().collect()
    }

    fn attempts_for(&self, quiz_id: &str) -> Vec<&QuizAttempt> {
        self.attempts
            .iter()
            .filter(|attempt| attempt.quiz_id == quiz_id)
            .collect()
    }
}

/// Entry point for everything a transport layer needs: reads are always
/// computed fresh, writes all go through `apply_progress_event`.
#[derive(Clone)]
pub struct CourseProgressService {
    catalog: Arc<dyn CatalogRepository>,
    progress: Arc<dyn ProgressRepository>,
    attempts: Arc<dyn QuizAttemptRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    issuer: Arc<CertificationIssuer>,
    aggregator: Arc<ProgressAggregator>,
    grader: Arc<QuizGrader>,
    notifier: Arc<dyn Notifier>,
    policy: RetryPolicy,
    task_unlock_threshold: f64,
}

impl CourseProgressService {
    pub fn new(deps: ProgressDependencies, config: &Config) -> Self {
        let issuer = Arc::new(CertificationIssuer::new(
            deps.certifications,
            deps.notifier.clone(),
            config.certificate_number_prefix.clone(),
            config.certificate_validity_days,
        ));
        let aggregator = Arc::new(ProgressAggregator::new(
            deps.catalog.clone(),
            deps.progress.clone(),
            deps.attempts.clone(),
            deps.enrollments.clone(),
            issuer.clone(),
        ));
        let grader = Arc::new(QuizGrader::new(deps.attempts.clone()));

        Self {
            catalog: deps.catalog,
            progress: deps.progress,
            attempts: deps.attempts,
            enrollments: deps.enrollments,
            issuer,
            aggregator,
            grader,
            notifier: deps.notifier,
            policy: RetryPolicy::from_config(config),
            task_unlock_threshold: config.task_unlock_threshold,
        }
    }

    /// Same service with a different per-operation deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.policy = self.policy.with_timeout(timeout);
        self
    }

    pub async fn get_course_progress(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> AppResult<CourseProgressView> {
        self.policy
            .deadline("get_course_progress", async {
                let course = self
                    .catalog
                    .find_course(course_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Course '{}' not found", course_id)))?;
                let enrollment = self.find_enrollment(user_id, course_id).await?;
                let state = self.load_course_state(user_id, course_id).await?;

                let lesson_rows = self.progress.list_lesson_progress(user_id, course_id).await?;
                let lesson_progress: HashMap<&str, &LessonProgress> = lesson_rows
                    .iter()
                    .map(|p| (p.lesson_id.as_str(), p))
                    .collect();

                let accesses = unlock_gate::evaluate_all(&state.gate());
                let mut modules = Vec::with_capacity(state.modules.len());
                for (module, access) in state.modules.iter().zip(accesses) {
                    let lessons = self.catalog.list_lessons(&module.id).await?;
                    modules.push(module_view(module, access, &lessons, &lesson_progress, &state));
                }

                let snapshot = build_snapshot(&state.modules, &state.progress_rows());
                let total_time_spent_minutes = state
                    .progress
                    .values()
                    .map(|p| p.time_spent_minutes)
                    .chain(lesson_rows.iter().map(|p| p.time_spent_minutes))
                    .sum();
                let certification = self.issuer.find_for_course(user_id, course_id).await?;

                Ok(CourseProgressView {
                    course_id: course.id,
                    course_title: course.title,
                    enrollment_status: enrollment.status,
                    modules_completed: snapshot.modules_completed,
                    total_modules: snapshot.total_modules,
                    completion_percentage: snapshot.completion_percentage,
                    last_accessed_at: snapshot.last_accessed_at,
                    total_time_spent_minutes,
                    modules,
                    task_progress: enrollment.task_progress,
                    certificate_downloadable: enrollment.certificate_downloadable,
                    certification: certification.as_ref().map(CertificationSummary::from),
                })
            })
            .await
    }

    pub async fn check_module_access(
        &self,
        user_id: &str,
        module_id: &str,
    ) -> AppResult<ModuleAccess> {
        self.policy
            .deadline("check_module_access", async {
                let module = self.require_module(module_id).await?;
                self.require_active_enrollment(user_id, &module.course_id)
                    .await?;
                self.module_access(user_id, &module).await
            })
            .await
    }

    pub async fn can_request_certificate(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> AppResult<CertificateEligibility> {
        self.policy
            .deadline("can_request_certificate", async {
                let enrollment = self.require_active_enrollment(user_id, course_id).await?;
                let state = self.load_course_state(user_id, course_id).await?;
                let snapshot = build_snapshot(&state.modules, &state.progress_rows());

                let failed_quizzes: Vec<String> = state
                    .modules
                    .iter()
                    .filter(|module| {
                        gating_quiz(&state.quizzes, &module.id)
                            .map(|quiz| !state.passed_quizzes.contains(&quiz.id))
                            .unwrap_or(false)
                    })
                    .map(|module| module.title.clone())
                    .collect();
                let certification = self.issuer.find_for_course(user_id, course_id).await?;
                let tasks_unlock = enrollment
                    .task_progress
                    .unlocks_certificate(self.task_unlock_threshold);

                let reason = match &certification {
                    Some(cert) if cert.status == CertificationStatus::Revoked => {
                        Some("Certification for this course was revoked".to_string())
                    }
                    _ if tasks_unlock => None,
                    _ if !snapshot.is_complete() => Some("Not all modules completed".to_string()),
                    _ if !failed_quizzes.is_empty() => {
                        Some("Some required quizzes not passed".to_string())
                    }
                    _ => None,
                };

                Ok(CertificateEligibility {
                    eligible: reason.is_none(),
                    reason,
                    completion_percentage: snapshot.completion_percentage,
                    task_completion_percentage: enrollment.task_progress.completion_percentage,
                    failed_quizzes,
                    certification: certification.as_ref().map(CertificationSummary::from),
                })
            })
            .await
    }

    pub async fn get_dashboard(&self, user_id: &str) -> AppResult<DashboardView> {
        self.policy
            .deadline("get_dashboard", async {
                let enrollments = self.enrollments.list_by_user(user_id).await?;
                let certifications = self.issuer.list_for_user(user_id).await?;
                let certificate_status: HashMap<&str, CertificationStatus> = certifications
                    .iter()
                    .map(|cert| (cert.course_id.as_str(), cert.status))
                    .collect();

                let mut courses = Vec::with_capacity(enrollments.len());
                for enrollment in &enrollments {
                    let state = self
                        .load_course_state(user_id, &enrollment.course_id)
                        .await?;
                    let snapshot = build_snapshot(&state.modules, &state.progress_rows());
                    let next_module_id = unlock_gate::evaluate_all(&state.gate())
                        .into_iter()
                        .find(|access| {
                            access.accessible
                                && !state
                                    .progress
                                    .get(&access.module_id)
                                    .map(|p| p.is_completed)
                                    .unwrap_or(false)
                        })
                        .map(|access| access.module_id);

                    courses.push(DashboardCourse {
                        course_id: enrollment.course_id.clone(),
                        course_title: enrollment.course_title.clone(),
                        enrollment_status: enrollment.status,
                        completion_percentage: snapshot.completion_percentage,
                        modules_completed: snapshot.modules_completed,
                        total_modules: snapshot.total_modules,
                        last_accessed_at: snapshot.last_accessed_at,
                        next_module_id,
                        certificate_downloadable: enrollment.certificate_downloadable,
                        certificate_status: certificate_status
                            .get(enrollment.course_id.as_str())
                            .copied(),
                    });
                }

                let completed_courses = courses
                    .iter()
                    .filter(|c| c.total_modules > 0 && c.completion_percentage >= 100)
                    .count();
                let certificates_issued = certifications
                    .iter()
                    .filter(|cert| cert.status == CertificationStatus::Issued)
                    .count();

                Ok(DashboardView {
                    user_id: user_id.to_string(),
                    total_courses: courses.len(),
                    completed_courses,
                    in_progress_courses: courses.len() - completed_courses,
                    certificates_issued,
                    courses,
                })
            })
            .await
    }

    pub async fn update_lesson_progress(
        &self,
        user_id: &str,
        lesson_id: &str,
        delta: LessonProgressDelta,
    ) -> AppResult<ProgressEventOutcome> {
        self.apply_progress_event(
            user_id,
            ProgressEvent::LessonProgress {
                lesson_id: lesson_id.to_string(),
                delta,
            },
        )
        .await
    }

    pub async fn update_module_progress(
        &self,
        user_id: &str,
        module_id: &str,
        delta: ModuleProgressDelta,
    ) -> AppResult<ProgressEventOutcome> {
        self.apply_progress_event(
            user_id,
            ProgressEvent::ModuleProgress {
                module_id: module_id.to_string(),
                delta,
            },
        )
        .await
    }

    /// Rejected with `AccessDenied` while the module's required quiz is unpassed.
    pub async fn complete_module(
        &self,
        user_id: &str,
        module_id: &str,
    ) -> AppResult<ProgressEventOutcome> {
        self.apply_progress_event(
            user_id,
            ProgressEvent::CompleteModule {
                module_id: module_id.to_string(),
            },
        )
        .await
    }

    pub async fn submit_quiz_attempt(
        &self,
        user_id: &str,
        quiz_id: &str,
        input: SubmitQuizAttemptInput,
    ) -> AppResult<ProgressEventOutcome> {
        self.apply_progress_event(
            user_id,
            ProgressEvent::QuizSubmission {
                quiz_id: quiz_id.to_string(),
                input,
            },
        )
        .await
    }

    /// Administrative update of the tasks the platform cannot observe.
    pub async fn validate_tasks(
        &self,
        user_id: &str,
        course_id: &str,
        reviewer_id: &str,
        input: TaskValidationInput,
    ) -> AppResult<ProgressEventOutcome> {
        self.apply_progress_event(
            user_id,
            ProgressEvent::TaskValidation {
                course_id: course_id.to_string(),
                reviewer_id: reviewer_id.to_string(),
                input,
            },
        )
        .await
    }

    /// Single write path. Each event first records its own change (retried on
    /// conflicts), then re-derives module and course progress, which is where a
    /// pending certification may be created.
    pub async fn apply_progress_event(
        &self,
        user_id: &str,
        event: ProgressEvent,
    ) -> AppResult<ProgressEventOutcome> {
        event.validate_payload()?;
        let kind = event.kind();
        log::debug!("Applying {} event for user {}", kind, user_id);

        self.policy
            .deadline(kind, async {
                match &event {
                    ProgressEvent::LessonProgress { lesson_id, delta } => {
                        self.handle_lesson_progress(user_id, lesson_id, delta).await
                    }
                    ProgressEvent::ModuleProgress { module_id, delta } => {
                        self.handle_module_progress(user_id, module_id, delta, false)
                            .await
                    }
                    ProgressEvent::CompleteModule { module_id } => {
                        self.handle_module_progress(
                            user_id,
                            module_id,
                            &ModuleProgressDelta::default(),
                            true,
                        )
                        .await
                    }
                    ProgressEvent::QuizSubmission { quiz_id, input } => {
                        self.handle_quiz_submission(user_id, quiz_id, input).await
                    }
                    ProgressEvent::TaskValidation {
                        course_id,
                        reviewer_id,
                        input,
                    } => {
                        let input = TaskProgressInput::from(input.clone());
                        self.handle_task_validation(user_id, course_id, reviewer_id, &input)
                            .await
                    }
                }
            })
            .await
    }

    /// Administrative grant. Re-enrolling is a no-op; a pending enrollment is activated.
    pub async fn enroll(&self, request: EnrollRequest) -> AppResult<Enrollment> {
        request.validate()?;

        self.policy
            .deadline("enroll", async {
                let course = self
                    .catalog
                    .find_course(&request.course_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(format!("Course '{}' not found", request.course_id))
                    })?;
                if !course.is_published {
                    return Err(AppError::ValidationError(format!(
                        "Course '{}' is not published",
                        course.id
                    )));
                }

                self.policy
                    .retry("enroll", || {
                        self.enroll_once(&request.user_id, &course.id, &course.title, &request.learner_name)
                    })
                    .await
            })
            .await
    }

    pub async fn issue_certificate(
        &self,
        certification_id: &str,
        issued_by: &str,
        request: IssueCertificateRequest,
    ) -> AppResult<Certification> {
        request.validate()?;
        self.policy
            .run("issue_certificate", || {
                self.issuer
                    .issue(certification_id, issued_by, request.expires_at, Utc::now())
            })
            .await
    }

    pub async fn revoke_certificate(
        &self,
        certification_id: &str,
        revoked_by: &str,
        request: RevokeCertificateRequest,
    ) -> AppResult<Certification> {
        request.validate()?;
        self.policy
            .run("revoke_certificate", || {
                self.issuer
                    .revoke(certification_id, revoked_by, &request.reason, Utc::now())
            })
            .await
    }

    pub async fn annotate_certificate(
        &self,
        certification_id: &str,
        request: AnnotateCertificateRequest,
    ) -> AppResult<Certification> {
        request.validate()?;
        self.policy
            .run("annotate_certificate", || {
                self.issuer.annotate(
                    certification_id,
                    request.reviewer_notes.clone(),
                    request.metadata.clone(),
                    Utc::now(),
                )
            })
            .await
    }

    pub async fn verify_certificate(&self, verification_code: &str) -> AppResult<VerificationResult> {
        self.policy
            .deadline(
                "verify_certificate",
                self.issuer.verify(verification_code, Utc::now()),
            )
            .await
    }

    pub async fn list_certificates(&self, user_id: &str) -> AppResult<Vec<Certification>> {
        self.policy
            .deadline("list_certificates", self.issuer.list_for_user(user_id))
            .await
    }

    pub async fn certification_statistics(&self) -> AppResult<CertificationStatistics> {
        self.policy
            .deadline("certification_statistics", self.issuer.statistics())
            .await
    }

    async fn handle_lesson_progress(
        &self,
        user_id: &str,
        lesson_id: &str,
        delta: &LessonProgressDelta,
    ) -> AppResult<ProgressEventOutcome> {
        let lesson = self
            .catalog
            .find_lesson(lesson_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Lesson '{}' not found", lesson_id)))?;
        let module = self.require_module(&lesson.module_id).await?;
        self.require_active_enrollment(user_id, &module.course_id)
            .await?;
        self.require_module_access(user_id, &module).await?;

        self.policy
            .retry("lesson_progress_write", || {
                self.write_lesson(user_id, &module, &lesson, delta)
            })
            .await?;

        self.propagate(user_id, &module).await
    }

    async fn handle_module_progress(
        &self,
        user_id: &str,
        module_id: &str,
        delta: &ModuleProgressDelta,
        explicit_completion: bool,
    ) -> AppResult<ProgressEventOutcome> {
        let module = self.require_module(module_id).await?;
        self.require_active_enrollment(user_id, &module.course_id)
            .await?;
        self.require_module_access(user_id, &module).await?;

        let wants_completion = explicit_completion || delta.is_completed == Some(true);
        let quizzes = self.catalog.list_quizzes(&module.course_id).await?;
        let quiz_satisfied = match gating_quiz(&quizzes, &module.id) {
            Some(quiz) => {
                let passed = self.attempts.has_passed(user_id, &quiz.id).await?;
                if wants_completion && !passed {
                    return Err(AppError::AccessDenied(format!(
                        "Pass the quiz \"{}\" to complete \"{}\"",
                        quiz.title, module.title
                    )));
                }
                passed
            }
            None => true,
        };

        self.policy
            .retry("module_progress_write", || {
                self.write_module(user_id, &module, delta, wants_completion, quiz_satisfied)
            })
            .await?;

        self.propagate(user_id, &module).await
    }

    async fn handle_quiz_submission(
        &self,
        user_id: &str,
        quiz_id: &str,
        input: &SubmitQuizAttemptInput,
    ) -> AppResult<ProgressEventOutcome> {
        let quiz = self
            .catalog
            .find_quiz(quiz_id)
            .await?
            .filter(|quiz| quiz.is_published)
            .ok_or_else(|| AppError::NotFound(format!("Quiz '{}' not found", quiz_id)))?;
        let module = self.require_module(&quiz.module_id).await?;
        self.require_active_enrollment(user_id, &module.course_id)
            .await?;
        self.require_module_access(user_id, &module).await?;

        let attempt = self
            .policy
            .retry("quiz_attempt_write", || {
                self.grader.submit(user_id, &quiz, input, Utc::now())
            })
            .await?;

        self.policy
            .retry("quiz_outcome_write", || {
                self.record_quiz_outcome(user_id, &module, &quiz)
            })
            .await?;

        let mut outcome = self.propagate(user_id, &module).await?;
        outcome.quiz_attempt = Some(attempt);
        Ok(outcome)
    }

    async fn handle_task_validation(
        &self,
        user_id: &str,
        course_id: &str,
        reviewer_id: &str,
        input: &TaskProgressInput,
    ) -> AppResult<ProgressEventOutcome> {
        let (enrollment, issuance) = self
            .policy
            .retry("task_validation_write", || {
                self.write_task_progress(user_id, course_id, reviewer_id, input)
            })
            .await?;

        Ok(ProgressEventOutcome {
            course_id: course_id.to_string(),
            module_id: None,
            module_completed: false,
            course_completion_percentage: enrollment.progress.completion_percentage,
            course_completed: enrollment.progress.is_complete(),
            certification_created: issuance.as_ref().map(IssuanceOutcome::is_created).unwrap_or(false),
            certification: issuance
                .as_ref()
                .map(|outcome| CertificationSummary::from(outcome.certification())),
            quiz_attempt: None,
        })
    }

    async fn write_lesson(
        &self,
        user_id: &str,
        module: &CourseModule,
        lesson: &Lesson,
        delta: &LessonProgressDelta,
    ) -> AppResult<LessonProgress> {
        let now = Utc::now();
        let existing = self.progress.find_lesson_progress(user_id, &lesson.id).await?;
        let is_new = existing.is_none();
        let mut record = existing.unwrap_or_else(|| {
            LessonProgress::new(user_id, &module.course_id, &module.id, &lesson.id)
        });

        if let Some(percentage) = delta.progress_percentage {
            record.apply_percentage(percentage, now);
        }
        if delta.is_completed == Some(true) {
            record.mark_completed(now);
        }
        if let Some(minutes) = delta.time_spent_minutes {
            record.time_spent_minutes = record.time_spent_minutes.saturating_add(minutes.max(0));
        }
        if let Some(position) = delta.last_position_seconds {
            record.last_position_seconds = position.max(0);
        }
        if let Some(notes) = &delta.notes {
            record.notes = Some(notes.trim().to_string()).filter(|n| !n.is_empty());
        }
        if record.status == ProgressStatus::NotStarted {
            record.status = ProgressStatus::InProgress;
        }
        record.last_accessed_at = Some(now);

        self.aggregator.save_lesson(record, is_new).await
    }

    async fn write_module(
        &self,
        user_id: &str,
        module: &CourseModule,
        delta: &ModuleProgressDelta,
        wants_completion: bool,
        quiz_satisfied: bool,
    ) -> AppResult<ModuleProgress> {
        let now = Utc::now();
        let existing = self
            .progress
            .find_module_progress(user_id, &module.id)
            .await?;
        let is_new = existing.is_none();
        let mut record = existing
            .unwrap_or_else(|| ModuleProgress::new(user_id, &module.course_id, &module.id));

        if let Some(percentage) = delta.progress_percentage {
            record.apply_percentage(percentage.max(record.progress_percentage));
        }
        if let Some(minutes) = delta.time_spent_minutes {
            record.time_spent_minutes = record.time_spent_minutes.saturating_add(minutes.max(0));
        }
        if quiz_satisfied && (wants_completion || record.progress_percentage >= 100) {
            record.mark_completed(now);
        } else if record.status == ProgressStatus::NotStarted {
            record.status = ProgressStatus::InProgress;
        }
        record.last_accessed_at = Some(now);

        self.aggregator.save_module(record, is_new).await
    }

    /// Mirrors the learner's attempts on the quiz into module progress and closes
    /// a lesson-linked quiz's lesson once passed. Derived from the stored
    /// attempts, so running it twice changes nothing.
    async fn record_quiz_outcome(
        &self,
        user_id: &str,
        module: &CourseModule,
        quiz: &Quiz,
    ) -> AppResult<()> {
        let attempts = self.attempts.find_by_user_and_quiz(user_id, &quiz.id).await?;
        let passed = attempts.iter().any(|a| a.passed);
        let best_score = attempts.iter().map(|a| a.score).reduce(f64::max);
        let latest = attempts.iter().map(|a| a.submitted_at).max();

        if passed {
            if let Some(lesson_id) = &quiz.lesson_id {
                let existing = self.progress.find_lesson_progress(user_id, lesson_id).await?;
                let is_new = existing.is_none();
                let mut lesson = existing.unwrap_or_else(|| {
                    LessonProgress::new(user_id, &module.course_id, &module.id, lesson_id)
                });
                if !lesson.is_completed {
                    let completed_at = latest.unwrap_or_else(Utc::now);
                    lesson.mark_completed(completed_at);
                    lesson.last_accessed_at = lesson.last_accessed_at.max(Some(completed_at));
                    self.aggregator.save_lesson(lesson, is_new).await?;
                }
            }
        }

        let existing = self
            .progress
            .find_module_progress(user_id, &module.id)
            .await?;
        let is_new = existing.is_none();
        let mut record = existing
            .unwrap_or_else(|| ModuleProgress::new(user_id, &module.course_id, &module.id));
        let before = record.clone();

        record.quiz_attempts = attempts.len() as i32;
        record.quiz_score = best_score;
        record.quiz_passed = record.quiz_passed || passed;
        record.last_accessed_at = record.last_accessed_at.max(latest);
        if record.status == ProgressStatus::NotStarted {
            record.status = ProgressStatus::InProgress;
        }

        if record != before {
            self.aggregator.save_module(record, is_new).await?;
        }
        Ok(())
    }

    /// Merges reviewer input into the enrollment. A task completion of 100 %
    /// ensures the pending certification before the enrollment write lands.
    async fn write_task_progress(
        &self,
        user_id: &str,
        course_id: &str,
        reviewer_id: &str,
        input: &TaskProgressInput,
    ) -> AppResult<(Enrollment, Option<IssuanceOutcome>)> {
        let now = Utc::now();
        let enrollment = self
            .enrollments
            .find_by_user_and_course(user_id, course_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "No enrollment for user '{}' in course '{}'",
                    user_id, course_id
                ))
            })?;

        let merged = TaskProgress::merge(&enrollment.task_progress, input, reviewer_id, now);
        let downloadable = merged.unlocks_certificate(self.task_unlock_threshold)
            || enrollment.progress.is_complete();

        let issuance = if merged.is_complete() {
            Some(
                self.aggregator
                    .ensure_certification(
                        &enrollment,
                        merged.completion_percentage,
                        &merged,
                        CertificationTrigger::TaskValidation,
                        now,
                    )
                    .await?,
            )
        } else {
            None
        };

        let mut next = enrollment.clone();
        next.task_progress = merged;
        next.certificate_downloadable = downloadable;
        next.certificate_unlocked_at = if downloadable {
            enrollment.certificate_unlocked_at.or(Some(now))
        } else {
            None
        };
        if next == enrollment {
            return Ok((enrollment, issuance));
        }
        next.updated_at = now;

        let saved = self.enrollments.update(next).await?;
        log::info!(
            "Reviewer {} updated tasks for user {} in course {}: {}%",
            reviewer_id,
            user_id,
            course_id,
            saved.task_progress.completion_percentage
        );
        Ok((saved, issuance))
    }

    async fn enroll_once(
        &self,
        user_id: &str,
        course_id: &str,
        course_title: &str,
        learner_name: &str,
    ) -> AppResult<Enrollment> {
        match self
            .enrollments
            .find_by_user_and_course(user_id, course_id)
            .await?
        {
            Some(existing) if existing.status == EnrollmentStatus::Pending => {
                let mut next = existing;
                next.status = EnrollmentStatus::Active;
                next.updated_at = Utc::now();
                let saved = self.enrollments.update(next).await?;
                log::info!("Activated enrollment of user {} in course {}", user_id, course_id);
                dispatch(
                    self.notifier.clone(),
                    NotificationEvent::enrollment_created(&saved),
                );
                Ok(saved)
            }
            Some(existing) => Ok(existing),
            None => {
                let enrollment = Enrollment::new(
                    user_id,
                    course_id,
                    course_title,
                    learner_name,
                    EnrollmentStatus::Active,
                );
                let saved = self
                    .enrollments
                    .create(enrollment)
                    .await
                    .map_err(|e| match e {
                        AppError::AlreadyExists(reason) => AppError::ConflictRetryable(reason),
                        other => other,
                    })?;
                log::info!("Enrolled user {} in course {}", user_id, course_id);
                dispatch(
                    self.notifier.clone(),
                    NotificationEvent::enrollment_created(&saved),
                );
                Ok(saved)
            }
        }
    }

    /// Module and course recomputation. Both steps are idempotent and retried
    /// independently of the write that preceded them.
    async fn propagate(
        &self,
        user_id: &str,
        module: &CourseModule,
    ) -> AppResult<ProgressEventOutcome> {
        let module_progress = self
            .policy
            .retry("recompute_module", || {
                self.aggregator.recompute_module(user_id, module, Utc::now())
            })
            .await?;
        let CourseRecompute {
            enrollment,
            issuance,
            ..
        } = self
            .policy
            .retry("recompute_course", || {
                self.aggregator
                    .recompute_course(user_id, &module.course_id, Utc::now())
            })
            .await?;

        Ok(ProgressEventOutcome {
            course_id: module.course_id.clone(),
            module_id: Some(module.id.clone()),
            module_completed: module_progress.is_completed,
            course_completion_percentage: enrollment.progress.completion_percentage,
            course_completed: enrollment.progress.is_complete(),
            certification_created: issuance.as_ref().map(IssuanceOutcome::is_created).unwrap_or(false),
            certification: issuance
                .as_ref()
                .map(|outcome| CertificationSummary::from(outcome.certification())),
            quiz_attempt: None,
        })
    }

    async fn require_module(&self, module_id: &str) -> AppResult<CourseModule> {
        self.catalog
            .find_module(module_id)
            .await?
            .filter(|module| module.is_published)
            .ok_or_else(|| AppError::NotFound(format!("Module '{}' not found", module_id)))
    }

    async fn find_enrollment(&self, user_id: &str, course_id: &str) -> AppResult<Enrollment> {
        self.enrollments
            .find_by_user_and_course(user_id, course_id)
            .await?
            .ok_or_else(|| {
                AppError::AccessDenied(format!(
                    "User '{}' is not enrolled in course '{}'",
                    user_id, course_id
                ))
            })
    }

    /// Enrolled and past payment.
    async fn require_active_enrollment(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> AppResult<Enrollment> {
        let enrollment = self.find_enrollment(user_id, course_id).await?;
        if !enrollment.status.grants_access() {
            return Err(AppError::AccessDenied(format!(
                "Enrollment in course '{}' is still pending",
                course_id
            )));
        }
        Ok(enrollment)
    }

    async fn module_access(&self, user_id: &str, module: &CourseModule) -> AppResult<ModuleAccess> {
        let state = self.load_course_state(user_id, &module.course_id).await?;
        unlock_gate::evaluate(&state.gate(), &module.id)
            .ok_or_else(|| AppError::NotFound(format!("Module '{}' not found", module.id)))
    }

    async fn require_module_access(&self, user_id: &str, module: &CourseModule) -> AppResult<()> {
        let access = self.module_access(user_id, module).await?;
        if access.accessible {
            return Ok(());
        }
        Err(AppError::AccessDenied(access.reason.unwrap_or_else(|| {
            format!("Module '{}' is locked", module.id)
        })))
    }

    async fn load_course_state(&self, user_id: &str, course_id: &str) -> AppResult<CourseState> {
        let modules = self.catalog.list_modules(course_id).await?;
        let progress = self
            .progress
            .list_module_progress(user_id, course_id)
            .await?
            .into_iter()
            .map(|p| (p.module_id.clone(), p))
            .collect();
        let quizzes: Vec<Quiz> = self
            .catalog
            .list_quizzes(course_id)
            .await?
            .into_iter()
            .filter(|quiz| quiz.is_published)
            .collect();
        let quiz_ids: Vec<String> = quizzes.iter().map(|quiz| quiz.id.clone()).collect();
        let attempts = self
            .attempts
            .find_by_user_and_quizzes(user_id, &quiz_ids)
            .await?;
        let passed_quizzes = attempts
            .iter()
            .filter(|attempt| attempt.passed)
            .map(|attempt| attempt.quiz_id.clone())
            .collect();

        Ok(CourseState {
            modules,
            progress,
            quizzes,
            attempts,
            passed_quizzes,
        })
    }
}

fn module_view(
    module: &CourseModule,
    access: ModuleAccess,
    lessons: &[Lesson],
    lesson_progress: &HashMap<&str, &LessonProgress>,
    state: &CourseState,
) -> ModuleProgressView {
    let lesson_views: Vec<LessonView> = lessons
        .iter()
        .map(|lesson| {
            let progress = lesson_progress.get(lesson.id.as_str());
            LessonView {
                lesson_id: lesson.id.clone(),
                title: lesson.title.clone(),
                order_index: lesson.order_index,
                status: progress.map(|p| p.status).unwrap_or_default(),
                progress_percentage: progress.map(|p| p.progress_percentage).unwrap_or(0),
                is_completed: progress.map(|p| p.is_completed).unwrap_or(false),
                completed_at: progress.and_then(|p| p.completed_at),
                last_position_seconds: progress.map(|p| p.last_position_seconds).unwrap_or(0),
            }
        })
        .collect();
    let lessons_completed = lesson_views.iter().filter(|l| l.is_completed).count() as i32;

    let quiz = gating_quiz(&state.quizzes, &module.id)
        .or_else(|| {
            state
                .quizzes
                .iter()
                .filter(|quiz| quiz.module_id == module.id)
                .min_by(|a, b| a.id.cmp(&b.id))
        })
        .map(|quiz| {
            let attempts = state.attempts_for(&quiz.id);
            ModuleQuizView {
                quiz_id: quiz.id.clone(),
                title: quiz.title.clone(),
                passing_score: quiz.passing_score,
                passed: state.passed_quizzes.contains(&quiz.id),
                best_score: attempts.iter().map(|a| a.score).reduce(f64::max),
                attempts_used: attempts.len() as i32,
                max_attempts: quiz.max_attempts,
            }
        });

    let progress = state.progress.get(&module.id);
    ModuleProgressView {
        module_id: module.id.clone(),
        title: module.title.clone(),
        order_index: module.order_index,
        access,
        status: progress.map(|p| p.status).unwrap_or_default(),
        progress_percentage: progress.map(|p| p.progress_percentage).unwrap_or(0),
        is_completed: progress.map(|p| p.is_completed).unwrap_or(false),
        completed_at: progress.and_then(|p| p.completed_at),
        time_spent_minutes: progress.map(|p| p.time_spent_minutes).unwrap_or(0),
        lessons_completed,
        total_lessons: lesson_views.len() as i32,
        lessons: lesson_views,
        quiz,
    }
}
