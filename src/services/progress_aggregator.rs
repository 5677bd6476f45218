use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Utc};

use crate::{
    errors::{AppError, AppResult},
    models::domain::{
        certification::{CertificationMetadata, CertificationTrigger, CompletionSnapshot},
        course::CourseModule,
        enrollment::{Enrollment, EnrollmentStatus, ProgressSnapshot},
        progress::{completion_percentage, LessonProgress, ModuleProgress},
        quiz::gating_quiz,
        task_progress::TaskProgress,
    },
    repositories::{
        CatalogRepository, EnrollmentRepository, ProgressRepository, QuizAttemptRepository,
    },
    services::certification_issuer::{CertificationIssuer, IssuanceOutcome},
};

/// What a course recomputation did.
#[derive(Debug, Clone)]
pub struct CourseRecompute {
    pub enrollment: Enrollment,
    /// This call moved the snapshot from below 100 % to 100 %.
    pub reached_completion: bool,
    pub issuance: Option<IssuanceOutcome>,
}

/// Rolls lesson progress up into modules and module progress up into the
/// enrollment snapshot. Every progress trigger reaches `ensure_pending` through here.
pub struct ProgressAggregator {
    catalog: Arc<dyn CatalogRepository>,
    progress: Arc<dyn ProgressRepository>,
    attempts: Arc<dyn QuizAttemptRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    issuer: Arc<CertificationIssuer>,
}

impl ProgressAggregator {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        progress: Arc<dyn ProgressRepository>,
        attempts: Arc<dyn QuizAttemptRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        issuer: Arc<CertificationIssuer>,
    ) -> Self {
        Self {
            catalog,
            progress,
            attempts,
            enrollments,
            issuer,
        }
    }

    /// Derives the module's percentage from its lessons. A module completes when
    /// every lesson is complete and its gating quiz (if any) is passed; a module
    /// without lessons completes on its gating quiz alone. Completed modules are
    /// never reopened here.
    pub async fn recompute_module(
        &self,
        user_id: &str,
        module: &CourseModule,
        now: DateTime<Utc>,
    ) -> AppResult<ModuleProgress> {
        let lessons = self.catalog.list_lessons(&module.id).await?;
        let lesson_progress = self
            .progress
            .list_lesson_progress_for_module(user_id, &module.id)
            .await?;

        let lesson_ids: HashSet<&str> = lessons.iter().map(|l| l.id.as_str()).collect();
        let relevant: Vec<&LessonProgress> = lesson_progress
            .iter()
            .filter(|p| lesson_ids.contains(p.lesson_id.as_str()))
            .collect();
        let completed_lessons = relevant.iter().filter(|p| p.is_completed).count();
        let percentage = completion_percentage(completed_lessons, lessons.len());
        let lesson_touch = relevant.iter().filter_map(|p| p.last_accessed_at).max();

        let quizzes = self.catalog.list_quizzes(&module.course_id).await?;
        let gate = gating_quiz(&quizzes, &module.id);
        let quiz_passed = match gate {
            Some(quiz) => self.attempts.has_passed(user_id, &quiz.id).await?,
            None => true,
        };
        let lessons_done = if lessons.is_empty() {
            gate.is_some()
        } else {
            percentage >= 100
        };

        let existing = self
            .progress
            .find_module_progress(user_id, &module.id)
            .await?;
        let is_new = existing.is_none();
        let mut record = existing
            .unwrap_or_else(|| ModuleProgress::new(user_id, &module.course_id, &module.id));
        let before = record.clone();

        if !record.is_completed {
            // Direct module updates may have moved the percentage past the lesson ratio.
            if !lessons.is_empty() {
                record.apply_percentage(percentage.max(record.progress_percentage));
            }
            if lessons_done && quiz_passed {
                record.mark_completed(now);
            }
        }
        record.last_accessed_at = record.last_accessed_at.max(lesson_touch);

        if record == before {
            return Ok(record);
        }

        if record.is_completed && !before.is_completed {
            log::info!("User {} completed module {}", user_id, module.id);
        }
        self.save_module(record, is_new).await
    }

    /// Recomputes the enrollment snapshot. On the transition to 100 % the pending
    /// certification is ensured first, and only then is the snapshot swapped in,
    /// so no reader sees a complete enrollment whose certification was never
    /// evaluated. A snapshot identical to the stored one is not rewritten.
    pub async fn recompute_course(
        &self,
        user_id: &str,
        course_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<CourseRecompute> {
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

        let modules = self.catalog.list_modules(course_id).await?;
        let module_progress = self.progress.list_module_progress(user_id, course_id).await?;
        let snapshot = build_snapshot(&modules, &module_progress);

        if enrollment.progress == snapshot {
            return Ok(CourseRecompute {
                enrollment,
                reached_completion: false,
                issuance: None,
            });
        }

        let crossing = !enrollment.progress.is_complete() && snapshot.is_complete();
        let issuance = if crossing {
            let completion = completion_snapshot(
                &enrollment,
                f64::from(snapshot.completion_percentage),
                overall_score(&modules, &module_progress),
                &enrollment.task_progress,
                CertificationTrigger::CourseCompletion,
            );
            Some(
                self.issuer
                    .ensure_pending(user_id, course_id, completion, now)
                    .await?,
            )
        } else {
            None
        };

        let mut next = enrollment;
        if snapshot.is_complete() {
            if next.status == EnrollmentStatus::Active {
                next.status = EnrollmentStatus::Completed;
            }
            next.completed_at.get_or_insert(now);
            next.certificate_downloadable = true;
            next.certificate_unlocked_at.get_or_insert(now);
        }
        next.progress = snapshot;
        next.updated_at = now;

        let saved = self.enrollments.update(next).await?;
        if crossing {
            log::info!("User {} reached 100% in course {}", user_id, course_id);
        }

        Ok(CourseRecompute {
            enrollment: saved,
            reached_completion: crossing,
            issuance,
        })
    }

    /// Ensures the pending certification for a trigger other than the module
    /// rollup, scored over the course's current module progress.
    pub async fn ensure_certification(
        &self,
        enrollment: &Enrollment,
        completion_percentage: f64,
        task_progress: &TaskProgress,
        trigger: CertificationTrigger,
        now: DateTime<Utc>,
    ) -> AppResult<IssuanceOutcome> {
        let modules = self.catalog.list_modules(&enrollment.course_id).await?;
        let module_progress = self
            .progress
            .list_module_progress(&enrollment.user_id, &enrollment.course_id)
            .await?;
        let completion = completion_snapshot(
            enrollment,
            completion_percentage,
            overall_score(&modules, &module_progress),
            task_progress,
            trigger,
        );
        self.issuer
            .ensure_pending(&enrollment.user_id, &enrollment.course_id, completion, now)
            .await
    }

    /// Inserts a fresh row or swaps an existing one. Losing the insert race to
    /// another writer is reported as a retryable conflict.
    pub async fn save_module(
        &self,
        record: ModuleProgress,
        is_new: bool,
    ) -> AppResult<ModuleProgress> {
        if is_new {
            self.progress
                .insert_module_progress(record)
                .await
                .map_err(conflict_on_duplicate)
        } else {
            self.progress.update_module_progress(record).await
        }
    }

    pub async fn save_lesson(
        &self,
        record: LessonProgress,
        is_new: bool,
    ) -> AppResult<LessonProgress> {
        if is_new {
            self.progress
                .insert_lesson_progress(record)
                .await
                .map_err(conflict_on_duplicate)
        } else {
            self.progress.update_lesson_progress(record).await
        }
    }
}

/// Snapshot over the published modules only; progress rows for modules that
/// left the course are ignored.
pub fn build_snapshot(modules: &[CourseModule], progress: &[ModuleProgress]) -> ProgressSnapshot {
    let by_module: HashMap<&str, &ModuleProgress> = progress
        .iter()
        .map(|p| (p.module_id.as_str(), p))
        .collect();

    let in_course: Vec<&ModuleProgress> = modules
        .iter()
        .filter_map(|m| by_module.get(m.id.as_str()).copied())
        .collect();
    let modules_completed = in_course.iter().filter(|p| p.is_completed).count();

    ProgressSnapshot {
        modules_completed: modules_completed as i32,
        total_modules: modules.len() as i32,
        completion_percentage: completion_percentage(modules_completed, modules.len()),
        last_accessed_at: in_course.iter().filter_map(|p| p.last_accessed_at).max(),
    }
}

/// Mean of the recorded module quiz scores, 0 when none were taken.
pub fn overall_score(modules: &[CourseModule], progress: &[ModuleProgress]) -> f64 {
    let module_ids: HashSet<&str> = modules.iter().map(|m| m.id.as_str()).collect();
    let scores: Vec<f64> = progress
        .iter()
        .filter(|p| module_ids.contains(p.module_id.as_str()))
        .filter_map(|p| p.quiz_score)
        .collect();

    if scores.is_empty() {
        return 0.0;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    (mean * 100.0).round() / 100.0
}

fn completion_snapshot(
    enrollment: &Enrollment,
    completion_percentage: f64,
    overall_score: f64,
    task_progress: &TaskProgress,
    trigger: CertificationTrigger,
) -> CompletionSnapshot {
    CompletionSnapshot {
        enrollment_id: Some(enrollment.id.clone()),
        completion_percentage,
        overall_score,
        task_progress: task_progress.clone(),
        trigger,
        metadata: CertificationMetadata {
            learner_name: enrollment.learner_name.clone(),
            course_title: enrollment.course_title.clone(),
            enrolled_at: Some(enrollment.enrolled_at),
        },
    }
}

fn conflict_on_duplicate(err: AppError) -> AppError {
    match err {
        AppError::AlreadyExists(reason) => AppError::ConflictRetryable(reason),
        other => other,
    }
}
