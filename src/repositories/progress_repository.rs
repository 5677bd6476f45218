use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{bson::doc, options::IndexOptions, Collection, IndexModel};

use crate::{
    db::Database,
    errors::{AppError, AppResult},
    models::domain::progress::{LessonProgress, ModuleProgress},
};

/// Per-learner module and lesson progress. Rows are created lazily and never deleted.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    async fn find_module_progress(
        &self,
        user_id: &str,
        module_id: &str,
    ) -> AppResult<Option<ModuleProgress>>;
    async fn list_module_progress(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> AppResult<Vec<ModuleProgress>>;
    /// Fails with `AlreadyExists` when the learner already has a row for the module.
    async fn insert_module_progress(&self, progress: ModuleProgress) -> AppResult<ModuleProgress>;
    async fn update_module_progress(&self, progress: ModuleProgress) -> AppResult<ModuleProgress>;

    async fn find_lesson_progress(
        &self,
        user_id: &str,
        lesson_id: &str,
    ) -> AppResult<Option<LessonProgress>>;
    async fn list_lesson_progress_for_module(
        &self,
        user_id: &str,
        module_id: &str,
    ) -> AppResult<Vec<LessonProgress>>;
    async fn list_lesson_progress(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> AppResult<Vec<LessonProgress>>;
    async fn insert_lesson_progress(&self, progress: LessonProgress) -> AppResult<LessonProgress>;
    async fn update_lesson_progress(&self, progress: LessonProgress) -> AppResult<LessonProgress>;
}

pub struct MongoProgressRepository {
    modules: Collection<ModuleProgress>,
    lessons: Collection<LessonProgress>,
}

impl MongoProgressRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            modules: db.get_collection("module_progress"),
            lessons: db.get_collection("lesson_progress"),
        }
    }

    pub async fn ensure_indexes(&self) -> AppResult<()> {
        log::info!("Creating indexes for module_progress and lesson_progress collections");

        let unique = |keys, name: &str| {
            IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .unique(true)
                        .name(name.to_string())
                        .build(),
                )
                .build()
        };
        let lookup = |keys, name: &str| {
            IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().name(name.to_string()).build())
                .build()
        };

        self.modules
            .create_index(unique(doc! { "id": 1 }, "id_unique"))
            .await?;
        self.modules
            .create_index(unique(
                doc! { "user_id": 1, "module_id": 1 },
                "user_module_unique",
            ))
            .await?;
        self.modules
            .create_index(lookup(doc! { "user_id": 1, "course_id": 1 }, "user_course"))
            .await?;

        self.lessons
            .create_index(unique(doc! { "id": 1 }, "id_unique"))
            .await?;
        self.lessons
            .create_index(unique(
                doc! { "user_id": 1, "lesson_id": 1 },
                "user_lesson_unique",
            ))
            .await?;
        self.lessons
            .create_index(lookup(doc! { "user_id": 1, "module_id": 1 }, "user_module"))
            .await?;
        self.lessons
            .create_index(lookup(doc! { "user_id": 1, "course_id": 1 }, "user_course"))
            .await?;

        log::info!("Successfully created progress indexes");
        Ok(())
    }
}

#[async_trait]
impl ProgressRepository for MongoProgressRepository {
    async fn find_module_progress(
        &self,
        user_id: &str,
        module_id: &str,
    ) -> AppResult<Option<ModuleProgress>> {
        let progress = self
            .modules
            .find_one(doc! { "user_id": user_id, "module_id": module_id })
            .await?;
        Ok(progress)
    }

    async fn list_module_progress(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> AppResult<Vec<ModuleProgress>> {
        let progress = self
            .modules
            .find(doc! { "user_id": user_id, "course_id": course_id })
            .await?
            .try_collect()
            .await?;
        Ok(progress)
    }

    async fn insert_module_progress(&self, progress: ModuleProgress) -> AppResult<ModuleProgress> {
        self.modules.insert_one(&progress).await?;
        Ok(progress)
    }

    async fn update_module_progress(&self, progress: ModuleProgress) -> AppResult<ModuleProgress> {
        let expected_version = progress.version;
        let mut next = progress;
        next.version = expected_version + 1;

        let result = self
            .modules
            .replace_one(doc! { "id": &next.id, "version": expected_version }, &next)
            .await?;
        if result.matched_count == 0 {
            return Err(AppError::ConflictRetryable(format!(
                "Module progress '{}' changed since version {}",
                next.id, expected_version
            )));
        }
        Ok(next)
    }

    async fn find_lesson_progress(
        &self,
        user_id: &str,
        lesson_id: &str,
    ) -> AppResult<Option<LessonProgress>> {
        let progress = self
            .lessons
            .find_one(doc! { "user_id": user_id, "lesson_id": lesson_id })
            .await?;
        Ok(progress)
    }

    async fn list_lesson_progress_for_module(
        &self,
        user_id: &str,
        module_id: &str,
    ) -> AppResult<Vec<LessonProgress>> {
        let progress = self
            .lessons
            .find(doc! { "user_id": user_id, "module_id": module_id })
            .await?
            .try_collect()
            .await?;
        Ok(progress)
    }

    async fn list_lesson_progress(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> AppResult<Vec<LessonProgress>> {
        let progress = self
            .lessons
            .find(doc! { "user_id": user_id, "course_id": course_id })
            .await?
            .try_collect()
            .await?;
        Ok(progress)
    }

    async fn insert_lesson_progress(&self, progress: LessonProgress) -> AppResult<LessonProgress> {
        self.lessons.insert_one(&progress).await?;
        Ok(progress)
    }

    async fn update_lesson_progress(&self, progress: LessonProgress) -> AppResult<LessonProgress> {
        let expected_version = progress.version;
        let mut next = progress;
        next.version = expected_version + 1;

        let result = self
            .lessons
            .replace_one(doc! { "id": &next.id, "version": expected_version }, &next)
            .await?;
        if result.matched_count == 0 {
            return Err(AppError::ConflictRetryable(format!(
                "Lesson progress '{}' changed since version {}",
                next.id, expected_version
            )));
        }
        Ok(next)
    }
}
