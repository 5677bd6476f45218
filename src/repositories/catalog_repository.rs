use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{bson::doc, options::IndexOptions, Collection, IndexModel};

use crate::{
    db::Database,
    errors::AppResult,
    models::domain::{
        course::{sort_modules, Course, CourseModule, Lesson},
        quiz::Quiz,
    },
};

/// Read-only view of the course catalog. Content is authored elsewhere.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn find_course(&self, course_id: &str) -> AppResult<Option<Course>>;
    /// Published modules in course order.
    async fn list_modules(&self, course_id: &str) -> AppResult<Vec<CourseModule>>;
    async fn find_module(&self, module_id: &str) -> AppResult<Option<CourseModule>>;
    /// Lessons of a module in order.
    async fn list_lessons(&self, module_id: &str) -> AppResult<Vec<Lesson>>;
    async fn find_lesson(&self, lesson_id: &str) -> AppResult<Option<Lesson>>;
    async fn list_quizzes(&self, course_id: &str) -> AppResult<Vec<Quiz>>;
    async fn find_quiz(&self, quiz_id: &str) -> AppResult<Option<Quiz>>;
}

pub struct MongoCatalogRepository {
    courses: Collection<Course>,
    modules: Collection<CourseModule>,
    lessons: Collection<Lesson>,
    quizzes: Collection<Quiz>,
}

impl MongoCatalogRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            courses: db.get_collection("courses"),
            modules: db.get_collection("course_modules"),
            lessons: db.get_collection("lessons"),
            quizzes: db.get_collection("quizzes"),
        }
    }

    /// Lookup indexes only; the catalog owner enforces its own uniqueness.
    pub async fn ensure_indexes(&self) -> AppResult<()> {
        log::info!("Creating lookup indexes for catalog collections");

        let by_course = |name: &str| {
            IndexModel::builder()
                .keys(doc! { "course_id": 1, "order_index": 1 })
                .options(IndexOptions::builder().name(name.to_string()).build())
                .build()
        };

        self.modules
            .create_index(by_course("course_modules_by_course"))
            .await?;
        self.quizzes
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "course_id": 1, "module_id": 1 })
                    .options(
                        IndexOptions::builder()
                            .name("quizzes_by_course".to_string())
                            .build(),
                    )
                    .build(),
            )
            .await?;
        self.lessons
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "module_id": 1, "order_index": 1 })
                    .options(
                        IndexOptions::builder()
                            .name("lessons_by_module".to_string())
                            .build(),
                    )
                    .build(),
            )
            .await?;

        log::info!("Successfully created catalog indexes");
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for MongoCatalogRepository {
    async fn find_course(&self, course_id: &str) -> AppResult<Option<Course>> {
        let course = self.courses.find_one(doc! { "id": course_id }).await?;
        Ok(course)
    }

    async fn list_modules(&self, course_id: &str) -> AppResult<Vec<CourseModule>> {
        let mut modules: Vec<CourseModule> = self
            .modules
            .find(doc! { "course_id": course_id, "is_published": true })
            .await?
            .try_collect()
            .await?;
        sort_modules(&mut modules);
        Ok(modules)
    }

    async fn find_module(&self, module_id: &str) -> AppResult<Option<CourseModule>> {
        let module = self.modules.find_one(doc! { "id": module_id }).await?;
        Ok(module)
    }

    async fn list_lessons(&self, module_id: &str) -> AppResult<Vec<Lesson>> {
        let mut lessons: Vec<Lesson> = self
            .lessons
            .find(doc! { "module_id": module_id })
            .await?
            .try_collect()
            .await?;
        lessons.sort_by(|a, b| {
            a.order_index
                .cmp(&b.order_index)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(lessons)
    }

    async fn find_lesson(&self, lesson_id: &str) -> AppResult<Option<Lesson>> {
        let lesson = self.lessons.find_one(doc! { "id": lesson_id }).await?;
        Ok(lesson)
    }

    async fn list_quizzes(&self, course_id: &str) -> AppResult<Vec<Quiz>> {
        let quizzes = self
            .quizzes
            .find(doc! { "course_id": course_id })
            .await?
            .try_collect()
            .await?;
        Ok(quizzes)
    }

    async fn find_quiz(&self, quiz_id: &str) -> AppResult<Option<Quiz>> {
        let quiz = self.quizzes.find_one(doc! { "id": quiz_id }).await?;
        Ok(quiz)
    }
}
