use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{bson::doc, options::IndexOptions, Collection, IndexModel};

use crate::{
    db::Database,
    errors::{AppError, AppResult},
    models::domain::enrollment::Enrollment,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    async fn find_by_user_and_course(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> AppResult<Option<Enrollment>>;
    async fn list_by_user(&self, user_id: &str) -> AppResult<Vec<Enrollment>>;
    /// Fails with `AlreadyExists` when the (user, course) pair is taken.
    async fn create(&self, enrollment: Enrollment) -> AppResult<Enrollment>;
    /// Compare-and-swap on `version`; the stored copy comes back one version ahead.
    async fn update(&self, enrollment: Enrollment) -> AppResult<Enrollment>;
}

pub struct MongoEnrollmentRepository {
    collection: Collection<Enrollment>,
}

impl MongoEnrollmentRepository {
    pub fn new(db: &Database) -> Self {
        let collection = db.get_collection("enrollments");
        Self { collection }
    }

    pub async fn ensure_indexes(&self) -> AppResult<()> {
        log::info!("Creating indexes for enrollments collection");

        let id_index = IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("id_unique".to_string())
                    .build(),
            )
            .build();

        let user_course_index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "course_id": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("user_course_unique".to_string())
                    .build(),
            )
            .build();

        self.collection.create_index(id_index).await?;
        self.collection.create_index(user_course_index).await?;

        log::info!("Successfully created indexes for enrollments collection");
        Ok(())
    }
}

#[async_trait]
impl EnrollmentRepository for MongoEnrollmentRepository {
    async fn find_by_user_and_course(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> AppResult<Option<Enrollment>> {
        let enrollment = self
            .collection
            .find_one(doc! { "user_id": user_id, "course_id": course_id })
            .await?;
        Ok(enrollment)
    }

    async fn list_by_user(&self, user_id: &str) -> AppResult<Vec<Enrollment>> {
        let enrollments = self
            .collection
            .find(doc! { "user_id": user_id })
            .sort(doc! { "enrolled_at": -1 })
            .await?
            .try_collect()
            .await?;
        Ok(enrollments)
    }

    async fn create(&self, enrollment: Enrollment) -> AppResult<Enrollment> {
        self.collection.insert_one(&enrollment).await?;
        Ok(enrollment)
    }

    async fn update(&self, enrollment: Enrollment) -> AppResult<Enrollment> {
        let expected_version = enrollment.version;
        let mut next = enrollment;
        next.version = expected_version + 1;

        let result = self
            .collection
            .replace_one(doc! { "id": &next.id, "version": expected_version }, &next)
            .await?;

        if result.matched_count == 0 {
            return Err(AppError::ConflictRetryable(format!(
                "Enrollment '{}' changed since version {}",
                next.id, expected_version
            )));
        }

        Ok(next)
    }
}
