use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{bson::doc, options::IndexOptions, Collection, IndexModel};

use crate::{
    db::Database,
    errors::{AppError, AppResult},
    models::domain::certification::{Certification, CertificationStatus},
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CertificationRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> AppResult<Option<Certification>>;
    async fn find_by_user_and_course(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> AppResult<Option<Certification>>;
    async fn find_by_verification_code(&self, code: &str) -> AppResult<Option<Certification>>;
    /// Fails with `AlreadyExists` when the learner already holds one for the course.
    async fn create(&self, certification: Certification) -> AppResult<Certification>;
    /// Compare-and-swap on `version`.
    async fn update(&self, certification: Certification) -> AppResult<Certification>;
    async fn list_by_user(&self, user_id: &str) -> AppResult<Vec<Certification>>;
    async fn count_by_status(&self, status: Option<CertificationStatus>) -> AppResult<u64>;
}

pub struct MongoCertificationRepository {
    collection: Collection<Certification>,
}

impl MongoCertificationRepository {
    pub fn new(db: &Database) -> Self {
        let collection = db.get_collection("certifications");
        Self { collection }
    }

    /// The (user_id, course_id) index is what makes certification creation idempotent.
    pub async fn ensure_indexes(&self) -> AppResult<()> {
        log::info!("Creating indexes for certifications collection");

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

        let verification_index = IndexModel::builder()
            .keys(doc! { "verification_code": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("verification_code_unique".to_string())
                    .build(),
            )
            .build();

        let status_index = IndexModel::builder()
            .keys(doc! { "status": 1 })
            .options(IndexOptions::builder().name("status".to_string()).build())
            .build();

        self.collection.create_index(id_index).await?;
        self.collection.create_index(user_course_index).await?;
        self.collection.create_index(verification_index).await?;
        self.collection.create_index(status_index).await?;

        log::info!("Successfully created indexes for certifications collection");
        Ok(())
    }
}

#[async_trait]
impl CertificationRepository for MongoCertificationRepository {
    async fn find_by_id(&self, id: &str) -> AppResult<Option<Certification>> {
        let certification = self.collection.find_one(doc! { "id": id }).await?;
        Ok(certification)
    }

    async fn find_by_user_and_course(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> AppResult<Option<Certification>> {
        let certification = self
            .collection
            .find_one(doc! { "user_id": user_id, "course_id": course_id })
            .await?;
        Ok(certification)
    }

    async fn find_by_verification_code(&self, code: &str) -> AppResult<Option<Certification>> {
        let certification = self
            .collection
            .find_one(doc! { "verification_code": code })
            .await?;
        Ok(certification)
    }

    async fn create(&self, certification: Certification) -> AppResult<Certification> {
        self.collection.insert_one(&certification).await?;
        Ok(certification)
    }

    async fn update(&self, certification: Certification) -> AppResult<Certification> {
        let expected_version = certification.version;
        let mut next = certification;
        next.version = expected_version + 1;

        let result = self
            .collection
            .replace_one(doc! { "id": &next.id, "version": expected_version }, &next)
            .await?;
        if result.matched_count == 0 {
            return Err(AppError::ConflictRetryable(format!(
                "Certification '{}' changed since version {}",
                next.id, expected_version
            )));
        }
        Ok(next)
    }

    async fn list_by_user(&self, user_id: &str) -> AppResult<Vec<Certification>> {
        let certifications = self
            .collection
            .find(doc! { "user_id": user_id })
            .sort(doc! { "created_at": -1 })
            .await?
            .try_collect()
            .await?;
        Ok(certifications)
    }

    async fn count_by_status(&self, status: Option<CertificationStatus>) -> AppResult<u64> {
        let filter = match status {
            Some(status) => doc! { "status": status.as_str() },
            None => doc! {},
        };
        let count = self.collection.count_documents(filter).await?;
        Ok(count)
    }
}
