use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{bson::doc, options::IndexOptions, Collection, IndexModel};

use crate::{db::Database, errors::AppResult, models::domain::quiz_attempt::QuizAttempt};

/// Append-only: attempts are inserted and read, never updated.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuizAttemptRepository: Send + Sync {
    /// Fails with `AlreadyExists` if the attempt number is already taken.
    async fn create(&self, attempt: QuizAttempt) -> AppResult<QuizAttempt>;
    /// Oldest attempt first.
    async fn find_by_user_and_quiz(
        &self,
        user_id: &str,
        quiz_id: &str,
    ) -> AppResult<Vec<QuizAttempt>>;
    async fn find_by_user_and_quizzes(
        &self,
        user_id: &str,
        quiz_ids: &[String],
    ) -> AppResult<Vec<QuizAttempt>>;
    async fn count_user_attempts(&self, user_id: &str, quiz_id: &str) -> AppResult<usize>;
    async fn has_passed(&self, user_id: &str, quiz_id: &str) -> AppResult<bool>;
}

pub struct MongoQuizAttemptRepository {
    collection: Collection<QuizAttempt>,
}

impl MongoQuizAttemptRepository {
    pub fn new(db: &Database) -> Self {
        let collection = db.get_collection("quiz_attempts");
        Self { collection }
    }

    pub async fn ensure_indexes(&self) -> AppResult<()> {
        log::info!("Creating indexes for quiz_attempts collection");

        let id_index = IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("id_unique".to_string())
                    .build(),
            )
            .build();

        let attempt_number_index = IndexModel::builder()
            .keys(doc! { "quiz_id": 1, "user_id": 1, "attempt_number": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("quiz_user_attempt_unique".to_string())
                    .build(),
            )
            .build();

        let user_id_index = IndexModel::builder()
            .keys(doc! { "user_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("user_id".to_string())
                    .build(),
            )
            .build();

        self.collection.create_index(id_index).await?;
        self.collection.create_index(attempt_number_index).await?;
        self.collection.create_index(user_id_index).await?;

        log::info!("Successfully created indexes for quiz_attempts collection");
        Ok(())
    }
}

#[async_trait]
impl QuizAttemptRepository for MongoQuizAttemptRepository {
    async fn create(&self, attempt: QuizAttempt) -> AppResult<QuizAttempt> {
        self.collection.insert_one(&attempt).await?;
        Ok(attempt)
    }

    async fn find_by_user_and_quiz(
        &self,
        user_id: &str,
        quiz_id: &str,
    ) -> AppResult<Vec<QuizAttempt>> {
        let attempts = self
            .collection
            .find(doc! {
                "user_id": user_id,
                "quiz_id": quiz_id
            })
            .sort(doc! { "attempt_number": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(attempts)
    }

    async fn find_by_user_and_quizzes(
        &self,
        user_id: &str,
        quiz_ids: &[String],
    ) -> AppResult<Vec<QuizAttempt>> {
        if quiz_ids.is_empty() {
            return Ok(Vec::new());
        }
        let attempts = self
            .collection
            .find(doc! {
                "user_id": user_id,
                "quiz_id": { "$in": quiz_ids.to_vec() }
            })
            .sort(doc! { "attempt_number": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(attempts)
    }

    async fn count_user_attempts(&self, user_id: &str, quiz_id: &str) -> AppResult<usize> {
        let count = self
            .collection
            .count_documents(doc! {
                "user_id": user_id,
                "quiz_id": quiz_id
            })
            .await?;
        Ok(count as usize)
    }

    async fn has_passed(&self, user_id: &str, quiz_id: &str) -> AppResult<bool> {
        let attempt = self
            .collection
            .find_one(doc! {
                "user_id": user_id,
                "quiz_id": quiz_id,
                "passed": true
            })
            .await?;
        Ok(attempt.is_some())
    }
}
