use std::sync::Arc;

use crate::{
    config::Config,
    db::Database,
    errors::AppResult,
    repositories::{
        MongoCatalogRepository, MongoCertificationRepository, MongoEnrollmentRepository,
        MongoProgressRepository, MongoQuizAttemptRepository,
    },
    services::{
        notification_service::notifier_from_url, CourseProgressService, ProgressDependencies,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub progress_service: Arc<CourseProgressService>,
    pub db: Database,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> AppResult<Self> {
        let db = Database::connect(&config).await?;

        let catalog = Arc::new(MongoCatalogRepository::new(&db));
        catalog.ensure_indexes().await?;

        let progress = Arc::new(MongoProgressRepository::new(&db));
        progress.ensure_indexes().await?;

        let attempts = Arc::new(MongoQuizAttemptRepository::new(&db));
        attempts.ensure_indexes().await?;

        let enrollments = Arc::new(MongoEnrollmentRepository::new(&db));
        enrollments.ensure_indexes().await?;

        let certifications = Arc::new(MongoCertificationRepository::new(&db));
        certifications.ensure_indexes().await?;

        let notifier = notifier_from_url(config.notification_webhook_url.as_deref())?;

        let progress_service = Arc::new(CourseProgressService::new(
            ProgressDependencies {
                catalog,
                progress,
                attempts,
                enrollments,
                certifications,
                notifier,
            },
            &config,
        ));

        Ok(Self {
            progress_service,
            db,
            config: Arc::new(config),
        })
    }
}
