use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::{
    errors::{AppError, AppResult},
    models::{
        domain::certification::{Certification, CertificationStatus, CompletionSnapshot},
        dto::response::{CertificationStatistics, VerificationResult},
    },
    repositories::CertificationRepository,
    services::notification_service::{dispatch, NotificationEvent, Notifier},
};

/// Result of asking for a pending certification.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "certification", rename_all = "snake_case")]
pub enum IssuanceOutcome {
    Created(Certification),
    /// Another trigger got there first; not an error.
    AlreadyExists(Certification),
}

impl IssuanceOutcome {
    pub fn certification(&self) -> &Certification {
        match self {
            IssuanceOutcome::Created(cert) | IssuanceOutcome::AlreadyExists(cert) => cert,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, IssuanceOutcome::Created(_))
    }
}

pub struct CertificationIssuer {
    repository: Arc<dyn CertificationRepository>,
    notifier: Arc<dyn Notifier>,
    number_prefix: String,
    validity_days: Option<i64>,
}

impl CertificationIssuer {
    pub fn new(
        repository: Arc<dyn CertificationRepository>,
        notifier: Arc<dyn Notifier>,
        number_prefix: impl Into<String>,
        validity_days: Option<i64>,
    ) -> Self {
        Self {
            repository,
            notifier,
            number_prefix: number_prefix.into(),
            validity_days,
        }
    }

    /// Creates the PENDING certification for (user, course) exactly once. Safe to
    /// call from any number of concurrent triggers: the unique (user_id, course_id)
    /// index decides the winner and every loser gets `AlreadyExists`.
    pub async fn ensure_pending(
        &self,
        user_id: &str,
        course_id: &str,
        snapshot: CompletionSnapshot,
        now: DateTime<Utc>,
    ) -> AppResult<IssuanceOutcome> {
        if let Some(existing) = self
            .repository
            .find_by_user_and_course(user_id, course_id)
            .await?
        {
            return Ok(IssuanceOutcome::AlreadyExists(existing));
        }

        let trigger = snapshot.trigger;
        let candidate =
            Certification::new_pending(user_id, course_id, snapshot, &self.number_prefix, now);

        match self.repository.create(candidate).await {
            Ok(created) => {
                log::info!(
                    "Created pending certification {} for user {} in course {} ({:?})",
                    created.certificate_number,
                    user_id,
                    course_id,
                    trigger
                );
                dispatch(
                    self.notifier.clone(),
                    NotificationEvent::certification_pending(&created),
                );
                Ok(IssuanceOutcome::Created(created))
            }
            Err(AppError::AlreadyExists(_)) => {
                log::debug!(
                    "Certification for user {} in course {} created concurrently",
                    user_id,
                    course_id
                );
                self.repository
                    .find_by_user_and_course(user_id, course_id)
                    .await?
                    .map(IssuanceOutcome::AlreadyExists)
                    .ok_or_else(|| {
                        AppError::ConflictRetryable(format!(
                            "Certification for user '{}' in course '{}' is not yet visible",
                            user_id, course_id
                        ))
                    })
            }
            Err(e) => Err(e),
        }
    }

    /// PENDING -> ISSUED. `expires_at` overrides the configured validity window.
    pub async fn issue(
        &self,
        certification_id: &str,
        issued_by: &str,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<Certification> {
        let mut cert = self.load(certification_id).await?;
        let expires_at = expires_at.or_else(|| {
            self.validity_days
                .map(|days| now + Duration::days(days))
        });

        cert.issue(issued_by, expires_at, now)?;
        let saved = self.repository.update(cert).await?;

        log::info!(
            "Issued certificate {} to user {} by {}",
            saved.certificate_number,
            saved.user_id,
            issued_by
        );
        dispatch(
            self.notifier.clone(),
            NotificationEvent::certificate_issued(&saved),
        );
        Ok(saved)
    }

    pub async fn revoke(
        &self,
        certification_id: &str,
        revoked_by: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Certification> {
        let mut cert = self.load(certification_id).await?;
        cert.revoke(revoked_by, reason, now)?;
        let saved = self.repository.update(cert).await?;

        log::warn!(
            "Revoked certificate {} by {}: {}",
            saved.certificate_number,
            revoked_by,
            reason
        );
        Ok(saved)
    }

    pub async fn annotate(
        &self,
        certification_id: &str,
        notes: Option<String>,
        metadata: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> AppResult<Certification> {
        let mut cert = self.load(certification_id).await?;
        cert.annotate(notes, metadata, now)?;
        self.repository.update(cert).await
    }

    pub async fn verify(
        &self,
        verification_code: &str,
        now: DateTime<Utc>,
    ) -> AppResult<VerificationResult> {
        let code = verification_code.trim().to_uppercase();
        let Some(cert) = self.repository.find_by_verification_code(&code).await? else {
            return Ok(VerificationResult::not_found());
        };

        let reason = match cert.status {
            CertificationStatus::Pending => Some("Certificate has not been issued yet".to_string()),
            CertificationStatus::Revoked => Some(format!(
                "Certificate was revoked: {}",
                cert.revoke_reason.as_deref().unwrap_or("no reason recorded")
            )),
            CertificationStatus::Issued if cert.is_expired(now) => {
                Some("Certificate has expired".to_string())
            }
            CertificationStatus::Issued => None,
        };

        Ok(VerificationResult {
            valid: reason.is_none(),
            reason,
            certificate_number: Some(cert.certificate_number),
            learner_name: Some(cert.metadata.learner_name),
            course_title: Some(cert.metadata.course_title),
            status: Some(cert.status),
            issued_at: cert.issued_at,
            expires_at: cert.expires_at,
        })
    }

    pub async fn find_for_course(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> AppResult<Option<Certification>> {
        self.repository
            .find_by_user_and_course(user_id, course_id)
            .await
    }

    pub async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<Certification>> {
        self.repository.list_by_user(user_id).await
    }

    pub async fn statistics(&self) -> AppResult<CertificationStatistics> {
        Ok(CertificationStatistics {
            total: self.repository.count_by_status(None).await?,
            pending: self
                .repository
                .count_by_status(Some(CertificationStatus::Pending))
                .await?,
            issued: self
                .repository
                .count_by_status(Some(CertificationStatus::Issued))
                .await?,
            revoked: self
                .repository
                .count_by_status(Some(CertificationStatus::Revoked))
                .await?,
        })
    }

    async fn load(&self, certification_id: &str) -> AppResult<Certification> {
        self.repository
            .find_by_id(certification_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Certification '{}' not found", certification_id))
            })
    }
}
