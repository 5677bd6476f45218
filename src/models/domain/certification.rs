use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    errors::{AppError, AppResult},
    models::domain::task_progress::TaskProgress,
};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificationStatus {
    Pending,
    Issued,
    Revoked,
}

impl CertificationStatus {
    /// Stored representation, used when filtering on status.
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificationStatus::Pending => "PENDING",
            CertificationStatus::Issued => "ISSUED",
            CertificationStatus::Revoked => "REVOKED",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, Copy)]
#[serde(rename_all = "snake_case")]
pub enum CertificationTrigger {
    CourseCompletion,
    TaskValidation,
}

/// Presentation data frozen at creation so later profile or catalog edits do
/// not change a pending certificate.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct CertificationMetadata {
    pub learner_name: String,
    pub course_title: String,
    pub enrolled_at: Option<DateTime<Utc>>,
}

/// Completion state captured when the certification is requested.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct CompletionSnapshot {
    pub enrollment_id: Option<String>,
    pub completion_percentage: f64,
    pub overall_score: f64,
    pub task_progress: TaskProgress,
    pub trigger: CertificationTrigger,
    pub metadata: CertificationMetadata,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Certification {
    pub id: String,
    pub certificate_number: String,
    pub verification_code: String,
    pub user_id: String,
    pub course_id: String,
    pub enrollment_id: Option<String>,
    pub status: CertificationStatus,
    pub trigger: CertificationTrigger,
    pub completion_percentage: f64,
    pub overall_score: f64,
    pub task_progress: TaskProgress,
    pub metadata: CertificationMetadata,
    pub reviewer_notes: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub issued_at: Option<DateTime<Utc>>,
    pub issued_by: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<String>,
    pub revoke_reason: Option<String>,
    /// Informational only; the one field besides notes that stays writable after issue.
    pub annotations: serde_json::Value,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Certification {
    pub fn new_pending(
        user_id: &str,
        course_id: &str,
        snapshot: CompletionSnapshot,
        number_prefix: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        let certificate_number = certificate_number(number_prefix, &id, now);
        let verification_code = verification_code(&id, user_id, course_id);

        Certification {
            id,
            certificate_number,
            verification_code,
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            enrollment_id: snapshot.enrollment_id,
            status: CertificationStatus::Pending,
            trigger: snapshot.trigger,
            completion_percentage: snapshot.completion_percentage.clamp(0.0, 100.0),
            overall_score: snapshot.overall_score,
            task_progress: snapshot.task_progress,
            metadata: snapshot.metadata,
            reviewer_notes: None,
            reviewed_by: None,
            reviewed_at: None,
            issued_at: None,
            issued_by: None,
            expires_at: None,
            revoked_at: None,
            revoked_by: None,
            revoke_reason: None,
            annotations: serde_json::Value::Object(Default::default()),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// PENDING -> ISSUED. Issuance metadata is written once and never replaced.
    pub fn issue(
        &mut self,
        issued_by: &str,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        match self.status {
            CertificationStatus::Pending => {}
            CertificationStatus::Issued => {
                return Err(AppError::InvalidState(format!(
                    "Certification '{}' is already issued",
                    self.id
                )))
            }
            CertificationStatus::Revoked => {
                return Err(AppError::InvalidState(format!(
                    "Certification '{}' is revoked and cannot be issued",
                    self.id
                )))
            }
        }
        if self.issued_at.is_some() || self.issued_by.is_some() {
            return Err(AppError::InvalidState(format!(
                "Certification '{}' already carries issuance metadata",
                self.id
            )));
        }
        if let Some(expiry) = expires_at {
            if expiry <= now {
                return Err(AppError::ValidationError(
                    "Expiry must be in the future".to_string(),
                ));
            }
        }

        self.status = CertificationStatus::Issued;
        self.issued_at = Some(now);
        self.issued_by = Some(issued_by.to_string());
        self.reviewed_by.get_or_insert_with(|| issued_by.to_string());
        self.reviewed_at.get_or_insert(now);
        self.expires_at = expires_at;
        self.updated_at = now;
        Ok(())
    }

    /// PENDING or ISSUED -> REVOKED.
    pub fn revoke(&mut self, revoked_by: &str, reason: &str, now: DateTime<Utc>) -> AppResult<()> {
        if self.status == CertificationStatus::Revoked {
            return Err(AppError::InvalidState(format!(
                "Certification '{}' is already revoked",
                self.id
            )));
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::ValidationError(
                "A revocation reason is required".to_string(),
            ));
        }

        self.status = CertificationStatus::Revoked;
        self.revoked_at = Some(now);
        self.revoked_by = Some(revoked_by.to_string());
        self.revoke_reason = Some(reason.to_string());
        self.updated_at = now;
        Ok(())
    }

    /// Notes and informational metadata; allowed in every state.
    pub fn annotate(
        &mut self,
        notes: Option<String>,
        annotations: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if let Some(value) = &annotations {
            if !value.is_object() {
                return Err(AppError::ValidationError(
                    "Annotations must be a JSON object".to_string(),
                ));
            }
        }
        if let Some(notes) = notes {
            self.reviewer_notes = Some(notes.trim().to_string()).filter(|n| !n.is_empty());
        }
        if let Some(serde_json::Value::Object(incoming)) = annotations {
            if let serde_json::Value::Object(existing) = &mut self.annotations {
                existing.extend(incoming);
            } else {
                self.annotations = serde_json::Value::Object(incoming);
            }
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|expiry| expiry <= now).unwrap_or(false)
    }
}

fn certificate_number(prefix: &str, id: &str, now: DateTime<Utc>) -> String {
    let suffix: String = id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect::<String>()
        .to_uppercase();
    format!("{}-{}-{}", prefix, now.format("%Y%m%d"), suffix)
}

/// Public lookup code; derived from the row identity so it is stable and unguessable
/// without the id.
fn verification_code(id: &str, user_id: &str, course_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update(b":");
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(course_id.as_bytes());
    let digest = hasher.finalize();

    digest
        .iter()
        .take(6)
        .map(|byte| format!("{:02X}", byte))
        .collect()
}
