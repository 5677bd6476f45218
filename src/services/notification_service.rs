use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Serialize;

use crate::{
    errors::{AppError, AppResult},
    models::domain::{certification::Certification, enrollment::Enrollment},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    CertificationPending {
        certification_id: String,
        user_id: String,
        course_id: String,
        learner_name: String,
        course_title: String,
    },
    CertificateIssued {
        certification_id: String,
        user_id: String,
        course_id: String,
        certificate_number: String,
        verification_code: String,
    },
    EnrollmentCreated {
        enrollment_id: String,
        user_id: String,
        course_id: String,
        course_title: String,
    },
}

impl NotificationEvent {
    pub fn certification_pending(cert: &Certification) -> Self {
        NotificationEvent::CertificationPending {
            certification_id: cert.id.clone(),
            user_id: cert.user_id.clone(),
            course_id: cert.course_id.clone(),
            learner_name: cert.metadata.learner_name.clone(),
            course_title: cert.metadata.course_title.clone(),
        }
    }

    pub fn certificate_issued(cert: &Certification) -> Self {
        NotificationEvent::CertificateIssued {
            certification_id: cert.id.clone(),
            user_id: cert.user_id.clone(),
            course_id: cert.course_id.clone(),
            certificate_number: cert.certificate_number.clone(),
            verification_code: cert.verification_code.clone(),
        }
    }

    pub fn enrollment_created(enrollment: &Enrollment) -> Self {
        NotificationEvent::EnrollmentCreated {
            enrollment_id: enrollment.id.clone(),
            user_id: enrollment.user_id.clone(),
            course_id: enrollment.course_id.clone(),
            course_title: enrollment.course_title.clone(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NotificationEvent::CertificationPending { .. } => "certification_pending",
            NotificationEvent::CertificateIssued { .. } => "certificate_issued",
            NotificationEvent::EnrollmentCreated { .. } => "enrollment_created",
        }
    }
}

/// Outbound side channel for learner-facing events (email, chat, ...).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotificationEvent) -> AppResult<()>;
}

/// Fire and forget: the event is delivered on a detached task and a failure is
/// only logged. State changes that raised the event are never rolled back.
pub fn dispatch(notifier: Arc<dyn Notifier>, event: NotificationEvent) {
    tokio::spawn(async move {
        let name = event.name();
        match notifier.notify(event).await {
            Ok(()) => log::debug!("Delivered {} notification", name),
            Err(e) => log::warn!("Failed to deliver {} notification: {}", name, e),
        }
    });
}

/// Default notifier when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: NotificationEvent) -> AppResult<()> {
        log::info!("Notification {}: {:?}", event.name(), event);
        Ok(())
    }
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::InternalError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: NotificationEvent) -> AppResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&event)
            .send()
            .await
            .map_err(|e| AppError::InternalError(format!("Webhook request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::InternalError(format!(
                "Webhook responded with {} for {}",
                status,
                event.name()
            )));
        }
        Ok(())
    }
}

/// Picks the webhook notifier when a URL is configured, otherwise logs.
pub fn notifier_from_url(url: Option<&str>) -> AppResult<Arc<dyn Notifier>> {
    match url {
        Some(url) => {
            log::info!("Notifications will be posted to {}", url);
            Ok(Arc::new(WebhookNotifier::new(url)?))
        }
        None => Ok(Arc::new(LogNotifier)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    fn enrollment_event() -> NotificationEvent {
        NotificationEvent::EnrollmentCreated {
            enrollment_id: "enrollment-1".to_string(),
            user_id: "user-1".to_string(),
            course_id: "course-1".to_string(),
            course_title: "Rust Basics".to_string(),
        }
    }

    #[test]
    fn event_serializes_with_tag() {
        let json = serde_json::to_value(enrollment_event()).expect("serialize");
        assert_eq!(json["event"], "enrollment_created");
        assert_eq!(json["course_title"], "Rust Basics");
    }

    #[tokio::test]
    async fn dispatch_delivers_event_to_notifier() {
        let (tx, rx) = oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));

        let mut mock = MockNotifier::new();
        mock.expect_notify().times(1).returning(move |event| {
            if let Some(sender) = tx.lock().ok().and_then(|mut guard| guard.take()) {
                let _ = sender.send(event);
            }
            Ok(())
        });

        dispatch(Arc::new(mock), enrollment_event());

        let delivered = tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("notification delivered in time")
            .expect("sender kept alive");
        assert_eq!(delivered, enrollment_event());
    }

    #[tokio::test]
    async fn dispatch_swallows_notifier_failure() {
        let mut mock = MockNotifier::new();
        mock.expect_notify()
            .returning(|_| Err(AppError::InternalError("smtp down".to_string())));

        dispatch(Arc::new(mock), enrollment_event());
        tokio::task::yield_now().await;
    }

    #[test]
    fn notifier_from_url_defaults_to_logging() {
        assert!(notifier_from_url(None).is_ok());
        assert!(notifier_from_url(Some("http://localhost:9/hooks")).is_ok());
    }
}
