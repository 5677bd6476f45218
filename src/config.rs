use std::{env, time::Duration};

use secrecy::SecretString;

use crate::errors::{AppError, AppResult};

#[derive(Clone, Debug)]
pub struct Config {
    pub mongo_conn_string: SecretString,
    pub mongo_db_name: String,
    pub operation_timeout_ms: u64,
    pub max_conflict_retries: u32,
    pub conflict_backoff_ms: u64,
    pub certificate_validity_days: Option<i64>,
    pub certificate_number_prefix: String,
    pub task_unlock_threshold: f64,
    pub notification_webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            mongo_conn_string: SecretString::from(
                env::var("MONGO_CONN_STRING")
                    .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            ),
            mongo_db_name: env::var("MONGO_DB_NAME")
                .unwrap_or_else(|_| "course-progress-local".to_string()),
            operation_timeout_ms: parse_env("OPERATION_TIMEOUT_MS").unwrap_or(5_000),
            max_conflict_retries: parse_env("MAX_CONFLICT_RETRIES").unwrap_or(3),
            conflict_backoff_ms: parse_env("CONFLICT_BACKOFF_MS").unwrap_or(25),
            certificate_validity_days: parse_env("CERTIFICATE_VALIDITY_DAYS"),
            certificate_number_prefix: env::var("CERTIFICATE_NUMBER_PREFIX")
                .unwrap_or_else(|_| "CERT".to_string()),
            task_unlock_threshold: parse_env("TASK_UNLOCK_THRESHOLD").unwrap_or(90.0),
            notification_webhook_url: env::var("NOTIFICATION_WEBHOOK_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
        }
    }

    /// Reject configuration the engine cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        if self.mongo_db_name.trim().is_empty() {
            return Err(AppError::ValidationError(
                "MONGO_DB_NAME must not be empty".to_string(),
            ));
        }

        if self.operation_timeout_ms == 0 {
            return Err(AppError::ValidationError(
                "OPERATION_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }

        if !(0.0..=100.0).contains(&self.task_unlock_threshold) {
            return Err(AppError::ValidationError(format!(
                "TASK_UNLOCK_THRESHOLD must be within 0..=100, got {}",
                self.task_unlock_threshold
            )));
        }

        if let Some(days) = self.certificate_validity_days {
            if days <= 0 {
                return Err(AppError::ValidationError(format!(
                    "CERTIFICATE_VALIDITY_DAYS must be positive, got {}",
                    days
                )));
            }
        }

        Ok(())
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn conflict_backoff(&self) -> Duration {
        Duration::from_millis(self.conflict_backoff_ms)
    }

    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            mongo_conn_string: SecretString::from("mongodb://localhost:27017".to_string()),
            mongo_db_name: "course-progress-test".to_string(),
            operation_timeout_ms: 1_000,
            max_conflict_retries: 3,
            conflict_backoff_ms: 1,
            certificate_validity_days: None,
            certificate_number_prefix: "TEST".to_string(),
            task_unlock_threshold: 90.0,
            notification_webhook_url: None,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|raw| raw.trim().parse().ok())
}
