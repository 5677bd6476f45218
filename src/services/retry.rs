use std::{future::Future, time::Duration};

use crate::{
    config::Config,
    errors::{AppError, AppResult},
};

/// Bounded retries of optimistic-concurrency conflicts plus an overall deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_conflict_retries,
            backoff: config.conflict_backoff(),
            timeout: config.operation_timeout(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs `operation` again while it reports `ConflictRetryable`, backing off
    /// linearly between tries. Every other outcome is returned as is.
    pub async fn retry<T, F, Fut>(&self, name: &str, mut operation: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match operation().await {
                Err(AppError::ConflictRetryable(reason)) if attempt < self.max_retries => {
                    attempt += 1;
                    log::debug!(
                        "{} hit a write conflict ({}), retry {}/{}",
                        name,
                        reason,
                        attempt,
                        self.max_retries
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(AppError::ConflictRetryable(reason)) => {
                    log::warn!(
                        "{} gave up after {} conflict retries: {}",
                        name,
                        self.max_retries,
                        reason
                    );
                    return Err(AppError::ConflictRetryable(reason));
                }
                other => return other,
            }
        }
    }

    /// Fails with `Timeout` if `work` has not finished in time. The work is
    /// dropped, and so cancelled, at that point.
    pub async fn deadline<T, Fut>(&self, name: &str, work: Fut) -> AppResult<T>
    where
        Fut: Future<Output = AppResult<T>>,
    {
        match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("{} timed out after {:?}", name, self.timeout);
                Err(AppError::Timeout(format!(
                    "{} did not finish within {}ms",
                    name,
                    self.timeout.as_millis()
                )))
            }
        }
    }

    /// `retry` under `deadline`.
    pub async fn run<T, F, Fut>(&self, name: &str, operation: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        self.deadline(name, self.retry(name, operation)).await
    }
}
