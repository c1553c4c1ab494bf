//! Timeout and backoff policy for remote calls
//!
//! Every registry and object store call is bounded by a timeout. Timeouts
//! and network failures are `StorageTransient` and retried with
//! exponential backoff until the attempt budget is spent.

use super::{ModelRegistry, ObjectStore, RegisteredModel, StoredObject};
use crate::config::Settings;
use crate::error::{EstimatorError, Result};
use crate::observability::EstimatorMetrics;
use crate::predictor::TrainedModel;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Timeout applied to each attempt
    pub request_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            request_timeout: Duration::from_secs(10),
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            ..Default::default()
        }
    }

    /// Backoff before the given retry (1-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        std::cmp::min(self.initial_backoff.saturating_mul(factor), self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let outcome = match tokio::time::timeout(self.request_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(EstimatorError::StorageTransient(format!(
                    "{} timed out after {:?}",
                    operation, self.request_timeout
                ))),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Remote call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let backoff = self.backoff_for(attempt);
                    EstimatorMetrics::new().inc_storage_retries();
                    warn!(
                        operation,
                        error = %e,
                        attempt,
                        max_attempts = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "Remote call failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Object store decorator applying a [`RetryPolicy`]
pub struct RetryingObjectStore {
    inner: Arc<dyn ObjectStore>,
    policy: RetryPolicy,
}

impl RetryingObjectStore {
    pub fn new(inner: Arc<dyn ObjectStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl ObjectStore for RetryingObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject> {
        self.policy
            .run("object_store.get", || self.inner.get(bucket, key))
            .await
    }

    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()> {
        self.policy
            .run("object_store.put", || self.inner.put(bucket, key, data.clone()))
            .await
    }

    async fn put_if(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        expected: Option<&str>,
    ) -> Result<()> {
        self.policy
            .run("object_store.put_if", || {
                self.inner.put_if(bucket, key, data.clone(), expected)
            })
            .await
    }
}

/// Registry decorator applying a [`RetryPolicy`]
pub struct RetryingRegistry {
    inner: Arc<dyn ModelRegistry>,
    policy: RetryPolicy,
}

impl RetryingRegistry {
    pub fn new(inner: Arc<dyn ModelRegistry>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl ModelRegistry for RetryingRegistry {
    async fn publish(&self, model: &TrainedModel, name: &str) -> Result<String> {
        self.policy
            .run("registry.publish", || self.inner.publish(model, name))
            .await
    }

    async fn fetch(&self, name: &str, stage: &str) -> Result<RegisteredModel> {
        self.policy
            .run("registry.fetch", || self.inner.fetch(name, stage))
            .await
    }

    async fn promote(&self, name: &str, version: &str, stage: &str) -> Result<()> {
        self.policy
            .run("registry.promote", || self.inner.promote(name, version, stage))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            request_timeout: Duration::from_millis(50),
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(300),
            ..Default::default()
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(300));
        assert_eq!(policy.backoff_for(10), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_transient_failures_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(3)
            .run("flaky", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(EstimatorError::StorageTransient("reset".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy(2)
            .run("down", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EstimatorError::StorageTransient("down".into()))
            })
            .await;
        assert!(matches!(result, Err(EstimatorError::StorageTransient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy(5)
            .run("missing", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EstimatorError::NotFound("feedback.csv".into()))
            })
            .await;
        assert!(matches!(result, Err(EstimatorError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy(2)
            .run("slow", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        match result {
            Err(EstimatorError::StorageTransient(msg)) => assert!(msg.contains("timed out")),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
