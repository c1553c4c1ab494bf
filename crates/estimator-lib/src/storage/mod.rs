//! Remote storage collaborators
//!
//! This module provides:
//! - Object store abstraction with versioned conditional writes
//! - Model registry abstraction (publish / fetch by stage / promote)
//! - Filesystem, in-memory and HTTP backends
//! - Bounded timeout and exponential backoff around every remote call

mod object_store;
mod registry;
mod retry;

pub use object_store::{FsObjectStore, HttpObjectStore, MemoryObjectStore};
pub use registry::{FsModelRegistry, HttpModelRegistry};
pub use retry::{RetryPolicy, RetryingObjectStore, RetryingRegistry};

use crate::config::{Backend, Settings};
use crate::error::{EstimatorError, Result};
use crate::predictor::TrainedModel;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;

/// Stage that inference resolves by default
pub const PRODUCTION_STAGE: &str = "production";

/// Object contents plus the version tag observed when reading them
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    /// Content hash or ETag; opaque to callers
    pub version: String,
}

/// Minimal object store contract
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object; `NotFound` when absent
    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject>;

    /// Overwrite an object unconditionally
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()>;

    /// Overwrite only if the current version equals `expected`
    /// (`None` means the object must not exist yet); `Conflict` otherwise
    async fn put_if(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        expected: Option<&str>,
    ) -> Result<()>;
}

/// A model resolved from the registry together with its version
#[derive(Debug, Clone)]
pub struct RegisteredModel {
    pub name: String,
    pub version: String,
    pub model: TrainedModel,
}

/// Model registry contract; versioning and promotion are owned by the registry
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Register a new version of `name`, returning its version id
    async fn publish(&self, model: &TrainedModel, name: &str) -> Result<String>;

    /// Resolve the version currently assigned to `stage`
    async fn fetch(&self, name: &str, stage: &str) -> Result<RegisteredModel>;

    /// Operator action: assign `version` to `stage`
    async fn promote(&self, name: &str, version: &str, stage: &str) -> Result<()>;
}

/// Build the object store selected by the settings, wrapped in the retry policy
pub fn object_store_from_settings(settings: &Settings) -> Result<Arc<dyn ObjectStore>> {
    let policy = RetryPolicy::from_settings(settings);
    let store: Arc<dyn ObjectStore> = match settings.store_backend()? {
        Backend::Filesystem(root) => Arc::new(FsObjectStore::new(root)?),
        Backend::Http(url) => Arc::new(HttpObjectStore::new(
            url,
            settings.access_key.clone().unwrap_or_default(),
            settings.secret_key.clone().unwrap_or_default(),
            policy.request_timeout,
        )?),
    };
    Ok(Arc::new(RetryingObjectStore::new(store, policy)))
}

/// Build the model registry selected by the settings, wrapped in the retry policy
pub fn registry_from_settings(settings: &Settings) -> Result<Arc<dyn ModelRegistry>> {
    let policy = RetryPolicy::from_settings(settings);
    let registry: Arc<dyn ModelRegistry> = match settings.registry_backend()? {
        Backend::Filesystem(root) => Arc::new(FsModelRegistry::new(root)?),
        Backend::Http(url) => Arc::new(HttpModelRegistry::new(url, policy.request_timeout)?),
    };
    Ok(Arc::new(RetryingRegistry::new(registry, policy)))
}

/// Map a non-success HTTP status to the error taxonomy
pub(crate) fn error_for_status(status: StatusCode, what: String) -> EstimatorError {
    match status {
        StatusCode::NOT_FOUND => EstimatorError::NotFound(what),
        StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => EstimatorError::Conflict(what),
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            EstimatorError::StorageTransient(format!("{} returned {}", what, s))
        }
        s => EstimatorError::Storage(format!("{} returned {}", what, s)),
    }
}
