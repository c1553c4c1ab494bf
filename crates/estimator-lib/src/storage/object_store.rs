//! Object store backends
//!
//! Versions are opaque tags: a SHA-256 of the content for the local
//! backends, the server ETag for the HTTP backend. `put_if` compares
//! against that tag and fails with `Conflict` when another writer won.

use super::{error_for_status, ObjectStore, StoredObject};
use crate::error::{EstimatorError, Result};
use crate::predictor::{compute_checksum, write_atomic};
use async_trait::async_trait;
use reqwest::header::{ETAG, IF_MATCH, IF_NONE_MATCH};
use reqwest::{Client, Response};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use url::Url;

fn object_id(bucket: &str, key: &str) -> String {
    format!("{}/{}", bucket, key)
}

/// Reject keys that could escape the bucket
pub(super) fn check_key(bucket: &str, key: &str) -> Result<()> {
    for part in [bucket, key] {
        let path = Path::new(part);
        let safe = !part.is_empty()
            && path
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(EstimatorError::Validation(format!(
                "invalid object path '{}'",
                object_id(bucket, key)
            )));
        }
    }
    Ok(())
}

fn conflict(bucket: &str, key: &str) -> EstimatorError {
    EstimatorError::Conflict(object_id(bucket, key))
}

/// In-process store; used by tests and ephemeral runs
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject> {
        let objects = self.objects.read().await;
        objects
            .get(&object_id(bucket, key))
            .map(|data| StoredObject {
                version: compute_checksum(data),
                data: data.clone(),
            })
            .ok_or_else(|| EstimatorError::NotFound(object_id(bucket, key)))
    }

    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()> {
        self.objects
            .write()
            .await
            .insert(object_id(bucket, key), data);
        Ok(())
    }

    async fn put_if(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        expected: Option<&str>,
    ) -> Result<()> {
        let mut objects = self.objects.write().await;
        let id = object_id(bucket, key);
        let current = objects.get(&id).map(|d| compute_checksum(d));
        if current.as_deref() != expected {
            return Err(conflict(bucket, key));
        }
        objects.insert(id, data);
        Ok(())
    }
}

/// Store rooted at a local directory: `<root>/<bucket>/<key>`
///
/// Conditional writes are serialized within the process; the filesystem
/// backend is not meant to be shared by several processes.
pub struct FsObjectStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        check_key(bucket, key)?;
        Ok(self.root.join(bucket).join(key))
    }

    async fn read(&self, path: &Path, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(object = %object_id(bucket, key), "Object not present");
                Ok(None)
            }
            Err(e) => Err(EstimatorError::Io(e)),
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject> {
        let path = self.path_for(bucket, key)?;
        match self.read(&path, bucket, key).await? {
            Some(data) => Ok(StoredObject {
                version: compute_checksum(&data),
                data,
            }),
            None => Err(EstimatorError::NotFound(object_id(bucket, key))),
        }
    }

    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()> {
        let path = self.path_for(bucket, key)?;
        let _guard = self.write_lock.lock().await;
        write_atomic(&path, &data)
    }

    async fn put_if(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        expected: Option<&str>,
    ) -> Result<()> {
        let path = self.path_for(bucket, key)?;
        let _guard = self.write_lock.lock().await;
        let current = self
            .read(&path, bucket, key)
            .await?
            .map(|d| compute_checksum(&d));
        if current.as_deref() != expected {
            return Err(conflict(bucket, key));
        }
        write_atomic(&path, &data)
    }
}

/// Path-style HTTP object store (`{endpoint}/{bucket}/{key}`)
///
/// Authenticates with the access/secret key pair and uses `ETag`,
/// `If-Match` and `If-None-Match: *` for conditional writes.
pub struct HttpObjectStore {
    client: Client,
    endpoint: Url,
    access_key: String,
    secret_key: String,
}

impl HttpObjectStore {
    pub fn new(
        endpoint: Url,
        access_key: String,
        secret_key: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EstimatorError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint,
            access_key,
            secret_key,
        })
    }

    fn url_for(&self, bucket: &str, key: &str) -> Result<Url> {
        check_key(bucket, key)?;
        let raw = format!(
            "{}/{}/{}",
            self.endpoint.as_str().trim_end_matches('/'),
            bucket,
            key
        );
        Url::parse(&raw).map_err(|e| EstimatorError::Config(format!("invalid object URL: {}", e)))
    }

    fn check(response: Response, bucket: &str, key: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(error_for_status(status, object_id(bucket, key)))
        }
    }

    /// A 404 on a write means the bucket is gone, not that the object is absent
    fn check_write(response: Response, bucket: &str, key: &str) -> Result<()> {
        match Self::check(response, bucket, key) {
            Ok(_) => Ok(()),
            Err(EstimatorError::NotFound(what)) => Err(EstimatorError::Storage(format!(
                "{} rejected the write: bucket not found",
                what
            ))),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject> {
        let url = self.url_for(bucket, key)?;
        let response = self
            .client
            .get(url)
            .basic_auth(&self.access_key, Some(&self.secret_key))
            .send()
            .await?;
        let response = Self::check(response, bucket, key)?;

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let data = response.bytes().await?.to_vec();
        Ok(StoredObject {
            version: etag.unwrap_or_else(|| compute_checksum(&data)),
            data,
        })
    }

    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()> {
        let url = self.url_for(bucket, key)?;
        let response = self
            .client
            .put(url)
            .basic_auth(&self.access_key, Some(&self.secret_key))
            .body(data)
            .send()
            .await?;
        Self::check_write(response, bucket, key)
    }

    async fn put_if(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        expected: Option<&str>,
    ) -> Result<()> {
        let url = self.url_for(bucket, key)?;
        let request = self
            .client
            .put(url)
            .basic_auth(&self.access_key, Some(&self.secret_key))
            .body(data);
        let request = match expected {
            Some(version) => request.header(IF_MATCH, version),
            None => request.header(IF_NONE_MATCH, "*"),
        };
        let response = request.send().await?;
        Self::check_write(response, bucket, key)
    }
}
