//! Model registry backends
//!
//! Versions are assigned by the registry. A stage (e.g. `production`)
//! points at exactly one version and only moves on explicit promotion.

use super::object_store::check_key;
use super::{error_for_status, ModelRegistry, RegisteredModel};
use crate::error::{EstimatorError, Result};
use crate::predictor::{compute_checksum, verify_checksum, write_atomic, TrainedModel};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;
use url::Url;

/// Registry laid out on disk:
///
/// ```text
/// <root>/<name>/versions/<n>/model.json (+ .sha256)
/// <root>/<name>/stages/<stage>          (contains the version id)
/// ```
pub struct FsModelRegistry {
    root: PathBuf,
    publish_lock: Mutex<()>,
}

impl FsModelRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            publish_lock: Mutex::new(()),
        })
    }

    fn versions_dir(&self, name: &str) -> PathBuf {
        self.root.join(name).join("versions")
    }

    fn artifact_path(&self, name: &str, version: &str) -> PathBuf {
        self.versions_dir(name).join(version).join("model.json")
    }

    fn stage_path(&self, name: &str, stage: &str) -> PathBuf {
        self.root.join(name).join("stages").join(stage)
    }

    fn latest_version(&self, name: &str) -> Result<u64> {
        let dir = self.versions_dir(name);
        if !dir.exists() {
            return Ok(0);
        }
        let mut latest = 0;
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(n) = entry
                .file_name()
                .to_str()
                .and_then(|s| s.parse::<u64>().ok())
            {
                latest = latest.max(n);
            }
        }
        Ok(latest)
    }
}

#[async_trait]
impl ModelRegistry for FsModelRegistry {
    async fn publish(&self, model: &TrainedModel, name: &str) -> Result<String> {
        check_key(name, "versions")?;
        let _guard = self.publish_lock.lock().await;
        let version = (self.latest_version(name)? + 1).to_string();
        let checksum = model.save_to_file(&self.artifact_path(name, &version))?;
        info!(
            model_name = name,
            version = %version,
            checksum = %checksum,
            "Model version registered"
        );
        Ok(version)
    }

    async fn fetch(&self, name: &str, stage: &str) -> Result<RegisteredModel> {
        check_key(name, stage)?;
        let stage_path = self.stage_path(name, stage);
        let version = match tokio::fs::read_to_string(&stage_path).await {
            Ok(v) => v.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EstimatorError::NotFound(format!(
                    "no version of '{}' in stage '{}'",
                    name, stage
                )))
            }
            Err(e) => return Err(EstimatorError::Io(e)),
        };
        check_key(name, &version)?;
        let model = TrainedModel::load_from_file(&self.artifact_path(name, &version))?;
        Ok(RegisteredModel {
            name: name.to_string(),
            version,
            model,
        })
    }

    async fn promote(&self, name: &str, version: &str, stage: &str) -> Result<()> {
        check_key(name, version)?;
        check_key(name, stage)?;
        if !self.artifact_path(name, version).exists() {
            return Err(EstimatorError::NotFound(format!(
                "version {} of '{}'",
                version, name
            )));
        }
        write_atomic(&self.stage_path(name, stage), version.as_bytes())?;
        info!(model_name = name, version, stage, "Model version promoted");
        Ok(())
    }
}

/// Artifact exchanged with the HTTP registry; the checksum covers the
/// exact artifact text so the transfer is verified byte for byte
#[derive(Debug, Serialize, Deserialize)]
struct ArtifactPayload {
    artifact: String,
    checksum: String,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    version: String,
}

#[derive(Debug, Deserialize)]
struct StageResponse {
    version: String,
    artifact: String,
    #[serde(default)]
    checksum: Option<String>,
}

#[derive(Debug, Serialize)]
struct PromoteRequest<'a> {
    stage: &'a str,
}

/// Registry served over HTTP
///
/// - `POST {uri}/api/models/{name}/versions` registers a version
/// - `GET  {uri}/api/models/{name}/stages/{stage}` resolves a stage
/// - `POST {uri}/api/models/{name}/versions/{version}/stage` promotes
pub struct HttpModelRegistry {
    client: Client,
    base_url: Url,
}

impl HttpModelRegistry {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EstimatorError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url> {
        let raw = format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path);
        Url::parse(&raw).map_err(|e| EstimatorError::Config(format!("invalid registry URL: {}", e)))
    }

    fn check(response: Response, what: String) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(error_for_status(status, what))
        }
    }
}

#[async_trait]
impl ModelRegistry for HttpModelRegistry {
    async fn publish(&self, model: &TrainedModel, name: &str) -> Result<String> {
        check_key(name, "versions")?;
        let bytes = model.to_bytes()?;
        let payload = ArtifactPayload {
            checksum: compute_checksum(&bytes),
            artifact: String::from_utf8(bytes)
                .map_err(|e| EstimatorError::ArtifactCorrupt(e.to_string()))?,
        };
        let response = self
            .client
            .post(self.url(&format!("/api/models/{}/versions", name))?)
            .json(&payload)
            .send()
            .await?;
        let response = Self::check(response, format!("model '{}'", name))?;
        let published: PublishResponse = response
            .json()
            .await
            .map_err(|e| EstimatorError::Storage(format!("invalid registry response: {}", e)))?;
        info!(
            model_name = name,
            version = %published.version,
            checksum = %payload.checksum,
            "Model version registered"
        );
        Ok(published.version)
    }

    async fn fetch(&self, name: &str, stage: &str) -> Result<RegisteredModel> {
        check_key(name, stage)?;
        let response = self
            .client
            .get(self.url(&format!("/api/models/{}/stages/{}", name, stage))?)
            .send()
            .await?;
        let response = Self::check(response, format!("model '{}' stage '{}'", name, stage))?;
        let resolved: StageResponse = response
            .json()
            .await
            .map_err(|e| EstimatorError::ArtifactCorrupt(format!("invalid registry response: {}", e)))?;

        if let Some(checksum) = &resolved.checksum {
            verify_checksum(resolved.artifact.as_bytes(), checksum)?;
        }
        let model = TrainedModel::from_bytes(resolved.artifact.as_bytes())?;
        Ok(RegisteredModel {
            name: name.to_string(),
            version: resolved.version,
            model,
        })
    }

    async fn promote(&self, name: &str, version: &str, stage: &str) -> Result<()> {
        check_key(name, version)?;
        let response = self
            .client
            .post(self.url(&format!("/api/models/{}/versions/{}/stage", name, version))?)
            .json(&PromoteRequest { stage })
            .send()
            .await?;
        Self::check(response, format!("model '{}' version {}", name, version))?;
        info!(model_name = name, version, stage, "Model version promoted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_model(intercept: f64) -> TrainedModel {
        TrainedModel::from_coefficients(
            intercept,
            [1000.0, 500.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2000.0, -1000.0],
        )
    }

    #[tokio::test]
    async fn test_fs_publish_assigns_increasing_versions() {
        let dir = TempDir::new().unwrap();
        let registry = FsModelRegistry::new(dir.path()).unwrap();
        let v1 = registry.publish(&sample_model(1.0), "apartments").await.unwrap();
        let v2 = registry.publish(&sample_model(2.0), "apartments").await.unwrap();
        assert_eq!(v1, "1");
        assert_eq!(v2, "2");
    }

    #[tokio::test]
    async fn test_fs_publish_does_not_move_stage() {
        let dir = TempDir::new().unwrap();
        let registry = FsModelRegistry::new(dir.path()).unwrap();
        let v1 = registry.publish(&sample_model(1.0), "apartments").await.unwrap();
        assert!(matches!(
            registry.fetch("apartments", "production").await,
            Err(EstimatorError::NotFound(_))
        ));

        registry.promote("apartments", &v1, "production").await.unwrap();
        registry.publish(&sample_model(2.0), "apartments").await.unwrap();

        let resolved = registry.fetch("apartments", "production").await.unwrap();
        assert_eq!(resolved.version, "1");
        assert_eq!(resolved.model.intercept, 1.0);
    }

    #[tokio::test]
    async fn test_fs_promote_unknown_version() {
        let dir = TempDir::new().unwrap();
        let registry = FsModelRegistry::new(dir.path()).unwrap();
        assert!(matches!(
            registry.promote("apartments", "7", "production").await,
            Err(EstimatorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_http_fetch_verifies_checksum() {
        let model = sample_model(10_000.0);
        let artifact = String::from_utf8(model.to_bytes().unwrap()).unwrap();
        let body = serde_json::json!({
            "version": "4",
            "artifact": artifact,
            "checksum": compute_checksum(artifact.as_bytes()),
        });

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/models/apartments/stages/production")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let registry =
            HttpModelRegistry::new(Url::parse(&server.url()).unwrap(), Duration::from_secs(5))
                .unwrap();
        let resolved = registry.fetch("apartments", "production").await.unwrap();
        assert_eq!(resolved.version, "4");
        assert_eq!(resolved.model, model);
    }

    #[tokio::test]
    async fn test_http_fetch_rejects_bad_checksum() {
        let artifact = String::from_utf8(sample_model(1.0).to_bytes().unwrap()).unwrap();
        let body = serde_json::json!({
            "version": "4",
            "artifact": artifact,
            "checksum": "0000",
        });

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/models/apartments/stages/production")
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let registry =
            HttpModelRegistry::new(Url::parse(&server.url()).unwrap(), Duration::from_secs(5))
                .unwrap();
        assert!(matches!(
            registry.fetch("apartments", "production").await,
            Err(EstimatorError::ArtifactCorrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_http_publish_returns_registry_version() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/models/apartments/versions")
            .match_body(mockito::Matcher::Regex("\"checksum\"".into()))
            .with_status(201)
            .with_body(r#"{"version":"12"}"#)
            .create_async()
            .await;

        let registry =
            HttpModelRegistry::new(Url::parse(&server.url()).unwrap(), Duration::from_secs(5))
                .unwrap();
        let version = registry.publish(&sample_model(1.0), "apartments").await.unwrap();
        assert_eq!(version, "12");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/models/apartments/versions/3/stage")
            .with_status(502)
            .create_async()
            .await;

        let registry =
            HttpModelRegistry::new(Url::parse(&server.url()).unwrap(), Duration::from_secs(5))
                .unwrap();
        assert!(matches!(
            registry.promote("apartments", "3", "production").await,
            Err(EstimatorError::StorageTransient(_))
        ));
    }
}
