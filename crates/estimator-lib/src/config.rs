//! Explicit configuration
//!
//! Settings come from an optional file (`ape.toml`, or the path in
//! `APE_CONFIG`) overlaid by `APE_*` environment variables. Validation
//! reports every missing or malformed option at once.

use crate::error::{EstimatorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use url::Url;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "APE";

/// Environment variable naming an explicit settings file
pub const CONFIG_PATH_VAR: &str = "APE_CONFIG";

/// Where a collaborator lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Filesystem(PathBuf),
    Http(Url),
}

/// Estimator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// `file://<dir>` or `http(s)://…`
    #[serde(default)]
    pub registry_uri: Option<String>,

    #[serde(default = "default_model_name")]
    pub model_name: String,

    #[serde(default = "default_model_stage")]
    pub model_stage: String,

    /// `file://<dir>` or `http(s)://…`
    #[serde(default)]
    pub store_endpoint: Option<String>,

    #[serde(default)]
    pub access_key: Option<String>,

    #[serde(default)]
    pub secret_key: Option<String>,

    #[serde(default = "default_feedback_bucket")]
    pub feedback_bucket: String,

    #[serde(default = "default_feedback_key")]
    pub feedback_key: String,

    /// Local model artifact written by training and used as offline fallback
    #[serde(default = "default_artifact_path")]
    pub artifact_path: PathBuf,

    /// Persisted feedback outbox; in-memory when unset
    #[serde(default)]
    pub outbox_path: Option<PathBuf>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_model_name() -> String {
    "apartment-price-regression".to_string()
}

fn default_model_stage() -> String {
    crate::storage::PRODUCTION_STAGE.to_string()
}

fn default_feedback_bucket() -> String {
    "feedback".to_string()
}

fn default_feedback_key() -> String {
    "feedback.csv".to_string()
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from("model.json")
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    200
}

fn default_api_port() -> u16 {
    8080
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            registry_uri: None,
            model_name: default_model_name(),
            model_stage: default_model_stage(),
            store_endpoint: None,
            access_key: None,
            secret_key: None,
            feedback_bucket: default_feedback_bucket(),
            feedback_key: default_feedback_key(),
            artifact_path: default_artifact_path(),
            outbox_path: None,
            request_timeout_secs: default_request_timeout(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            api_port: default_api_port(),
        }
    }
}

impl Settings {
    /// Load from the settings file and the process environment (not validated)
    pub fn load() -> Result<Self> {
        Self::build(std::env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from), None)
    }

    /// Load from an explicit variable map instead of the process environment
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::build(None, Some(vars))
    }

    fn build(file: Option<PathBuf>, vars: Option<HashMap<String, String>>) -> Result<Self> {
        let file_source = match file {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("ape").required(false),
        };
        let env_source = config::Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .source(vars);

        config::Config::builder()
            .add_source(file_source)
            .add_source(env_source)
            .build()
            .and_then(|c| c.try_deserialize::<Settings>())
            .map_err(|e| EstimatorError::Config(e.to_string()))
    }

    /// Load and validate; used at service startup
    pub fn load_validated() -> Result<Self> {
        let settings = Self::load()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check that every required option is present and well formed
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        match &self.registry_uri {
            None => problems.push(format!("{}_REGISTRY_URI is required", ENV_PREFIX)),
            Some(uri) => {
                if let Err(e) = parse_backend(uri) {
                    problems.push(format!("{}_REGISTRY_URI: {}", ENV_PREFIX, e));
                }
            }
        }

        match &self.store_endpoint {
            None => problems.push(format!("{}_STORE_ENDPOINT is required", ENV_PREFIX)),
            Some(uri) => match parse_backend(uri) {
                Ok(Backend::Http(_)) => {
                    if self.access_key.as_deref().map_or(true, str::is_empty) {
                        problems.push(format!("{}_ACCESS_KEY is required", ENV_PREFIX));
                    }
                    if self.secret_key.as_deref().map_or(true, str::is_empty) {
                        problems.push(format!("{}_SECRET_KEY is required", ENV_PREFIX));
                    }
                }
                Ok(Backend::Filesystem(_)) => {}
                Err(e) => problems.push(format!("{}_STORE_ENDPOINT: {}", ENV_PREFIX, e)),
            },
        }

        if self.max_attempts == 0 {
            problems.push(format!("{}_MAX_ATTEMPTS must be at least 1", ENV_PREFIX));
        }
        if self.request_timeout_secs == 0 {
            problems.push(format!("{}_REQUEST_TIMEOUT_SECS must be at least 1", ENV_PREFIX));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(EstimatorError::Config(problems.join("; ")))
        }
    }

    pub fn registry_backend(&self) -> Result<Backend> {
        let uri = self.registry_uri.as_deref().ok_or_else(|| {
            EstimatorError::Config(format!("{}_REGISTRY_URI is required", ENV_PREFIX))
        })?;
        parse_backend(uri).map_err(EstimatorError::Config)
    }

    pub fn store_backend(&self) -> Result<Backend> {
        let uri = self.store_endpoint.as_deref().ok_or_else(|| {
            EstimatorError::Config(format!("{}_STORE_ENDPOINT is required", ENV_PREFIX))
        })?;
        parse_backend(uri).map_err(EstimatorError::Config)
    }
}

fn parse_backend(uri: &str) -> std::result::Result<Backend, String> {
    let url = Url::parse(uri).map_err(|e| format!("invalid URI '{}': {}", uri, e))?;
    match url.scheme() {
        "file" => url
            .to_file_path()
            .map(Backend::Filesystem)
            .map_err(|_| format!("'{}' is not a local path", uri)),
        "http" | "https" => Ok(Backend::Http(url)),
        other => Err(format!("unsupported scheme '{}'", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_vars(HashMap::new()).unwrap();
        assert_eq!(settings.model_name, "apartment-price-regression");
        assert_eq!(settings.model_stage, "production");
        assert_eq!(settings.feedback_bucket, "feedback");
        assert_eq!(settings.feedback_key, "feedback.csv");
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.api_port, 8080);
    }

    #[test]
    fn test_environment_overrides() {
        let settings = Settings::from_vars(vars(&[
            ("APE_REGISTRY_URI", "file:///var/lib/ape/registry"),
            ("APE_STORE_ENDPOINT", "http://minio:9000"),
            ("APE_ACCESS_KEY", "access"),
            ("APE_SECRET_KEY", "secret"),
            ("APE_MAX_ATTEMPTS", "5"),
            ("APE_API_PORT", "9090"),
        ]))
        .unwrap();

        assert_eq!(settings.max_attempts, 5);
        assert_eq!(settings.api_port, 9090);
        settings.validate().unwrap();
        assert_eq!(
            settings.registry_backend().unwrap(),
            Backend::Filesystem(PathBuf::from("/var/lib/ape/registry"))
        );
        assert!(matches!(settings.store_backend().unwrap(), Backend::Http(_)));
    }

    #[test]
    fn test_validation_lists_every_missing_option() {
        let settings = Settings::default();
        let message = match settings.validate() {
            Err(EstimatorError::Config(message)) => message,
            other => panic!("expected config error, got {:?}", other),
        };
        assert!(message.contains("APE_REGISTRY_URI"));
        assert!(message.contains("APE_STORE_ENDPOINT"));
    }

    #[test]
    fn test_http_store_requires_credentials() {
        let settings = Settings {
            registry_uri: Some("http://registry:5000".into()),
            store_endpoint: Some("https://store.example".into()),
            ..Default::default()
        };
        let message = settings.validate().unwrap_err().to_string();
        assert!(message.contains("APE_ACCESS_KEY"));
        assert!(message.contains("APE_SECRET_KEY"));
    }

    #[test]
    fn test_unsupported_scheme() {
        let settings = Settings {
            registry_uri: Some("ftp://registry".into()),
            store_endpoint: Some("file:///tmp/store".into()),
            ..Default::default()
        };
        let message = settings.validate().unwrap_err().to_string();
        assert!(message.contains("unsupported scheme 'ftp'"));
    }
}
