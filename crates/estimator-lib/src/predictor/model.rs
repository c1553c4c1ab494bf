//! Trained model artifact
//!
//! A [`TrainedModel`] bundles imputation statistics, regression
//! coefficients and the feature layout they were fitted against. It is
//! serialized as JSON with a SHA-256 sidecar so a file round-trip is
//! bit-identical and corruption is detected on load.

use super::imputer::ImputationStats;
use super::regression::{linear_combination, LinearFit};
use crate::error::{EstimatorError, Result};
use crate::schema::{self, FEATURE_COUNT, FEATURE_NAMES};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Fit diagnostics carried with the artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub training_rows: usize,
    /// Coefficient of determination on the training set, when computable
    pub r_squared: Option<f64>,
    /// Unix seconds
    pub trained_at: i64,
}

/// Fitted linear model, immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub feature_names: Vec<String>,
    pub imputation: ImputationStats,
    pub coefficients: [f64; FEATURE_COUNT],
    pub intercept: f64,
    pub metadata: ModelMetadata,
}

impl TrainedModel {
    pub fn new(imputation: ImputationStats, fit: LinearFit, metadata: ModelMetadata) -> Self {
        Self {
            feature_names: schema::feature_names(),
            imputation,
            coefficients: fit.coefficients,
            intercept: fit.intercept,
            metadata,
        }
    }

    /// Build a model from known coefficients, e.g. for reproducing a quote
    pub fn from_coefficients(intercept: f64, coefficients: [f64; FEATURE_COUNT]) -> Self {
        Self {
            feature_names: schema::feature_names(),
            imputation: ImputationStats {
                means: [0.0; FEATURE_COUNT],
            },
            coefficients,
            intercept,
            metadata: ModelMetadata {
                training_rows: 0,
                r_squared: None,
                trained_at: chrono::Utc::now().timestamp(),
            },
        }
    }

    /// `intercept + dot(coefficients, x)`; pure and deterministic
    pub fn predict(&self, x: &[f64; FEATURE_COUNT]) -> f64 {
        linear_combination(self.intercept, &self.coefficients, x)
    }

    /// Reject artifacts fitted against a different feature layout
    pub fn check_schema(&self) -> Result<()> {
        schema::ensure_layout(&self.feature_names)
    }

    /// Coefficients paired with their feature names
    pub fn coefficient_table(&self) -> Vec<(&'static str, f64)> {
        FEATURE_NAMES
            .iter()
            .copied()
            .zip(self.coefficients.iter().copied())
            .collect()
    }

    /// Serialize to artifact bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse artifact bytes and verify the feature layout
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let model: TrainedModel = serde_json::from_slice(bytes)
            .map_err(|e| EstimatorError::ArtifactCorrupt(e.to_string()))?;
        model.check_schema()?;
        if !model.intercept.is_finite() || model.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(EstimatorError::ArtifactCorrupt(
                "non-finite coefficient".to_string(),
            ));
        }
        Ok(model)
    }

    /// Write the artifact atomically with a checksum sidecar
    pub fn save_to_file(&self, path: &Path) -> Result<String> {
        let bytes = self.to_bytes()?;
        let checksum = compute_checksum(&bytes);
        write_atomic(path, &bytes)?;
        write_atomic(&checksum_path(path), checksum.as_bytes())?;
        info!(
            path = %path.display(),
            checksum = %checksum,
            "Model artifact saved"
        );
        Ok(checksum)
    }

    /// Load an artifact, verifying the sidecar checksum when present
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EstimatorError::NotFound(format!("model file {}", path.display()))
            } else {
                EstimatorError::Io(e)
            }
        })?;

        let sidecar = checksum_path(path);
        if sidecar.exists() {
            let expected = fs::read_to_string(&sidecar)?;
            verify_checksum(&bytes, expected.trim())?;
        } else {
            debug!(path = %path.display(), "No checksum sidecar, skipping verification");
        }

        Self::from_bytes(&bytes)
    }
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compare artifact bytes against an expected checksum
pub fn verify_checksum(data: &[u8], expected: &str) -> Result<()> {
    let computed = compute_checksum(data);
    if computed != expected {
        return Err(EstimatorError::ArtifactCorrupt(format!(
            "checksum mismatch: expected {}, got {}",
            expected, computed
        )));
    }
    Ok(())
}

fn checksum_path(path: &Path) -> PathBuf {
    with_suffix(path, ".sha256")
}

/// `path` with `suffix` appended to the full file name
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Write to a temp file, sync, then rename over the target
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let temp_path = with_suffix(path, ".tmp");
    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_writes_to_same_stem_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let csv = dir.path().join("feedback.csv");
        let json = dir.path().join("feedback.json");
        assert_ne!(with_suffix(&csv, ".tmp"), with_suffix(&json, ".tmp"));

        write_atomic(&csv, b"price\n").unwrap();
        write_atomic(&json, b"[]").unwrap();
        assert_eq!(fs::read(&csv).unwrap(), b"price\n".to_vec());
        assert_eq!(fs::read(&json).unwrap(), b"[]".to_vec());
        assert!(!dir.path().join("feedback.csv.tmp").exists());
    }

    fn sample_model() -> TrainedModel {
        TrainedModel::from_coefficients(
            10_000.0,
            [1000.0, 500.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2000.0, -1000.0],
        )
    }

    #[test]
    fn test_predict_linear_combination() {
        let model = sample_model();
        let x = [75.0, 3.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 4.0];
        assert_eq!(model.predict(&x), 84_500.0);
    }

    #[test]
    fn test_file_round_trip_is_exact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        let mut model = sample_model();
        model.intercept = 12_345.678_901_234_567;
        model.coefficients[0] = 0.1 + 0.2;
        model.imputation.means[1] = 1.0 / 3.0;

        model.save_to_file(&path).unwrap();
        let loaded = TrainedModel::load_from_file(&path).unwrap();

        assert_eq!(loaded.intercept.to_bits(), model.intercept.to_bits());
        for (a, b) in loaded.coefficients.iter().zip(model.coefficients.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        assert_eq!(loaded, model);
    }

    #[test]
    fn test_tampered_artifact_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        sample_model().save_to_file(&path).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap().replace("10000.0", "99999.0");
        bytes = text.into_bytes();
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            TrainedModel::load_from_file(&path),
            Err(EstimatorError::ArtifactCorrupt(_))
        ));
    }

    #[test]
    fn test_schema_mismatch_on_load() {
        let mut model = sample_model();
        model.feature_names.swap(0, 8);
        let bytes = serde_json::to_vec(&model).unwrap();
        assert!(matches!(
            TrainedModel::from_bytes(&bytes),
            Err(EstimatorError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            TrainedModel::load_from_file(&dir.path().join("absent.json")),
            Err(EstimatorError::NotFound(_))
        ));
    }

    #[test]
    fn test_coefficient_table_is_named() {
        let table = sample_model().coefficient_table();
        assert_eq!(table[0], ("living_area_m2", 1000.0));
        assert_eq!(table[8], ("energy_class", -1000.0));
    }
}
