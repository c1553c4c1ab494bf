//! Inference over a loaded model
//!
//! The model is loaded once and shared immutably; `estimate` is a pure
//! function of the model and the feature vector.

use super::model::TrainedModel;
use super::output::round_price;
use crate::error::{EstimatorError, Result};
use crate::models::ApartmentFeatures;
use crate::observability::EstimatorMetrics;
use crate::storage::ModelRegistry;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Where the active model came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Registry { name: String, stage: String },
    File(String),
    InMemory,
}

impl std::fmt::Display for ModelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelSource::Registry { name, stage } => write!(f, "registry:{}@{}", name, stage),
            ModelSource::File(path) => write!(f, "file:{}", path),
            ModelSource::InMemory => write!(f, "memory"),
        }
    }
}

/// Serves estimates from one immutable model
pub struct InferenceService {
    model: Arc<TrainedModel>,
    version: String,
    source: ModelSource,
    metrics: EstimatorMetrics,
    estimate_count: AtomicU64,
    rejected_count: AtomicU64,
}

impl InferenceService {
    /// Wrap an in-process model, verifying its feature layout
    pub fn new(model: TrainedModel, version: impl Into<String>, source: ModelSource) -> Result<Self> {
        model.check_schema()?;
        Ok(Self {
            model: Arc::new(model),
            version: version.into(),
            source,
            metrics: EstimatorMetrics::new(),
            estimate_count: AtomicU64::new(0),
            rejected_count: AtomicU64::new(0),
        })
    }

    /// Resolve the model assigned to `stage` in the registry
    pub async fn load_from_registry(
        registry: &dyn ModelRegistry,
        name: &str,
        stage: &str,
    ) -> Result<Self> {
        let registered = registry.fetch(name, stage).await?;
        info!(
            model_name = name,
            stage,
            version = %registered.version,
            "Resolved model from registry"
        );
        Self::new(
            registered.model,
            registered.version,
            ModelSource::Registry {
                name: name.to_string(),
                stage: stage.to_string(),
            },
        )
    }

    /// Offline path: load a local artifact saved by a training run
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let model = TrainedModel::load_from_file(path)?;
        let version = format!("local-{}", model.metadata.trained_at);
        Self::new(model, version, ModelSource::File(path.display().to_string()))
    }

    /// Round the model output to a whole price
    pub fn estimate(&self, features: &ApartmentFeatures) -> Result<i64> {
        let start = Instant::now();
        let x = features.to_vector();
        if x.iter().any(|v| !v.is_finite()) {
            self.rejected_count.fetch_add(1, Ordering::Relaxed);
            self.metrics.inc_estimate_errors();
            return Err(EstimatorError::Validation(
                "feature vector contains a non-finite value".to_string(),
            ));
        }

        let price = round_price(self.model.predict(&x));

        let elapsed = start.elapsed();
        self.estimate_count.fetch_add(1, Ordering::Relaxed);
        self.metrics.observe_estimate_latency(elapsed.as_secs_f64());
        debug!(price, elapsed_us = elapsed.as_micros() as u64, "Estimate computed");
        Ok(price)
    }

    pub fn model(&self) -> Arc<TrainedModel> {
        Arc::clone(&self.model)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    pub fn stats(&self) -> InferenceStats {
        InferenceStats {
            total_estimates: self.estimate_count.load(Ordering::Relaxed),
            rejected: self.rejected_count.load(Ordering::Relaxed),
        }
    }
}

/// Inference statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceStats {
    pub total_estimates: u64,
    pub rejected: u64,
}
