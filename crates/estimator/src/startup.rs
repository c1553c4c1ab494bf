//! Service wiring: model resolution and feedback collaborators

use anyhow::{Context, Result};
use estimator_lib::{
    feedback::{FeedbackOutbox, FeedbackStore},
    health::{components, HealthRegistry},
    predictor::InferenceService,
    storage::{self, ModelRegistry},
    AppContext, EstimatorMetrics, Settings, StructuredLogger,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Resolve the serving model, falling back to the local artifact
///
/// The registry is authoritative. When it cannot be reached the artifact at
/// `artifact_path` is served instead and the model component is marked
/// degraded.
pub async fn load_model(
    registry: &dyn ModelRegistry,
    settings: &Settings,
    health: &HealthRegistry,
) -> Result<InferenceService> {
    let service = match InferenceService::load_from_registry(
        registry,
        &settings.model_name,
        &settings.model_stage,
    )
    .await
    {
        Ok(service) => {
            health.set_healthy(components::MODEL).await;
            service
        }
        Err(registry_error) => {
            warn!(
                error = %registry_error,
                artifact = %settings.artifact_path.display(),
                "Registry unavailable, falling back to local artifact"
            );
            match InferenceService::load_from_file(&settings.artifact_path) {
                Ok(service) => {
                    health
                        .set_degraded(
                            components::MODEL,
                            format!("serving local artifact: {}", registry_error),
                        )
                        .await;
                    service
                }
                Err(file_error) => {
                    health
                        .set_unhealthy(components::MODEL, file_error.to_string())
                        .await;
                    return Err(file_error).with_context(|| {
                        format!(
                            "no model available (registry: {}; local artifact)",
                            registry_error
                        )
                    });
                }
            }
        }
    };

    EstimatorMetrics::new().set_model_version(&settings.model_name, service.version());
    StructuredLogger::new("price-estimator").log_model_loaded(
        &service.source().to_string(),
        service.version(),
        service.model().metadata.training_rows,
    );
    Ok(service)
}

/// Build the application context from validated settings
pub async fn build_context(settings: &Settings) -> Result<AppContext> {
    let health = HealthRegistry::new();

    let registry = storage::registry_from_settings(settings).context("model registry")?;
    let inference = load_model(registry.as_ref(), settings, &health).await?;

    let objects = storage::object_store_from_settings(settings).context("object store")?;
    let feedback = FeedbackStore::new(
        objects,
        settings.feedback_bucket.clone(),
        settings.feedback_key.clone(),
    );
    health.set_healthy(components::FEEDBACK_STORE).await;

    let outbox = match &settings.outbox_path {
        Some(path) => FeedbackOutbox::open(path)
            .with_context(|| format!("opening outbox {}", path.display()))?,
        None => FeedbackOutbox::in_memory(),
    };
    let staged = outbox.len();

    let ctx = AppContext::new(Arc::new(inference), feedback, outbox, health.clone());
    if staged > 0 {
        info!(pending = staged, "Replaying feedback staged by a previous run");
        match ctx.flush_outbox().await {
            Ok(report) => info!(
                replayed = report.replayed,
                remaining = report.remaining,
                "Outbox replayed"
            ),
            Err(e) => warn!(error = %e, "Outbox replay failed, will retry on next write"),
        }
    } else {
        health.record_outbox_depth(0).await;
    }

    Ok(ctx)
}
