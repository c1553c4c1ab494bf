//! Registry commands

use anyhow::{Context, Result};
use estimator_lib::{
    storage::{self, ModelRegistry},
    Settings,
};
use serde_json::json;

use crate::output::{print_json, print_success, OutputFormat};

/// Assign a published version to a stage
pub async fn promote(
    settings: &Settings,
    version: &str,
    stage: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let stage = stage.unwrap_or_else(|| settings.model_stage.clone());
    let registry = storage::registry_from_settings(settings).context("model registry")?;
    registry
        .promote(&settings.model_name, version, &stage)
        .await
        .with_context(|| format!("promoting {} version {}", settings.model_name, version))?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "model_name": settings.model_name,
            "version": version,
            "stage": stage,
        }))?,
        OutputFormat::Table => print_success(&format!(
            "{} version {} is now in stage {}",
            settings.model_name, version, stage
        )),
    }
    Ok(())
}
