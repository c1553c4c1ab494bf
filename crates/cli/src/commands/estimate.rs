//! Estimate command: quote a price for one apartment

use anyhow::{Context, Result};
use colored::Colorize;
use estimator_lib::{
    predictor::{InferenceService, PriceFormatter},
    schema, storage, Settings,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

use super::FeatureArgs;
use crate::output::{format_flag, print_heading, print_json, print_warning, OutputFormat};

#[derive(Debug, Serialize)]
struct EstimateOutput {
    price: i64,
    formatted: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
    model_version: String,
    model_source: String,
}

/// Load the model named by the settings, or a local artifact when given
pub async fn load_service(settings: &Settings, model_file: Option<PathBuf>) -> Result<InferenceService> {
    match model_file {
        Some(path) => InferenceService::load_from_file(&path)
            .with_context(|| format!("loading model from {}", path.display())),
        None => {
            let registry = storage::registry_from_settings(settings).context("model registry")?;
            InferenceService::load_from_registry(
                registry.as_ref(),
                &settings.model_name,
                &settings.model_stage,
            )
            .await
            .with_context(|| {
                format!(
                    "resolving {}@{} (pass --model-file to use a local artifact)",
                    settings.model_name, settings.model_stage
                )
            })
        }
    }
}

/// Quote a price for the given features
pub async fn estimate(
    settings: &Settings,
    features: &FeatureArgs,
    model_file: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let features = features.validate()?;
    let service = load_service(settings, model_file).await?;
    debug!(version = service.version(), source = %service.source(), "Model loaded");
    let price = service.estimate(&features)?;

    let formatter = PriceFormatter::new();
    let output = EstimateOutput {
        price,
        formatted: formatter.format(price),
        note: formatter.plausibility_note(price),
        model_version: service.version().to_string(),
        model_source: service.source().to_string(),
    };

    match format {
        OutputFormat::Json => print_json(&output)?,
        OutputFormat::Table => {
            print_heading("Price Estimate");
            println!("Living area:   {} m²", features.living_area_m2);
            println!("Rooms:         {}", features.room_count);
            println!("Bedrooms:      {}", features.bedroom_count);
            println!("Bathrooms:     {}", features.bathroom_count);
            println!("Elevator:      {}", format_flag(features.has_elevator));
            println!("Balcony:       {}", format_flag(features.has_balcony));
            println!("Heritage:      {}", format_flag(features.is_heritage_listed));
            println!("Parking:       {}", format_flag(features.has_parking));
            println!(
                "Energy class:  {}",
                schema::energy_class_letter(features.energy_class)
                    .map(String::from)
                    .unwrap_or_else(|| features.energy_class.to_string())
            );
            println!();
            println!("Estimate:      {}", output.formatted.green().bold());
            println!(
                "Model:         {} ({})",
                output.model_version, output.model_source
            );
            if let Some(note) = &output.note {
                print_warning(note);
            }
        }
    }
    Ok(())
}
