//! Training command: fit, save and publish a model

use anyhow::{Context, Result};
use colored::Colorize;
use estimator_lib::{
    feedback::FeedbackStore,
    storage::{self, ModelRegistry},
    training::{self, TrainingReport},
    FeedbackRecord, Settings, StructuredLogger,
};
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;
use tracing::debug;

use crate::output::{
    color_coefficient, color_r_squared, print_heading, print_info, print_json, print_success,
    print_table, print_warning, OutputFormat,
};

/// Options of one training run
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub data: PathBuf,
    pub with_feedback: bool,
    pub cutoff_year: i32,
    pub output: Option<PathBuf>,
    pub publish: bool,
    pub promote: bool,
}

#[derive(Debug, Serialize)]
struct TrainOutput {
    #[serde(flatten)]
    report: TrainingReport,
    rows_read: usize,
    dropped_malformed: usize,
    artifact: String,
    checksum: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    published_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    promoted_to: Option<String>,
}

/// Row for the coefficient table
#[derive(Tabled)]
struct CoefficientRow {
    #[tabled(rename = "Feature")]
    feature: String,
    #[tabled(rename = "Coefficient")]
    coefficient: String,
}

async fn load_feedback(settings: &Settings) -> Result<Vec<FeedbackRecord>> {
    let objects = storage::object_store_from_settings(settings).context("object store")?;
    let store = FeedbackStore::new(
        objects,
        settings.feedback_bucket.clone(),
        settings.feedback_key.clone(),
    );
    store
        .read_all()
        .await
        .with_context(|| format!("reading feedback dataset {}", store.location()))
}

/// Fit a model on the offers table and hand it to the registry
pub async fn run_training(
    settings: &Settings,
    options: TrainOptions,
    format: OutputFormat,
) -> Result<()> {
    let parsed = training::load_offers(&options.data)
        .with_context(|| format!("loading offers from {}", options.data.display()))?;

    let feedback = if options.with_feedback {
        let records = load_feedback(settings).await?;
        debug!(records = records.len(), "Loaded feedback dataset");
        Some(records)
    } else {
        None
    };

    let (model, report) = training::run(&parsed.offers, feedback.as_deref(), options.cutoff_year)?;

    let logger = StructuredLogger::new("ape");
    logger.log_training_completed(report.training_rows, report.feedback_rows, report.r_squared);

    let artifact = options
        .output
        .clone()
        .unwrap_or_else(|| settings.artifact_path.clone());
    let checksum = model
        .save_to_file(&artifact)
        .with_context(|| format!("saving model to {}", artifact.display()))?;

    let mut published_version = None;
    let mut promoted_to = None;
    if options.publish {
        let registry = storage::registry_from_settings(settings).context("model registry")?;
        let version = registry
            .publish(&model, &settings.model_name)
            .await
            .context("publishing model")?;
        logger.log_model_published(&settings.model_name, &version);

        if options.promote {
            registry
                .promote(&settings.model_name, &version, &settings.model_stage)
                .await
                .with_context(|| format!("promoting version {}", version))?;
            promoted_to = Some(settings.model_stage.clone());
        }
        published_version = Some(version);
    }

    let output = TrainOutput {
        report,
        rows_read: parsed.rows_read,
        dropped_malformed: parsed.dropped_malformed,
        artifact: artifact.display().to_string(),
        checksum,
        published_version,
        promoted_to,
    };

    match format {
        OutputFormat::Json => print_json(&output)?,
        OutputFormat::Table => print_report(&output, &settings.model_name),
    }
    Ok(())
}

fn print_report(output: &TrainOutput, model_name: &str) {
    let report = &output.report;

    print_heading("Training Run");
    println!("Rows read:              {}", output.rows_read);
    println!("Malformed rows dropped: {}", output.dropped_malformed);
    println!("Listed before cutoff:   {}", report.filtered_by_date);
    println!("Duplicates removed:     {}", report.filtered_as_duplicate);
    println!("Feedback rows:          {}", report.feedback_rows);
    println!("Training rows:          {}", report.training_rows.to_string().cyan());
    println!("R²:                     {}", color_r_squared(report.r_squared));
    println!();

    let mut rows = vec![CoefficientRow {
        feature: "(intercept)".to_string(),
        coefficient: color_coefficient(report.intercept),
    }];
    rows.extend(report.coefficients.iter().map(|(name, value)| CoefficientRow {
        feature: name.clone(),
        coefficient: color_coefficient(*value),
    }));
    print_table(rows);
    println!();

    print_success(&format!("Model saved to {}", output.artifact));
    print_info(&format!("SHA-256 {}", output.checksum));
    match (&output.published_version, &output.promoted_to) {
        (Some(version), Some(stage)) => print_success(&format!(
            "Published {} version {} and promoted it to {}",
            model_name, version, stage
        )),
        (Some(version), None) => print_success(&format!(
            "Published {} version {} (run `ape promote {}` to serve it)",
            model_name, version, version
        )),
        _ => print_warning("Model not published to the registry"),
    }
}
