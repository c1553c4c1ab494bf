//! Training pipeline: filter offers, merge feedback, impute, fit

use crate::error::{EstimatorError, Result};
use crate::models::{FeatureRow, FeedbackRecord, LabeledOffer};
use crate::predictor::{fit, r_squared, ImputationStats, ModelMetadata, TrainedModel};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Offers listed before this year are ignored by default
pub const DEFAULT_CUTOFF_YEAR: i32 = 2020;

/// What a training run consumed and produced
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub offers_in: usize,
    pub filtered_by_date: usize,
    pub filtered_as_duplicate: usize,
    pub feedback_rows: usize,
    pub training_rows: usize,
    pub r_squared: Option<f64>,
    pub coefficients: Vec<(String, f64)>,
    pub intercept: f64,
}

/// Fit a model on offers listed since `cutoff_year`, optionally adding feedback
pub fn run(
    offers: &[LabeledOffer],
    feedback: Option<&[FeedbackRecord]>,
    cutoff_year: i32,
) -> Result<(TrainedModel, TrainingReport)> {
    let cutoff = NaiveDate::from_ymd_opt(cutoff_year, 1, 1).ok_or_else(|| {
        EstimatorError::Validation(format!("invalid cutoff year {}", cutoff_year))
    })?;

    let mut filtered_by_date = 0;
    let mut filtered_as_duplicate = 0;
    let mut rows: Vec<FeatureRow> = Vec::with_capacity(offers.len());
    let mut prices: Vec<f64> = Vec::with_capacity(offers.len());

    for offer in offers {
        if offer.listed_date < cutoff {
            filtered_by_date += 1;
        } else if offer.duplicate_of.is_some() {
            filtered_as_duplicate += 1;
        } else {
            rows.push(offer.features);
            prices.push(offer.price);
        }
    }

    let offer_rows = rows.len();
    let feedback_rows = feedback.map_or(0, |records| records.len());
    if let Some(records) = feedback {
        for record in records {
            rows.push(record.features.to_row());
            prices.push(record.price as f64);
        }
    }

    debug!(
        offers_in = offers.len(),
        filtered_by_date,
        filtered_as_duplicate,
        offer_rows,
        feedback_rows,
        "Filtered training rows"
    );

    if rows.is_empty() {
        return Err(EstimatorError::InsufficientData(format!(
            "{} offers, {} before {}, {} duplicates, {} feedback rows",
            offers.len(),
            filtered_by_date,
            cutoff,
            filtered_as_duplicate,
            feedback_rows
        )));
    }

    let imputation = ImputationStats::fit(&rows)?;
    let x = imputation.apply_all(&rows);
    let linear = fit(&x, &prices)?;

    let r2 = r_squared(&linear, &x, &prices);
    if r2.is_none() {
        warn!("Coefficient of determination not computable for this training set");
    }

    let model = TrainedModel::new(
        imputation,
        linear,
        ModelMetadata {
            training_rows: rows.len(),
            r_squared: r2,
            trained_at: chrono::Utc::now().timestamp(),
        },
    );

    for (feature, coefficient) in model.coefficient_table() {
        info!(feature, coefficient, "Fitted coefficient");
    }
    info!(
        intercept = model.intercept,
        r_squared = ?r2,
        training_rows = rows.len(),
        "Fitted linear model"
    );

    let report = TrainingReport {
        offers_in: offers.len(),
        filtered_by_date,
        filtered_as_duplicate,
        feedback_rows,
        training_rows: rows.len(),
        r_squared: r2,
        coefficients: model
            .coefficient_table()
            .into_iter()
            .map(|(name, c)| (name.to_string(), c))
            .collect(),
        intercept: model.intercept,
    };
    Ok((model, report))
}
