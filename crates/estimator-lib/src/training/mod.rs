//! Model training
//!
//! Loads the historical offers table, filters it, optionally merges the
//! feedback dataset and fits the regression model.

mod dataset;
mod pipeline;

pub use dataset::{
    load_offers, parse_month, parse_number, parse_offers, ColumnSummary, DatasetSummary,
    ParsedOffers,
};
pub use pipeline::{run, TrainingReport, DEFAULT_CUTOFF_YEAR};
