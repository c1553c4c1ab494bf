//! Core data models for the price estimator

use crate::schema::FEATURE_COUNT;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Feature row as seen at training time; `None` marks a missing value
pub type FeatureRow = [Option<f64>; FEATURE_COUNT];

/// Validated apartment features, in schema order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApartmentFeatures {
    pub living_area_m2: f64,
    pub room_count: f64,
    pub bedroom_count: u8,
    pub bathroom_count: u8,
    pub has_elevator: bool,
    pub has_balcony: bool,
    pub is_heritage_listed: bool,
    pub has_parking: bool,
    /// 1 (A, best) to 8 (H, worst)
    pub energy_class: u8,
}

impl ApartmentFeatures {
    /// Fixed-order numeric vector consumed by the regression model
    pub fn to_vector(&self) -> [f64; FEATURE_COUNT] {
        [
            self.living_area_m2,
            self.room_count,
            f64::from(self.bedroom_count),
            f64::from(self.bathroom_count),
            bool_to_f64(self.has_elevator),
            bool_to_f64(self.has_balcony),
            bool_to_f64(self.is_heritage_listed),
            bool_to_f64(self.has_parking),
            f64::from(self.energy_class),
        ]
    }

    /// Same vector with every slot present, for mixing with training rows
    pub fn to_row(&self) -> FeatureRow {
        self.to_vector().map(Some)
    }
}

fn bool_to_f64(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Historical offer with an observed price
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledOffer {
    pub features: FeatureRow,
    /// Asking price in EUR
    pub price: f64,
    pub listed_date: NaiveDate,
    /// Set when the offer is a price update of another listing
    pub duplicate_of: Option<i64>,
}

/// User correction of an estimate, one line of the feedback dataset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub features: ApartmentFeatures,
    /// Price the user believes is realistic, in EUR
    pub price: i64,
}

impl FeedbackRecord {
    pub fn new(features: ApartmentFeatures, price: i64) -> Self {
        Self { features, price }
    }
}
