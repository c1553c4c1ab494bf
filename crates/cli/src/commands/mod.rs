//! CLI command implementations

pub mod estimate;
pub mod feedback;
pub mod registry;
pub mod summary;
pub mod train;

use clap::Args;
use estimator_lib::schema::{self, RawFeatures, RawValue};
use estimator_lib::ApartmentFeatures;
use std::collections::BTreeMap;

/// Apartment features as command-line flags
#[derive(Args, Debug, Clone, Default)]
pub struct FeatureArgs {
    /// Living area in square meters
    #[arg(long)]
    pub living_area: Option<f64>,

    /// Number of rooms (1 to 8, steps of 0.5)
    #[arg(long)]
    pub rooms: Option<f64>,

    /// Number of bedrooms (1 to 5)
    #[arg(long)]
    pub bedrooms: Option<f64>,

    /// Number of bathrooms (1 to 3)
    #[arg(long)]
    pub bathrooms: Option<f64>,

    /// The building has an elevator
    #[arg(long)]
    pub elevator: bool,

    /// The apartment has a balcony
    #[arg(long)]
    pub balcony: bool,

    /// The building is heritage listed
    #[arg(long)]
    pub heritage: bool,

    /// A parking space is included
    #[arg(long)]
    pub parking: bool,

    /// Energy efficiency class, A to H or 1 to 8
    #[arg(long)]
    pub energy_class: Option<String>,
}

impl FeatureArgs {
    /// Named raw input; absent options are left out and reported by validation
    pub fn to_raw(&self) -> RawFeatures {
        let mut named = BTreeMap::new();
        let numbers = [
            ("living_area_m2", self.living_area),
            ("room_count", self.rooms),
            ("bedroom_count", self.bedrooms),
            ("bathroom_count", self.bathrooms),
        ];
        for (name, value) in numbers {
            if let Some(v) = value {
                named.insert(name.to_string(), RawValue::Number(v));
            }
        }
        let flags = [
            ("has_elevator", self.elevator),
            ("has_balcony", self.balcony),
            ("is_heritage_listed", self.heritage),
            ("has_parking", self.parking),
        ];
        for (name, value) in flags {
            named.insert(name.to_string(), RawValue::Flag(value));
        }
        if let Some(class) = &self.energy_class {
            let value = match class.parse::<f64>() {
                Ok(n) => RawValue::Number(n),
                Err(_) => RawValue::Text(class.clone()),
            };
            named.insert("energy_class".to_string(), value);
        }
        RawFeatures::Named(named)
    }

    pub fn validate(&self) -> estimator_lib::Result<ApartmentFeatures> {
        schema::validate(&self.to_raw())
    }
}
