//! Price prediction engine

mod imputer;
mod inference;
mod model;
mod output;
mod regression;

pub use imputer::ImputationStats;
pub use inference::{InferenceService, InferenceStats, ModelSource};
pub use model::{compute_checksum, verify_checksum, ModelMetadata, TrainedModel};
pub use output::{
    round_price, OutputConfig, PriceFormatter, MAX_PLAUSIBLE_PRICE, MIN_PLAUSIBLE_PRICE,
};
pub use regression::{fit, linear_combination, r_squared, LinearFit};

pub(crate) use model::{with_suffix, write_atomic};
