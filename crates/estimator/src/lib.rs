//! Apartment price estimator service
//!
//! Serves estimates from the production model and collects user
//! corrections into the shared feedback dataset.

pub mod api;
pub mod startup;
