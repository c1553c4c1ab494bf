//! Apartment price estimation library
//!
//! This crate provides the core functionality for:
//! - Feature validation against a fixed, named schema
//! - Mean imputation and ordinary least squares fitting
//! - Model artifacts, registry publication and inference
//! - The shared feedback dataset and its local outbox
//! - Configuration, health checks and observability

pub mod config;
pub mod error;
pub mod feedback;
pub mod health;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod schema;
pub mod session;
pub mod storage;
pub mod training;

pub use config::Settings;
pub use error::{EstimatorError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{EstimatorMetrics, StructuredLogger};
pub use session::{AppContext, EstimateSession, FeedbackOutcome, SessionState};
