//! Price Estimator - apartment price estimation service
//!
//! Loads the production model once at startup and serves estimates and
//! feedback over HTTP.

use anyhow::{Context, Result};
use estimator_lib::{EstimatorMetrics, Settings, StructuredLogger};
use price_estimator::{api, startup};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting price-estimator");

    let settings = Settings::load_validated().context("invalid configuration")?;
    info!(
        model_name = %settings.model_name,
        stage = %settings.model_stage,
        port = settings.api_port,
        "Estimator configured"
    );

    let ctx = startup::build_context(&settings).await?;

    let logger = StructuredLogger::new("price-estimator");
    logger.log_startup(SERVICE_VERSION, ctx.model_version());

    let app_state = Arc::new(api::AppState::new(ctx, EstimatorMetrics::new()));
    let mut api_handle = tokio::spawn(api::serve(settings.api_port, app_state));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
        served = &mut api_handle => {
            let reason = match served {
                Ok(Ok(())) => "API server stopped".to_string(),
                Ok(Err(e)) => format!("API server failed: {}", e),
                Err(e) => format!("API server task panicked: {}", e),
            };
            error!(reason = %reason, "Shutting down");
            logger.log_shutdown(&reason);
            anyhow::bail!(reason);
        }
    }

    info!("Shutting down");
    Ok(())
}
