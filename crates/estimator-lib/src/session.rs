//! Application context and the estimate/feedback session state machine
//!
//! [`AppContext`] carries the loaded model and the feedback collaborators
//! and is passed explicitly to every estimate and feedback call.
//! [`EstimateSession`] models one user interaction:
//!
//! ```text
//! CollectingInput --estimate--> CollectingInput
//! CollectingInput --submit_feedback--> FeedbackSubmitted
//! FeedbackSubmitted --restart--> CollectingInput
//! ```

use crate::error::{EstimatorError, Result};
use crate::feedback::{AppendOutcome, FeedbackOutbox, FeedbackStore, FlushReport};
use crate::health::{components, HealthRegistry};
use crate::models::{ApartmentFeatures, FeedbackRecord};
use crate::observability::{EstimatorMetrics, StructuredLogger};
use crate::predictor::InferenceService;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// What happened to a feedback submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FeedbackOutcome {
    /// Written to the shared dataset
    Appended,
    /// Non-positive price; nothing written
    Discarded,
    /// Store unavailable; kept in the local outbox
    Staged { pending: usize },
    /// The user accepted the estimate; nothing to write
    Confirmed,
}

/// Explicit dependencies of estimate and feedback calls
#[derive(Clone)]
pub struct AppContext {
    inference: Arc<InferenceService>,
    feedback: FeedbackStore,
    outbox: Arc<Mutex<FeedbackOutbox>>,
    health: HealthRegistry,
    logger: StructuredLogger,
    metrics: EstimatorMetrics,
}

impl AppContext {
    pub fn new(
        inference: Arc<InferenceService>,
        feedback: FeedbackStore,
        outbox: FeedbackOutbox,
        health: HealthRegistry,
    ) -> Self {
        Self {
            inference,
            feedback,
            outbox: Arc::new(Mutex::new(outbox)),
            health,
            logger: StructuredLogger::new("price-estimator"),
            metrics: EstimatorMetrics::new(),
        }
    }

    pub fn inference(&self) -> &InferenceService {
        &self.inference
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn model_version(&self) -> &str {
        self.inference.version()
    }

    /// Rounded price for validated features
    pub fn estimate(&self, features: &ApartmentFeatures) -> Result<i64> {
        let start = Instant::now();
        let price = self.inference.estimate(features)?;
        self.logger
            .log_estimate(price, self.inference.version(), start.elapsed().as_micros());
        Ok(price)
    }

    /// Append a correction, staging it locally when the store is unavailable
    pub async fn submit_feedback(
        &self,
        record: FeedbackRecord,
        estimated: Option<i64>,
    ) -> Result<FeedbackOutcome> {
        match self.feedback.append(&record).await {
            Ok(AppendOutcome::Discarded) => {
                self.metrics.inc_feedback_discarded();
                self.logger.log_feedback_discarded(record.price);
                Ok(FeedbackOutcome::Discarded)
            }
            Ok(AppendOutcome::Appended) => {
                self.metrics.inc_feedback_appended();
                self.logger.log_feedback_appended(record.price, estimated);
                self.health.set_healthy(components::FEEDBACK_STORE).await;
                self.replay_staged().await;
                Ok(FeedbackOutcome::Appended)
            }
            Err(e) if e.is_storage_failure() => {
                let pending = {
                    let mut outbox = self.outbox.lock().await;
                    outbox.stage(record, e.to_string())?
                };
                self.metrics.inc_feedback_staged();
                self.logger
                    .log_feedback_staged(record.price, &e.to_string(), pending);
                self.health
                    .set_degraded(components::FEEDBACK_STORE, e.to_string())
                    .await;
                self.health.record_outbox_depth(pending).await;
                Ok(FeedbackOutcome::Staged { pending })
            }
            Err(e) => Err(e),
        }
    }

    /// Replay the outbox against the feedback store
    pub async fn flush_outbox(&self) -> Result<FlushReport> {
        let mut outbox = self.outbox.lock().await;
        let result = outbox.flush_pending(&self.feedback).await;
        self.health.record_outbox_depth(outbox.len()).await;
        result
    }

    pub async fn pending_feedback(&self) -> usize {
        self.outbox.lock().await.len()
    }

    /// Best-effort replay after the store accepted a write
    async fn replay_staged(&self) {
        if self.pending_feedback().await == 0 {
            return;
        }
        match self.flush_outbox().await {
            Ok(report) => debug!(replayed = report.replayed, remaining = report.remaining, "Outbox replayed"),
            Err(e) => warn!(error = %e, "Outbox replay failed, will retry on next write"),
        }
    }
}

/// Session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    CollectingInput,
    FeedbackSubmitted,
}

/// One user's estimate-then-feedback interaction
#[derive(Debug, Clone)]
pub struct EstimateSession {
    state: SessionState,
    last_estimate: Option<(ApartmentFeatures, i64)>,
}

impl Default for EstimateSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EstimateSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::CollectingInput,
            last_estimate: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn last_estimate(&self) -> Option<i64> {
        self.last_estimate.map(|(_, price)| price)
    }

    fn require(&self, expected: SessionState, action: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(EstimatorError::InvalidTransition(format!(
                "cannot {} in state {:?}",
                action, self.state
            )))
        }
    }

    /// Quote a price; the session keeps collecting input
    pub fn estimate(&mut self, ctx: &AppContext, features: ApartmentFeatures) -> Result<i64> {
        self.require(SessionState::CollectingInput, "estimate")?;
        let price = ctx.estimate(&features)?;
        self.last_estimate = Some((features, price));
        Ok(price)
    }

    /// Answer the "is this price realistic?" question
    ///
    /// `None` accepts the estimate; `Some(price)` submits a correction for
    /// the features of the last estimate.
    pub async fn submit_feedback(
        &mut self,
        ctx: &AppContext,
        corrected_price: Option<i64>,
    ) -> Result<FeedbackOutcome> {
        self.require(SessionState::CollectingInput, "submit feedback")?;
        let (features, estimated) = self.last_estimate.ok_or_else(|| {
            EstimatorError::InvalidTransition("cannot submit feedback before an estimate".into())
        })?;

        let outcome = match corrected_price {
            None => FeedbackOutcome::Confirmed,
            Some(price) => {
                ctx.submit_feedback(FeedbackRecord::new(features, price), Some(estimated))
                    .await?
            }
        };
        self.state = SessionState::FeedbackSubmitted;
        Ok(outcome)
    }

    /// Start over with a fresh form
    pub fn restart(&mut self) -> Result<()> {
        self.require(SessionState::FeedbackSubmitted, "restart")?;
        self.state = SessionState::CollectingInput;
        self.last_estimate = None;
        Ok(())
    }
}
