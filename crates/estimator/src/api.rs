//! HTTP API for estimates, feedback, health checks and Prometheus metrics

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use estimator_lib::{
    feedback::FlushReport,
    health::{ComponentStatus, HealthRegistry},
    observability::render_metrics,
    predictor::PriceFormatter,
    schema::{self, RawFeatures},
    AppContext, EstimateSession, EstimatorError, EstimatorMetrics, FeedbackOutcome,
    FeedbackRecord, SessionState,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Open sessions kept before the oldest is evicted
pub const MAX_SESSIONS: usize = 10_000;

/// Shared application state
pub struct AppState {
    pub ctx: AppContext,
    pub health_registry: HealthRegistry,
    pub metrics: EstimatorMetrics,
    formatter: PriceFormatter,
    sessions: Mutex<BTreeMap<u64, Arc<Mutex<EstimateSession>>>>,
    next_session_id: AtomicU64,
}

impl AppState {
    pub fn new(ctx: AppContext, metrics: EstimatorMetrics) -> Self {
        let health_registry = ctx.health().clone();
        Self {
            ctx,
            health_registry,
            metrics,
            formatter: PriceFormatter::new(),
            sessions: Mutex::new(BTreeMap::new()),
            next_session_id: AtomicU64::new(1),
        }
    }

    async fn open_session(&self) -> u64 {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let mut sessions = self.sessions.lock().await;
        while sessions.len() >= MAX_SESSIONS {
            match sessions.pop_first() {
                Some((evicted, _)) => debug!(session_id = evicted, "Evicted idle session"),
                None => break,
            }
        }
        sessions.insert(id, Arc::new(Mutex::new(EstimateSession::new())));
        id
    }

    async fn session(&self, id: u64) -> Result<Arc<Mutex<EstimateSession>>, ApiError> {
        self.sessions
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| EstimatorError::NotFound(format!("session {}", id)).into())
    }

    fn quote(&self, price: i64) -> EstimateResponse {
        EstimateResponse {
            price,
            formatted: self.formatter.format(price),
            note: self.formatter.plausibility_note(price),
            model_version: self.ctx.model_version().to_string(),
        }
    }
}

/// Error body returned for every rejected request
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

/// Maps library errors onto status codes
pub struct ApiError(EstimatorError);

impl From<EstimatorError> for ApiError {
    fn from(e: EstimatorError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            EstimatorError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
            EstimatorError::InvalidTransition(_) => (StatusCode::CONFLICT, "invalid_transition"),
            EstimatorError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            e if e.is_storage_failure() => (StatusCode::SERVICE_UNAVAILABLE, "storage"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            warn!(error = %self.0, "Request failed");
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
            kind: kind.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// A rounded quote
#[derive(Debug, Serialize, Deserialize)]
pub struct EstimateResponse {
    pub price: i64,
    pub formatted: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub model_version: String,
}

/// A correction for an arbitrary feature set
#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub features: RawFeatures,
    pub price: i64,
    #[serde(default)]
    pub estimated_price: Option<i64>,
}

/// Answer to "is this price realistic?"; `null` accepts the estimate
#[derive(Debug, Default, Deserialize)]
pub struct SessionFeedbackRequest {
    #[serde(default)]
    pub price: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: u64,
    pub state: SessionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_estimate: Option<i64>,
}

fn feedback_status(outcome: &FeedbackOutcome) -> StatusCode {
    match outcome {
        FeedbackOutcome::Appended => StatusCode::CREATED,
        FeedbackOutcome::Staged { .. } => StatusCode::ACCEPTED,
        FeedbackOutcome::Discarded | FeedbackOutcome::Confirmed => StatusCode::OK,
    }
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // feedback is staged, estimates still served
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once a model is loaded
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        render_metrics(),
    )
}

async fn estimate(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<RawFeatures>,
) -> Result<Json<EstimateResponse>, ApiError> {
    let features = schema::validate(&raw).map_err(|e| {
        state.metrics.inc_estimate_errors();
        e
    })?;
    let price = state.ctx.estimate(&features)?;
    Ok(Json(state.quote(price)))
}

async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FeedbackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let features = schema::validate(&request.features)?;
    let outcome = state
        .ctx
        .submit_feedback(
            FeedbackRecord::new(features, request.price),
            request.estimated_price,
        )
        .await?;
    Ok((feedback_status(&outcome), Json(outcome)))
}

/// Operator hook: replay staged corrections now
async fn flush_feedback(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FlushReport>, ApiError> {
    let report = state.ctx.flush_outbox().await?;
    info!(
        replayed = report.replayed,
        dropped = report.dropped,
        remaining = report.remaining,
        "Outbox flushed on request"
    );
    Ok(Json(report))
}

async fn create_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let session_id = state.open_session().await;
    (
        StatusCode::CREATED,
        Json(SessionResponse {
            session_id,
            state: SessionState::CollectingInput,
            last_estimate: None,
        }),
    )
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.session(id).await?;
    let session = session.lock().await;
    Ok(Json(SessionResponse {
        session_id: id,
        state: session.state(),
        last_estimate: session.last_estimate(),
    }))
}

async fn session_estimate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(raw): Json<RawFeatures>,
) -> Result<Json<EstimateResponse>, ApiError> {
    let session = state.session(id).await?;
    let features = schema::validate(&raw).map_err(|e| {
        state.metrics.inc_estimate_errors();
        e
    })?;
    let price = session.lock().await.estimate(&state.ctx, features)?;
    Ok(Json(state.quote(price)))
}

async fn session_feedback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(request): Json<SessionFeedbackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(id).await?;
    let outcome = session
        .lock()
        .await
        .submit_feedback(&state.ctx, request.price)
        .await?;
    Ok((feedback_status(&outcome), Json(outcome)))
}

async fn session_restart(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.session(id).await?;
    let mut session = session.lock().await;
    session.restart()?;
    Ok(Json(SessionResponse {
        session_id: id,
        state: session.state(),
        last_estimate: None,
    }))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/v1/estimate", post(estimate))
        .route("/v1/feedback", post(submit_feedback))
        .route("/v1/feedback/flush", post(flush_feedback))
        .route("/v1/sessions", post(create_session))
        .route("/v1/sessions/:id", get(get_session))
        .route("/v1/sessions/:id/estimate", post(session_estimate))
        .route("/v1/sessions/:id/feedback", post(session_feedback))
        .route("/v1/sessions/:id/restart", post(session_restart))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
