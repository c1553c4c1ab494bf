//! Health tracking for the estimator service
//!
//! The model component gates readiness: without a loaded model no
//! estimate can be served. Feedback storage and the outbox only degrade
//! the service, since corrections are staged locally when the store is
//! unreachable.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Operational with reduced guarantees, e.g. feedback is being staged
    Degraded,
    Unhealthy,
}

/// Information about a component's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst component status wins
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        let mut has_degraded = false;
        for health in components.values() {
            match health.status {
                ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
                ComponentStatus::Degraded => has_degraded = true,
                ComponentStatus::Healthy => {}
            }
        }
        if has_degraded {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        }
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const MODEL: &str = "model";
    pub const FEEDBACK_STORE: &str = "feedback_store";
    pub const OUTBOX: &str = "outbox";
}

/// Registry of component health, shared between handlers
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Reflect the number of corrections waiting in the outbox
    pub async fn record_outbox_depth(&self, pending: usize) {
        if pending == 0 {
            self.set_healthy(components::OUTBOX).await;
        } else {
            self.set_degraded(
                components::OUTBOX,
                format!("{} feedback record(s) waiting for replay", pending),
            )
            .await;
        }
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    /// Ready once a model is loaded and healthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let components = self.components.read().await;
        match components.get(components::MODEL) {
            None => ReadinessResponse {
                ready: false,
                reason: Some("Model not loaded yet".to_string()),
            },
            Some(model) if model.status == ComponentStatus::Unhealthy => ReadinessResponse {
                ready: false,
                reason: model
                    .message
                    .clone()
                    .or_else(|| Some("Model unavailable".to_string())),
            },
            Some(_) => ReadinessResponse {
                ready: true,
                reason: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_state_is_healthy_but_not_ready() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
        assert!(!registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_ready_after_model_loaded() {
        let registry = HealthRegistry::new();
        registry.set_healthy(components::MODEL).await;
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_degraded_store_keeps_service_ready() {
        let registry = HealthRegistry::new();
        registry.set_healthy(components::MODEL).await;
        registry
            .set_degraded(components::FEEDBACK_STORE, "object store timed out")
            .await;

        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_unhealthy_model_not_ready() {
        let registry = HealthRegistry::new();
        registry
            .set_unhealthy(components::MODEL, "checksum mismatch")
            .await;

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("checksum mismatch"));
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_outbox_depth() {
        let registry = HealthRegistry::new();
        registry.record_outbox_depth(2).await;
        let health = registry.health().await;
        assert_eq!(
            health.components[components::OUTBOX].status,
            ComponentStatus::Degraded
        );

        registry.record_outbox_depth(0).await;
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
    }
}
