//! # Health Check Module
//!
//! - **Overall** (`/health`): store and live channel status, 503 when the
//!   store is not connected
//! - **Liveness Probe** (`/health/live`): is the process running?
//! - **Readiness Probe** (`/health/ready`): is the initial backfill done and
//!   the store usable?
//! - **Startup Probe** (`/health/startup`): has the engine been initialized?
//!
//! ## Usage
//!
//! ```rust,ignore
//! use axum::Router;
//! use rescache_node::health::{health_routes, HealthState};
//!
//! let health_state = HealthState::new(engine, store);
//! health_state.set_startup_complete(true);
//!
//! let app: Router<()> = Router::new()
//!     .merge(health_routes(health_state));
//! ```

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use rescache_storage::BlockStore;
use rescache_sync::{LiveState, SyncEngine};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Health status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is healthy.
    Up,
    /// Component is unhealthy.
    Down,
    /// Component status is unknown.
    Unknown,
}

/// Individual component health.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    /// Component status.
    pub status: HealthStatus,
    /// Optional latency in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ComponentHealth {
    /// Create a healthy component with latency and details.
    pub fn up_with(latency: Duration, details: serde_json::Value) -> Self {
        Self {
            status: HealthStatus::Up,
            latency_ms: Some(latency.as_millis() as u64),
            details: Some(details),
        }
    }

    /// Create an unhealthy component with reason.
    pub fn down_with_reason(reason: &str) -> Self {
        Self {
            status: HealthStatus::Down,
            latency_ms: None,
            details: Some(serde_json::json!({ "reason": reason })),
        }
    }
}

/// Liveness probe response.
#[derive(Debug, Clone, Serialize)]
pub struct LivenessResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Readiness probe response.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Component health checks.
    pub checks: HealthChecks,
}

/// Component checks.
#[derive(Debug, Clone, Serialize)]
pub struct HealthChecks {
    /// Local block store.
    pub store: ComponentHealth,
    /// WebSocket update channel to the ledger.
    pub live_channel: ComponentHealth,
}

/// Startup probe response.
#[derive(Debug, Clone, Serialize)]
pub struct StartupResponse {
    /// Overall status.
    pub status: HealthStatus,
}

/// Overall health response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Version info.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
    /// Highest block id persisted without gaps.
    pub cursor: u64,
    /// Component checks.
    pub checks: HealthChecks,
}

/// Health state for tracking component health.
#[derive(Clone)]
pub struct HealthState {
    start_time: Instant,
    startup_complete: Arc<AtomicBool>,
    engine: Arc<SyncEngine>,
    store: Arc<dyn BlockStore>,
}

impl HealthState {
    /// Create a new health state.
    pub fn new(engine: Arc<SyncEngine>, store: Arc<dyn BlockStore>) -> Self {
        Self {
            start_time: Instant::now(),
            startup_complete: Arc::new(AtomicBool::new(false)),
            engine,
            store,
        }
    }

    /// Get uptime in seconds.
    pub fn uptime(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Mark startup as complete.
    pub fn set_startup_complete(&self, complete: bool) {
        self.startup_complete.store(complete, Ordering::SeqCst);
    }

    /// Check if startup is complete.
    pub fn is_startup_complete(&self) -> bool {
        self.startup_complete.load(Ordering::SeqCst)
    }

    fn store_health(&self) -> ComponentHealth {
        if !self.store.is_connected() {
            return ComponentHealth::down_with_reason("store not connected");
        }

        let start = Instant::now();
        match self.store.len() {
            Ok(blocks) => {
                ComponentHealth::up_with(start.elapsed(), serde_json::json!({ "blocks": blocks }))
            }
            Err(e) => ComponentHealth::down_with_reason(&e.to_string()),
        }
    }

    fn live_channel_health(&self) -> ComponentHealth {
        let state = self.engine.live_state();
        let status = match state {
            LiveState::Connected => HealthStatus::Up,
            LiveState::Connecting => HealthStatus::Unknown,
            LiveState::Disconnected => HealthStatus::Down,
        };
        ComponentHealth {
            status,
            latency_ms: None,
            details: Some(serde_json::json!({
                "state": state,
                "endpoint": self.engine.endpoints().ws,
                "reconnect_attempts": self.engine.stats().reconnect_attempts,
            })),
        }
    }

    /// Get component checks.
    pub fn checks(&self) -> HealthChecks {
        HealthChecks {
            store: self.store_health(),
            live_channel: self.live_channel_health(),
        }
    }
}

/// Create health check routes.
pub fn health_routes<S>(state: HealthState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .route("/health/startup", get(startup_handler))
        .with_state(state)
}

fn status_code(status: HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Up => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Overall health handler.
///
/// A disconnected live channel is reported but does not fail the check; the
/// mirror keeps serving and the periodic re-fetch keeps it current.
async fn health_handler(State(state): State<HealthState>) -> Response {
    let checks = state.checks();
    let overall_status = checks.store.status;

    let response = HealthResponse {
        status: overall_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime(),
        cursor: state.engine.cursor(),
        checks,
    };

    (status_code(overall_status), Json(response)).into_response()
}

/// Liveness probe handler.
async fn liveness_handler(State(state): State<HealthState>) -> Response {
    let response = LivenessResponse {
        status: HealthStatus::Up,
        uptime_seconds: state.uptime(),
    };

    (StatusCode::OK, Json(response)).into_response()
}

/// Readiness probe handler.
async fn readiness_handler(State(state): State<HealthState>) -> Response {
    let checks = state.checks();
    let overall_status = if state.is_startup_complete() {
        checks.store.status
    } else {
        HealthStatus::Down
    };

    let response = ReadinessResponse {
        status: overall_status,
        checks,
    };

    (status_code(overall_status), Json(response)).into_response()
}

/// Startup probe handler.
async fn startup_handler(State(state): State<HealthState>) -> Response {
    let status = if state.is_startup_complete() {
        HealthStatus::Up
    } else {
        HealthStatus::Down
    };

    (status_code(status), Json(StartupResponse { status })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use rescache_storage::MemoryBlockStore;
    use rescache_sync::{LedgerConfig, SyncOptions};
    use tower::ServiceExt;

    fn state() -> (HealthState, Arc<MemoryBlockStore>) {
        let store = Arc::new(MemoryBlockStore::new());
        let engine = SyncEngine::new(
            LedgerConfig::new("resilientdb://127.0.0.1:18000"),
            SyncOptions::default(),
            store.clone(),
            None,
        )
        .unwrap();
        (HealthState::new(Arc::new(engine), store.clone()), store)
    }

    async fn get_json(state: HealthState, uri: &str) -> (StatusCode, serde_json::Value) {
        let app: Router = health_routes(state);
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn test_startup_flag() {
        let (state, _) = state();
        assert!(!state.is_startup_complete());
        state.set_startup_complete(true);
        assert!(state.is_startup_complete());
    }

    #[test]
    fn test_component_health() {
        let down = ComponentHealth::down_with_reason("test failure");
        assert_eq!(down.status, HealthStatus::Down);
        assert!(down.details.is_some());
    }

    #[tokio::test]
    async fn test_health_unavailable_until_store_connected() {
        let (state, store) = state();

        let (status, body) = get_json(state.clone(), "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "down");
        assert_eq!(body["checks"]["store"]["status"], "down");

        store.connect().unwrap();
        let (status, body) = get_json(state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "up");
        assert_eq!(body["checks"]["store"]["details"]["blocks"], 0);
        assert_eq!(body["checks"]["live_channel"]["status"], "down");
    }

    #[tokio::test]
    async fn test_readiness_waits_for_startup() {
        let (state, store) = state();
        store.connect().unwrap();

        let (status, _) = get_json(state.clone(), "/health/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        state.set_startup_complete(true);
        let (status, _) = get_json(state.clone(), "/health/ready").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = get_json(state, "/health/live").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "up");
    }
}
