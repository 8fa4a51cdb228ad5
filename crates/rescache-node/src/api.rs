//! HTTP API for the rescache node.
//!
//! Serves the mirrored blocks, their delta-encoded transaction-volume series,
//! the sync engine status and Prometheus metrics.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use rescache_storage::{BlockStore, StorageError};
use rescache_sync::{HubStats, LiveState, PassReport, SyncEngine, SyncStats};
use rescache_types::{Block, DeltaEncodedData};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::health::{health_routes, HealthState};
use crate::observability::{metrics_middleware, request_id_middleware, MetricsState};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The sync engine keeping the mirror current.
    pub engine: Arc<SyncEngine>,
    /// The local block mirror.
    pub store: Arc<dyn BlockStore>,
    /// Prometheus metrics.
    pub metrics: MetricsState,
    /// Health probe state.
    pub health: HealthState,
}

impl AppState {
    /// Creates the state for `engine` mirroring into `store`.
    pub fn new(engine: Arc<SyncEngine>, store: Arc<dyn BlockStore>, metrics: MetricsState) -> Self {
        let health = HealthState::new(engine.clone(), store.clone());
        Self {
            engine,
            store,
            metrics,
            health,
        }
    }
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("no blocks in the mirror")]
    NoBlocks,
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("metrics encoding failed")]
    Metrics(#[from] std::fmt::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NoBlocks => StatusCode::NOT_FOUND,
            ApiError::Storage(StorageError::NotConnected) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Storage(_) | ApiError::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Query of the encoded series endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct EncodedQuery {
    /// First block id, inclusive.
    pub start: Option<u64>,
    /// Last block id, inclusive.
    pub end: Option<u64>,
}

/// Resolved ledger URLs.
#[derive(Debug, Serialize)]
pub struct EndpointsInfo {
    /// Block API base.
    pub http: String,
    /// Update channel.
    pub ws: String,
}

/// Response of `GET /v1/sync/status`.
#[derive(Debug, Serialize)]
pub struct SyncStatusResponse {
    /// Highest block id persisted without gaps.
    pub cursor: u64,
    /// Live channel state.
    pub live_state: LiveState,
    /// Whether the background tasks are running.
    pub running: bool,
    /// Ledger URLs in use.
    pub endpoints: EndpointsInfo,
    /// Engine counters.
    pub stats: SyncStats,
    /// Most recent pass, if any.
    pub last_pass: Option<PassReport>,
    /// Emitted event counters.
    pub events: HubStats,
}

/// Creates the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/blocks/encoded", get(encoded_series))
        .route("/v1/blocks/{start}/{end}", get(blocks_in_range))
        .route("/v1/sync/status", get(sync_status))
        .route("/metrics", get(metrics_handler))
        .merge(health_routes(state.health.clone()))
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            metrics_middleware,
        ))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Mirrored blocks with ids in `start..=end`.
async fn blocks_in_range(
    State(state): State<AppState>,
    Path((start, end)): Path<(u64, u64)>,
) -> Result<Json<Vec<Block>>, ApiError> {
    if start > end {
        return Err(ApiError::BadRequest(format!(
            "start ({start}) must not exceed end ({end})"
        )));
    }

    Ok(Json(state.store.blocks_in_range(start, end)?))
}

/// Delta-encoded transaction-volume series of the mirrored blocks.
///
/// Without `start` and `end` the whole mirror is encoded.
async fn encoded_series(
    State(state): State<AppState>,
    Query(query): Query<EncodedQuery>,
) -> Result<Json<DeltaEncodedData>, ApiError> {
    let blocks = match (query.start, query.end) {
        (Some(start), Some(end)) if start > end => {
            return Err(ApiError::BadRequest(format!(
                "start ({start}) must not exceed end ({end})"
            )));
        }
        (Some(start), Some(end)) => state.store.blocks_in_range(start, end)?,
        (None, None) => state.store.all_blocks()?,
        _ => {
            return Err(ApiError::BadRequest(
                "start and end must be given together".to_string(),
            ));
        }
    };

    if blocks.is_empty() {
        return Err(ApiError::NoBlocks);
    }

    Ok(Json(rescache_codec::encode_blocks(&blocks)))
}

/// Cursor, counters and live channel state of the engine.
async fn sync_status(State(state): State<AppState>) -> Json<SyncStatusResponse> {
    let engine = &state.engine;
    let endpoints = engine.endpoints();

    Json(SyncStatusResponse {
        cursor: engine.cursor(),
        live_state: engine.live_state(),
        running: engine.is_running(),
        endpoints: EndpointsInfo {
            http: endpoints.http.clone(),
            ws: endpoints.ws.clone(),
        },
        stats: engine.stats(),
        last_pass: engine.last_pass(),
        events: engine.event_stats(),
    })
}

/// Prometheus text exposition.
async fn metrics_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    state
        .metrics
        .observe_sync(&state.engine.stats(), state.store.len().ok());
    let body = state.metrics.encode()?;

    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        Body::from(body),
    )
        .into_response())
}
