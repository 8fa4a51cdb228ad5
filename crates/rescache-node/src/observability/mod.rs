//! # Observability Module
//!
//! - **Structured Logging**: pretty or JSON logs through `tracing`
//! - **Prometheus Metrics**: HTTP and sync engine metrics
//! - **Request Tracing**: request ID propagation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use axum::{middleware, Router};
//! use rescache_node::observability::{init_logging, request_id_middleware, LogFormat, MetricsState};
//!
//! init_logging("info", LogFormat::Json);
//!
//! let metrics = MetricsState::new();
//! let app: Router<()> = Router::new()
//!     .layer(middleware::from_fn(request_id_middleware));
//! ```

mod logging;
mod metrics;
pub mod middleware;

pub use logging::{default_directives, init_logging, LogFormat};
pub use metrics::{ErrorLabels, HttpLabels, MetricsState};
pub use middleware::{
    metrics_middleware, request_id_middleware, RequestId, REQUEST_ID_HEADER, UNMATCHED_PATH,
};
