//! # Rescache Node
//!
//! Daemon that keeps a local mirror of a ResilientDB ledger in sync and serves
//! it to dashboards over HTTP.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Rescache Node                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  HTTP API (axum)                                            │
//! │  • /v1/blocks/{start}/{end}   mirrored blocks               │
//! │  • /v1/blocks/encoded         delta-encoded volume series   │
//! │  • /v1/sync/status            engine cursor and counters    │
//! │  • /health, /metrics          probes and Prometheus         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Sync engine (rescache-sync)                                │
//! │  • backfill passes over the ledger's paginated block API    │
//! │  • live "Update blocks" notifications over WebSocket        │
//! │  • periodic re-fetch                                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Block store (rescache-storage): memory or RocksDB          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cargo run --bin rescache-node -- --base-url resilientdb://localhost:18000
//! ```
//!
//! ## Modules
//!
//! - [`api`] - HTTP endpoints over the mirror and the engine
//! - [`config`] - Layered node configuration
//! - [`health`] - Health check endpoints (overall, liveness, readiness, startup)
//! - [`node`] - Startup and graceful shutdown
//! - [`observability`] - Structured logging, metrics, and request tracing

pub mod api;
pub mod config;
pub mod health;
pub mod node;
pub mod observability;

pub use node::{run, shutdown_signal, NodeError};
