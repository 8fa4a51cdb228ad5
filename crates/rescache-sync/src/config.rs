//! Engine configuration and ledger endpoint resolution.

use crate::error::{Result, SyncError};
use rescache_types::LEDGER_SCHEME;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Path of the paginated block API on the ledger.
pub const BLOCKS_PATH: &str = "/v1/blocks";

/// Path of the block update WebSocket on the ledger.
pub const UPDATES_PATH: &str = "/blockupdatelistener";

/// Connection settings for the remote ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Ledger address, e.g. `resilientdb://localhost:18000`.
    pub base_url: String,
    /// Use `https` for the block API.
    pub http_secure: bool,
    /// Use `wss` for the update channel.
    pub ws_secure: bool,
    /// Full block API URL, overriding the derived one.
    pub http_endpoint: Option<String>,
    /// Full update channel URL, overriding the derived one.
    pub ws_endpoint: Option<String>,
    /// Base reconnect delay in milliseconds.
    pub reconnect_interval_ms: u64,
    /// Periodic re-fetch interval in milliseconds.
    pub fetch_interval_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_url: format!("{LEDGER_SCHEME}://localhost:18000"),
            http_secure: false,
            ws_secure: false,
            http_endpoint: None,
            ws_endpoint: None,
            reconnect_interval_ms: 5_000,
            fetch_interval_ms: 30_000,
        }
    }
}

impl LedgerConfig {
    /// Creates a configuration for `base_url` with default timings.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Base reconnect delay.
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Periodic re-fetch interval.
    pub fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms)
    }
}

/// Tuning of the backfill and the live channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Number of block ids per page.
    pub batch_size: u64,
    /// Maximum number of page fetches in flight.
    pub concurrency: usize,
    /// Ceiling for the reconnect delay in milliseconds.
    pub max_reconnect_delay_ms: u64,
    /// Timeout for a single WebSocket connection attempt in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            concurrency: 5,
            max_reconnect_delay_ms: 300_000,
            connect_timeout_ms: 10_000,
        }
    }
}

impl SyncOptions {
    /// Ceiling for the reconnect delay.
    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }

    /// Timeout for a single connection attempt.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Concrete URLs derived from a [`LedgerConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEndpoints {
    /// Block API base; pages live at `{http}/{min}/{max}`.
    pub http: String,
    /// Update channel URL.
    pub ws: String,
}

impl LedgerEndpoints {
    /// Validates the base URL and derives both endpoints.
    ///
    /// Explicit endpoint overrides win over the derived URLs, but the base URL
    /// must still be a valid ledger address.
    pub fn resolve(config: &LedgerConfig) -> Result<Self> {
        let url = Url::parse(&config.base_url)
            .map_err(|e| SyncError::InvalidBaseUrl(format!("{}: {e}", config.base_url)))?;

        if url.scheme() != LEDGER_SCHEME {
            return Err(SyncError::InvalidBaseUrl(format!(
                "expected scheme {LEDGER_SCHEME}://, got {}://",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| SyncError::InvalidBaseUrl(format!("{}: missing host", config.base_url)))?;
        let host_port = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let http_scheme = if config.http_secure { "https" } else { "http" };
        let ws_scheme = if config.ws_secure { "wss" } else { "ws" };

        let endpoints = Self {
            http: config
                .http_endpoint
                .clone()
                .unwrap_or_else(|| format!("{http_scheme}://{host_port}{BLOCKS_PATH}")),
            ws: config
                .ws_endpoint
                .clone()
                .unwrap_or_else(|| format!("{ws_scheme}://{host_port}{UPDATES_PATH}")),
        };

        tracing::info!(http = %endpoints.http, ws = %endpoints.ws, "Resolved ledger endpoints");
        Ok(endpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::new("resilientdb://localhost:18000");
        assert_eq!(config.reconnect_interval(), Duration::from_secs(5));
        assert_eq!(config.fetch_interval(), Duration::from_secs(30));

        let options = SyncOptions::default();
        assert_eq!(options.batch_size, 100);
        assert_eq!(options.concurrency, 5);
        assert_eq!(options.max_reconnect_delay(), Duration::from_secs(300));
    }

    #[test]
    fn test_resolve_plain() {
        let endpoints =
            LedgerEndpoints::resolve(&LedgerConfig::new("resilientdb://localhost:18000")).unwrap();
        assert_eq!(endpoints.http, "http://localhost:18000/v1/blocks");
        assert_eq!(endpoints.ws, "ws://localhost:18000/blockupdatelistener");
    }

    #[test]
    fn test_resolve_secure_without_port() {
        let config = LedgerConfig {
            http_secure: true,
            ws_secure: true,
            ..LedgerConfig::new("resilientdb://ledger.example.com")
        };
        let endpoints = LedgerEndpoints::resolve(&config).unwrap();
        assert_eq!(endpoints.http, "https://ledger.example.com/v1/blocks");
        assert_eq!(endpoints.ws, "wss://ledger.example.com/blockupdatelistener");
    }

    #[test]
    fn test_resolve_overrides() {
        let config = LedgerConfig {
            http_endpoint: Some("http://proxy/blocks".to_string()),
            ws_endpoint: Some("ws://proxy/updates".to_string()),
            ..LedgerConfig::new("resilientdb://localhost:18000")
        };
        let endpoints = LedgerEndpoints::resolve(&config).unwrap();
        assert_eq!(endpoints.http, "http://proxy/blocks");
        assert_eq!(endpoints.ws, "ws://proxy/updates");
    }

    #[test]
    fn test_rejects_wrong_scheme() {
        for base in ["http://localhost:18000", "not a url", "resilientdb:nohost"] {
            let err = LedgerEndpoints::resolve(&LedgerConfig::new(base)).unwrap_err();
            assert!(matches!(err, SyncError::InvalidBaseUrl(_)), "{base}");
        }
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: SyncOptions = serde_json::from_str(r#"{"concurrency": 2}"#).unwrap();
        assert_eq!(options.concurrency, 2);
        assert_eq!(options.batch_size, 100);
    }
}
