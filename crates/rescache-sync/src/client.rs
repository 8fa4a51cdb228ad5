//! HTTP client for the ledger block API.

use crate::error::ApiError;
use async_trait::async_trait;
use rescache_types::{BatchRange, Block};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Request timeout for a single page.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A source of ledger blocks, fetched one page at a time.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Fetches the blocks whose ids fall in `range`.
    ///
    /// An empty result means the ledger has no blocks in that range.
    async fn fetch_range(&self, range: BatchRange) -> Result<Vec<Block>, ApiError>;
}

#[async_trait]
impl<T: BlockSource + ?Sized> BlockSource for Arc<T> {
    async fn fetch_range(&self, range: BatchRange) -> Result<Vec<Block>, ApiError> {
        (**self).fetch_range(range).await
    }
}

/// HTTP client for the ledger block API.
///
/// The client is cheaply cloneable and can be shared across workers.
#[derive(Debug, Clone)]
pub struct LedgerClient {
    endpoint: String,
    http: reqwest::Client,
}

impl LedgerClient {
    /// Creates a client for the block API at `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Ok(Self { endpoint, http })
    }

    /// Returns the block API base URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn page_url(&self, range: BatchRange) -> String {
        format!("{}/{}/{}", self.endpoint, range.min_seq, range.max_seq)
    }
}

#[async_trait]
impl BlockSource for LedgerClient {
    async fn fetch_range(&self, range: BatchRange) -> Result<Vec<Block>, ApiError> {
        let res = self.http.get(self.page_url(range)).send().await?;

        if !res.status().is_success() {
            return Err(ApiError::NodeError {
                status: res.status().as_u16(),
                message: res.text().await.unwrap_or_default(),
            });
        }

        let body: Value = res
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        match body {
            Value::Array(items) => serde_json::from_value(Value::Array(items))
                .map_err(|e| ApiError::InvalidResponse(e.to_string())),
            other => {
                tracing::debug!(range = %range, body = %other, "Ledger returned a non-array page");
                Ok(Vec::new())
            }
        }
    }
}
