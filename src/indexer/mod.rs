//! Read-only access to the chain indexer.
//!
//! History endpoints paginate [`HISTORY_PAGE_SIZE`] epochs per page, newest
//! first. Quantities come back as decimal strings of lovelace.

pub mod http;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::BlockfrostClient;

pub const HISTORY_PAGE_SIZE: u64 = 100;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("GET {url} returned 404")]
    NotFound { url: String },
    #[error("GET {url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl IndexerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PoolMetadataResponse {
    pub pool_id: String,
    pub hex: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PoolResponse {
    pub pool_id: String,
    pub hex: String,
    #[serde(default)]
    pub live_stake: String,
    #[serde(default)]
    pub live_pledge: String,
    #[serde(default)]
    pub live_saturation: f64,
    #[serde(default)]
    pub live_delegators: u64,
    #[serde(default)]
    pub margin_cost: f64,
    #[serde(default)]
    pub fixed_cost: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolHistoryEntry {
    pub epoch: u64,
    pub active_stake: String,
    pub delegators_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AccountResponse {
    pub stake_address: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub pool_id: Option<String>,
    #[serde(default)]
    pub controlled_amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountHistoryEntry {
    pub active_epoch: u64,
    pub amount: String,
    pub pool_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpochResponse {
    pub epoch: u64,
}

#[async_trait]
pub trait Indexer: Send + Sync {
    /// `GET /pools/{id}/metadata`; `id` may be bech32 or hex.
    async fn pool_metadata(&self, id: &str) -> Result<PoolMetadataResponse, IndexerError>;
    /// `GET /pools/{id}`
    async fn pool(&self, id: &str) -> Result<PoolResponse, IndexerError>;
    /// `GET /pools/{id}/history?page=N&order=desc`
    async fn pool_history(&self, id: &str, page: u64)
        -> Result<Vec<PoolHistoryEntry>, IndexerError>;
    /// `GET /accounts/{address}`
    async fn account(&self, address: &str) -> Result<AccountResponse, IndexerError>;
    /// `GET /accounts/{address}/history?page=N&order=desc`
    async fn account_history(
        &self,
        address: &str,
        page: u64,
    ) -> Result<Vec<AccountHistoryEntry>, IndexerError>;
    /// `GET /epochs/latest`
    async fn latest_epoch(&self) -> Result<u64, IndexerError>;
}
