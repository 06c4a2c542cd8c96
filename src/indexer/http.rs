use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::IndexerConfig;
use crate::indexer::{
    AccountHistoryEntry, AccountResponse, EpochResponse, Indexer, IndexerError,
    PoolHistoryEntry, PoolMetadataResponse, PoolResponse, HISTORY_PAGE_SIZE,
};

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 6;
const ERROR_PREVIEW_CHARS: usize = 180;

/// Blockfrost-compatible indexer client.
#[derive(Debug, Clone)]
pub struct BlockfrostClient {
    http: Client,
    base_url: String,
}

impl BlockfrostClient {
    pub fn new(config: &IndexerConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if !config.project_id.trim().is_empty() {
            let value = HeaderValue::from_str(config.project_id.trim())
                .context("indexer project_id is not a valid header value")?;
            headers.insert("project_id", value);
        }
        let http = Client::builder()
            .user_agent(concat!("fiso-rewards/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .build()
            .context("failed to build indexer HTTP client")?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: String) -> Result<T, IndexerError> {
        debug!("GET {url}");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| IndexerError::Transport {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(IndexerError::NotFound { url });
        }
        let body = response
            .text()
            .await
            .map_err(|source| IndexerError::Transport {
                url: url.clone(),
                source,
            })?;
        if !status.is_success() {
            let preview: String = body.chars().take(ERROR_PREVIEW_CHARS).collect();
            return Err(IndexerError::Status {
                url,
                status: status.as_u16(),
                body: preview,
            });
        }
        serde_json::from_str(&body).map_err(|source| IndexerError::Decode { url, source })
    }
}

#[async_trait]
impl Indexer for BlockfrostClient {
    async fn pool_metadata(&self, id: &str) -> Result<PoolMetadataResponse, IndexerError> {
        self.fetch_json(self.url(&format!("/pools/{id}/metadata")))
            .await
    }

    async fn pool(&self, id: &str) -> Result<PoolResponse, IndexerError> {
        self.fetch_json(self.url(&format!("/pools/{id}"))).await
    }

    async fn pool_history(
        &self,
        id: &str,
        page: u64,
    ) -> Result<Vec<PoolHistoryEntry>, IndexerError> {
        self.fetch_json(self.url(&history_path("pools", id, page)))
            .await
    }

    async fn account(&self, address: &str) -> Result<AccountResponse, IndexerError> {
        self.fetch_json(self.url(&format!("/accounts/{address}")))
            .await
    }

    async fn account_history(
        &self,
        address: &str,
        page: u64,
    ) -> Result<Vec<AccountHistoryEntry>, IndexerError> {
        self.fetch_json(self.url(&history_path("accounts", address, page)))
            .await
    }

    async fn latest_epoch(&self) -> Result<u64, IndexerError> {
        let latest: EpochResponse = self.fetch_json(self.url("/epochs/latest")).await?;
        Ok(latest.epoch)
    }
}

fn history_path(resource: &str, id: &str, page: u64) -> String {
    format!("/{resource}/{id}/history?count={HISTORY_PAGE_SIZE}&page={page}&order=desc")
}
