//! Stake-pool display data with stale-while-revalidate caching.
//!
//! A requested id set maps to one cache entry. Fresh entries are returned
//! as-is. A stale entry is stamped with the current time before anything
//! else, so concurrent readers inside the window keep serving it, and is
//! rebuilt in a detached task while the caller gets the stale bundle. The
//! stamp is advisory: two readers racing on the same stale row may both
//! rebuild it.

pub mod cache;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::FisoError;
use crate::indexer::{Indexer, PoolResponse};
use crate::pools::cache::{cache_key, freshness, normalize_ids, Freshness};
use crate::store::PoolStore;
use crate::types::{
    parse_lovelace, PoolCacheEntry, PoolInfo, PoolInfoBundle, PoolResolutionError, StakePool,
    StakePoolStats,
};

#[derive(Clone)]
pub struct PoolInfoService {
    indexer: Arc<dyn Indexer>,
    store: Arc<dyn PoolStore>,
    bundle_staleness: Duration,
    stats_staleness: Duration,
}

impl PoolInfoService {
    pub fn new(indexer: Arc<dyn Indexer>, store: Arc<dyn PoolStore>, config: &CacheConfig) -> Self {
        Self {
            indexer,
            store,
            bundle_staleness: config.pool_bundle_staleness(),
            stats_staleness: config.pool_stats_staleness(),
        }
    }

    /// Resolves `ids` (bech32 or hex) to merged pool records. Unresolvable
    /// ids land in `errors` instead of failing the batch.
    pub async fn pool_info<S: AsRef<str>>(&self, ids: &[S]) -> Result<PoolInfoBundle, FisoError> {
        let ids = normalize_ids(ids);
        let key = cache_key(&ids);
        let now = Utc::now();

        if let Some(entry) = self.store.cache_entry(&key)? {
            match freshness(entry.updated_at, now, self.bundle_staleness) {
                Freshness::Fresh => {
                    debug!("pool cache hit for {} ids", ids.len());
                    return Ok(entry.bundle);
                }
                Freshness::Stale => {
                    self.store.touch_cache_entry(&key, now)?;
                    info!("pool cache entry {key} stale; refreshing in background");
                    self.spawn_refresh(key, ids);
                    return Ok(entry.bundle);
                }
            }
        }

        info!("pool cache miss for {} ids", ids.len());
        let bundle = self.build_bundle(&ids).await;
        self.store.upsert_cache_entry(&PoolCacheEntry {
            key,
            bundle: bundle.clone(),
            updated_at: Utc::now(),
        })?;
        Ok(bundle)
    }

    fn spawn_refresh(&self, key: String, ids: Vec<String>) {
        let service = self.clone();
        tokio::spawn(async move {
            let bundle = service.build_bundle(&ids).await;
            let entry = PoolCacheEntry {
                key: key.clone(),
                bundle,
                updated_at: Utc::now(),
            };
            if let Err(error) = service.store.upsert_cache_entry(&entry) {
                warn!("failed writing refreshed pool cache entry {key}: {error:#}");
            }
        });
    }

    async fn build_bundle(&self, ids: &[String]) -> PoolInfoBundle {
        let mut bundle = PoolInfoBundle::default();
        for id in ids {
            let pool = match self.resolve_pool(id).await {
                Ok(pool) => pool,
                Err(error) => {
                    warn!("failed resolving pool {id}: {error}");
                    bundle.errors.push(PoolResolutionError {
                        pool_id: id.clone(),
                        error: error.to_string(),
                    });
                    continue;
                }
            };
            match self.current_stats(&pool.pool_id).await {
                Ok(stats) => bundle.successful_pools.push(PoolInfo {
                    pool,
                    stats: Some(stats),
                }),
                Err(error) => {
                    warn!("failed refreshing stats for pool {}: {error}", pool.pool_id);
                    bundle.errors.push(PoolResolutionError {
                        pool_id: pool.pool_id,
                        error: error.to_string(),
                    });
                }
            }
        }
        bundle
    }

    async fn resolve_pool(&self, id: &str) -> Result<StakePool, FisoError> {
        if let Some(pool) = self.store.find_pool(id)? {
            return Ok(pool);
        }
        let metadata = self.indexer.pool_metadata(id).await?;
        let pool = StakePool {
            pool_id: metadata.pool_id,
            hex_id: metadata.hex,
            ticker: metadata.ticker,
            name: metadata.name,
            homepage: metadata.homepage,
            description: metadata.description,
        };
        self.store.insert_pool(&pool)?;
        // Another writer may have created the row first; theirs is canonical.
        Ok(self.store.find_pool(&pool.pool_id)?.unwrap_or(pool))
    }

    async fn current_stats(&self, pool_id: &str) -> Result<StakePoolStats, FisoError> {
        let now = Utc::now();
        if let Some(stats) = self.store.pool_stats(pool_id)? {
            if freshness(stats.updated_at, now, self.stats_staleness) == Freshness::Fresh {
                return Ok(stats);
            }
        }
        let response = self.indexer.pool(pool_id).await?;
        let stats = stats_from_response(pool_id, &response, now)?;
        self.store.upsert_pool_stats(&stats)?;
        Ok(stats)
    }
}

fn stats_from_response(
    pool_id: &str,
    response: &PoolResponse,
    now: chrono::DateTime<Utc>,
) -> Result<StakePoolStats, FisoError> {
    Ok(StakePoolStats {
        pool_id: pool_id.to_string(),
        live_stake: parse_lovelace(&response.live_stake)?,
        live_pledge: parse_lovelace(&response.live_pledge)?,
        margin_cost: response.margin_cost,
        fixed_cost: parse_lovelace(&response.fixed_cost)?,
        live_saturation: response.live_saturation,
        live_delegators: response.live_delegators,
        updated_at: now,
    })
}
