//! Keyed persistence used by the engine components.
//!
//! Each component depends only on the trait it needs. History inserts skip
//! keys that already exist, so a stored `(subject, epoch)` row is never
//! overwritten.

pub mod memory;
pub mod migrations;
pub mod sqlite;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::types::{
    AccountEpochHistory, ApprovedPool, CampaignDraft, EpochTotalStake, FisoCampaign,
    PoolCacheEntry, PoolEpochHistory, StakePool, StakePoolStats,
};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub trait PoolStore: Send + Sync {
    /// Looks a pool up by bech32 id or hex id.
    fn find_pool(&self, id_or_hex: &str) -> Result<Option<StakePool>>;
    /// Creates the identity row; an existing row is left untouched.
    fn insert_pool(&self, pool: &StakePool) -> Result<()>;
    fn pool_stats(&self, pool_id: &str) -> Result<Option<StakePoolStats>>;
    fn upsert_pool_stats(&self, stats: &StakePoolStats) -> Result<()>;
    fn cache_entry(&self, key: &str) -> Result<Option<PoolCacheEntry>>;
    fn upsert_cache_entry(&self, entry: &PoolCacheEntry) -> Result<()>;
    fn touch_cache_entry(&self, key: &str, at: DateTime<Utc>) -> Result<()>;
}

pub trait HistoryStore: Send + Sync {
    /// Stored rows for `pool_id` within `[start, end]`, oldest first.
    fn pool_history(&self, pool_id: &str, start: u64, end: u64) -> Result<Vec<PoolEpochHistory>>;
    /// Returns how many rows were new.
    fn insert_pool_history(&self, rows: &[PoolEpochHistory]) -> Result<usize>;
    fn account_history(
        &self,
        stake_account: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<AccountEpochHistory>>;
    fn insert_account_history(&self, rows: &[AccountEpochHistory]) -> Result<usize>;
}

pub trait CampaignStore: Send + Sync {
    fn create_campaign(&self, draft: &CampaignDraft) -> Result<FisoCampaign>;
    fn campaign(&self, id: i64) -> Result<Option<FisoCampaign>>;
    fn update_campaign_epochs(&self, id: i64, start_epoch: u64, end_epoch: u64) -> Result<()>;
    fn approved_pools(&self, fiso_id: i64) -> Result<Vec<ApprovedPool>>;
    fn replace_approved_pools(&self, fiso_id: i64, pools: &[ApprovedPool]) -> Result<()>;
    /// Stored totals, ascending by epoch.
    fn epoch_totals(&self, fiso_id: i64) -> Result<Vec<EpochTotalStake>>;
    fn insert_epoch_totals(&self, fiso_id: i64, totals: &[EpochTotalStake]) -> Result<()>;
    fn set_totals_complete_through(&self, fiso_id: i64, epoch: Option<u64>) -> Result<()>;
    /// Drops every stored total and the completeness marker.
    fn clear_epoch_totals(&self, fiso_id: i64) -> Result<()>;
}

pub trait Store: PoolStore + HistoryStore + CampaignStore {}

impl<T: PoolStore + HistoryStore + CampaignStore> Store for T {}
