use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use crate::store::{CampaignStore, HistoryStore, PoolStore};
use crate::types::{
    AccountEpochHistory, ApprovedPool, CampaignDraft, EpochTotalStake, FisoCampaign,
    PoolCacheEntry, PoolEpochHistory, StakePool, StakePoolStats,
};

#[derive(Default)]
struct Tables {
    pools: BTreeMap<String, StakePool>,
    stats: HashMap<String, StakePoolStats>,
    cache: HashMap<String, PoolCacheEntry>,
    pool_history: BTreeMap<(String, u64), PoolEpochHistory>,
    account_history: BTreeMap<(String, u64), AccountEpochHistory>,
    campaigns: BTreeMap<i64, FisoCampaign>,
    approved: HashMap<i64, Vec<ApprovedPool>>,
    totals: HashMap<i64, BTreeMap<u64, EpochTotalStake>>,
}

/// Process-local store with the same semantics as [`super::SqliteStore`].
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow!("memory store mutex poisoned"))
    }
}

impl PoolStore for MemoryStore {
    fn find_pool(&self, id_or_hex: &str) -> Result<Option<StakePool>> {
        let tables = self.tables()?;
        if let Some(pool) = tables.pools.get(id_or_hex) {
            return Ok(Some(pool.clone()));
        }
        Ok(tables
            .pools
            .values()
            .find(|pool| pool.hex_id == id_or_hex)
            .cloned())
    }

    fn insert_pool(&self, pool: &StakePool) -> Result<()> {
        self.tables()?
            .pools
            .entry(pool.pool_id.clone())
            .or_insert_with(|| pool.clone());
        Ok(())
    }

    fn pool_stats(&self, pool_id: &str) -> Result<Option<StakePoolStats>> {
        Ok(self.tables()?.stats.get(pool_id).cloned())
    }

    fn upsert_pool_stats(&self, stats: &StakePoolStats) -> Result<()> {
        self.tables()?
            .stats
            .insert(stats.pool_id.clone(), stats.clone());
        Ok(())
    }

    fn cache_entry(&self, key: &str) -> Result<Option<PoolCacheEntry>> {
        Ok(self.tables()?.cache.get(key).cloned())
    }

    fn upsert_cache_entry(&self, entry: &PoolCacheEntry) -> Result<()> {
        self.tables()?
            .cache
            .insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    fn touch_cache_entry(&self, key: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(entry) = self.tables()?.cache.get_mut(key) {
            entry.updated_at = at;
        }
        Ok(())
    }
}

impl HistoryStore for MemoryStore {
    fn pool_history(&self, pool_id: &str, start: u64, end: u64) -> Result<Vec<PoolEpochHistory>> {
        if start > end {
            return Ok(Vec::new());
        }
        let tables = self.tables()?;
        Ok(tables
            .pool_history
            .range((pool_id.to_string(), start)..=(pool_id.to_string(), end))
            .map(|(_, row)| row.clone())
            .collect())
    }

    fn insert_pool_history(&self, rows: &[PoolEpochHistory]) -> Result<usize> {
        let mut tables = self.tables()?;
        let mut inserted = 0;
        for row in rows {
            let key = (row.pool_id.clone(), row.epoch);
            if !tables.pool_history.contains_key(&key) {
                tables.pool_history.insert(key, row.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn account_history(
        &self,
        stake_account: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<AccountEpochHistory>> {
        if start > end {
            return Ok(Vec::new());
        }
        let tables = self.tables()?;
        Ok(tables
            .account_history
            .range((stake_account.to_string(), start)..=(stake_account.to_string(), end))
            .map(|(_, row)| row.clone())
            .collect())
    }

    fn insert_account_history(&self, rows: &[AccountEpochHistory]) -> Result<usize> {
        let mut tables = self.tables()?;
        let mut inserted = 0;
        for row in rows {
            let key = (row.stake_account.clone(), row.epoch);
            if !tables.account_history.contains_key(&key) {
                tables.account_history.insert(key, row.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

impl CampaignStore for MemoryStore {
    fn create_campaign(&self, draft: &CampaignDraft) -> Result<FisoCampaign> {
        let mut tables = self.tables()?;
        let id = tables.campaigns.keys().next_back().copied().unwrap_or(0) + 1;
        let campaign = FisoCampaign {
            id,
            project_slug: draft.project_slug.clone(),
            token_amount: draft.token_amount,
            token_ticker: draft.token_ticker.clone(),
            start_epoch: draft.start_epoch,
            end_epoch: draft.end_epoch,
            totals_complete_through: None,
        };
        tables.campaigns.insert(id, campaign.clone());
        Ok(campaign)
    }

    fn campaign(&self, id: i64) -> Result<Option<FisoCampaign>> {
        Ok(self.tables()?.campaigns.get(&id).cloned())
    }

    fn update_campaign_epochs(&self, id: i64, start_epoch: u64, end_epoch: u64) -> Result<()> {
        if let Some(campaign) = self.tables()?.campaigns.get_mut(&id) {
            campaign.start_epoch = start_epoch;
            campaign.end_epoch = end_epoch;
        }
        Ok(())
    }

    fn approved_pools(&self, fiso_id: i64) -> Result<Vec<ApprovedPool>> {
        let mut pools = self
            .tables()?
            .approved
            .get(&fiso_id)
            .cloned()
            .unwrap_or_default();
        pools.sort_by(|a, b| a.pool_id.cmp(&b.pool_id));
        Ok(pools)
    }

    fn replace_approved_pools(&self, fiso_id: i64, pools: &[ApprovedPool]) -> Result<()> {
        self.tables()?.approved.insert(fiso_id, pools.to_vec());
        Ok(())
    }

    fn epoch_totals(&self, fiso_id: i64) -> Result<Vec<EpochTotalStake>> {
        Ok(self
            .tables()?
            .totals
            .get(&fiso_id)
            .map(|totals| totals.values().copied().collect())
            .unwrap_or_default())
    }

    fn insert_epoch_totals(&self, fiso_id: i64, totals: &[EpochTotalStake]) -> Result<()> {
        let mut tables = self.tables()?;
        let stored = tables.totals.entry(fiso_id).or_default();
        for total in totals {
            stored.entry(total.epoch).or_insert(*total);
        }
        Ok(())
    }

    fn set_totals_complete_through(&self, fiso_id: i64, epoch: Option<u64>) -> Result<()> {
        if let Some(campaign) = self.tables()?.campaigns.get_mut(&fiso_id) {
            campaign.totals_complete_through = epoch;
        }
        Ok(())
    }

    fn clear_epoch_totals(&self, fiso_id: i64) -> Result<()> {
        let mut tables = self.tables()?;
        tables.totals.remove(&fiso_id);
        if let Some(campaign) = tables.campaigns.get_mut(&fiso_id) {
            campaign.totals_complete_through = None;
        }
        Ok(())
    }
}
