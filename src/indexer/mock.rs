use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::indexer::{
    AccountHistoryEntry, AccountResponse, Indexer, IndexerError, PoolHistoryEntry,
    PoolMetadataResponse, PoolResponse, HISTORY_PAGE_SIZE,
};

#[derive(Default)]
struct Fixtures {
    current_epoch: u64,
    metadata: HashMap<String, PoolMetadataResponse>,
    pools: HashMap<String, PoolResponse>,
    pool_history: HashMap<String, BTreeMap<u64, (u64, u64)>>,
    accounts: HashMap<String, AccountResponse>,
    account_history: HashMap<String, BTreeMap<u64, (String, u64)>>,
    failing: HashSet<String>,
}

/// In-memory indexer. History pages are cut relative to `current_epoch`
/// exactly like the real API, newest first.
#[derive(Default)]
pub struct MockIndexer {
    fixtures: Mutex<Fixtures>,
    calls: AtomicUsize,
}

impl MockIndexer {
    pub fn new(current_epoch: u64) -> Self {
        let mock = Self::default();
        mock.fixtures.lock().unwrap().current_epoch = current_epoch;
        mock
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_current_epoch(&self, epoch: u64) {
        self.fixtures.lock().unwrap().current_epoch = epoch;
    }

    pub fn add_pool(&self, pool_id: &str, hex: &str, ticker: &str, live_stake: u64) {
        let mut fixtures = self.fixtures.lock().unwrap();
        let metadata = PoolMetadataResponse {
            pool_id: pool_id.to_string(),
            hex: hex.to_string(),
            ticker: Some(ticker.to_string()),
            name: Some(format!("{ticker} pool")),
            ..Default::default()
        };
        fixtures.metadata.insert(pool_id.to_string(), metadata.clone());
        fixtures.metadata.insert(hex.to_string(), metadata);
        fixtures.pools.insert(
            pool_id.to_string(),
            PoolResponse {
                pool_id: pool_id.to_string(),
                hex: hex.to_string(),
                live_stake: live_stake.to_string(),
                live_pledge: "1000".to_string(),
                live_saturation: 0.5,
                live_delegators: 10,
                margin_cost: 0.02,
                fixed_cost: "340000000".to_string(),
            },
        );
    }

    pub fn set_pool_live_stake(&self, pool_id: &str, live_stake: u64) {
        let mut fixtures = self.fixtures.lock().unwrap();
        if let Some(pool) = fixtures.pools.get_mut(pool_id) {
            pool.live_stake = live_stake.to_string();
        }
    }

    pub fn set_pool_epoch(&self, pool_id: &str, epoch: u64, active_stake: u64, delegators: u64) {
        self.fixtures
            .lock()
            .unwrap()
            .pool_history
            .entry(pool_id.to_string())
            .or_default()
            .insert(epoch, (active_stake, delegators));
    }

    pub fn set_account_epoch(&self, address: &str, epoch: u64, pool_id: &str, amount: u64) {
        let mut fixtures = self.fixtures.lock().unwrap();
        fixtures
            .accounts
            .entry(address.to_string())
            .or_insert_with(|| AccountResponse {
                stake_address: address.to_string(),
                active: true,
                pool_id: Some(pool_id.to_string()),
                controlled_amount: amount.to_string(),
            });
        fixtures
            .account_history
            .entry(address.to_string())
            .or_default()
            .insert(epoch, (pool_id.to_string(), amount));
    }

    /// Every request touching `id` fails with a 503.
    pub fn fail_for(&self, id: &str) {
        self.fixtures.lock().unwrap().failing.insert(id.to_string());
    }

    fn record_call(&self, id: &str, path: &str) -> Result<(), IndexerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fixtures.lock().unwrap().failing.contains(id) {
            return Err(IndexerError::Status {
                url: path.to_string(),
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}

fn page_bounds(current_epoch: u64, page: u64) -> (u64, u64) {
    let newest = current_epoch.saturating_sub((page - 1) * HISTORY_PAGE_SIZE);
    let oldest = (newest + 1).saturating_sub(HISTORY_PAGE_SIZE);
    (oldest, newest)
}

#[async_trait]
impl Indexer for MockIndexer {
    async fn pool_metadata(&self, id: &str) -> Result<PoolMetadataResponse, IndexerError> {
        let path = format!("/pools/{id}/metadata");
        self.record_call(id, &path)?;
        self.fixtures
            .lock()
            .unwrap()
            .metadata
            .get(id)
            .cloned()
            .ok_or(IndexerError::NotFound { url: path })
    }

    async fn pool(&self, id: &str) -> Result<PoolResponse, IndexerError> {
        let path = format!("/pools/{id}");
        self.record_call(id, &path)?;
        self.fixtures
            .lock()
            .unwrap()
            .pools
            .get(id)
            .cloned()
            .ok_or(IndexerError::NotFound { url: path })
    }

    async fn pool_history(
        &self,
        id: &str,
        page: u64,
    ) -> Result<Vec<PoolHistoryEntry>, IndexerError> {
        let path = format!("/pools/{id}/history");
        self.record_call(id, &path)?;
        let fixtures = self.fixtures.lock().unwrap();
        let history = fixtures
            .pool_history
            .get(id)
            .ok_or(IndexerError::NotFound { url: path })?;
        let (oldest, newest) = page_bounds(fixtures.current_epoch, page);
        Ok(history
            .range(oldest..=newest)
            .rev()
            .map(|(epoch, (stake, delegators))| PoolHistoryEntry {
                epoch: *epoch,
                active_stake: stake.to_string(),
                delegators_count: *delegators,
            })
            .collect())
    }

    async fn account(&self, address: &str) -> Result<AccountResponse, IndexerError> {
        let path = format!("/accounts/{address}");
        self.record_call(address, &path)?;
        self.fixtures
            .lock()
            .unwrap()
            .accounts
            .get(address)
            .cloned()
            .ok_or(IndexerError::NotFound { url: path })
    }

    async fn account_history(
        &self,
        address: &str,
        page: u64,
    ) -> Result<Vec<AccountHistoryEntry>, IndexerError> {
        let path = format!("/accounts/{address}/history");
        self.record_call(address, &path)?;
        let fixtures = self.fixtures.lock().unwrap();
        let history = fixtures
            .account_history
            .get(address)
            .ok_or(IndexerError::NotFound { url: path })?;
        let (oldest, newest) = page_bounds(fixtures.current_epoch, page);
        Ok(history
            .range(oldest..=newest)
            .rev()
            .map(|(epoch, (pool_id, amount))| AccountHistoryEntry {
                active_epoch: *epoch,
                amount: amount.to_string(),
                pool_id: pool_id.clone(),
            })
            .collect())
    }

    async fn latest_epoch(&self) -> Result<u64, IndexerError> {
        self.record_call("", "/epochs/latest")?;
        Ok(self.fixtures.lock().unwrap().current_epoch)
    }
}
