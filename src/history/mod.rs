//! Epoch history of pools and stake accounts, served from the store and
//! backfilled from the indexer's newest-first history pages.

pub mod pages;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::FisoError;
use crate::history::pages::{clamp_to_current, epochs_on_pages, page_range};
use crate::indexer::{AccountHistoryEntry, Indexer};
use crate::store::HistoryStore;
use crate::types::{parse_lovelace, AccountEpochHistory, PoolEpochHistory};

#[derive(Clone)]
pub struct HistoryFetcher {
    indexer: Arc<dyn Indexer>,
    store: Arc<dyn HistoryStore>,
}

impl HistoryFetcher {
    pub fn new(indexer: Arc<dyn Indexer>, store: Arc<dyn HistoryStore>) -> Self {
        Self { indexer, store }
    }

    /// The epoch a calculation runs as of: the caller's epoch when given,
    /// otherwise the chain's. An epoch ahead of the chain is rejected.
    pub async fn resolve_current_epoch(&self, supplied: Option<u64>) -> Result<u64, FisoError> {
        let chain_epoch = self.indexer.latest_epoch().await?;
        match supplied {
            Some(epoch) => {
                ensure_not_ahead(epoch, chain_epoch)?;
                Ok(epoch)
            }
            None => Ok(chain_epoch),
        }
    }

    /// Pages are always cut relative to the chain's own epoch, whatever
    /// epoch the caller evaluates at.
    async fn chain_epoch(&self, current_epoch: u64) -> Result<u64, FisoError> {
        let chain_epoch = self.indexer.latest_epoch().await?;
        ensure_not_ahead(current_epoch, chain_epoch)?;
        Ok(chain_epoch)
    }

    /// Per-epoch stake of `pool_id` within `[start, end]`, oldest first.
    ///
    /// Epochs the pool has no history for are simply absent.
    pub async fn pool_history(
        &self,
        pool_id: &str,
        start: u64,
        end: u64,
        current_epoch: u64,
    ) -> Result<Vec<PoolEpochHistory>, FisoError> {
        let Some((start, end)) = clamp_to_current(start, end, current_epoch) else {
            return Ok(Vec::new());
        };
        let stored = self.store.pool_history(pool_id, start, end)?;
        let Some((first_missing, last_missing)) =
            missing_bounds(start, end, stored.iter().map(|row| row.epoch))
        else {
            debug!("pool {pool_id} epochs {start}..={end} served from store");
            return Ok(stored);
        };

        let chain_epoch = self.chain_epoch(current_epoch).await?;
        let pages = page_range(chain_epoch, first_missing, last_missing);
        let mut fetched = Vec::new();
        for page in pages.clone() {
            let entries = self.indexer.pool_history(pool_id, page).await?;
            if entries.is_empty() {
                break;
            }
            for entry in entries {
                fetched.push(PoolEpochHistory {
                    pool_id: pool_id.to_string(),
                    epoch: entry.epoch,
                    active_stake: parse_lovelace(&entry.active_stake)?,
                    delegators_count: entry.delegators_count,
                });
            }
        }
        let inserted = self.store.insert_pool_history(&fetched)?;
        info!(
            "pool {pool_id}: fetched pages {}..={} ({} rows, {inserted} new)",
            pages.start(),
            pages.end(),
            fetched.len()
        );

        Ok(self.store.pool_history(pool_id, start, end)?)
    }

    /// Delegation of `stake_account` for every epoch of `[start, end]`,
    /// oldest first. Epochs without delegation come back as blank rows.
    pub async fn account_history(
        &self,
        stake_account: &str,
        start: u64,
        end: u64,
        current_epoch: u64,
    ) -> Result<Vec<AccountEpochHistory>, FisoError> {
        let Some((start, end)) = clamp_to_current(start, end, current_epoch) else {
            return Ok(Vec::new());
        };
        let stored = self.store.account_history(stake_account, start, end)?;
        let Some((first_missing, last_missing)) =
            missing_bounds(start, end, stored.iter().map(|row| row.epoch))
        else {
            debug!("account {stake_account} epochs {start}..={end} served from store");
            return Ok(stored);
        };

        let chain_epoch = self.chain_epoch(current_epoch).await?;
        let pages = page_range(chain_epoch, first_missing, last_missing);
        let mut by_epoch: BTreeMap<u64, AccountHistoryEntry> = BTreeMap::new();
        for page in pages.clone() {
            let entries = match self.indexer.account_history(stake_account, page).await {
                Ok(entries) => entries,
                Err(error) if error.is_not_found() => {
                    info!("account {stake_account} is not registered; recording no delegation");
                    break;
                }
                Err(error) => return Err(error.into()),
            };
            if entries.is_empty() {
                break;
            }
            for entry in entries {
                by_epoch.entry(entry.active_epoch).or_insert(entry);
            }
        }

        let rows = dense_account_rows(stake_account, epochs_on_pages(chain_epoch, &pages), &by_epoch);
        let inserted = self.store.insert_account_history(&rows)?;
        info!(
            "account {stake_account}: fetched pages {}..={} ({} delegated epochs, {inserted} new rows)",
            pages.start(),
            pages.end(),
            by_epoch.len()
        );

        Ok(self.store.account_history(stake_account, start, end)?)
    }
}

fn ensure_not_ahead(epoch: u64, chain_epoch: u64) -> Result<(), FisoError> {
    if epoch > chain_epoch {
        return Err(FisoError::InvalidInput(format!(
            "epoch {epoch} is ahead of the chain (latest {chain_epoch})"
        )));
    }
    Ok(())
}

/// First and last epoch of `[start, end]` absent from `present`.
fn missing_bounds(start: u64, end: u64, present: impl Iterator<Item = u64>) -> Option<(u64, u64)> {
    let present: BTreeSet<u64> = present.collect();
    let first = (start..=end).find(|epoch| !present.contains(epoch))?;
    let last = (start..=end).rev().find(|epoch| !present.contains(epoch))?;
    Some((first, last))
}

fn dense_account_rows(
    stake_account: &str,
    epochs: impl Iterator<Item = u64>,
    by_epoch: &BTreeMap<u64, AccountHistoryEntry>,
) -> Vec<AccountEpochHistory> {
    epochs
        .map(|epoch| match by_epoch.get(&epoch) {
            Some(entry) => AccountEpochHistory {
                stake_account: stake_account.to_string(),
                epoch,
                pool_id: entry.pool_id.clone(),
                amount: entry.amount.clone(),
            },
            None => AccountEpochHistory::empty(stake_account, epoch),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::error::FisoError;
    use crate::history::HistoryFetcher;
    use crate::indexer::mock::MockIndexer;
    use crate::store::{HistoryStore, MemoryStore, SqliteStore};

    fn fetcher(indexer: &Arc<MockIndexer>, store: Arc<dyn HistoryStore>) -> HistoryFetcher {
        HistoryFetcher::new(indexer.clone(), store)
    }

    #[tokio::test]
    async fn pool_history_is_fetched_once_then_served_from_store() {
        let indexer = Arc::new(MockIndexer::new(105));
        for epoch in 90..=105 {
            indexer.set_pool_epoch("pool1a", epoch, 1_000 + epoch, 4);
        }
        let fetcher = fetcher(&indexer, Arc::new(MemoryStore::new()));

        let rows = fetcher
            .pool_history("pool1a", 100, 104, 105)
            .await
            .expect("history");
        assert_eq!(rows.iter().map(|r| r.epoch).collect::<Vec<_>>(), vec![100, 101, 102, 103, 104]);
        assert_eq!(rows[0].active_stake, 1_100);
        let calls = indexer.calls();
        assert_eq!(calls, 2, "latest epoch plus one history page");

        let again = fetcher
            .pool_history("pool1a", 100, 104, 105)
            .await
            .expect("history");
        assert_eq!(again, rows);
        assert_eq!(indexer.calls(), calls);
    }

    #[tokio::test]
    async fn refetch_never_rewrites_stored_epochs() {
        let indexer = Arc::new(MockIndexer::new(105));
        indexer.set_pool_epoch("pool1a", 100, 1_000, 4);
        let fetcher = fetcher(&indexer, Arc::new(SqliteStore::open_in_memory().expect("sqlite")));
        fetcher.pool_history("pool1a", 100, 101, 105).await.expect("history");

        indexer.set_pool_epoch("pool1a", 100, 7_777, 9);
        indexer.set_pool_epoch("pool1a", 101, 2_000, 5);
        let rows = fetcher.pool_history("pool1a", 100, 101, 105).await.expect("history");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].active_stake, 1_000);
        assert_eq!(rows[0].delegators_count, 4);
        assert_eq!(rows[1].active_stake, 2_000);
    }

    #[tokio::test]
    async fn account_gaps_become_blank_rows_for_the_whole_page() {
        let indexer = Arc::new(MockIndexer::new(105));
        for epoch in [100, 101, 103, 104] {
            indexer.set_account_epoch("stake1u", epoch, "pool1a", 200);
        }
        let store = Arc::new(MemoryStore::new());
        let fetcher = fetcher(&indexer, store.clone());

        let rows = fetcher
            .account_history("stake1u", 100, 104, 105)
            .await
            .expect("history");
        assert_eq!(rows.len(), 5);
        assert!(rows[2].is_empty());
        assert_eq!(rows[3].pool(), Some("pool1a"));

        // The whole first page is known now, not only the requested range.
        assert_eq!(store.account_history("stake1u", 6, 105).expect("read").len(), 100);
        let calls = indexer.calls();
        fetcher
            .account_history("stake1u", 50, 60, 105)
            .await
            .expect("history");
        assert_eq!(indexer.calls(), calls);
    }

    #[tokio::test]
    async fn unregistered_account_degrades_to_no_delegation() {
        let indexer = Arc::new(MockIndexer::new(105));
        let fetcher = fetcher(&indexer, Arc::new(MemoryStore::new()));

        let rows = fetcher
            .account_history("stake1unknown", 100, 104, 105)
            .await
            .expect("404 is not an error");
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|row| row.is_empty()));

        let calls = indexer.calls();
        fetcher
            .account_history("stake1unknown", 100, 104, 105)
            .await
            .expect("history");
        assert_eq!(indexer.calls(), calls);
    }

    #[tokio::test]
    async fn upstream_failure_is_terminal() {
        let indexer = Arc::new(MockIndexer::new(105));
        indexer.set_account_epoch("stake1u", 100, "pool1a", 200);
        indexer.fail_for("stake1u");
        let fetcher = fetcher(&indexer, Arc::new(MemoryStore::new()));

        let err = fetcher
            .account_history("stake1u", 100, 104, 105)
            .await
            .expect_err("503 must surface");
        assert!(matches!(err, FisoError::Upstream(_)));
    }

    #[tokio::test]
    async fn epoch_ahead_of_chain_is_rejected_and_stores_nothing() {
        let indexer = Arc::new(MockIndexer::new(105));
        for epoch in 100..=104 {
            indexer.set_account_epoch("stake1u", epoch, "pool1a", 200);
        }
        let store = Arc::new(MemoryStore::new());
        let fetcher = fetcher(&indexer, store.clone());

        let err = fetcher
            .account_history("stake1u", 100, 104, 205)
            .await
            .expect_err("future epoch");
        assert!(matches!(err, FisoError::InvalidInput(_)));
        assert!(store.account_history("stake1u", 0, 300).expect("read").is_empty());

        let rows = fetcher
            .account_history("stake1u", 100, 104, 105)
            .await
            .expect("history");
        assert!(rows.iter().all(|row| row.pool() == Some("pool1a")));
        assert_eq!(rows.len(), 5);
    }

    #[tokio::test]
    async fn epoch_behind_chain_pages_relative_to_chain() {
        let indexer = Arc::new(MockIndexer::new(250));
        for epoch in 140..=160 {
            indexer.set_account_epoch("stake1u", epoch, "pool1a", 200);
        }
        let store = Arc::new(MemoryStore::new());
        let fetcher = fetcher(&indexer, store.clone());

        // Asked as of epoch 200, the range spans the chain's pages 1 and 2.
        let rows = fetcher
            .account_history("stake1u", 140, 160, 200)
            .await
            .expect("history");
        assert_eq!(rows.len(), 21);
        assert!(rows.iter().all(|row| row.pool() == Some("pool1a")));

        let calls = indexer.calls();
        let again = fetcher
            .account_history("stake1u", 140, 160, 250)
            .await
            .expect("history");
        assert_eq!(again, rows);
        assert_eq!(indexer.calls(), calls);
        assert_eq!(store.account_history("stake1u", 51, 250).expect("read").len(), 200);
    }

    #[tokio::test]
    async fn future_ranges_need_no_fetch() {
        let indexer = Arc::new(MockIndexer::new(105));
        let fetcher = fetcher(&indexer, Arc::new(MemoryStore::new()));
        let rows = fetcher
            .pool_history("pool1a", 200, 210, 105)
            .await
            .expect("history");
        assert!(rows.is_empty());
        assert_eq!(indexer.calls(), 0);
    }
}
