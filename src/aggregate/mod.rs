//! Total delegated stake per epoch across a campaign's approved pools.
//!
//! Totals are computed incrementally: only epochs missing from the stored
//! collection are summed, and an epoch stays missing until every active pool
//! has history for it instead of being recorded partially or as zero. Stored
//! totals are only valid for the pool configuration they were computed with;
//! changing that configuration must clear them first (see [`crate::campaigns`]).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::FisoError;
use crate::history::HistoryFetcher;
use crate::store::CampaignStore;
use crate::types::{ApprovedPool, EpochTotalStake, EpochWindow, FisoCampaign, PoolEpochHistory};

#[derive(Clone)]
pub struct TotalStakeAggregator {
    history: HistoryFetcher,
    store: Arc<dyn CampaignStore>,
}

impl TotalStakeAggregator {
    pub fn new(history: HistoryFetcher, store: Arc<dyn CampaignStore>) -> Self {
        Self { history, store }
    }

    /// Totals for every computable epoch from the campaign start through
    /// `min(campaign.end_epoch, current_epoch - 1)`, ascending.
    pub async fn total_stake_per_epoch(
        &self,
        campaign: &FisoCampaign,
        approved: &[ApprovedPool],
        current_epoch: u64,
    ) -> Result<Vec<EpochTotalStake>, FisoError> {
        let Some(window) = finalized_window(campaign, current_epoch) else {
            return Ok(Vec::new());
        };
        if campaign
            .totals_complete_through
            .is_some_and(|through| through >= window.end)
        {
            debug!("campaign {} totals complete through {}", campaign.id, window.end);
            return Ok(self.store.epoch_totals(campaign.id)?);
        }

        let stored = self.store.epoch_totals(campaign.id)?;
        let known: BTreeSet<u64> = stored.iter().map(|total| total.epoch).collect();
        let missing: Vec<u64> = (window.start..=window.end)
            .filter(|epoch| !known.contains(epoch))
            .collect();

        let mut computed = Vec::new();
        if !missing.is_empty() {
            let histories = self
                .pool_histories(campaign, approved, &missing, window.end, current_epoch)
                .await?;
            computed = sum_missing_epochs(&missing, &histories);
            self.store.insert_epoch_totals(campaign.id, &computed)?;
            info!(
                "campaign {}: folded {} of {} missing epochs",
                campaign.id,
                computed.len(),
                missing.len()
            );
        }

        let mut merged: BTreeMap<u64, EpochTotalStake> =
            stored.into_iter().map(|total| (total.epoch, total)).collect();
        for total in computed {
            merged.entry(total.epoch).or_insert(total);
        }
        let through = complete_through(campaign.start_epoch, merged.keys().copied());
        if through != campaign.totals_complete_through {
            self.store.set_totals_complete_through(campaign.id, through)?;
        }
        Ok(merged.into_values().collect())
    }

    async fn pool_histories(
        &self,
        campaign: &FisoCampaign,
        approved: &[ApprovedPool],
        missing: &[u64],
        final_end: u64,
        current_epoch: u64,
    ) -> Result<Vec<(EpochWindow, HashMap<u64, PoolEpochHistory>)>, FisoError> {
        let mut histories = Vec::new();
        for pool in approved {
            let Some(window) = pool
                .effective_window(campaign)
                .and_then(|window| window.clamp_end(final_end))
            else {
                continue;
            };
            let needed: Vec<u64> = missing
                .iter()
                .copied()
                .filter(|epoch| window.contains(*epoch))
                .collect();
            let (Some(first), Some(last)) = (needed.first(), needed.last()) else {
                continue;
            };
            let rows = self
                .history
                .pool_history(&pool.pool_id, *first, *last, current_epoch)
                .await?;
            histories.push((window, rows.into_iter().map(|row| (row.epoch, row)).collect()));
        }
        Ok(histories)
    }
}

/// Campaign epochs whose history is final: the current epoch is still open.
pub fn finalized_window(campaign: &FisoCampaign, current_epoch: u64) -> Option<EpochWindow> {
    let last_final = current_epoch.checked_sub(1)?;
    EpochWindow::new(campaign.start_epoch, campaign.end_epoch.min(last_final))
}

/// Totals of the missing epochs every active pool has a history row for.
/// An epoch with an active pool lacking its row, or with no active pool,
/// stays missing.
fn sum_missing_epochs(
    missing: &[u64],
    histories: &[(EpochWindow, HashMap<u64, PoolEpochHistory>)],
) -> Vec<EpochTotalStake> {
    let mut totals = Vec::new();
    'epochs: for epoch in missing {
        let mut total = EpochTotalStake {
            epoch: *epoch,
            total_stake: 0,
            total_delegators: 0,
        };
        let mut contributors = 0;
        for (window, rows) in histories {
            if !window.contains(*epoch) {
                continue;
            }
            let Some(row) = rows.get(epoch) else {
                continue 'epochs;
            };
            total.total_stake += row.active_stake;
            total.total_delegators += row.delegators_count;
            contributors += 1;
        }
        if contributors > 0 {
            totals.push(total);
        }
    }
    totals
}

fn complete_through(start: u64, epochs: impl Iterator<Item = u64>) -> Option<u64> {
    let mut through = None;
    let mut expected = start;
    for epoch in epochs {
        if epoch != expected {
            break;
        }
        through = Some(epoch);
        expected += 1;
    }
    through
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::aggregate::{complete_through, finalized_window, TotalStakeAggregator};
    use crate::history::HistoryFetcher;
    use crate::indexer::mock::MockIndexer;
    use crate::store::{CampaignStore, MemoryStore, SqliteStore, Store};
    use crate::types::{ApprovedPool, CampaignDraft, EpochWindow, FisoCampaign};

    fn setup<S: Store + 'static>(
        store: Arc<S>,
        indexer: &Arc<MockIndexer>,
        pools: &[(&str, u64, u64)],
    ) -> (TotalStakeAggregator, FisoCampaign, Vec<ApprovedPool>) {
        let campaign = store
            .create_campaign(&CampaignDraft {
                project_slug: "demo".to_string(),
                token_amount: 500.0,
                token_ticker: "DEMO".to_string(),
                start_epoch: 100,
                end_epoch: 104,
            })
            .expect("campaign");
        let approved = pools
            .iter()
            .map(|(pool_id, start, end)| ApprovedPool {
                pool_id: pool_id.to_string(),
                start_epoch: *start,
                end_epoch: *end,
            })
            .collect::<Vec<_>>();
        store
            .replace_approved_pools(campaign.id, &approved)
            .expect("pools");
        let history = HistoryFetcher::new(indexer.clone(), store.clone());
        (
            TotalStakeAggregator::new(history, store),
            campaign,
            approved,
        )
    }

    #[tokio::test]
    async fn second_call_is_identical_and_fetches_nothing() {
        let indexer = Arc::new(MockIndexer::new(105));
        for epoch in 95..=105 {
            indexer.set_pool_epoch("pool1a", epoch, 1_000, 10);
        }
        let store = Arc::new(SqliteStore::open_in_memory().expect("sqlite"));
        let (aggregator, campaign, approved) =
            setup(store.clone(), &indexer, &[("pool1a", 0, 1_000)]);

        let first = aggregator
            .total_stake_per_epoch(&campaign, &approved, 105)
            .await
            .expect("totals");
        assert_eq!(first.len(), 5);
        let calls = indexer.calls();

        let campaign = store.campaign(campaign.id).expect("read").expect("campaign");
        assert_eq!(campaign.totals_complete_through, Some(104));
        let second = aggregator
            .total_stake_per_epoch(&campaign, &approved, 105)
            .await
            .expect("totals");
        assert_eq!(
            serde_json::to_string(&first).expect("json"),
            serde_json::to_string(&second).expect("json")
        );
        assert_eq!(indexer.calls(), calls);
    }

    #[tokio::test]
    async fn pools_count_only_inside_their_window() {
        let indexer = Arc::new(MockIndexer::new(110));
        for epoch in 95..=110 {
            indexer.set_pool_epoch("pool1a", epoch, 1_000, 10);
            indexer.set_pool_epoch("pool1b", epoch, 500, 3);
        }
        let (aggregator, campaign, approved) = setup(
            Arc::new(MemoryStore::new()),
            &indexer,
            &[("pool1a", 90, 200), ("pool1b", 102, 103)],
        );

        let totals = aggregator
            .total_stake_per_epoch(&campaign, &approved, 110)
            .await
            .expect("totals");
        let stakes = totals.iter().map(|t| (t.epoch, t.total_stake)).collect::<Vec<_>>();
        assert_eq!(
            stakes,
            vec![(100, 1_000), (101, 1_000), (102, 1_500), (103, 1_500), (104, 1_000)]
        );
        assert_eq!(totals[2].total_delegators, 13);
    }

    #[tokio::test]
    async fn epochs_without_pool_history_stay_missing() {
        let indexer = Arc::new(MockIndexer::new(105));
        for epoch in [100, 101, 103] {
            indexer.set_pool_epoch("pool1a", epoch, 1_000, 10);
        }
        let store = Arc::new(MemoryStore::new());
        let (aggregator, campaign, approved) =
            setup(store.clone(), &indexer, &[("pool1a", 100, 104)]);

        let totals = aggregator
            .total_stake_per_epoch(&campaign, &approved, 105)
            .await
            .expect("totals");
        assert_eq!(
            totals.iter().map(|t| t.epoch).collect::<Vec<_>>(),
            vec![100, 101, 103]
        );
        let campaign = store.campaign(campaign.id).expect("read").expect("campaign");
        assert_eq!(campaign.totals_complete_through, Some(101));
    }

    #[tokio::test]
    async fn epoch_waits_for_every_active_pool() {
        let indexer = Arc::new(MockIndexer::new(105));
        for epoch in 95..=105 {
            indexer.set_pool_epoch("pool1a", epoch, 1_000, 10);
            if epoch != 102 {
                indexer.set_pool_epoch("pool1b", epoch, 500, 3);
            }
        }
        let store = Arc::new(MemoryStore::new());
        let (aggregator, campaign, approved) = setup(
            store.clone(),
            &indexer,
            &[("pool1a", 0, 1_000), ("pool1b", 0, 1_000)],
        );

        let totals = aggregator
            .total_stake_per_epoch(&campaign, &approved, 105)
            .await
            .expect("totals");
        let stakes = totals.iter().map(|t| (t.epoch, t.total_stake)).collect::<Vec<_>>();
        assert_eq!(stakes, vec![(100, 1_500), (101, 1_500), (103, 1_500), (104, 1_500)]);
        let campaign = store.campaign(campaign.id).expect("read").expect("campaign");
        assert_eq!(campaign.totals_complete_through, Some(101));

        indexer.set_pool_epoch("pool1b", 102, 500, 3);
        let totals = aggregator
            .total_stake_per_epoch(&campaign, &approved, 105)
            .await
            .expect("totals");
        assert_eq!(totals.len(), 5);
        assert_eq!(totals[2].total_stake, 1_500);
        let campaign = store.campaign(campaign.id).expect("read").expect("campaign");
        assert_eq!(campaign.totals_complete_through, Some(104));
    }

    #[tokio::test]
    async fn new_epochs_are_appended_as_time_passes() {
        let indexer = Arc::new(MockIndexer::new(103));
        for epoch in 95..=106 {
            indexer.set_pool_epoch("pool1a", epoch, 1_000 + epoch, 10);
        }
        let store = Arc::new(MemoryStore::new());
        let (aggregator, campaign, approved) =
            setup(store.clone(), &indexer, &[("pool1a", 100, 104)]);

        let early = aggregator
            .total_stake_per_epoch(&campaign, &approved, 103)
            .await
            .expect("totals");
        assert_eq!(early.len(), 3);

        indexer.set_current_epoch(106);
        let campaign = store.campaign(campaign.id).expect("read").expect("campaign");
        let later = aggregator
            .total_stake_per_epoch(&campaign, &approved, 106)
            .await
            .expect("totals");
        assert_eq!(later.len(), 5);
        assert_eq!(&later[..3], &early[..]);
        assert_eq!(later[4].total_stake, 1_104);
    }

    #[tokio::test]
    async fn campaign_not_started_has_no_totals() {
        let indexer = Arc::new(MockIndexer::new(100));
        let (aggregator, campaign, approved) =
            setup(Arc::new(MemoryStore::new()), &indexer, &[("pool1a", 100, 104)]);
        let totals = aggregator
            .total_stake_per_epoch(&campaign, &approved, 100)
            .await
            .expect("totals");
        assert!(totals.is_empty());
        assert_eq!(indexer.calls(), 0);
    }

    #[test]
    fn finalized_window_stops_before_current_epoch() {
        let campaign = FisoCampaign {
            id: 1,
            project_slug: "demo".to_string(),
            token_amount: 1.0,
            token_ticker: "DEMO".to_string(),
            start_epoch: 100,
            end_epoch: 104,
            totals_complete_through: None,
        };
        assert_eq!(
            finalized_window(&campaign, 103),
            Some(EpochWindow { start: 100, end: 102 })
        );
        assert_eq!(
            finalized_window(&campaign, 300),
            Some(EpochWindow { start: 100, end: 104 })
        );
        assert_eq!(finalized_window(&campaign, 100), None);
        assert_eq!(finalized_window(&campaign, 0), None);
    }

    #[test]
    fn completeness_marker_tracks_contiguous_prefix() {
        assert_eq!(complete_through(100, [100, 101, 103].into_iter()), Some(101));
        assert_eq!(complete_through(100, [101, 102].into_iter()), None);
        assert_eq!(complete_through(100, std::iter::empty()), None);
    }
}
