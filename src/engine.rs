use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::aggregate::TotalStakeAggregator;
use crate::campaigns::CampaignAdmin;
use crate::config::{CacheConfig, Config};
use crate::error::FisoError;
use crate::history::HistoryFetcher;
use crate::indexer::{BlockfrostClient, Indexer};
use crate::pools::PoolInfoService;
use crate::rewards::RewardCalculator;
use crate::store::{MemoryStore, SqliteStore, Store};
use crate::types::{parse_lovelace, DelegationSnapshot, EpochTotalStake};

/// The four components plus campaign administration, sharing one indexer
/// and one store.
#[derive(Clone)]
pub struct Engine {
    pub pools: PoolInfoService,
    pub history: HistoryFetcher,
    pub totals: TotalStakeAggregator,
    pub rewards: RewardCalculator,
    pub campaigns: CampaignAdmin,
    indexer: Arc<dyn Indexer>,
}

impl Engine {
    pub fn new<S: Store + 'static>(
        indexer: Arc<dyn Indexer>,
        store: Arc<S>,
        cache: &CacheConfig,
    ) -> Self {
        let history = HistoryFetcher::new(indexer.clone(), store.clone());
        let totals = TotalStakeAggregator::new(history.clone(), store.clone());
        let rewards = RewardCalculator::new(store.clone(), history.clone(), totals.clone());
        Self {
            pools: PoolInfoService::new(indexer.clone(), store.clone(), cache),
            history,
            totals,
            rewards,
            campaigns: CampaignAdmin::new(store),
            indexer,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let indexer: Arc<dyn Indexer> = Arc::new(BlockfrostClient::new(&config.indexer)?);
        if config.uses_memory_store() {
            info!("using in-memory store");
            return Ok(Self::new(indexer, Arc::new(MemoryStore::new()), &config.cache));
        }
        let path = config.resolved_db_path();
        let store = SqliteStore::open(&path)
            .with_context(|| format!("failed opening database: {}", path.display()))?;
        info!("using database {}", path.display());
        Ok(Self::new(indexer, Arc::new(store), &config.cache))
    }

    pub async fn latest_epoch(&self) -> Result<u64, FisoError> {
        Ok(self.indexer.latest_epoch().await?)
    }

    /// Stored and newly computed totals of a campaign's finalized epochs.
    pub async fn epoch_totals(
        &self,
        fiso_id: i64,
        current_epoch: Option<u64>,
    ) -> Result<Vec<EpochTotalStake>, FisoError> {
        let details = self.campaigns.get_campaign(fiso_id)?;
        let current_epoch = self.history.resolve_current_epoch(current_epoch).await?;
        self.totals
            .total_stake_per_epoch(&details.campaign, &details.approved_pools, current_epoch)
            .await
    }

    /// Live delegation of a stake account. Unregistered accounts come back
    /// with no pool and a zero amount.
    pub async fn account_snapshot(
        &self,
        stake_account: &str,
    ) -> Result<DelegationSnapshot, FisoError> {
        let stake_account = stake_account.trim();
        if stake_account.is_empty() {
            return Err(FisoError::InvalidInput("stake account is required".to_string()));
        }
        match self.indexer.account(stake_account).await {
            Ok(account) => Ok(DelegationSnapshot {
                stake_account: account.stake_address,
                registered: true,
                active: account.active,
                pool_id: account.pool_id.filter(|pool_id| !pool_id.is_empty()),
                controlled_amount: parse_lovelace(&account.controlled_amount)?,
            }),
            Err(error) if error.is_not_found() => Ok(DelegationSnapshot {
                stake_account: stake_account.to_string(),
                registered: false,
                active: false,
                pool_id: None,
                controlled_amount: 0,
            }),
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use crate::config::CacheConfig;
    use crate::engine::Engine;
    use crate::error::FisoError;
    use crate::indexer::mock::MockIndexer;
    use crate::store::MemoryStore;
    use crate::types::{ApprovedPool, CampaignDraft};

    pub(crate) fn engine(indexer: &Arc<MockIndexer>) -> Engine {
        Engine::new(
            indexer.clone(),
            Arc::new(MemoryStore::new()),
            &CacheConfig::default(),
        )
    }

    /// Campaign 100..=104 over one pool with 1000 stake per epoch and an
    /// account delegating 200 to it throughout.
    pub(crate) fn seeded_engine() -> (Engine, Arc<MockIndexer>, i64) {
        let indexer = Arc::new(MockIndexer::new(105));
        indexer.add_pool("pool1a", "aa01", "AAA", 1_000);
        for epoch in 90..=105 {
            indexer.set_pool_epoch("pool1a", epoch, 1_000, 5);
            indexer.set_account_epoch("stake1u", epoch, "pool1a", 200);
        }
        let engine = engine(&indexer);
        let campaign = engine
            .campaigns
            .create_campaign(&CampaignDraft {
                project_slug: "demo".to_string(),
                token_amount: 500.0,
                token_ticker: "DEMO".to_string(),
                start_epoch: 100,
                end_epoch: 104,
            })
            .expect("campaign");
        engine
            .campaigns
            .set_approved_pools(
                campaign.id,
                &[ApprovedPool {
                    pool_id: "pool1a".to_string(),
                    start_epoch: 0,
                    end_epoch: 1_000,
                }],
            )
            .expect("pools");
        (engine, indexer, campaign.id)
    }

    #[test]
    fn unregistered_account_snapshot_is_not_an_error() {
        let indexer = Arc::new(MockIndexer::new(105));
        let engine = engine(&indexer);
        let snapshot = tokio_test::block_on(engine.account_snapshot("stake1nobody"))
            .expect("snapshot");
        assert!(!snapshot.registered);
        assert_eq!(snapshot.pool_id, None);
        assert_eq!(snapshot.controlled_amount, 0);
    }

    #[tokio::test]
    async fn registered_account_snapshot_reports_delegation() {
        let (engine, _, _) = seeded_engine();
        let snapshot = engine.account_snapshot("stake1u").await.expect("snapshot");
        assert!(snapshot.registered);
        assert!(snapshot.active);
        assert_eq!(snapshot.pool_id.as_deref(), Some("pool1a"));
        assert_eq!(snapshot.controlled_amount, 200);
    }

    #[tokio::test]
    async fn totals_use_latest_epoch_when_none_given() {
        let (engine, _, id) = seeded_engine();
        let totals = engine.epoch_totals(id, None).await.expect("totals");
        assert_eq!(totals.len(), 5);
        assert!(totals.iter().all(|total| total.total_stake == 1_000));

        let missing = engine.epoch_totals(id + 1, Some(105)).await.expect_err("missing");
        assert!(missing.is_not_found());

        let ahead = engine.epoch_totals(id, Some(106)).await.expect_err("ahead");
        assert!(matches!(ahead, FisoError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn pool_edits_force_recomputation() {
        let (engine, indexer, id) = seeded_engine();
        engine.epoch_totals(id, Some(105)).await.expect("totals");
        for epoch in 90..=105 {
            indexer.set_pool_epoch("pool1b", epoch, 500, 1);
        }
        engine
            .campaigns
            .set_approved_pools(
                id,
                &[
                    ApprovedPool {
                        pool_id: "pool1a".to_string(),
                        start_epoch: 0,
                        end_epoch: 1_000,
                    },
                    ApprovedPool {
                        pool_id: "pool1b".to_string(),
                        start_epoch: 0,
                        end_epoch: 1_000,
                    },
                ],
            )
            .expect("pools");

        let totals = engine.epoch_totals(id, Some(105)).await.expect("totals");
        assert!(totals.iter().all(|total| total.total_stake == 1_500));
    }
}
