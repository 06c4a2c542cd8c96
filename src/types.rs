use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FisoError;

/// Identity row for a stake pool. Created on first reference and never
/// changed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StakePool {
    pub pool_id: String,
    pub hex_id: String,
    pub ticker: Option<String>,
    pub name: Option<String>,
    pub homepage: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StakePoolStats {
    pub pool_id: String,
    pub live_stake: u64,
    pub live_pledge: u64,
    pub margin_cost: f64,
    pub fixed_cost: u64,
    pub live_saturation: f64,
    pub live_delegators: u64,
    pub updated_at: DateTime<Utc>,
}

/// Pool identity merged with its latest statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolInfo {
    #[serde(flatten)]
    pub pool: StakePool,
    pub stats: Option<StakePoolStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolResolutionError {
    pub pool_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PoolInfoBundle {
    pub successful_pools: Vec<PoolInfo>,
    pub errors: Vec<PoolResolutionError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolCacheEntry {
    pub key: String,
    pub bundle: PoolInfoBundle,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolEpochHistory {
    pub pool_id: String,
    pub epoch: u64,
    pub active_stake: u64,
    pub delegators_count: u64,
}

/// Delegation of a stake account during one epoch. Blank `pool_id` and
/// `amount` record a known epoch without delegation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountEpochHistory {
    pub stake_account: String,
    pub epoch: u64,
    pub pool_id: String,
    pub amount: String,
}

impl AccountEpochHistory {
    pub fn empty(stake_account: impl Into<String>, epoch: u64) -> Self {
        Self {
            stake_account: stake_account.into(),
            epoch,
            pool_id: String::new(),
            amount: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pool_id.is_empty() && self.amount.is_empty()
    }

    pub fn pool(&self) -> Option<&str> {
        if self.pool_id.is_empty() {
            None
        } else {
            Some(self.pool_id.as_str())
        }
    }

    pub fn delegated_amount(&self) -> Result<u64, FisoError> {
        parse_lovelace(&self.amount)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FisoCampaign {
    pub id: i64,
    pub project_slug: String,
    pub token_amount: f64,
    pub token_ticker: String,
    pub start_epoch: u64,
    pub end_epoch: u64,
    /// Largest epoch `N` such that every epoch from `start_epoch` through `N`
    /// has an aggregated total stored.
    pub totals_complete_through: Option<u64>,
}

impl FisoCampaign {
    pub fn epoch_count(&self) -> u64 {
        self.end_epoch.saturating_sub(self.start_epoch) + 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignDraft {
    pub project_slug: String,
    pub token_amount: f64,
    pub token_ticker: String,
    pub start_epoch: u64,
    pub end_epoch: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovedPool {
    pub pool_id: String,
    pub start_epoch: u64,
    pub end_epoch: u64,
}

impl ApprovedPool {
    /// The pool's window clipped to the campaign window; `None` when they do
    /// not overlap.
    pub fn effective_window(&self, campaign: &FisoCampaign) -> Option<EpochWindow> {
        EpochWindow::new(
            self.start_epoch.max(campaign.start_epoch),
            self.end_epoch.min(campaign.end_epoch),
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EpochWindow {
    pub start: u64,
    pub end: u64,
}

impl EpochWindow {
    pub fn new(start: u64, end: u64) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn contains(&self, epoch: u64) -> bool {
        self.start <= epoch && epoch <= self.end
    }

    pub fn clamp_end(&self, end: u64) -> Option<Self> {
        Self::new(self.start, self.end.min(end))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EpochTotalStake {
    pub epoch: u64,
    pub total_stake: u64,
    pub total_delegators: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FisoRewardInfo {
    pub campaign_id: i64,
    pub stake_account: String,
    pub current_epoch: u64,
    pub user_earned: f64,
    pub token_ticker: String,
    pub user_current_pool: Option<String>,
    pub user_current_staked_amount: u64,
    pub current_total_stake: u64,
    pub current_total_delegators: u64,
    /// Epoch the `current_*` fields describe.
    pub reported_epoch: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DelegationSnapshot {
    pub stake_account: String,
    pub registered: bool,
    pub active: bool,
    pub pool_id: Option<String>,
    pub controlled_amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignDetails {
    pub campaign: FisoCampaign,
    pub approved_pools: Vec<ApprovedPool>,
}

/// Parses an indexer lovelace quantity. Blank means zero.
pub fn parse_lovelace(raw: &str) -> Result<u64, FisoError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed
        .parse::<u64>()
        .map_err(|_| FisoError::InvalidData(format!("invalid lovelace amount: {raw:?}")))
}
