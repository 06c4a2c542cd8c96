//! Per-account share of a campaign's token budget.
//!
//! The budget is spread evenly over the campaign's declared length. For each
//! finalized epoch the account was delegated to an approved pool inside that
//! pool's window, the account earns `amount / total_stake` of the epoch's
//! tokens. Any failure while gathering inputs aborts the calculation.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::aggregate::TotalStakeAggregator;
use crate::error::FisoError;
use crate::history::HistoryFetcher;
use crate::store::CampaignStore;
use crate::types::{
    AccountEpochHistory, ApprovedPool, EpochTotalStake, FisoCampaign, FisoRewardInfo,
};

#[derive(Clone)]
pub struct RewardCalculator {
    store: Arc<dyn CampaignStore>,
    history: HistoryFetcher,
    totals: TotalStakeAggregator,
}

impl RewardCalculator {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        history: HistoryFetcher,
        totals: TotalStakeAggregator,
    ) -> Self {
        Self {
            store,
            history,
            totals,
        }
    }

    pub async fn reward_info(
        &self,
        campaign_id: i64,
        stake_account: &str,
        current_epoch: Option<u64>,
    ) -> Result<FisoRewardInfo, FisoError> {
        let stake_account = stake_account.trim();
        if stake_account.is_empty() {
            return Err(FisoError::InvalidInput("stake account is required".to_string()));
        }
        let campaign = self
            .store
            .campaign(campaign_id)?
            .ok_or_else(|| FisoError::not_found(format!("FISO campaign {campaign_id}")))?;
        let current_epoch = self.history.resolve_current_epoch(current_epoch).await?;
        let approved = self.store.approved_pools(campaign.id)?;

        let totals = self
            .totals
            .total_stake_per_epoch(&campaign, &approved, current_epoch)
            .await?;
        let user_history = self
            .history
            .account_history(
                stake_account,
                campaign.start_epoch,
                campaign.end_epoch.min(current_epoch),
                current_epoch,
            )
            .await?;

        let totals_by_epoch: HashMap<u64, EpochTotalStake> =
            totals.iter().map(|total| (total.epoch, *total)).collect();
        let user_earned = accrued_reward(
            &campaign,
            &approved,
            &totals_by_epoch,
            &user_history,
            current_epoch,
        )?;
        let position = current_position(&campaign, &totals_by_epoch, &user_history, current_epoch)?;

        info!(
            "campaign {} account {stake_account}: earned {user_earned:.6} {} at epoch {current_epoch}",
            campaign.id, campaign.token_ticker
        );
        Ok(FisoRewardInfo {
            campaign_id: campaign.id,
            stake_account: stake_account.to_string(),
            current_epoch,
            user_earned,
            token_ticker: campaign.token_ticker.clone(),
            user_current_pool: position.pool_id,
            user_current_staked_amount: position.amount,
            current_total_stake: position.total_stake,
            current_total_delegators: position.total_delegators,
            reported_epoch: position.epoch,
        })
    }
}

pub fn tokens_per_epoch(campaign: &FisoCampaign) -> f64 {
    campaign.token_amount / campaign.epoch_count() as f64
}

/// Sums the account's share over finalized epochs, oldest first.
pub fn accrued_reward(
    campaign: &FisoCampaign,
    approved: &[ApprovedPool],
    totals: &HashMap<u64, EpochTotalStake>,
    user_history: &[AccountEpochHistory],
    current_epoch: u64,
) -> Result<f64, FisoError> {
    let per_epoch = tokens_per_epoch(campaign);
    let mut earned = 0.0;
    for entry in user_history {
        if entry.epoch >= current_epoch {
            continue;
        }
        let Some(pool_id) = entry.pool() else {
            continue;
        };
        let counted = approved.iter().any(|pool| {
            pool.pool_id == pool_id
                && pool
                    .effective_window(campaign)
                    .is_some_and(|window| window.contains(entry.epoch))
        });
        if !counted {
            continue;
        }
        let total_stake = totals.get(&entry.epoch).map_or(0, |t| t.total_stake);
        if total_stake == 0 {
            continue;
        }
        let amount = entry.delegated_amount()?;
        earned += amount as f64 / total_stake as f64 * per_epoch;
    }
    Ok(earned)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Position {
    pub epoch: Option<u64>,
    pub pool_id: Option<String>,
    pub amount: u64,
    pub total_stake: u64,
    pub total_delegators: u64,
}

/// The account's delegation as of the newest finalized campaign epoch whose
/// total stake is non-zero, looking back at most as many epochs as the
/// account has history rows.
pub fn current_position(
    campaign: &FisoCampaign,
    totals: &HashMap<u64, EpochTotalStake>,
    user_history: &[AccountEpochHistory],
    current_epoch: u64,
) -> Result<Position, FisoError> {
    let Some(newest) = current_epoch
        .checked_sub(1)
        .map(|epoch| epoch.min(campaign.end_epoch))
        .filter(|epoch| *epoch >= campaign.start_epoch)
    else {
        return Ok(Position::default());
    };

    let mut chosen = None;
    for step in 0..user_history.len() as u64 {
        let Some(epoch) = newest.checked_sub(step) else {
            break;
        };
        if epoch < campaign.start_epoch {
            break;
        }
        if let Some(total) = totals.get(&epoch).filter(|t| t.total_stake > 0) {
            chosen = Some((epoch, *total));
            break;
        }
    }
    let (epoch, total) = chosen.unwrap_or((
        newest,
        EpochTotalStake {
            epoch: newest,
            total_stake: 0,
            total_delegators: 0,
        },
    ));

    let entry = user_history.iter().find(|row| row.epoch == epoch);
    Ok(Position {
        epoch: Some(epoch),
        pool_id: entry.and_then(|row| row.pool()).map(str::to_string),
        amount: match entry {
            Some(row) => row.delegated_amount()?,
            None => 0,
        },
        total_stake: total.total_stake,
        total_delegators: total.total_delegators,
    })
}
