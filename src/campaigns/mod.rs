//! Campaign administration. Any change to a campaign's window or pool set
//! drops its stored epoch totals, which were computed under the old
//! configuration.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::info;

use crate::error::FisoError;
use crate::store::CampaignStore;
use crate::types::{ApprovedPool, CampaignDetails, CampaignDraft, EpochWindow, FisoCampaign};

#[derive(Clone)]
pub struct CampaignAdmin {
    store: Arc<dyn CampaignStore>,
}

impl CampaignAdmin {
    pub fn new(store: Arc<dyn CampaignStore>) -> Self {
        Self { store }
    }

    pub fn create_campaign(&self, draft: &CampaignDraft) -> Result<FisoCampaign, FisoError> {
        validate_draft(draft)?;
        let draft = CampaignDraft {
            project_slug: draft.project_slug.trim().to_string(),
            token_ticker: draft.token_ticker.trim().to_string(),
            ..draft.clone()
        };
        let campaign = self.store.create_campaign(&draft)?;
        info!(
            "created campaign {} ({}) for epochs {}..={}",
            campaign.id, campaign.project_slug, campaign.start_epoch, campaign.end_epoch
        );
        Ok(campaign)
    }

    pub fn get_campaign(&self, fiso_id: i64) -> Result<CampaignDetails, FisoError> {
        let campaign = self.campaign(fiso_id)?;
        let approved_pools = self.store.approved_pools(fiso_id)?;
        Ok(CampaignDetails {
            campaign,
            approved_pools,
        })
    }

    pub fn set_approved_pools(
        &self,
        fiso_id: i64,
        pools: &[ApprovedPool],
    ) -> Result<CampaignDetails, FisoError> {
        self.campaign(fiso_id)?;
        let pools = validate_pools(pools)?;
        self.store.replace_approved_pools(fiso_id, &pools)?;
        self.store.clear_epoch_totals(fiso_id)?;
        info!("campaign {fiso_id}: {} approved pools, totals invalidated", pools.len());
        self.get_campaign(fiso_id)
    }

    pub fn update_campaign_epochs(
        &self,
        fiso_id: i64,
        start_epoch: u64,
        end_epoch: u64,
    ) -> Result<CampaignDetails, FisoError> {
        self.campaign(fiso_id)?;
        if EpochWindow::new(start_epoch, end_epoch).is_none() {
            return Err(FisoError::InvalidInput(format!(
                "start epoch {start_epoch} is after end epoch {end_epoch}"
            )));
        }
        self.store
            .update_campaign_epochs(fiso_id, start_epoch, end_epoch)?;
        self.store.clear_epoch_totals(fiso_id)?;
        info!("campaign {fiso_id}: window now {start_epoch}..={end_epoch}, totals invalidated");
        self.get_campaign(fiso_id)
    }

    fn campaign(&self, fiso_id: i64) -> Result<FisoCampaign, FisoError> {
        self.store
            .campaign(fiso_id)?
            .ok_or_else(|| FisoError::not_found(format!("FISO campaign {fiso_id}")))
    }
}

fn validate_draft(draft: &CampaignDraft) -> Result<(), FisoError> {
    if draft.project_slug.trim().is_empty() {
        return Err(FisoError::InvalidInput("project slug is required".to_string()));
    }
    if draft.token_ticker.trim().is_empty() {
        return Err(FisoError::InvalidInput("token ticker is required".to_string()));
    }
    if !(draft.token_amount.is_finite() && draft.token_amount > 0.0) {
        return Err(FisoError::InvalidInput(format!(
            "token amount must be positive, got {}",
            draft.token_amount
        )));
    }
    if draft.start_epoch > draft.end_epoch {
        return Err(FisoError::InvalidInput(format!(
            "start epoch {} is after end epoch {}",
            draft.start_epoch, draft.end_epoch
        )));
    }
    Ok(())
}

fn validate_pools(pools: &[ApprovedPool]) -> Result<Vec<ApprovedPool>, FisoError> {
    let mut seen = BTreeSet::new();
    let mut validated = Vec::with_capacity(pools.len());
    for pool in pools {
        let pool_id = pool.pool_id.trim();
        if pool_id.is_empty() {
            return Err(FisoError::InvalidInput("pool id is required".to_string()));
        }
        if pool.start_epoch > pool.end_epoch {
            return Err(FisoError::InvalidInput(format!(
                "pool {pool_id}: start epoch {} is after end epoch {}",
                pool.start_epoch, pool.end_epoch
            )));
        }
        if !seen.insert(pool_id.to_string()) {
            return Err(FisoError::InvalidInput(format!("pool {pool_id} listed twice")));
        }
        validated.push(ApprovedPool {
            pool_id: pool_id.to_string(),
            ..pool.clone()
        });
    }
    Ok(validated)
}
