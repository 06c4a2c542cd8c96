use anyhow::Result;

use crate::types::{EpochTotalStake, FisoRewardInfo, PoolInfoBundle};

pub fn rewards_to_csv(info: &FisoRewardInfo) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "campaign_id",
        "stake_account",
        "current_epoch",
        "user_earned",
        "token_ticker",
        "reported_epoch",
        "user_current_pool",
        "user_current_staked_amount",
        "current_total_stake",
        "current_total_delegators",
    ])?;
    writer.write_record([
        info.campaign_id.to_string(),
        info.stake_account.clone(),
        info.current_epoch.to_string(),
        format!("{:.6}", info.user_earned),
        info.token_ticker.clone(),
        info.reported_epoch.map(|e| e.to_string()).unwrap_or_default(),
        info.user_current_pool.clone().unwrap_or_default(),
        info.user_current_staked_amount.to_string(),
        info.current_total_stake.to_string(),
        info.current_total_delegators.to_string(),
    ])?;
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn totals_to_csv(totals: &[EpochTotalStake]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["epoch", "total_stake", "total_delegators"])?;
    for total in totals {
        writer.write_record([
            total.epoch.to_string(),
            total.total_stake.to_string(),
            total.total_delegators.to_string(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn pools_to_csv(bundle: &PoolInfoBundle) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "pool_id",
        "hex_id",
        "ticker",
        "live_stake",
        "live_pledge",
        "live_saturation",
        "margin_cost",
        "fixed_cost",
        "live_delegators",
        "error",
    ])?;
    for info in &bundle.successful_pools {
        let stats = info.stats.as_ref();
        writer.write_record([
            info.pool.pool_id.clone(),
            info.pool.hex_id.clone(),
            info.pool.ticker.clone().unwrap_or_default(),
            stats.map(|s| s.live_stake.to_string()).unwrap_or_default(),
            stats.map(|s| s.live_pledge.to_string()).unwrap_or_default(),
            stats
                .map(|s| format!("{:.4}", s.live_saturation))
                .unwrap_or_default(),
            stats.map(|s| format!("{:.4}", s.margin_cost)).unwrap_or_default(),
            stats.map(|s| s.fixed_cost.to_string()).unwrap_or_default(),
            stats.map(|s| s.live_delegators.to_string()).unwrap_or_default(),
            String::new(),
        ])?;
    }
    for error in &bundle.errors {
        let mut record = vec![error.pool_id.clone()];
        record.extend(std::iter::repeat(String::new()).take(8));
        record.push(error.error.clone());
        writer.write_record(&record)?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}
