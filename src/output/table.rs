use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::types::{
    CampaignDetails, DelegationSnapshot, EpochTotalStake, FisoRewardInfo, PoolInfoBundle,
};

const LOVELACE_PER_ADA: f64 = 1_000_000.0;

pub fn format_ada(lovelace: u64) -> String {
    format!("{:.2} ADA", lovelace as f64 / LOVELACE_PER_ADA)
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn render_rewards_table(info: &FisoRewardInfo) -> String {
    let mut table = new_table();
    table.set_header(vec!["Field", "Value"]);
    let share = if info.current_total_stake == 0 {
        "-".to_string()
    } else {
        format!(
            "{:.4}%",
            info.user_current_staked_amount as f64 / info.current_total_stake as f64 * 100.0
        )
    };
    let rows = vec![
        ("Campaign", info.campaign_id.to_string()),
        ("Stake account", info.stake_account.clone()),
        ("Current epoch", info.current_epoch.to_string()),
        (
            "Earned",
            format!("{:.6} {}", info.user_earned, info.token_ticker),
        ),
        (
            "Reported epoch",
            info.reported_epoch
                .map(|epoch| epoch.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ),
        (
            "Delegated to",
            info.user_current_pool
                .clone()
                .unwrap_or_else(|| "-".to_string()),
        ),
        ("Delegated amount", format_ada(info.user_current_staked_amount)),
        ("Campaign stake", format_ada(info.current_total_stake)),
        ("Campaign delegators", info.current_total_delegators.to_string()),
        ("Share", share),
    ];
    for (field, value) in rows {
        table.add_row(vec![field.to_string(), value]);
    }
    table.to_string()
}

pub fn render_totals_table(totals: &[EpochTotalStake]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Epoch", "Total Stake", "Delegators"]);
    for total in totals {
        table.add_row(vec![
            total.epoch.to_string(),
            format_ada(total.total_stake),
            total.total_delegators.to_string(),
        ]);
    }
    table.to_string()
}

pub fn render_pools_table(bundle: &PoolInfoBundle) -> String {
    let mut table = new_table();
    table.set_header(vec![
        "Pool",
        "Ticker",
        "Live Stake",
        "Saturation",
        "Margin",
        "Delegators",
        "Status",
    ]);
    for info in &bundle.successful_pools {
        let stats = info.stats.as_ref();
        table.add_row(Row::from(vec![
            Cell::new(&info.pool.pool_id),
            Cell::new(info.pool.ticker.as_deref().unwrap_or("-")),
            Cell::new(
                stats
                    .map(|s| format_ada(s.live_stake))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(
                stats
                    .map(|s| format!("{:.1}%", s.live_saturation * 100.0))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(
                stats
                    .map(|s| format!("{:.2}%", s.margin_cost * 100.0))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(
                stats
                    .map(|s| s.live_delegators.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new("OK").fg(Color::Green),
        ]));
    }
    for error in &bundle.errors {
        table.add_row(Row::from(vec![
            Cell::new(&error.pool_id),
            Cell::new("-"),
            Cell::new("-"),
            Cell::new("-"),
            Cell::new("-"),
            Cell::new("-"),
            Cell::new(&error.error).fg(Color::Red),
        ]));
    }
    table.to_string()
}

pub fn render_campaign_table(details: &CampaignDetails) -> String {
    let campaign = &details.campaign;
    let mut summary = new_table();
    summary.set_header(vec!["Campaign", "Project", "Tokens", "Epochs", "Totals Through"]);
    summary.add_row(vec![
        campaign.id.to_string(),
        campaign.project_slug.clone(),
        format!("{} {}", campaign.token_amount, campaign.token_ticker),
        format!("{}..={}", campaign.start_epoch, campaign.end_epoch),
        campaign
            .totals_complete_through
            .map(|epoch| epoch.to_string())
            .unwrap_or_else(|| "-".to_string()),
    ]);

    let mut pools = new_table();
    pools.set_header(vec!["Approved Pool", "From Epoch", "To Epoch", "Effective"]);
    for pool in &details.approved_pools {
        let effective = match pool.effective_window(campaign) {
            Some(window) => Cell::new(format!("{}..={}", window.start, window.end)),
            None => Cell::new("outside campaign").fg(Color::Yellow),
        };
        pools.add_row(Row::from(vec![
            Cell::new(&pool.pool_id),
            Cell::new(pool.start_epoch),
            Cell::new(pool.end_epoch),
            effective,
        ]));
    }
    format!("{summary}\n{pools}")
}

pub fn render_snapshot_table(snapshot: &DelegationSnapshot) -> String {
    let mut table = new_table();
    table.set_header(vec!["Stake Account", "Registered", "Active", "Pool", "Controlled"]);
    let registered = if snapshot.registered {
        Cell::new("YES").fg(Color::Green)
    } else {
        Cell::new("NO").fg(Color::Red)
    };
    table.add_row(Row::from(vec![
        Cell::new(&snapshot.stake_account),
        registered,
        Cell::new(if snapshot.active { "YES" } else { "NO" }),
        Cell::new(snapshot.pool_id.as_deref().unwrap_or("-")),
        Cell::new(format_ada(snapshot.controlled_amount)),
    ]));
    table.to_string()
}
