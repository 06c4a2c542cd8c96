pub const BASE_MIGRATION: &str = r#"
CREATE TABLE IF NOT EXISTS stake_pools (
    pool_id TEXT PRIMARY KEY,
    hex_id TEXT NOT NULL UNIQUE,
    ticker TEXT,
    name TEXT,
    homepage TEXT,
    description TEXT
);

CREATE TABLE IF NOT EXISTS stake_pool_stats (
    pool_id TEXT PRIMARY KEY REFERENCES stake_pools(pool_id),
    live_stake INTEGER NOT NULL,
    live_pledge INTEGER NOT NULL,
    margin_cost REAL NOT NULL,
    fixed_cost INTEGER NOT NULL,
    live_saturation REAL NOT NULL,
    live_delegators INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS stake_pool_data_cache (
    cache_key TEXT PRIMARY KEY,
    bundle_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS stake_pool_epoch_history (
    pool_id TEXT NOT NULL,
    epoch INTEGER NOT NULL,
    active_stake INTEGER NOT NULL,
    delegators_count INTEGER NOT NULL,
    PRIMARY KEY (pool_id, epoch)
);

CREATE TABLE IF NOT EXISTS user_stake_epoch_history (
    stake_account TEXT NOT NULL,
    epoch INTEGER NOT NULL,
    pool_id TEXT NOT NULL,
    amount TEXT NOT NULL,
    PRIMARY KEY (stake_account, epoch)
);

CREATE TABLE IF NOT EXISTS fiso_campaigns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_slug TEXT NOT NULL,
    token_amount REAL NOT NULL,
    token_ticker TEXT NOT NULL,
    start_epoch INTEGER NOT NULL,
    end_epoch INTEGER NOT NULL,
    totals_complete_through INTEGER
);

CREATE TABLE IF NOT EXISTS fiso_approved_pools (
    fiso_id INTEGER NOT NULL REFERENCES fiso_campaigns(id),
    pool_id TEXT NOT NULL,
    start_epoch INTEGER NOT NULL,
    end_epoch INTEGER NOT NULL,
    PRIMARY KEY (fiso_id, pool_id)
);

CREATE TABLE IF NOT EXISTS fiso_epoch_totals (
    fiso_id INTEGER NOT NULL REFERENCES fiso_campaigns(id),
    epoch INTEGER NOT NULL,
    total_stake INTEGER NOT NULL,
    total_delegators INTEGER NOT NULL,
    PRIMARY KEY (fiso_id, epoch)
);
"#;
