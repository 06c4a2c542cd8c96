use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use crate::store::migrations::BASE_MIGRATION;
use crate::store::{CampaignStore, HistoryStore, PoolStore};
use crate::types::{
    AccountEpochHistory, ApprovedPool, CampaignDraft, EpochTotalStake, FisoCampaign,
    PoolCacheEntry, PoolEpochHistory, StakePool, StakePoolStats,
};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn()?.execute_batch(BASE_MIGRATION)?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("sqlite connection mutex poisoned"))
    }
}

impl PoolStore for SqliteStore {
    fn find_pool(&self, id_or_hex: &str) -> Result<Option<StakePool>> {
        let conn = self.conn()?;
        let pool = conn
            .query_row(
                r#"
SELECT pool_id, hex_id, ticker, name, homepage, description
FROM stake_pools
WHERE pool_id = ?1 OR hex_id = ?1
LIMIT 1
"#,
                params![id_or_hex],
                |row| {
                    Ok(StakePool {
                        pool_id: row.get(0)?,
                        hex_id: row.get(1)?,
                        ticker: row.get(2)?,
                        name: row.get(3)?,
                        homepage: row.get(4)?,
                        description: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(pool)
    }

    fn insert_pool(&self, pool: &StakePool) -> Result<()> {
        self.conn()?.execute(
            r#"
INSERT OR IGNORE INTO stake_pools(pool_id, hex_id, ticker, name, homepage, description)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#,
            params![
                pool.pool_id,
                pool.hex_id,
                pool.ticker,
                pool.name,
                pool.homepage,
                pool.description
            ],
        )?;
        Ok(())
    }

    fn pool_stats(&self, pool_id: &str) -> Result<Option<StakePoolStats>> {
        let conn = self.conn()?;
        let stats = conn
            .query_row(
                r#"
SELECT pool_id, live_stake, live_pledge, margin_cost, fixed_cost,
       live_saturation, live_delegators, updated_at
FROM stake_pool_stats
WHERE pool_id = ?1
"#,
                params![pool_id],
                |row| {
                    Ok(StakePoolStats {
                        pool_id: row.get(0)?,
                        live_stake: row.get::<_, i64>(1)? as u64,
                        live_pledge: row.get::<_, i64>(2)? as u64,
                        margin_cost: row.get(3)?,
                        fixed_cost: row.get::<_, i64>(4)? as u64,
                        live_saturation: row.get(5)?,
                        live_delegators: row.get::<_, i64>(6)? as u64,
                        updated_at: parse_timestamp(7, &row.get::<_, String>(7)?)?,
                    })
                },
            )
            .optional()?;
        Ok(stats)
    }

    fn upsert_pool_stats(&self, stats: &StakePoolStats) -> Result<()> {
        self.conn()?.execute(
            r#"
INSERT INTO stake_pool_stats(
    pool_id, live_stake, live_pledge, margin_cost, fixed_cost,
    live_saturation, live_delegators, updated_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
ON CONFLICT(pool_id) DO UPDATE SET
    live_stake = excluded.live_stake,
    live_pledge = excluded.live_pledge,
    margin_cost = excluded.margin_cost,
    fixed_cost = excluded.fixed_cost,
    live_saturation = excluded.live_saturation,
    live_delegators = excluded.live_delegators,
    updated_at = excluded.updated_at
"#,
            params![
                stats.pool_id,
                stats.live_stake as i64,
                stats.live_pledge as i64,
                stats.margin_cost,
                stats.fixed_cost as i64,
                stats.live_saturation,
                stats.live_delegators as i64,
                stats.updated_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn cache_entry(&self, key: &str) -> Result<Option<PoolCacheEntry>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT bundle_json, updated_at FROM stake_pool_data_cache WHERE cache_key = ?1",
                params![key],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        match row {
            Some((json, updated_at)) => Ok(Some(PoolCacheEntry {
                key: key.to_string(),
                bundle: serde_json::from_str(&json)?,
                updated_at: parse_timestamp(1, &updated_at)?,
            })),
            None => Ok(None),
        }
    }

    fn upsert_cache_entry(&self, entry: &PoolCacheEntry) -> Result<()> {
        self.conn()?.execute(
            r#"
INSERT INTO stake_pool_data_cache(cache_key, bundle_json, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(cache_key) DO UPDATE SET
    bundle_json = excluded.bundle_json,
    updated_at = excluded.updated_at
"#,
            params![
                entry.key,
                serde_json::to_string(&entry.bundle)?,
                entry.updated_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn touch_cache_entry(&self, key: &str, at: DateTime<Utc>) -> Result<()> {
        self.conn()?.execute(
            "UPDATE stake_pool_data_cache SET updated_at = ?2 WHERE cache_key = ?1",
            params![key, at.to_rfc3339()],
        )?;
        Ok(())
    }
}

impl HistoryStore for SqliteStore {
    fn pool_history(&self, pool_id: &str, start: u64, end: u64) -> Result<Vec<PoolEpochHistory>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
SELECT pool_id, epoch, active_stake, delegators_count
FROM stake_pool_epoch_history
WHERE pool_id = ?1 AND epoch BETWEEN ?2 AND ?3
ORDER BY epoch ASC
"#,
        )?;
        let rows = stmt
            .query_map(params![pool_id, start as i64, end as i64], |row| {
                Ok(PoolEpochHistory {
                    pool_id: row.get(0)?,
                    epoch: row.get::<_, i64>(1)? as u64,
                    active_stake: row.get::<_, i64>(2)? as u64,
                    delegators_count: row.get::<_, i64>(3)? as u64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert_pool_history(&self, rows: &[PoolEpochHistory]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                r#"
INSERT OR IGNORE INTO stake_pool_epoch_history(pool_id, epoch, active_stake, delegators_count)
VALUES (?1, ?2, ?3, ?4)
"#,
            )?;
            for row in rows {
                inserted += stmt.execute(params![
                    row.pool_id,
                    row.epoch as i64,
                    row.active_stake as i64,
                    row.delegators_count as i64
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn account_history(
        &self,
        stake_account: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<AccountEpochHistory>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
SELECT stake_account, epoch, pool_id, amount
FROM user_stake_epoch_history
WHERE stake_account = ?1 AND epoch BETWEEN ?2 AND ?3
ORDER BY epoch ASC
"#,
        )?;
        let rows = stmt
            .query_map(params![stake_account, start as i64, end as i64], |row| {
                Ok(AccountEpochHistory {
                    stake_account: row.get(0)?,
                    epoch: row.get::<_, i64>(1)? as u64,
                    pool_id: row.get(2)?,
                    amount: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert_account_history(&self, rows: &[AccountEpochHistory]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                r#"
INSERT OR IGNORE INTO user_stake_epoch_history(stake_account, epoch, pool_id, amount)
VALUES (?1, ?2, ?3, ?4)
"#,
            )?;
            for row in rows {
                inserted += stmt.execute(params![
                    row.stake_account,
                    row.epoch as i64,
                    row.pool_id,
                    row.amount
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }
}

impl CampaignStore for SqliteStore {
    fn create_campaign(&self, draft: &CampaignDraft) -> Result<FisoCampaign> {
        let conn = self.conn()?;
        conn.execute(
            r#"
INSERT INTO fiso_campaigns(project_slug, token_amount, token_ticker, start_epoch, end_epoch)
VALUES (?1, ?2, ?3, ?4, ?5)
"#,
            params![
                draft.project_slug,
                draft.token_amount,
                draft.token_ticker,
                draft.start_epoch as i64,
                draft.end_epoch as i64
            ],
        )?;
        Ok(FisoCampaign {
            id: conn.last_insert_rowid(),
            project_slug: draft.project_slug.clone(),
            token_amount: draft.token_amount,
            token_ticker: draft.token_ticker.clone(),
            start_epoch: draft.start_epoch,
            end_epoch: draft.end_epoch,
            totals_complete_through: None,
        })
    }

    fn campaign(&self, id: i64) -> Result<Option<FisoCampaign>> {
        let conn = self.conn()?;
        let campaign = conn
            .query_row(
                r#"
SELECT id, project_slug, token_amount, token_ticker, start_epoch, end_epoch,
       totals_complete_through
FROM fiso_campaigns
WHERE id = ?1
"#,
                params![id],
                |row| {
                    Ok(FisoCampaign {
                        id: row.get(0)?,
                        project_slug: row.get(1)?,
                        token_amount: row.get(2)?,
                        token_ticker: row.get(3)?,
                        start_epoch: row.get::<_, i64>(4)? as u64,
                        end_epoch: row.get::<_, i64>(5)? as u64,
                        totals_complete_through: row
                            .get::<_, Option<i64>>(6)?
                            .map(|epoch| epoch as u64),
                    })
                },
            )
            .optional()?;
        Ok(campaign)
    }

    fn update_campaign_epochs(&self, id: i64, start_epoch: u64, end_epoch: u64) -> Result<()> {
        self.conn()?.execute(
            "UPDATE fiso_campaigns SET start_epoch = ?2, end_epoch = ?3 WHERE id = ?1",
            params![id, start_epoch as i64, end_epoch as i64],
        )?;
        Ok(())
    }

    fn approved_pools(&self, fiso_id: i64) -> Result<Vec<ApprovedPool>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
SELECT pool_id, start_epoch, end_epoch
FROM fiso_approved_pools
WHERE fiso_id = ?1
ORDER BY pool_id ASC
"#,
        )?;
        let rows = stmt
            .query_map(params![fiso_id], |row| {
                Ok(ApprovedPool {
                    pool_id: row.get(0)?,
                    start_epoch: row.get::<_, i64>(1)? as u64,
                    end_epoch: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn replace_approved_pools(&self, fiso_id: i64, pools: &[ApprovedPool]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM fiso_approved_pools WHERE fiso_id = ?1",
            params![fiso_id],
        )?;
        {
            let mut stmt = tx.prepare(
                r#"
INSERT INTO fiso_approved_pools(fiso_id, pool_id, start_epoch, end_epoch)
VALUES (?1, ?2, ?3, ?4)
"#,
            )?;
            for pool in pools {
                stmt.execute(params![
                    fiso_id,
                    pool.pool_id,
                    pool.start_epoch as i64,
                    pool.end_epoch as i64
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn epoch_totals(&self, fiso_id: i64) -> Result<Vec<EpochTotalStake>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
SELECT epoch, total_stake, total_delegators
FROM fiso_epoch_totals
WHERE fiso_id = ?1
ORDER BY epoch ASC
"#,
        )?;
        let rows = stmt
            .query_map(params![fiso_id], |row| {
                Ok(EpochTotalStake {
                    epoch: row.get::<_, i64>(0)? as u64,
                    total_stake: row.get::<_, i64>(1)? as u64,
                    total_delegators: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert_epoch_totals(&self, fiso_id: i64, totals: &[EpochTotalStake]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
INSERT OR IGNORE INTO fiso_epoch_totals(fiso_id, epoch, total_stake, total_delegators)
VALUES (?1, ?2, ?3, ?4)
"#,
            )?;
            for total in totals {
                stmt.execute(params![
                    fiso_id,
                    total.epoch as i64,
                    total.total_stake as i64,
                    total.total_delegators as i64
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn set_totals_complete_through(&self, fiso_id: i64, epoch: Option<u64>) -> Result<()> {
        self.conn()?.execute(
            "UPDATE fiso_campaigns SET totals_complete_through = ?2 WHERE id = ?1",
            params![fiso_id, epoch.map(|e| e as i64)],
        )?;
        Ok(())
    }

    fn clear_epoch_totals(&self, fiso_id: i64) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM fiso_epoch_totals WHERE fiso_id = ?1",
            params![fiso_id],
        )?;
        tx.execute(
            "UPDATE fiso_campaigns SET totals_complete_through = NULL WHERE id = ?1",
            params![fiso_id],
        )?;
        tx.commit()?;
        Ok(())
    }
}

fn parse_timestamp(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}
