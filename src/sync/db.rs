//! SQLite persistence gateway
//!
//! Exclusive owner of durable state. One row per block number, one row per
//! emission snapshot, an append log of market snapshots. Every write is a
//! single-row transaction, so a concurrent reader never observes a
//! half-written block.
//!
//! Schema changes are versioned migrations applied once at open via
//! `PRAGMA user_version`; no runtime column probing.

use super::error::StoreError;
use super::types::{BlockRecord, EmissionSnapshot, MarketSnapshot, UpsertMode, MOVING_AVERAGE_WINDOWS};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Versioned migrations, applied in order; `user_version` records progress
const MIGRATIONS: &[&str] = &[r#"
    CREATE TABLE block_data (
        block_number        INTEGER PRIMARY KEY,
        timestamp           INTEGER NOT NULL,
        prev_block_number   INTEGER,
        prev_timestamp      INTEGER,
        interval_seconds    INTEGER,
        network_hashrate    REAL,
        moving_avg_100      REAL,
        moving_avg_672      REAL
    );

    CREATE TABLE emissions (
        block_number        INTEGER PRIMARY KEY,
        unix_timestamp      INTEGER NOT NULL,
        observed_at         TEXT NOT NULL,
        money_supply        REAL NOT NULL,
        block_reward        REAL
    );

    CREATE TABLE market_data (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        unix_timestamp      INTEGER NOT NULL,
        observed_at         TEXT NOT NULL,
        price               REAL NOT NULL,
        difficulty          REAL NOT NULL
    );

    CREATE INDEX idx_market_unix ON market_data(unix_timestamp DESC);
"#];

/// Shared handle to the relational store
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database and bring the schema up to date
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
            }
        }

        let mut conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::apply_migrations(&mut conn, MIGRATIONS)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Apply pending migrations, each atomic with its version bump so a
    /// crash mid-migration leaves no partial tables behind
    fn apply_migrations(conn: &mut Connection, migrations: &[&str]) -> Result<(), StoreError> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        for (idx, sql) in migrations.iter().enumerate().skip(version as usize) {
            let tx = conn.transaction()?;
            tx.execute_batch(sql)
                .map_err(|e| StoreError::Migration(format!("migration {}: {}", idx + 1, e)))?;
            tx.pragma_update(None, "user_version", (idx + 1) as i64)?;
            tx.commit()?;
            log::info!("applied schema migration {} of {}", idx + 1, migrations.len());
        }

        Ok(())
    }

    // --- block_data ---

    /// Highest stored block number, or None when the store is empty
    pub fn max_block_number(&self) -> Result<Option<u64>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let max: Option<i64> =
            conn.query_row("SELECT MAX(block_number) FROM block_data", [], |row| {
                row.get(0)
            })?;
        Ok(max.map(|n| n as u64))
    }

    pub fn block_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM block_data", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn block_timestamp(&self, block_number: u64) -> Result<Option<i64>, StoreError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT timestamp FROM block_data WHERE block_number = ?1",
                [block_number as i64],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn block(&self, block_number: u64) -> Result<Option<BlockRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT block_number, timestamp, prev_block_number, prev_timestamp,
                        interval_seconds, network_hashrate, moving_avg_100, moving_avg_672
                 FROM block_data WHERE block_number = ?1",
                [block_number as i64],
                |row| {
                    Ok(BlockRecord {
                        block_number: row.get::<_, i64>(0)? as u64,
                        timestamp: row.get(1)?,
                        prev_block_number: row.get::<_, Option<i64>>(2)?.map(|n| n as u64),
                        prev_timestamp: row.get(3)?,
                        interval_seconds: row.get(4)?,
                        network_hashrate: row.get(5)?,
                        moving_avg_100: row.get(6)?,
                        moving_avg_672: row.get(7)?,
                    })
                },
            )
            .optional()?)
    }

    /// Block numbers in `[start, end]` with no stored row, ascending
    pub fn missing_in_range(&self, start: u64, end: u64) -> Result<Vec<u64>, StoreError> {
        if start > end {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT block_number FROM block_data WHERE block_number BETWEEN ?1 AND ?2",
        )?;
        let existing: HashSet<u64> = stmt
            .query_map(params![start as i64, end as i64], |row| {
                row.get::<_, i64>(0).map(|n| n as u64)
            })?
            .collect::<Result<_, _>>()?;

        Ok((start..=end).filter(|n| !existing.contains(n)).collect())
    }

    /// Insert or reconcile one block row per the configured conflict policy
    ///
    /// `Refresh` updates the mutable fields in place (timestamps, interval,
    /// hashrate); `Keep` leaves the existing row untouched. Moving-average
    /// columns are never written here. Idempotent either way.
    pub fn upsert_block(&self, record: &BlockRecord, mode: UpsertMode) -> Result<(), StoreError> {
        let sql = match mode {
            UpsertMode::Refresh => {
                "INSERT INTO block_data
                    (block_number, timestamp, prev_block_number, prev_timestamp,
                     interval_seconds, network_hashrate)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(block_number) DO UPDATE SET
                    timestamp = excluded.timestamp,
                    prev_block_number = excluded.prev_block_number,
                    prev_timestamp = excluded.prev_timestamp,
                    interval_seconds = excluded.interval_seconds,
                    network_hashrate = excluded.network_hashrate"
            }
            UpsertMode::Keep => {
                "INSERT INTO block_data
                    (block_number, timestamp, prev_block_number, prev_timestamp,
                     interval_seconds, network_hashrate)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(block_number) DO NOTHING"
            }
        };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            sql,
            params![
                record.block_number as i64,
                record.timestamp,
                record.prev_block_number.map(|n| n as i64),
                record.prev_timestamp,
                record.interval_seconds,
                record.network_hashrate,
            ],
        )?;
        Ok(())
    }

    /// Derive the stored successor's interval once this block's timestamp
    /// is known; returns whether a row changed
    ///
    /// Only fills a null interval, so a successor whose predecessor was
    /// resolvable at write time is never touched.
    pub fn heal_successor_interval(
        &self,
        block_number: u64,
        timestamp: i64,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE block_data
             SET prev_block_number = ?1,
                 prev_timestamp = ?2,
                 interval_seconds = timestamp - ?2
             WHERE block_number = ?1 + 1 AND interval_seconds IS NULL",
            params![block_number as i64, timestamp],
        )?;
        Ok(changed > 0)
    }

    /// Count and mean of the most recent `size` non-null intervals at or
    /// below `block_number`
    pub fn window_average(
        &self,
        block_number: u64,
        size: u32,
    ) -> Result<(u32, Option<f64>), StoreError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT COUNT(*), AVG(interval_seconds) FROM (
                SELECT interval_seconds
                FROM block_data
                WHERE block_number <= ?1 AND interval_seconds IS NOT NULL
                ORDER BY block_number DESC
                LIMIT ?2
            )",
            params![block_number as i64, size],
            |row| Ok((row.get::<_, u32>(0)?, row.get::<_, Option<f64>>(1)?)),
        )?;
        Ok(result)
    }

    /// Write computed averages back onto the block row
    ///
    /// The update clause is built from the window list so it stays in step
    /// with `MOVING_AVERAGE_WINDOWS`.
    pub fn write_moving_averages(
        &self,
        block_number: u64,
        averages: &[(u32, Option<f64>)],
    ) -> Result<(), StoreError> {
        if averages.is_empty() {
            return Ok(());
        }

        let set_clause = averages
            .iter()
            .map(|(size, _)| format!("moving_avg_{} = ?", size))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE block_data SET {} WHERE block_number = ?",
            set_clause
        );

        let mut values: Vec<rusqlite::types::Value> = averages
            .iter()
            .map(|(_, avg)| match avg {
                Some(v) => (*v).into(),
                None => rusqlite::types::Value::Null,
            })
            .collect();
        values.push((block_number as i64).into());

        let conn = self.conn.lock().unwrap();
        conn.execute(&sql, rusqlite::params_from_iter(values))?;
        Ok(())
    }

    /// Blocks whose average columns are still null but can still fill,
    /// ascending
    ///
    /// A window of `size` needs `size` prior intervals, so rows at or below
    /// the window size are permanently null for it and excluded; reporting
    /// them would make bounded repair runs rescan the same rows forever.
    pub fn blocks_without_averages(&self, limit: usize) -> Result<Vec<u64>, StoreError> {
        let null_clause = MOVING_AVERAGE_WINDOWS
            .iter()
            .map(|size| {
                format!(
                    "(moving_avg_{} IS NULL AND block_number > {})",
                    size, size
                )
            })
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = format!(
            "SELECT block_number FROM block_data WHERE {} ORDER BY block_number ASC LIMIT ?1",
            null_clause
        );

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([limit as i64], |row| row.get::<_, i64>(0).map(|n| n as u64))?
            .collect::<Result<_, _>>()?;
        Ok(rows)
    }

    pub fn all_block_numbers(&self, limit: usize) -> Result<Vec<u64>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT block_number FROM block_data ORDER BY block_number ASC LIMIT ?1")?;
        let rows = stmt
            .query_map([limit as i64], |row| row.get::<_, i64>(0).map(|n| n as u64))?
            .collect::<Result<_, _>>()?;
        Ok(rows)
    }

    // --- emissions ---

    pub fn emission_exists(&self, block_number: u64) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT block_number FROM emissions WHERE block_number = ?1")?;
        Ok(stmt.exists([block_number as i64])?)
    }

    /// Insert-only, first write wins; returns whether a row was written
    pub fn insert_emission(&self, snapshot: &EmissionSnapshot) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO emissions
                (block_number, unix_timestamp, observed_at, money_supply, block_reward)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                snapshot.block_number as i64,
                snapshot.unix_timestamp,
                snapshot.observed_at,
                snapshot.money_supply,
                snapshot.block_reward,
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn emission(&self, block_number: u64) -> Result<Option<EmissionSnapshot>, StoreError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT block_number, unix_timestamp, observed_at, money_supply, block_reward
                 FROM emissions WHERE block_number = ?1",
                [block_number as i64],
                |row| {
                    Ok(EmissionSnapshot {
                        block_number: row.get::<_, i64>(0)? as u64,
                        unix_timestamp: row.get(1)?,
                        observed_at: row.get(2)?,
                        money_supply: row.get(3)?,
                        block_reward: row.get(4)?,
                    })
                },
            )
            .optional()?)
    }

    // --- market_data ---

    /// Newest stored market snapshot
    pub fn latest_market(&self) -> Result<Option<MarketSnapshot>, StoreError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT id, unix_timestamp, observed_at, price, difficulty
                 FROM market_data ORDER BY unix_timestamp DESC, id DESC LIMIT 1",
                [],
                |row| {
                    Ok(MarketSnapshot {
                        id: row.get(0)?,
                        unix_timestamp: row.get(1)?,
                        observed_at: row.get(2)?,
                        price: row.get(3)?,
                        difficulty: row.get(4)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn insert_market(
        &self,
        unix_timestamp: i64,
        observed_at: &str,
        price: f64,
        difficulty: f64,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO market_data (unix_timestamp, observed_at, price, difficulty)
             VALUES (?1, ?2, ?3, ?4)",
            params![unix_timestamp, observed_at, price, difficulty],
        )?;
        Ok(())
    }

    pub fn market_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM market_data", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
