//! Core row and outcome types
//!
//! Row structs mirror the persisted schema one to one; outcome structs are
//! the structured results returned to operators instead of raised errors.

use serde::Serialize;

/// Trailing window sizes maintained per block row
///
/// Each size has a matching `moving_avg_<size>` column, so the set is a
/// schema property; changing it requires a migration.
pub const MOVING_AVERAGE_WINDOWS: [u32; 2] = [100, 672];

/// Conflict policy applied when a block row already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
    /// `ON CONFLICT DO UPDATE`: refresh timestamps, interval, and hashrate
    Refresh,
    /// `ON CONFLICT DO NOTHING`: first writer wins
    Keep,
}

/// Local mirror of one remote block's metadata
///
/// `interval_seconds` is defined only when the predecessor's timestamp was
/// resolvable; moving averages stay null until enough history exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockRecord {
    pub block_number: u64,
    /// Block time, seconds since epoch
    pub timestamp: i64,
    pub prev_block_number: Option<u64>,
    pub prev_timestamp: Option<i64>,
    pub interval_seconds: Option<i64>,
    pub network_hashrate: Option<f64>,
    pub moving_avg_100: Option<f64>,
    pub moving_avg_672: Option<f64>,
}

impl BlockRecord {
    /// Row as written by the reconciler, before averages are maintained
    pub fn new(
        block_number: u64,
        timestamp: i64,
        prev_timestamp: Option<i64>,
        network_hashrate: Option<f64>,
    ) -> Self {
        Self {
            block_number,
            timestamp,
            prev_block_number: block_number.checked_sub(1),
            prev_timestamp,
            interval_seconds: prev_timestamp.map(|prev| timestamp - prev),
            network_hashrate,
            moving_avg_100: None,
            moving_avg_672: None,
        }
    }
}

/// Point-in-time money-supply observation, one per block, insert-only
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmissionSnapshot {
    pub block_number: u64,
    pub unix_timestamp: i64,
    /// Wall clock of capture, formatted UTC
    pub observed_at: String,
    pub money_supply: f64,
    /// Reward extraction may fail without invalidating the snapshot
    pub block_reward: Option<f64>,
}

/// Appended price/difficulty observation, rate limited by timestamp
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSnapshot {
    pub id: i64,
    pub unix_timestamp: i64,
    pub observed_at: String,
    pub price: f64,
    pub difficulty: f64,
}

/// Structured result of one synchronization pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncOutcome {
    /// Block numbers written this pass, ascending
    pub synced: Vec<u64>,
    /// Block numbers that failed this pass and will be retried later
    pub failed: Vec<u64>,
    pub remote_tip: u64,
    /// Highest stored block number after the pass
    pub local_coverage: u64,
}

/// Structured result of a bulk moving-average recomputation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepairOutcome {
    pub fixed: Vec<u64>,
    pub failed: Vec<u64>,
}
