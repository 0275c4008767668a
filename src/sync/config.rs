//! Synchronizer configuration from environment variables

use super::types::UpsertMode;
use std::env;

/// Configuration for the mirror synchronizer
///
/// Loaded once at startup and passed into each component at construction.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the remote explorer API (trailing slash optional)
    pub base_url: String,

    /// Path to the SQLite database file
    pub db_path: String,

    /// Poll interval between synchronization passes (seconds)
    pub poll_interval_secs: u64,

    /// Per-request HTTP timeout (seconds)
    pub request_timeout_secs: u64,

    /// Bounded retry count for transport failures on a single fetch
    pub fetch_retries: u32,

    /// Maximum blocks processed per pass, oldest first
    pub max_blocks_per_pass: usize,

    /// Block number floor used when the store is empty; synchronization
    /// starts at `start_floor + 1`
    pub start_floor: u64,

    /// Conflict policy for re-inserted block rows
    pub upsert_mode: UpsertMode,

    /// Also fill internal gaps below the local maximum during scheduled passes
    pub repair_gaps: bool,

    /// Minimum spacing between stored market snapshots (seconds)
    pub market_min_interval_secs: i64,

    /// Consecutive failed passes before backoff kicks in
    pub failure_threshold: u32,

    /// Initial backoff delay (seconds)
    pub backoff_initial_secs: u64,

    /// Backoff delay cap (seconds)
    pub backoff_max_secs: u64,
}

impl SyncConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `CHAINMIRROR_API_BASE_URL` (default: https://explorer.fact0rn.io/api/)
    /// - `CHAINMIRROR_DB_PATH` (default: data/chainmirror.db)
    /// - `CHAINMIRROR_POLL_INTERVAL_SECS` (default: 59)
    /// - `CHAINMIRROR_REQUEST_TIMEOUT_SECS` (default: 10)
    /// - `CHAINMIRROR_FETCH_RETRIES` (default: 3)
    /// - `CHAINMIRROR_MAX_BLOCKS_PER_PASS` (default: 200)
    /// - `CHAINMIRROR_START_FLOOR` (default: 0)
    /// - `CHAINMIRROR_UPSERT_MODE` ("refresh" | "keep", default: refresh)
    /// - `CHAINMIRROR_REPAIR_GAPS` (default: false)
    /// - `CHAINMIRROR_MARKET_MIN_INTERVAL_SECS` (default: 300)
    /// - `CHAINMIRROR_FAILURE_THRESHOLD` (default: 3)
    /// - `CHAINMIRROR_BACKOFF_INITIAL_SECS` (default: 5)
    /// - `CHAINMIRROR_BACKOFF_MAX_SECS` (default: 300)
    pub fn from_env() -> Self {
        Self {
            base_url: env::var("CHAINMIRROR_API_BASE_URL")
                .unwrap_or_else(|_| "https://explorer.fact0rn.io/api/".to_string()),

            db_path: env::var("CHAINMIRROR_DB_PATH")
                .unwrap_or_else(|_| "data/chainmirror.db".to_string()),

            poll_interval_secs: parse_env("CHAINMIRROR_POLL_INTERVAL_SECS", 59),

            request_timeout_secs: parse_env("CHAINMIRROR_REQUEST_TIMEOUT_SECS", 10),

            fetch_retries: parse_env("CHAINMIRROR_FETCH_RETRIES", 3),

            max_blocks_per_pass: parse_env("CHAINMIRROR_MAX_BLOCKS_PER_PASS", 200),

            start_floor: parse_env("CHAINMIRROR_START_FLOOR", 0),

            upsert_mode: match env::var("CHAINMIRROR_UPSERT_MODE").as_deref() {
                Ok("keep") => UpsertMode::Keep,
                _ => UpsertMode::Refresh,
            },

            repair_gaps: parse_env("CHAINMIRROR_REPAIR_GAPS", false),

            market_min_interval_secs: parse_env("CHAINMIRROR_MARKET_MIN_INTERVAL_SECS", 300),

            failure_threshold: parse_env("CHAINMIRROR_FAILURE_THRESHOLD", 3),

            backoff_initial_secs: parse_env("CHAINMIRROR_BACKOFF_INITIAL_SECS", 5),

            backoff_max_secs: parse_env("CHAINMIRROR_BACKOFF_MAX_SECS", 300),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test so the shared env vars are not raced by a parallel case.
    #[test]
    fn test_defaults_and_overrides() {
        env::remove_var("CHAINMIRROR_API_BASE_URL");
        env::remove_var("CHAINMIRROR_DB_PATH");
        env::remove_var("CHAINMIRROR_MAX_BLOCKS_PER_PASS");
        env::remove_var("CHAINMIRROR_UPSERT_MODE");
        env::remove_var("CHAINMIRROR_REPAIR_GAPS");

        let config = SyncConfig::from_env();
        assert_eq!(config.base_url, "https://explorer.fact0rn.io/api/");
        assert_eq!(config.db_path, "data/chainmirror.db");
        assert_eq!(config.poll_interval_secs, 59);
        assert_eq!(config.fetch_retries, 3);
        assert_eq!(config.max_blocks_per_pass, 200);
        assert_eq!(config.upsert_mode, UpsertMode::Refresh);
        assert!(!config.repair_gaps);
        assert_eq!(config.market_min_interval_secs, 300);

        env::set_var("CHAINMIRROR_API_BASE_URL", "http://localhost:3001/api/");
        env::set_var("CHAINMIRROR_MAX_BLOCKS_PER_PASS", "25");
        env::set_var("CHAINMIRROR_UPSERT_MODE", "keep");
        env::set_var("CHAINMIRROR_REPAIR_GAPS", "true");

        let config = SyncConfig::from_env();
        assert_eq!(config.base_url, "http://localhost:3001/api/");
        assert_eq!(config.max_blocks_per_pass, 25);
        assert_eq!(config.upsert_mode, UpsertMode::Keep);
        assert!(config.repair_gaps);

        env::remove_var("CHAINMIRROR_API_BASE_URL");
        env::remove_var("CHAINMIRROR_MAX_BLOCKS_PER_PASS");
        env::remove_var("CHAINMIRROR_UPSERT_MODE");
        env::remove_var("CHAINMIRROR_REPAIR_GAPS");
    }
}
