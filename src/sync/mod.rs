//! # Ledger mirror synchronizer
//!
//! Mirrors an append-only remote explorer feed into a local relational
//! store and maintains per-block derived metrics:
//!
//! 1. The reconciler detects missing local block numbers relative to the
//!    remote tip (and internal gaps in repair mode)
//! 2. The feed client resolves hash/time/raw payload per block
//! 3. Rows are upserted one transaction at a time, so re-running a pass
//!    over the same range is idempotent
//! 4. The average maintainer recomputes trailing interval means per row
//! 5. The snapshot recorder appends emission and market observations
//!
//! Processing is strictly sequential within a pass: each block's interval
//! depends on its predecessor's timestamp, and moving averages depend on
//! ordered history. Coverage is eventual and gap-free up to the last
//! successfully synchronized point; nothing here is real-time.
//!
//! ## Module organization
//!
//! - `config` - environment-backed configuration
//! - `error` - feed/store/pass error taxonomy
//! - `types` - row structs and structured pass outcomes
//! - `feed` - remote explorer HTTP client behind the `BlockFeed` seam
//! - `db` - SQLite gateway and versioned migrations
//! - `averages` - trailing moving averages of block-interval time
//! - `snapshots` - emission (insert-once) and market (rate-limited) rows
//! - `reconciler` - gap detection and per-block fetch + write
//! - `scheduler` - polling loop, tip-change detection, backoff

pub mod averages;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod reconciler;
pub mod scheduler;
pub mod snapshots;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export commonly used types
pub use averages::AverageMaintainer;
pub use config::SyncConfig;
pub use db::Store;
pub use error::{FeedError, StoreError, SyncError};
pub use feed::{BlockFeed, FeedClient, ResolvedBlock};
pub use reconciler::Reconciler;
pub use scheduler::{run_sync_loop, Backoff};
pub use snapshots::SnapshotRecorder;
pub use types::{
    BlockRecord, EmissionSnapshot, MarketSnapshot, RepairOutcome, SyncOutcome, UpsertMode,
    MOVING_AVERAGE_WINDOWS,
};
