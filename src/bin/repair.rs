//! Operator repair tool
//!
//! Usage:
//!   cargo run --bin repair -- blocks <start> <end>
//!   cargo run --bin repair -- averages [limit] [--force]
//!
//! `blocks` backfills the missing block rows in an explicit range (also
//! driving moving averages and snapshots per filled block). `averages`
//! recomputes moving averages for rows whose averages are still null, or
//! for all rows with `--force`.
//!
//! Shares the daemon's environment configuration; see `SyncConfig::from_env`.

use chainmirror::sync::{
    AverageMaintainer, BlockFeed, FeedClient, Reconciler, SnapshotRecorder, Store, SyncConfig,
};
use dotenv::dotenv;
use log::info;
use std::env;
use std::sync::Arc;

fn usage() -> ! {
    eprintln!("Usage:");
    eprintln!("  repair blocks <start> <end>");
    eprintln!("  repair averages [limit] [--force]");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let config = SyncConfig::from_env();

    let store = Store::open(&config.db_path)?;
    let averages = AverageMaintainer::new(store.clone());

    match args.get(1).map(String::as_str) {
        Some("blocks") => {
            let (start, end) = match (
                args.get(2).and_then(|s| s.parse().ok()),
                args.get(3).and_then(|s| s.parse().ok()),
            ) {
                (Some(start), Some(end)) if start <= end => (start, end),
                _ => usage(),
            };

            let feed: Arc<dyn BlockFeed> = Arc::new(FeedClient::new(
                &config.base_url,
                config.request_timeout_secs,
                config.fetch_retries,
            )?);
            let snapshots = SnapshotRecorder::new(
                store.clone(),
                feed.clone(),
                config.market_min_interval_secs,
            );
            let reconciler = Reconciler::new(store, feed, averages, snapshots, &config);

            info!("backfilling blocks {}..={}", start, end);
            let outcome = reconciler.sync_range(start, end).await?;
            info!(
                "backfill complete: {} synced, {} failed (tip {}, coverage {})",
                outcome.synced.len(),
                outcome.failed.len(),
                outcome.remote_tip,
                outcome.local_coverage
            );
            if !outcome.failed.is_empty() {
                info!("failed blocks: {:?}", outcome.failed);
            }
        }

        Some("averages") => {
            let limit = args
                .get(2)
                .filter(|s| s.as_str() != "--force")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000);
            let force = args.iter().any(|a| a == "--force");

            info!(
                "recomputing moving averages (limit {}, force {})",
                limit, force
            );
            let outcome = averages.recompute_missing(limit, force)?;
            info!(
                "recompute complete: {} fixed, {} failed",
                outcome.fixed.len(),
                outcome.failed.len()
            );
            if !outcome.failed.is_empty() {
                info!("failed blocks: {:?}", outcome.failed);
            }
        }

        _ => usage(),
    }

    Ok(())
}
