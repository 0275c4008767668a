//! Poller daemon: continuous mirroring of the remote explorer feed
//!
//! Usage:
//!   cargo run --release --bin chainmirror
//!
//! Configuration is environment-driven; see `SyncConfig::from_env` for the
//! full variable list. `RUST_LOG` controls log verbosity (default: info).

use chainmirror::sync::{
    run_sync_loop, AverageMaintainer, BlockFeed, FeedClient, Reconciler, SnapshotRecorder, Store,
    SyncConfig,
};
use dotenv::dotenv;
use log::info;
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = SyncConfig::from_env();

    info!("starting chainmirror");
    info!("   remote feed:    {}", config.base_url);
    info!("   database:       {}", config.db_path);
    info!("   poll interval:  {}s", config.poll_interval_secs);
    info!("   blocks per pass: {}", config.max_blocks_per_pass);
    info!("   upsert mode:    {:?}", config.upsert_mode);
    info!("   repair gaps:    {}", config.repair_gaps);

    let store = Store::open(&config.db_path)?;
    let feed: Arc<dyn BlockFeed> = Arc::new(FeedClient::new(
        &config.base_url,
        config.request_timeout_secs,
        config.fetch_retries,
    )?);

    let averages = AverageMaintainer::new(store.clone());
    let snapshots = SnapshotRecorder::new(
        store.clone(),
        feed.clone(),
        config.market_min_interval_secs,
    );
    let reconciler = Arc::new(Reconciler::new(
        store,
        feed.clone(),
        averages,
        snapshots,
        &config,
    ));

    let (stop_tx, stop_rx) = watch::channel(false);
    let loop_handle = tokio::spawn(run_sync_loop(reconciler, feed, config, stop_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, finishing current block");
    let _ = stop_tx.send(true);
    let _ = loop_handle.await;

    Ok(())
}
