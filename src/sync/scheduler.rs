//! Polling loop driving synchronization passes
//!
//! One sequential pass per tick, no intra-pass parallelism. The loop only
//! runs a pass when the remote tip has moved since the last successful
//! pass. Consecutive failing passes past the configured threshold trigger
//! exponential backoff before the next attempt; backoff is never fatal.

use super::config::SyncConfig;
use super::feed::BlockFeed;
use super::reconciler::Reconciler;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Duration};

/// Exponential backoff between failing passes
///
/// Unlike a per-request retry budget this has no attempt cap: the delay
/// grows to `max_secs` and stays there until `reset`.
#[derive(Debug)]
pub struct Backoff {
    initial_secs: u64,
    max_secs: u64,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial_secs: u64, max_secs: u64) -> Self {
        Self {
            initial_secs,
            max_secs,
            attempt: 0,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let secs = self
            .initial_secs
            .saturating_mul(2u64.saturating_pow(self.attempt))
            .min(self.max_secs);
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_secs(secs)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Run synchronization passes until the stop signal flips
///
/// The stop signal is also threaded into each pass so a long pass ends at
/// the next block boundary, never mid-write.
pub async fn run_sync_loop(
    reconciler: Arc<Reconciler>,
    feed: Arc<dyn BlockFeed>,
    config: SyncConfig,
    mut stop: watch::Receiver<bool>,
) {
    log::info!(
        "starting sync loop (poll interval: {}s, max blocks per pass: {})",
        config.poll_interval_secs,
        config.max_blocks_per_pass
    );

    let mut timer = interval(Duration::from_secs(config.poll_interval_secs));
    let mut backoff = Backoff::new(config.backoff_initial_secs, config.backoff_max_secs);
    let mut consecutive_failures = 0u32;
    let mut last_tip: Option<u64> = None;

    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }

            _ = timer.tick() => {
                let tip = match feed.tip().await {
                    Ok(tip) => tip,
                    Err(e) => {
                        log::warn!("tip unavailable: {}", e);
                        consecutive_failures += 1;
                        wait_out_failures(consecutive_failures, &mut backoff, &config, &mut stop).await;
                        if *stop.borrow() { break; }
                        continue;
                    }
                };

                // Only work when a new block has appeared
                if last_tip == Some(tip) {
                    continue;
                }
                log::info!("new remote tip detected: {}", tip);

                match reconciler.synchronize(config.max_blocks_per_pass, Some(&stop)).await {
                    Ok(outcome) => {
                        log::info!(
                            "pass complete: {} synced, {} failed, tip {}, coverage {}",
                            outcome.synced.len(),
                            outcome.failed.len(),
                            outcome.remote_tip,
                            outcome.local_coverage
                        );
                        if outcome.failed.is_empty() {
                            // Only a clean pass pins the tip; a pass with
                            // failures is retried on the next tick
                            last_tip = Some(tip);
                            consecutive_failures = 0;
                            backoff.reset();
                        } else {
                            log::warn!("failed blocks this pass: {:?}", outcome.failed);
                            consecutive_failures += 1;
                        }
                    }
                    Err(e) => {
                        log::error!("pass failed: {}", e);
                        consecutive_failures += 1;
                    }
                }

                wait_out_failures(consecutive_failures, &mut backoff, &config, &mut stop).await;
                if *stop.borrow() { break; }
            }
        }
    }

    log::info!("sync loop stopped");
}

/// Sleep out the backoff delay once the failure threshold is crossed,
/// still responsive to the stop signal
async fn wait_out_failures(
    consecutive_failures: u32,
    backoff: &mut Backoff,
    config: &SyncConfig,
    stop: &mut watch::Receiver<bool>,
) {
    if consecutive_failures < config.failure_threshold {
        return;
    }

    let delay = backoff.next_delay();
    log::warn!(
        "{} consecutive failed passes, backing off {}s",
        consecutive_failures,
        delay.as_secs()
    );

    tokio::select! {
        _ = stop.changed() => {}
        _ = sleep(delay) => {}
    }
}
