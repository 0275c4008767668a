//! Record reconciliation - gap detection and per-block fetch + write
//!
//! One pass: determine the remote tip, compute the missing numbers (tip
//! catch-up plus, in repair mode, internal gaps), and process candidates
//! oldest first so forward progress is guaranteed. A block's failure is
//! recorded and skipped; it never halts the pass. The predecessor's
//! resolved timestamp is carried forward across consecutive candidates so
//! only the first block of a run costs an extra lookup.

use super::averages::AverageMaintainer;
use super::config::SyncConfig;
use super::db::Store;
use super::error::{FeedError, SyncError};
use super::feed::BlockFeed;
use super::snapshots::SnapshotRecorder;
use super::types::{BlockRecord, SyncOutcome, UpsertMode};
use std::sync::Arc;
use tokio::sync::watch;

pub struct Reconciler {
    store: Store,
    feed: Arc<dyn BlockFeed>,
    averages: AverageMaintainer,
    snapshots: SnapshotRecorder,
    start_floor: u64,
    upsert_mode: UpsertMode,
    repair_gaps: bool,
}

impl Reconciler {
    pub fn new(
        store: Store,
        feed: Arc<dyn BlockFeed>,
        averages: AverageMaintainer,
        snapshots: SnapshotRecorder,
        config: &SyncConfig,
    ) -> Self {
        Self {
            store,
            feed,
            averages,
            snapshots,
            start_floor: config.start_floor,
            upsert_mode: config.upsert_mode,
            repair_gaps: config.repair_gaps,
        }
    }

    /// Run one synchronization pass bounded to `max_blocks` candidates
    ///
    /// Fails only when the pass cannot be set up (no remote tip, store
    /// unreadable); per-block failures land in `SyncOutcome::failed`.
    pub async fn synchronize(
        &self,
        max_blocks: usize,
        stop: Option<&watch::Receiver<bool>>,
    ) -> Result<SyncOutcome, SyncError> {
        let remote_tip = self.feed.tip().await?;
        let local_max = self.store.max_block_number()?;

        let mut candidates: Vec<u64> = Vec::new();
        if self.repair_gaps {
            if let Some(local_max) = local_max {
                candidates.extend(self.store.missing_in_range(self.start_floor + 1, local_max)?);
            }
        }
        let next = local_max.map(|m| m + 1).unwrap_or(self.start_floor + 1);
        if next <= remote_tip {
            // Bounded extend: a fresh mirror of a long chain must not
            // materialize the whole tip range just to truncate it
            let remaining = max_blocks.saturating_sub(candidates.len());
            candidates.extend((next..=remote_tip).take(remaining));
        }
        candidates.truncate(max_blocks);

        let (synced, failed) = self.process(&candidates, stop).await;

        Ok(SyncOutcome {
            synced,
            failed,
            remote_tip,
            local_coverage: self.store.max_block_number()?.unwrap_or(self.start_floor),
        })
    }

    /// Backfill only the absent blocks in `[start, end]` (operator repair)
    pub async fn sync_range(&self, start: u64, end: u64) -> Result<SyncOutcome, SyncError> {
        let remote_tip = self.feed.tip().await?;
        let candidates = self.store.missing_in_range(start, end)?;

        if candidates.is_empty() {
            log::info!("no missing blocks in {}..={}", start, end);
        } else {
            log::info!(
                "found {} missing blocks in {}..={}",
                candidates.len(),
                start,
                end
            );
        }

        let (synced, failed) = self.process(&candidates, None).await;

        Ok(SyncOutcome {
            synced,
            failed,
            remote_tip,
            local_coverage: self.store.max_block_number()?.unwrap_or(self.start_floor),
        })
    }

    async fn process(
        &self,
        candidates: &[u64],
        stop: Option<&watch::Receiver<bool>>,
    ) -> (Vec<u64>, Vec<u64>) {
        let mut synced = Vec::new();
        let mut failed = Vec::new();
        // Last resolved (number, time), reused as the next predecessor
        let mut carried: Option<(u64, i64)> = None;

        for &number in candidates {
            // Stop is observed between blocks, never mid-write
            if stop.map(|rx| *rx.borrow()).unwrap_or(false) {
                log::info!("stop requested, ending pass after {} blocks", synced.len());
                break;
            }

            match self.process_block(number, &mut carried).await {
                Ok(true) => synced.push(number),
                Ok(false) => {
                    // Remote does not have the block yet: nothing to do
                    log::debug!("block {} not on remote yet", number);
                }
                Err(e) => {
                    log::warn!("block {} failed: {}", number, e);
                    failed.push(number);
                    carried = None;
                }
            }
        }

        (synced, failed)
    }

    /// Fetch, reconcile, and derive one block
    ///
    /// Returns Ok(false) when the remote has no such block. Failures in the
    /// derived stages (averages, snapshots) are logged and do not roll back
    /// the already-committed block row.
    async fn process_block(
        &self,
        number: u64,
        carried: &mut Option<(u64, i64)>,
    ) -> Result<bool, SyncError> {
        let block = match self.feed.resolve_block(number).await {
            Ok(block) => block,
            Err(FeedError::NotFound) => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let prev_timestamp = self.predecessor_timestamp(number, carried).await;
        let hashrate = self.feed.network_hashrate().await;

        let record = BlockRecord::new(number, block.time, prev_timestamp, hashrate);
        self.store.upsert_block(&record, self.upsert_mode)?;
        *carried = Some((number, block.time));

        log::info!(
            "block {} stored (interval {:?}s, hashrate {:?})",
            number,
            record.interval_seconds,
            hashrate
        );

        if let Err(e) = self.averages.update_moving_averages(number) {
            log::warn!("moving averages not updated for block {}: {}", number, e);
        }

        // A successor stored earlier with an unresolvable predecessor gets
        // its interval derived now that this block's timestamp is known
        match self.store.heal_successor_interval(number, block.time) {
            Ok(true) => {
                log::info!(
                    "derived interval for block {} from backfilled block {}",
                    number + 1,
                    number
                );
                if let Err(e) = self.averages.update_moving_averages(number + 1) {
                    log::warn!(
                        "moving averages not updated for block {}: {}",
                        number + 1,
                        e
                    );
                }
            }
            Ok(false) => {}
            Err(e) => log::warn!("successor of block {} not healed: {}", number, e),
        }

        let reward = self.feed.block_reward(&block).await;
        if let Err(e) = self
            .snapshots
            .record_emission(number, block.time, reward)
            .await
        {
            log::warn!("emission snapshot failed for block {}: {}", number, e);
        }
        if let Err(e) = self.snapshots.record_market().await {
            log::warn!("market snapshot failed: {}", e);
        }

        Ok(true)
    }

    /// Predecessor timestamp: carried value, then the local store, then one
    /// remote fetch
    ///
    /// A genesis predecessor (`NotFound`) or an unreachable predecessor
    /// leaves the interval undefined; the block row is still written so an
    /// otherwise-resolvable block is never blocked by its neighbor.
    async fn predecessor_timestamp(
        &self,
        number: u64,
        carried: &Option<(u64, i64)>,
    ) -> Option<i64> {
        let prev = number.checked_sub(1)?;

        if let Some((carried_number, carried_time)) = carried {
            if *carried_number == prev {
                return Some(*carried_time);
            }
        }

        match self.store.block_timestamp(prev) {
            Ok(Some(timestamp)) => return Some(timestamp),
            Ok(None) => {}
            Err(e) => log::warn!("predecessor lookup failed locally for {}: {}", prev, e),
        }

        match self.feed.resolve_block(prev).await {
            Ok(block) => Some(block.time),
            Err(FeedError::NotFound) => None,
            Err(e) => {
                log::warn!(
                    "predecessor {} unresolvable, interval left null: {}",
                    prev,
                    e
                );
                None
            }
        }
    }
}
