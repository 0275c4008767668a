//! Trailing moving averages of block-interval time
//!
//! Each configured window is the arithmetic mean of `interval_seconds` over
//! the most recent `size` qualifying blocks at or below the target block.
//! A window with fewer than `size` qualifying records stays null; partial
//! averages are never written.

use super::db::Store;
use super::error::StoreError;
use super::types::{RepairOutcome, MOVING_AVERAGE_WINDOWS};

/// Largest magnitude an average column will store; larger values are
/// clamped with a warning instead of being rejected
pub const MAX_STORED_MAGNITUDE: f64 = 999_999_999_999.99;

/// Maintains the per-row `moving_avg_<size>` columns
pub struct AverageMaintainer {
    store: Store,
}

impl AverageMaintainer {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Recompute every configured window for one block and write the result
    ///
    /// Each window is independent and window-local: it reads only stored
    /// intervals, so the row itself must already be committed.
    pub fn update_moving_averages(&self, block_number: u64) -> Result<(), StoreError> {
        let mut averages = Vec::with_capacity(MOVING_AVERAGE_WINDOWS.len());

        for &size in &MOVING_AVERAGE_WINDOWS {
            let (count, mean) = self.store.window_average(block_number, size)?;
            let value = match mean {
                Some(raw) if count >= size => Some(round_and_clamp(raw, block_number, size)),
                _ => None,
            };
            averages.push((size, value));
        }

        self.store.write_moving_averages(block_number, &averages)
    }

    /// Bulk repair: apply `update_moving_averages` ascending over blocks
    /// whose averages are null and can still fill, or over all blocks when
    /// forced
    ///
    /// Ascending order matters because later windows may depend on earlier
    /// interval data being present.
    pub fn recompute_missing(&self, limit: usize, force: bool) -> Result<RepairOutcome, StoreError> {
        let candidates = if force {
            self.store.all_block_numbers(limit)?
        } else {
            self.store.blocks_without_averages(limit)?
        };

        let mut outcome = RepairOutcome {
            fixed: Vec::new(),
            failed: Vec::new(),
        };

        for block_number in candidates {
            match self.update_moving_averages(block_number) {
                Ok(()) => outcome.fixed.push(block_number),
                Err(e) => {
                    log::warn!("average recompute failed for block {}: {}", block_number, e);
                    outcome.failed.push(block_number);
                }
            }
        }

        Ok(outcome)
    }
}

/// Round to two decimal places, then clamp to the storage bound
fn round_and_clamp(value: f64, block_number: u64, size: u32) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.abs() > MAX_STORED_MAGNITUDE {
        log::warn!(
            "moving_avg_{} for block {} exceeds storage bound ({}), clamping",
            size,
            block_number,
            rounded
        );
        return MAX_STORED_MAGNITUDE.copysign(rounded);
    }
    rounded
}
