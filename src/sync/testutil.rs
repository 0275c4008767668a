//! Shared test doubles for the feed seam

use super::error::FeedError;
use super::feed::{BlockFeed, ResolvedBlock};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Scriptable in-memory feed
///
/// Blocks are `(time, reward)` pairs; numbers in `fail_blocks` raise a
/// transport error on every resolution, everything else unknown is
/// `NotFound`. `resolve_calls` records every resolution for assertions on
/// redundant predecessor fetches.
pub struct MockFeed {
    tip: Mutex<Result<u64, ()>>,
    blocks: Mutex<HashMap<u64, (i64, Option<f64>)>>,
    fail_blocks: Mutex<HashSet<u64>>,
    hashrate: Mutex<Option<f64>>,
    supply: Mutex<Option<f64>>,
    price: Mutex<Option<f64>>,
    difficulty: Mutex<Option<f64>>,
    pub resolve_calls: Mutex<Vec<u64>>,
}

impl MockFeed {
    pub fn new() -> Self {
        Self {
            tip: Mutex::new(Ok(0)),
            blocks: Mutex::new(HashMap::new()),
            fail_blocks: Mutex::new(HashSet::new()),
            hashrate: Mutex::new(Some(1_000_000.0)),
            supply: Mutex::new(Some(500_000.0)),
            price: Mutex::new(Some(0.05)),
            difficulty: Mutex::new(Some(12.5)),
            resolve_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_tip(&self, tip: u64) {
        *self.tip.lock().unwrap() = Ok(tip);
    }

    pub fn fail_tip(&self) {
        *self.tip.lock().unwrap() = Err(());
    }

    pub fn insert_block(&self, number: u64, time: i64, reward: Option<f64>) {
        self.blocks.lock().unwrap().insert(number, (time, reward));
    }

    /// Seed blocks `1..=count` spaced `interval` seconds apart
    pub fn seed_chain(&self, count: u64, start_time: i64, interval: i64) {
        for n in 1..=count {
            self.insert_block(n, start_time + (n as i64 - 1) * interval, Some(50.0));
        }
        self.set_tip(count);
    }

    pub fn fail_block(&self, number: u64) {
        self.fail_blocks.lock().unwrap().insert(number);
    }

    pub fn clear_block_failures(&self) {
        self.fail_blocks.lock().unwrap().clear();
    }

    pub fn set_supply(&self, supply: Option<f64>) {
        *self.supply.lock().unwrap() = supply;
    }

    pub fn set_price(&self, price: Option<f64>) {
        *self.price.lock().unwrap() = price;
    }

    pub fn set_difficulty(&self, difficulty: Option<f64>) {
        *self.difficulty.lock().unwrap() = difficulty;
    }

    pub fn resolve_count_for(&self, number: u64) -> usize {
        self.resolve_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|&&n| n == number)
            .count()
    }
}

#[async_trait]
impl BlockFeed for MockFeed {
    async fn tip(&self) -> Result<u64, FeedError> {
        let tip = *self.tip.lock().unwrap();
        tip.map_err(|_| FeedError::Transport("tip unavailable".to_string()))
    }

    async fn resolve_block(&self, index: u64) -> Result<ResolvedBlock, FeedError> {
        self.resolve_calls.lock().unwrap().push(index);

        if self.fail_blocks.lock().unwrap().contains(&index) {
            return Err(FeedError::Transport(format!("block {} unreachable", index)));
        }

        match self.blocks.lock().unwrap().get(&index) {
            Some(&(time, _)) => Ok(ResolvedBlock {
                number: index,
                hash: format!("hash{:08}", index),
                time,
                payload: json!({"time": time, "tx": [format!("coinbase{}", index)]}),
            }),
            None => Err(FeedError::NotFound),
        }
    }

    async fn network_hashrate(&self) -> Option<f64> {
        *self.hashrate.lock().unwrap()
    }

    async fn block_reward(&self, block: &ResolvedBlock) -> Option<f64> {
        self.blocks
            .lock()
            .unwrap()
            .get(&block.number)
            .and_then(|&(_, reward)| reward)
    }

    async fn money_supply(&self) -> Option<f64> {
        *self.supply.lock().unwrap()
    }

    async fn current_price(&self) -> Option<f64> {
        *self.price.lock().unwrap()
    }

    async fn difficulty(&self) -> Option<f64> {
        *self.difficulty.lock().unwrap()
    }
}
