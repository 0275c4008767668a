//! Error types for the synchronizer
//!
//! Per-block failures are reported through the `failed` lists on pass
//! outcomes; these types only surface where a pass cannot be set up at all
//! (no remote tip, no database).

use std::fmt;

/// Remote feed failure classification
///
/// `NotFound` means the remote has no such block yet and is not treated as
/// an error by callers. Missing optional data (reward, price, difficulty)
/// is expressed as `Option::None`, never as a `FeedError`.
#[derive(Debug)]
pub enum FeedError {
    /// Timeout, connection failure, non-2xx status, or malformed payload
    Transport(String),
    /// Remote returned 404 for the requested block
    NotFound,
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedError::Transport(msg) => write!(f, "transport error: {}", msg),
            FeedError::NotFound => write!(f, "block not found on remote"),
        }
    }
}

impl std::error::Error for FeedError {}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        FeedError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Transport(format!("malformed payload: {}", err))
    }
}

/// Persistence gateway failure
#[derive(Debug)]
pub enum StoreError {
    Database(String),
    Migration(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Database(msg) => write!(f, "database error: {}", msg),
            StoreError::Migration(msg) => write!(f, "migration error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Pass-level synchronization failure
#[derive(Debug)]
pub enum SyncError {
    Feed(FeedError),
    Store(StoreError),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Feed(e) => write!(f, "feed error: {}", e),
            SyncError::Store(e) => write!(f, "store error: {}", e),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<FeedError> for SyncError {
    fn from(err: FeedError) -> Self {
        SyncError::Feed(err)
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        SyncError::Store(err)
    }
}
