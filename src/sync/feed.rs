//! Remote explorer feed client
//!
//! Thin HTTP accessor over the explorer's Iquidus-style API. Endpoints are
//! heterogeneous on purpose: some return plain scalar text, some JSON, and
//! the encoding is decided by the requested endpoint, never by sniffing the
//! payload.
//!
//! ## Endpoints consumed
//!
//! - `getblockcount` → integer text
//! - `getblockhash?index=N` → hash text
//! - `getblock?hash=H` → JSON `{time, tx: [...]}`
//! - `getnetworkhashps` → numeric
//! - `getrawtransaction?txid=T&decrypt=1` → JSON `{vout: [{value, ...}]}`
//! - `getmoneysupply`, `getcurrentprice`, `getdifficulty` → numeric or JSON

use super::error::FeedError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// One remote block resolved to the fields the mirror needs
#[derive(Debug, Clone)]
pub struct ResolvedBlock {
    pub number: u64,
    pub hash: String,
    /// Block time, seconds since epoch
    pub time: i64,
    /// Raw `getblock` payload, kept for reward extraction
    pub payload: Value,
}

/// Seam between the reconciler/snapshot recorder and the remote explorer
///
/// Optional observations (hashrate, reward, supply, price, difficulty)
/// return `None` when the remote cannot provide them; only block resolution
/// and the tip distinguish transport failures from absence.
#[async_trait]
pub trait BlockFeed: Send + Sync {
    /// Current remote tip (highest block number)
    async fn tip(&self) -> Result<u64, FeedError>;

    /// Resolve hash, time, and raw payload for one block number
    async fn resolve_block(&self, index: u64) -> Result<ResolvedBlock, FeedError>;

    /// Current network hashrate in H/s, if available
    async fn network_hashrate(&self) -> Option<f64>;

    /// Reward paid by the block: first output of the first transaction
    async fn block_reward(&self, block: &ResolvedBlock) -> Option<f64>;

    /// Current circulating money supply, if available
    async fn money_supply(&self) -> Option<f64>;

    /// Current price in USD, if available
    async fn current_price(&self) -> Option<f64>;

    /// Current mining difficulty, if available
    async fn difficulty(&self) -> Option<f64>;
}

/// reqwest-backed implementation of [`BlockFeed`]
pub struct FeedClient {
    client: reqwest::Client,
    base_url: String,
    retries: u32,
}

impl FeedClient {
    pub fn new(base_url: &str, timeout_secs: u64, retries: u32) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            client,
            base_url,
            retries,
        })
    }

    /// Fetch an endpoint with bounded retries on transport failures
    ///
    /// 404 is surfaced immediately as `NotFound` and never retried.
    async fn fetch_text(&self, endpoint: &str) -> Result<String, FeedError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut last_err = FeedError::Transport("no attempt made".to_string());

        for attempt in 0..=self.retries {
            match self.client.get(&url).send().await {
                Ok(response) => {
                    if response.status() == reqwest::StatusCode::NOT_FOUND {
                        return Err(FeedError::NotFound);
                    }
                    if !response.status().is_success() {
                        last_err =
                            FeedError::Transport(format!("{}: HTTP {}", endpoint, response.status()));
                    } else {
                        match response.text().await {
                            Ok(body) => return Ok(body),
                            Err(e) => last_err = FeedError::from(e),
                        }
                    }
                }
                Err(e) => last_err = FeedError::from(e),
            }

            if attempt < self.retries {
                log::debug!(
                    "retrying {} (attempt {} of {}): {}",
                    endpoint,
                    attempt + 1,
                    self.retries,
                    last_err
                );
            }
        }

        Err(last_err)
    }

    async fn fetch_json(&self, endpoint: &str) -> Result<Value, FeedError> {
        let body = self.fetch_text(endpoint).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Fetch an optional numeric observation; any failure degrades to `None`
    async fn fetch_optional_number(&self, endpoint: &str) -> Option<f64> {
        match self.fetch_text(endpoint).await {
            Ok(body) => parse_scalar(&body),
            Err(e) => {
                log::warn!("{} unavailable: {}", endpoint, e);
                None
            }
        }
    }
}

#[async_trait]
impl BlockFeed for FeedClient {
    async fn tip(&self) -> Result<u64, FeedError> {
        let body = self.fetch_text("getblockcount").await?;
        body.trim()
            .parse()
            .map_err(|_| FeedError::Transport(format!("bad block count: {:?}", body.trim())))
    }

    async fn resolve_block(&self, index: u64) -> Result<ResolvedBlock, FeedError> {
        let hash = self
            .fetch_text(&format!("getblockhash?index={}", index))
            .await?
            .trim()
            .to_string();

        let payload = self.fetch_json(&format!("getblock?hash={}", hash)).await?;

        let time = payload
            .get("time")
            .and_then(Value::as_i64)
            .ok_or_else(|| FeedError::Transport(format!("block {} has no time field", index)))?;

        Ok(ResolvedBlock {
            number: index,
            hash,
            time,
            payload,
        })
    }

    async fn network_hashrate(&self) -> Option<f64> {
        self.fetch_optional_number("getnetworkhashps").await
    }

    async fn block_reward(&self, block: &ResolvedBlock) -> Option<f64> {
        let txid = first_txid(&block.payload)?;
        let endpoint = format!("getrawtransaction?txid={}&decrypt=1", txid);
        match self.fetch_json(&endpoint).await {
            Ok(tx) => first_output_value(&tx),
            Err(e) => {
                log::warn!("reward lookup failed for block {}: {}", block.number, e);
                None
            }
        }
    }

    async fn money_supply(&self) -> Option<f64> {
        self.fetch_optional_number("getmoneysupply").await
    }

    async fn current_price(&self) -> Option<f64> {
        self.fetch_optional_number("getcurrentprice").await
    }

    async fn difficulty(&self) -> Option<f64> {
        self.fetch_optional_number("getdifficulty").await
    }
}

/// Parse a scalar observation that may arrive as plain text, a JSON number,
/// a quoted number, or a price object keyed `last_price_usd`/`last_price_usdt`
fn parse_scalar(body: &str) -> Option<f64> {
    let trimmed = body.trim();

    if let Ok(value) = trimmed.parse::<f64>() {
        return Some(value);
    }

    let json: Value = serde_json::from_str(trimmed).ok()?;
    number_from(&json)
        .or_else(|| json.get("last_price_usd").and_then(number_from))
        .or_else(|| json.get("last_price_usdt").and_then(number_from))
}

fn number_from(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// First transaction id of a `getblock` payload (the coinbase)
fn first_txid(payload: &Value) -> Option<String> {
    let first = payload.get("tx")?.as_array()?.first()?;
    match first {
        Value::String(txid) => Some(txid.clone()),
        Value::Object(_) => first
            .get("txid")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Value of the first output of a decoded transaction
fn first_output_value(tx: &Value) -> Option<f64> {
    tx.get("vout")?.as_array()?.first()?.get("value").and_then(number_from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_scalar_plain_text() {
        assert_eq!(parse_scalar("1234\n"), Some(1234.0));
        assert_eq!(parse_scalar("  3.14  "), Some(3.14));
        assert_eq!(parse_scalar("not-a-number"), None);
    }

    #[test]
    fn test_parse_scalar_price_object() {
        assert_eq!(
            parse_scalar(r#"{"last_price_usd": 0.0421}"#),
            Some(0.0421)
        );
        assert_eq!(
            parse_scalar(r#"{"last_price_usdt": "0.0433"}"#),
            Some(0.0433)
        );
        assert_eq!(parse_scalar(r#"{"something_else": 1.0}"#), None);
    }

    #[test]
    fn test_first_txid_string_and_object_forms() {
        let as_strings = json!({"tx": ["abc123", "def456"]});
        assert_eq!(first_txid(&as_strings), Some("abc123".to_string()));

        let as_objects = json!({"tx": [{"txid": "abc123"}]});
        assert_eq!(first_txid(&as_objects), Some("abc123".to_string()));

        let empty = json!({"tx": []});
        assert_eq!(first_txid(&empty), None);

        assert_eq!(first_txid(&json!({})), None);
    }

    #[test]
    fn test_first_output_value() {
        let tx = json!({"vout": [{"value": 50.0}, {"value": 1.0}]});
        assert_eq!(first_output_value(&tx), Some(50.0));

        let no_outputs = json!({"vout": []});
        assert_eq!(first_output_value(&no_outputs), None);
    }

    #[tokio::test]
    #[ignore] // Run only when testing against the live explorer
    async fn test_live_tip() {
        let client = FeedClient::new("https://explorer.fact0rn.io/api/", 10, 1).unwrap();
        let tip = client.tip().await.unwrap();
        assert!(tip > 0);
    }
}
