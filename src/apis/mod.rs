//! Upstream provider clients.
//!
//! Each submodule wraps one third-party service and reduces its payload to
//! the shared normalized types at the edge; malformed or partial data
//! becomes `None`, never an error that could take down a worker. The
//! orchestration here implements the prioritized-failover contracts: market
//! snapshots try DexScreener, then BirdEye, then GeckoTerminal; JSON-RPC
//! lookups walk the configured RPC provider list.

pub mod birdeye;
pub mod bitquery;
pub mod dexscreener;
pub mod gecko;
pub mod helius;
pub mod jupiter;
pub mod rugcheck;
pub mod twitter;

use serde_json::Value;
use std::sync::Arc;

use crate::config::Secrets;
use crate::http::{FetchError, FetchRequest, HttpFetcher};
use crate::logger::{self, LogTag};
use crate::types::{AssetFacts, MarketSnapshot};

/// Lenient numeric extraction: providers ship numbers as strings routinely.
pub(crate) fn value_to_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn value_to_u64(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Shared handle for every upstream call.
#[derive(Clone)]
pub struct ApiClient {
    pub fetcher: Arc<HttpFetcher>,
    pub secrets: Arc<Secrets>,
}

impl ApiClient {
    pub fn new(fetcher: Arc<HttpFetcher>, secrets: Arc<Secrets>) -> Self {
        Self { fetcher, secrets }
    }

    /// Market snapshot with provider failover: first success wins.
    pub async fn fetch_market_snapshot(&self, mint: &str) -> Option<MarketSnapshot> {
        if let Some(snapshot) = dexscreener::fetch_by_mint(&self.fetcher, mint).await {
            return Some(snapshot);
        }
        if let Some(snapshot) =
            birdeye::fetch_market_stat(&self.fetcher, &self.secrets.birdeye_api_key, mint).await
        {
            return Some(snapshot);
        }
        gecko::fetch_market_data(&self.fetcher, mint).await
    }

    /// On-chain asset facts (authorities, metadata, holder concentration).
    pub async fn fetch_asset_facts(&self, mint: &str) -> Option<AssetFacts> {
        let mut facts = helius::fetch_asset(self, mint).await?;
        if facts.top10_holder_pct.is_none() {
            if let Some((pct, holders)) = helius::fetch_top10_via_rpc(self, mint).await {
                facts.top10_holder_pct = pct;
                if facts.holders_count.is_none() {
                    facts.holders_count = holders;
                }
            }
        }
        Some(facts)
    }

    /// External audit/risk label.
    pub async fn fetch_risk_label(&self, mint: &str) -> Option<String> {
        rugcheck::fetch_risk_label(&self.fetcher, &self.secrets.rugcheck_jwt, mint).await
    }

    /// Route-existence probe for the untradable clamp.
    pub async fn fetch_jupiter_has_route(&self, mint: &str) -> Option<bool> {
        jupiter::fetch_has_route(&self.fetcher, mint).await
    }

    /// Deep dive: how many tokens has this creator minted before?
    pub async fn fetch_creator_token_count(&self, creator: &str) -> Option<u64> {
        bitquery::fetch_creator_token_count(
            &self.fetcher,
            &self.secrets.bitquery_api_key,
            creator,
        )
        .await
    }

    /// Deep dive: follower count behind the project's Twitter link.
    pub async fn fetch_twitter_followers(&self, handle_or_url: &str) -> Option<u64> {
        twitter::fetch_follower_count(
            &self.fetcher,
            &self.secrets.x_bearer_token,
            handle_or_url,
        )
        .await
    }

    /// JSON-RPC POST with failover across the configured provider list.
    pub async fn rpc_post(&self, payload: Value) -> Result<Value, FetchError> {
        let providers = self.secrets.rpc_providers();
        let mut last_error = FetchError::Decode;
        for (name, url) in &providers {
            match self
                .fetcher
                .fetch_json(FetchRequest::post(name, url, payload.clone()))
                .await
            {
                Ok(value) => {
                    if !value.get("result").map(Value::is_null).unwrap_or(true) {
                        return Ok(value);
                    }
                    logger::debug(
                        LogTag::Http,
                        &format!("RPC provider {} returned no result, trying next", name),
                    );
                    last_error = FetchError::Decode;
                }
                Err(err) => {
                    logger::debug(
                        LogTag::Http,
                        &format!("RPC provider {} failed: {}", name, err),
                    );
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }

    /// Resolve a transaction signature to its parsed transaction.
    pub async fn fetch_transaction(&self, signature: &str) -> Option<Value> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getTransaction",
            "params": [
                signature,
                {"encoding": "jsonParsed", "maxSupportedTransactionVersion": 0}
            ]
        });
        self.rpc_post(payload)
            .await
            .ok()
            .and_then(|mut v| v.get_mut("result").map(Value::take))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_to_f64_accepts_strings_and_numbers() {
        assert_eq!(value_to_f64(Some(&json!(1.5))), Some(1.5));
        assert_eq!(value_to_f64(Some(&json!("2.25"))), Some(2.25));
        assert_eq!(value_to_f64(Some(&json!(" 3 "))), Some(3.0));
        assert_eq!(value_to_f64(Some(&json!(null))), None);
        assert_eq!(value_to_f64(Some(&json!("abc"))), None);
        assert_eq!(value_to_f64(None), None);
    }

    #[test]
    fn test_value_to_u64() {
        assert_eq!(value_to_u64(Some(&json!(7))), Some(7));
        assert_eq!(value_to_u64(Some(&json!("12"))), Some(12));
        assert_eq!(value_to_u64(Some(&json!(-3))), None);
    }
}
