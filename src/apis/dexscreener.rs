//! DexScreener client: primary market-data source plus two discovery feeds.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use super::{value_to_f64, ApiClient};
use crate::constants::is_known_quote_mint;
use crate::http::{FetchRequest, HttpFetcher};
use crate::types::MarketSnapshot;

const PROVIDER: &str = "dexscreener";

fn pair_created_at(pair: &Value) -> Option<DateTime<Utc>> {
    let millis = pair
        .get("pairCreatedAt")
        .and_then(|v| v.as_i64())
        .or_else(|| pair.get("createdAt").and_then(|v| v.as_i64()))?;
    Utc.timestamp_millis_opt(millis).single()
}

fn pair_liquidity(pair: &Value) -> f64 {
    value_to_f64(pair.get("liquidity").and_then(|l| l.get("usd"))).unwrap_or(0.0)
}

/// Reduce one DexScreener pair object to a MarketSnapshot
fn normalize_pair(pair: &Value) -> MarketSnapshot {
    MarketSnapshot {
        price_usd: value_to_f64(pair.get("priceUsd")),
        liquidity_usd: value_to_f64(pair.get("liquidity").and_then(|l| l.get("usd"))),
        volume_24h_usd: value_to_f64(pair.get("volume").and_then(|v| v.get("h24"))),
        market_cap_usd: value_to_f64(pair.get("fdv"))
            .or_else(|| value_to_f64(pair.get("marketCap"))),
        price_change_24h: value_to_f64(pair.get("priceChange").and_then(|p| p.get("h24"))),
        pair_address: pair
            .get("pairAddress")
            .and_then(|v| v.as_str())
            .map(String::from),
        pair_created_at: pair_created_at(pair),
        source: Some(PROVIDER.to_string()),
    }
}

/// Market snapshot for a mint: picks the Solana pair with the most liquidity.
pub async fn fetch_by_mint(fetcher: &HttpFetcher, mint: &str) -> Option<MarketSnapshot> {
    let url = format!("https://api.dexscreener.com/latest/dex/tokens/{}", mint);
    let response = fetcher
        .fetch_json(FetchRequest::get(PROVIDER, &url).header("Accept", "application/json"))
        .await
        .ok()?;

    let pairs = response.get("pairs")?.as_array()?;
    let solana_pairs: Vec<&Value> = pairs
        .iter()
        .filter(|p| {
            matches!(
                p.get("chainId").and_then(|c| c.as_str()),
                Some("solana") | Some("sol")
            )
        })
        .collect();
    let candidates = if solana_pairs.is_empty() {
        pairs.iter().collect()
    } else {
        solana_pairs
    };

    let best = candidates.into_iter().max_by(|a, b| {
        pair_liquidity(a)
            .partial_cmp(&pair_liquidity(b))
            .unwrap_or(std::cmp::Ordering::Equal)
    })?;
    Some(normalize_pair(best))
}

fn collect_pair_mints(pairs: &[Value], out: &mut Vec<String>) {
    for pair in pairs {
        for side in ["baseToken", "quoteToken"] {
            if let Some(address) = pair
                .get(side)
                .and_then(|t| t.get("address"))
                .and_then(|a| a.as_str())
            {
                if !is_known_quote_mint(address) && !out.iter().any(|m| m == address) {
                    out.push(address.to_string());
                }
            }
        }
    }
}

/// Discovery feed: newest Solana pairs.
pub async fn discover_new_pairs(client: &ApiClient) -> Vec<String> {
    let url = "https://api.dexscreener.com/latest/dex/pairs/solana/new";
    let response = match client
        .fetcher
        .fetch_json(
            FetchRequest::get(PROVIDER, url)
                .header("Accept", "application/json")
                .header("Cache-Control", "no-cache"),
        )
        .await
    {
        Ok(response) => response,
        Err(_) => return Vec::new(),
    };

    let mut mints = Vec::new();
    if let Some(pairs) = response.get("pairs").and_then(|p| p.as_array()) {
        collect_pair_mints(pairs, &mut mints);
    }
    mints
}

/// Discovery fallback: search results filtered to pairs created in the last
/// ten minutes, since the search feed mixes in long-established pools.
pub async fn discover_search_recent(client: &ApiClient) -> Vec<String> {
    let url = "https://api.dexscreener.com/latest/dex/search?q=solana";
    let response = match client
        .fetcher
        .fetch_json(FetchRequest::get(PROVIDER, url).header("Accept", "application/json"))
        .await
    {
        Ok(response) => response,
        Err(_) => return Vec::new(),
    };

    let now_ms = Utc::now().timestamp_millis();
    let fresh: Vec<Value> = response
        .get("pairs")
        .and_then(|p| p.as_array())
        .map(|pairs| {
            pairs
                .iter()
                .filter(|p| {
                    p.get("chainId").and_then(|c| c.as_str()) == Some("solana")
                        && p.get("pairCreatedAt")
                            .and_then(|v| v.as_i64())
                            .map(|created| (now_ms - created) <= 10 * 60 * 1000)
                            .unwrap_or(false)
                })
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let mut mints = Vec::new();
    collect_pair_mints(&fresh, &mut mints);
    mints
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_pair_handles_string_prices() {
        let pair = json!({
            "pairAddress": "PAIR123",
            "priceUsd": "0.0015",
            "liquidity": {"usd": 5000.5},
            "volume": {"h24": 1234.0},
            "priceChange": {"h24": -12.5},
            "fdv": 90000,
            "pairCreatedAt": 1700000000000i64
        });
        let snapshot = normalize_pair(&pair);
        assert_eq!(snapshot.price_usd, Some(0.0015));
        assert_eq!(snapshot.liquidity_usd, Some(5000.5));
        assert_eq!(snapshot.volume_24h_usd, Some(1234.0));
        assert_eq!(snapshot.price_change_24h, Some(-12.5));
        assert_eq!(snapshot.market_cap_usd, Some(90000.0));
        assert_eq!(snapshot.pair_address.as_deref(), Some("PAIR123"));
        assert!(snapshot.pair_created_at.is_some());
    }

    #[test]
    fn test_collect_pair_mints_filters_quotes() {
        let pairs = vec![json!({
            "baseToken": {"address": "BaseMint1111111111111111111111111111111111"},
            "quoteToken": {"address": crate::constants::SOL_MINT}
        })];
        let mut mints = Vec::new();
        collect_pair_mints(&pairs, &mut mints);
        assert_eq!(
            mints,
            vec!["BaseMint1111111111111111111111111111111111".to_string()]
        );
    }
}
