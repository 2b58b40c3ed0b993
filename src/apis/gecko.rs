//! GeckoTerminal client: tertiary market-data source and two discovery feeds.

use serde_json::Value;
use std::collections::HashMap;

use super::{value_to_f64, ApiClient};
use crate::constants::is_known_quote_mint;
use crate::http::{FetchRequest, HttpFetcher};
use crate::types::MarketSnapshot;

const PROVIDER: &str = "gecko";
const API_BASE: &str = "https://api.geckoterminal.com/api/v2";
const ACCEPT: &str = "application/json;version=20230302";

pub async fn fetch_market_data(fetcher: &HttpFetcher, mint: &str) -> Option<MarketSnapshot> {
    let url = format!("{}/networks/solana/tokens/{}", API_BASE, mint);
    let response = fetcher
        .fetch_json(FetchRequest::get(PROVIDER, &url).header("Accept", ACCEPT))
        .await
        .ok()?;

    let attributes = response.get("data")?.get("attributes")?;
    let snapshot = MarketSnapshot {
        price_usd: value_to_f64(attributes.get("price_usd")),
        liquidity_usd: value_to_f64(attributes.get("total_reserve_in_usd")),
        volume_24h_usd: value_to_f64(
            attributes.get("volume_usd").and_then(|v| v.get("h24")),
        ),
        market_cap_usd: value_to_f64(attributes.get("fdv_usd")),
        price_change_24h: None,
        pair_address: None,
        pair_created_at: None,
        source: Some(PROVIDER.to_string()),
    };

    if snapshot.price_usd.is_none()
        && snapshot.liquidity_usd.is_none()
        && snapshot.volume_24h_usd.is_none()
        && snapshot.market_cap_usd.is_none()
    {
        return None;
    }
    Some(snapshot)
}

/// Map `included` resources by id so pool relationships can be resolved.
fn index_included<'a>(
    response: &'a Value,
    kind: &str,
    attribute: &str,
) -> HashMap<&'a str, &'a str> {
    response
        .get("included")
        .and_then(|i| i.as_array())
        .map(|items| {
            items
                .iter()
                .filter(|item| item.get("type").and_then(|t| t.as_str()) == Some(kind))
                .filter_map(|item| {
                    let id = item.get("id")?.as_str()?;
                    let value = item.get("attributes")?.get(attribute)?.as_str()?;
                    Some((id, value))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn relationship_id<'a>(pool: &'a Value, name: &str) -> Option<&'a str> {
    pool.get("relationships")?
        .get(name)?
        .get("data")?
        .get("id")?
        .as_str()
}

fn collect_pool_mints(response: &Value, raydium_only: bool) -> Vec<String> {
    let tokens = index_included(response, "tokens", "address");
    let dexes = index_included(response, "dexes", "name");
    let networks = index_included(response, "networks", "identifier");

    let mut mints = Vec::new();
    let pools = match response.get("data").and_then(|d| d.as_array()) {
        Some(pools) => pools,
        None => return mints,
    };

    for pool in pools {
        if let Some(network_id) = relationship_id(pool, "network") {
            if let Some(identifier) = networks.get(network_id) {
                if !identifier.eq_ignore_ascii_case("solana") {
                    continue;
                }
            }
        }
        if raydium_only {
            if let Some(dex_id) = relationship_id(pool, "dex") {
                if let Some(name) = dexes.get(dex_id) {
                    if !name.to_lowercase().contains("raydium") {
                        continue;
                    }
                }
            }
        }
        for side in ["base_token", "quote_token"] {
            if let Some(token_id) = relationship_id(pool, side) {
                if let Some(address) = tokens.get(token_id).copied() {
                    if !is_known_quote_mint(address) && !mints.iter().any(|m| m == address) {
                        mints.push(address.to_string());
                    }
                }
            }
        }
    }
    mints
}

/// Discovery feed: newest pools on Solana, filtered to Raydium to cut noise.
pub async fn discover_new_pools(client: &ApiClient) -> Vec<String> {
    let url = format!(
        "{}/networks/solana/new_pools?include=base_token,quote_token,dex,network",
        API_BASE
    );
    match client
        .fetcher
        .fetch_json(FetchRequest::get(PROVIDER, &url).header("Accept", ACCEPT))
        .await
    {
        Ok(response) => collect_pool_mints(&response, true),
        Err(_) => Vec::new(),
    }
}

/// Discovery fallback: global pool search filtered to Solana/Raydium.
pub async fn discover_search_pools(client: &ApiClient, query: &str) -> Vec<String> {
    let url = format!(
        "{}/search/pools?query={}&include=base_token,quote_token,dex,network",
        API_BASE, query
    );
    match client
        .fetcher
        .fetch_json(FetchRequest::get(PROVIDER, &url).header("Accept", ACCEPT))
        .await
    {
        Ok(response) => collect_pool_mints(&response, true),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collect_pool_mints_resolves_relationships() {
        let response = json!({
            "data": [{
                "relationships": {
                    "base_token": {"data": {"id": "t1"}},
                    "quote_token": {"data": {"id": "t2"}},
                    "dex": {"data": {"id": "d1"}},
                    "network": {"data": {"id": "n1"}}
                }
            }],
            "included": [
                {"type": "tokens", "id": "t1",
                 "attributes": {"address": "NewMint11111111111111111111111111111111111"}},
                {"type": "tokens", "id": "t2",
                 "attributes": {"address": crate::constants::SOL_MINT}},
                {"type": "dexes", "id": "d1", "attributes": {"name": "Raydium"}},
                {"type": "networks", "id": "n1", "attributes": {"identifier": "solana"}}
            ]
        });
        let mints = collect_pool_mints(&response, true);
        assert_eq!(
            mints,
            vec!["NewMint11111111111111111111111111111111111".to_string()]
        );
    }

    #[test]
    fn test_collect_pool_mints_skips_other_dexes() {
        let response = json!({
            "data": [{
                "relationships": {
                    "base_token": {"data": {"id": "t1"}},
                    "dex": {"data": {"id": "d1"}}
                }
            }],
            "included": [
                {"type": "tokens", "id": "t1",
                 "attributes": {"address": "NewMint11111111111111111111111111111111111"}},
                {"type": "dexes", "id": "d1", "attributes": {"name": "Orca"}}
            ]
        });
        assert!(collect_pool_mints(&response, true).is_empty());
    }
}
