//! Helius DAS + RPC client: asset facts, holder concentration, supply.

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use super::{value_to_u64, ApiClient};
use crate::types::AssetFacts;

/// `getAsset` via the DAS API: metadata, authorities, creator, creation time.
pub async fn fetch_asset(client: &ApiClient, mint: &str) -> Option<AssetFacts> {
    let payload = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "getAsset",
        "params": {"id": mint}
    });
    let response = client.rpc_post(payload).await.ok()?;
    let result = response.get("result")?;

    let mut facts = AssetFacts::default();

    if let Some(content) = result.get("content") {
        if let Some(metadata) = content.get("metadata") {
            facts.name = metadata
                .get("name")
                .and_then(|v| v.as_str())
                .map(String::from);
            facts.symbol = metadata
                .get("symbol")
                .and_then(|v| v.as_str())
                .map(String::from);
        }
        if let Some(links) = content.get("links") {
            for key in ["external_url", "twitter", "telegram"] {
                if let Some(url) = links.get(key).and_then(|v| v.as_str()) {
                    facts.socials.insert(key.to_string(), url.to_string());
                }
            }
        }
    }

    if let Some(created) = result.get("created_at").and_then(|v| v.as_i64()) {
        facts.created_at = Utc.timestamp_opt(created, 0).single();
    }

    if let Some(mint_info) = result.get("mint_info") {
        facts.mint_authority = mint_info
            .get("mint_authority")
            .and_then(|v| v.as_str())
            .map(String::from);
        facts.freeze_authority = mint_info
            .get("freeze_authority")
            .and_then(|v| v.as_str())
            .map(String::from);
    }

    facts.creator_address = result
        .get("creators")
        .and_then(|c| c.as_array())
        .and_then(|creators| {
            creators
                .iter()
                .find(|c| c.get("verified").and_then(|v| v.as_bool()).unwrap_or(false))
                .and_then(|c| c.get("address"))
                .and_then(|a| a.as_str())
                .map(String::from)
        });

    // Helius sometimes inlines holder data on token_info
    if let Some(token_info) = result.get("token_info") {
        if let (Some(supply), Some(holders)) = (
            value_to_u64(token_info.get("supply")),
            token_info.get("holders").and_then(|h| h.as_array()),
        ) {
            facts.holders_count = Some(holders.len() as u64);
            if supply > 0 && !holders.is_empty() {
                let top10: u64 = holders
                    .iter()
                    .take(10)
                    .filter_map(|h| value_to_u64(h.get("amount")))
                    .sum();
                facts.top10_holder_pct =
                    Some(((top10 as f64 / supply as f64) * 1000.0).round() / 10.0);
            }
        }
    }

    Some(facts)
}

/// Fallback holder concentration via direct RPC:
/// getTokenLargestAccounts + getTokenSupply.
pub async fn fetch_top10_via_rpc(
    client: &ApiClient,
    mint: &str,
) -> Option<(Option<f64>, Option<u64>)> {
    let accounts_payload = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "getTokenLargestAccounts",
        "params": [mint, {"commitment": "confirmed"}]
    });
    let accounts = client.rpc_post(accounts_payload).await.ok()?;
    let holders: Vec<Value> = accounts
        .get("result")?
        .get("value")?
        .as_array()?
        .to_vec();
    if holders.is_empty() {
        return None;
    }

    let holders_count = holders
        .iter()
        .filter(|h| {
            h.get("uiAmount")
                .and_then(|v| v.as_f64())
                .map(|amount| amount > 0.0)
                .unwrap_or(false)
        })
        .count() as u64;

    let supply_payload = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "getTokenSupply",
        "params": [mint]
    });
    let supply = client
        .rpc_post(supply_payload)
        .await
        .ok()
        .and_then(|response| {
            value_to_u64(
                response
                    .get("result")
                    .and_then(|r| r.get("value"))
                    .and_then(|v| v.get("amount")),
            )
        })
        .unwrap_or(0);

    if supply == 0 {
        return Some((None, Some(holders_count)));
    }

    let top10: u64 = holders
        .iter()
        .take(10)
        .filter_map(|h| value_to_u64(h.get("amount")))
        .sum();
    let pct = ((top10 as f64 / supply as f64) * 10_000.0).round() / 100.0;
    Some((Some(pct), Some(holders_count)))
}
