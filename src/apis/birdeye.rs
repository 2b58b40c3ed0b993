//! BirdEye client: secondary market-data source, API-key gated.

use super::value_to_f64;
use crate::http::{FetchRequest, HttpFetcher};
use crate::types::MarketSnapshot;

const PROVIDER: &str = "birdeye";

pub async fn fetch_market_stat(
    fetcher: &HttpFetcher,
    api_key: &str,
    mint: &str,
) -> Option<MarketSnapshot> {
    if api_key.is_empty() {
        return None;
    }

    let url = format!(
        "https://public-api.birdeye.so/public/token/market-data?address={}&chain=solana",
        mint
    );
    let response = fetcher
        .fetch_json(
            FetchRequest::get(PROVIDER, &url)
                .header("accept", "application/json")
                .header("X-API-KEY", api_key),
        )
        .await
        .ok()?;

    let data = response.get("data")?;
    if !data.is_object() {
        return None;
    }

    let snapshot = MarketSnapshot {
        price_usd: value_to_f64(data.get("price")),
        liquidity_usd: value_to_f64(data.get("liquidity")),
        volume_24h_usd: value_to_f64(data.get("v24h")),
        market_cap_usd: value_to_f64(data.get("mc")),
        price_change_24h: value_to_f64(data.get("priceChange24h")),
        pair_address: None,
        pair_created_at: None,
        source: Some(PROVIDER.to_string()),
    };

    // A payload with no usable metric is a miss, not a snapshot
    if snapshot.price_usd.is_none()
        && snapshot.liquidity_usd.is_none()
        && snapshot.volume_24h_usd.is_none()
        && snapshot.market_cap_usd.is_none()
    {
        return None;
    }
    Some(snapshot)
}
