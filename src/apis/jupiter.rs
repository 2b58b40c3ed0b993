//! Jupiter client: route-existence probe.
//!
//! A token the aggregator cannot route to USDC is effectively untradable;
//! past a grace window that clamps its liquidity/volume to zero upstream.

use crate::constants::{is_known_quote_mint, USDC_MINT};
use crate::http::{FetchRequest, HttpFetcher};

const PROVIDER: &str = "jupiter";

/// Returns Some(true/false) when the probe answered, None when unavailable.
pub async fn fetch_has_route(fetcher: &HttpFetcher, mint: &str) -> Option<bool> {
    if is_known_quote_mint(mint) {
        return Some(true);
    }

    let url = format!(
        "https://quote-api.jup.ag/v6/quote?inputMint={}&outputMint={}&amount=1000000&slippageBps=300&swapMode=ExactIn",
        mint, USDC_MINT
    );
    let response = fetcher
        .fetch_json(FetchRequest::get(PROVIDER, &url).header("accept", "application/json"))
        .await
        .ok()?;

    if response.get("error").is_some() {
        return Some(false);
    }
    let has_route = response
        .get("routePlan")
        .and_then(|r| r.as_array())
        .map(|routes| !routes.is_empty())
        .or_else(|| response.get("data").map(|d| !d.is_null()));
    has_route
}
