//! Bitquery client: creator dossier (prior token count), deep-dive only.

use serde_json::json;

use crate::http::{FetchRequest, HttpFetcher};

const PROVIDER: &str = "bitquery";
const GRAPHQL_URL: &str = "https://graphql.bitquery.io/";

pub async fn fetch_creator_token_count(
    fetcher: &HttpFetcher,
    api_key: &str,
    creator: &str,
) -> Option<u64> {
    if api_key.is_empty() {
        return None;
    }

    let payload = json!({
        "query": "query($creator: String!) {
            solana(network: solana) {
                mintAccounts(
                    where: { mintAccount: { mintAuthority: { is: $creator } } }
                ) {
                    count
                }
            }
        }",
        "variables": {"creator": creator}
    });
    let response = fetcher
        .fetch_json(
            FetchRequest::post(PROVIDER, GRAPHQL_URL, payload)
                .header("X-API-KEY", api_key)
                .header("content-type", "application/json"),
        )
        .await
        .ok()?;

    response
        .get("data")?
        .get("solana")?
        .get("mintAccounts")?
        .as_array()?
        .first()?
        .get("count")?
        .as_u64()
}
