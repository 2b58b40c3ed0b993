//! RugCheck client: external audit/risk label.

use crate::http::{FetchRequest, HttpFetcher};

const PROVIDER: &str = "rugcheck";

pub async fn fetch_risk_label(fetcher: &HttpFetcher, jwt: &str, mint: &str) -> Option<String> {
    let url = format!("https://api.rugcheck.xyz/v1/tokens/{}", mint);
    let mut request = FetchRequest::get(PROVIDER, &url).header("accept", "application/json");
    if !jwt.is_empty() {
        request = request.header("Authorization", format!("Bearer {}", jwt));
    }
    let response = fetcher.fetch_json(request).await.ok()?;

    // The label moved between fields across API revisions; accept any of them
    for path in [
        response.get("summary").and_then(|s| s.get("risk")),
        response.get("summary").and_then(|s| s.get("label")),
        response.get("risk"),
        response.get("riskLevel"),
        response.get("label"),
    ]
    .into_iter()
    .flatten()
    {
        if let Some(label) = path.as_str() {
            if !label.is_empty() {
                return Some(label.to_string());
            }
        }
    }
    None
}
