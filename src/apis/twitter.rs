//! Twitter/X client: follower stats for the social bonus, bearer-token gated.

use regex::Regex;

use super::value_to_u64;
use crate::http::{FetchRequest, HttpFetcher};

const PROVIDER: &str = "twitter";

fn extract_handle(handle_or_url: &str) -> Option<String> {
    let trimmed = handle_or_url.trim();
    if trimmed.is_empty() {
        return None;
    }
    let re = Regex::new(r"(?:twitter\.com|x\.com)/(?:#!/)?([^/?#]+)").ok()?;
    let handle = match re.captures(trimmed) {
        Some(caps) => caps.get(1)?.as_str(),
        None => trimmed,
    };
    let handle = handle.trim_start_matches('@');
    if handle.is_empty() {
        None
    } else {
        Some(handle.to_string())
    }
}

pub async fn fetch_follower_count(
    fetcher: &HttpFetcher,
    bearer_token: &str,
    handle_or_url: &str,
) -> Option<u64> {
    if bearer_token.is_empty() {
        return None;
    }
    let handle = extract_handle(handle_or_url)?;

    let url = format!(
        "https://api.twitter.com/2/users/by/username/{}?user.fields=public_metrics",
        handle
    );
    let response = fetcher
        .fetch_json(
            FetchRequest::get(PROVIDER, &url)
                .header("Authorization", format!("Bearer {}", bearer_token)),
        )
        .await
        .ok()?;

    value_to_u64(
        response
            .get("data")
            .and_then(|d| d.get("public_metrics"))
            .and_then(|m| m.get("followers_count")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_handle_variants() {
        assert_eq!(
            extract_handle("https://twitter.com/someproject?ref=x"),
            Some("someproject".to_string())
        );
        assert_eq!(
            extract_handle("https://x.com/someproject/status/1"),
            Some("someproject".to_string())
        );
        assert_eq!(
            extract_handle("@someproject"),
            Some("someproject".to_string())
        );
        assert_eq!(extract_handle(""), None);
        assert_eq!(extract_handle("@"), None);
    }
}
