//! PumpPortal subscription worker: a single socket covering new-token and
//! migration events, with reconnect + resubscribe on every failure.

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::admit_candidate;
use crate::logger::{self, LogTag};
use crate::services::Services;

const SOURCE: &str = "pumpportal";
const BASE_BACKOFF_SECS: f64 = 10.0;
const MAX_BACKOFF_SECS: f64 = 300.0;

pub async fn run(services: Services) {
    let mut shutdown = services.shutdown.clone();
    let url = services.config.discovery.pumpportal_url.clone();
    let mut consecutive_failures: u32 = 0;

    loop {
        if shutdown.is_triggered() {
            break;
        }

        services.sources.update(SOURCE, |s| {
            s.connected = false;
        });
        logger::log(LogTag::Discovery, "CONNECTING", &format!("PumpPortal {}", url));

        let session = tokio::select! {
            _ = shutdown.wait() => break,
            result = subscribe_and_listen(&services, &url) => result,
        };

        match session {
            Ok(()) => {
                // Normal close; reconnect promptly
                consecutive_failures = 0;
            }
            Err(e) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                let backoff = (BASE_BACKOFF_SECS
                    * 2f64.powi(consecutive_failures.saturating_sub(1).min(10) as i32))
                .min(MAX_BACKOFF_SECS)
                    + rand::thread_rng().gen_range(0.0..0.5);
                services.sources.update(SOURCE, |s| {
                    s.connected = false;
                    s.consecutive_failures = consecutive_failures;
                    s.current_backoff_secs = backoff;
                    s.last_error = e.clone();
                });
                logger::warning(
                    LogTag::Discovery,
                    &format!(
                        "PumpPortal disconnected: {}. Reconnecting in {:.1}s",
                        e, backoff
                    ),
                );
                tokio::select! {
                    _ = shutdown.wait() => break,
                    _ = tokio::time::sleep(Duration::from_secs_f64(backoff)) => {}
                }
            }
        }
    }
    logger::debug(LogTag::Discovery, "PumpPortal worker stopped");
}

async fn subscribe_and_listen(services: &Services, url: &str) -> Result<(), String> {
    let (ws_stream, _) = connect_async(url)
        .await
        .map_err(|e| format!("connect failed: {}", e))?;
    let (mut sender, mut receiver) = ws_stream.split();

    for method in ["subscribeNewToken", "subscribeMigration"] {
        let payload = json!({ "method": method }).to_string();
        sender
            .send(Message::Text(payload))
            .await
            .map_err(|e| format!("subscribe failed: {}", e))?;
    }

    services.sources.update(SOURCE, |s| {
        s.connected = true;
        s.consecutive_failures = 0;
        s.current_backoff_secs = 0.0;
        s.last_error.clear();
    });
    logger::log(
        LogTag::Discovery,
        "CONNECTED",
        "PumpPortal subscribed (new tokens + migrations)",
    );

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                services.sources.update(SOURCE, |s| {
                    s.messages_received += 1;
                    s.last_success = Some(chrono::Utc::now());
                });
                if let Some(candidate) = extract_candidate(&text) {
                    admit_candidate(services, SOURCE, &candidate).await;
                }
            }
            Ok(Message::Close(_)) => {
                return Err("closed by server".to_string());
            }
            Ok(_) => {}
            Err(e) => {
                return Err(format!("read error: {}", e));
            }
        }
    }
    Err("stream ended".to_string())
}

/// Accept any payload carrying a plausible mint under the usual field names.
fn extract_candidate(text: &str) -> Option<String> {
    let data: Value = serde_json::from_str(text).ok()?;
    for key in ["mint", "token", "tokenMint"] {
        if let Some(candidate) = data.get(key).and_then(|v| v.as_str()) {
            return Some(candidate.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_candidate_field_variants() {
        assert_eq!(
            extract_candidate(r#"{"mint": "abc"}"#),
            Some("abc".to_string())
        );
        assert_eq!(
            extract_candidate(r#"{"tokenMint": "xyz"}"#),
            Some("xyz".to_string())
        );
        assert_eq!(extract_candidate(r#"{"signature": "sig"}"#), None);
        assert_eq!(extract_candidate("not json"), None);
    }
}
