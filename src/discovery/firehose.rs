//! Logs firehose: logsSubscribe streams over the configured WS providers.
//!
//! Each subscriber watches the target DEX programs for pool-creation log
//! lines, resolves the transaction signature through the failover RPC pool,
//! and feeds the extracted mints into the admission gate. Backup providers
//! stand down while the primary is healthy.

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::admit_candidate;
use crate::constants::{is_known_quote_mint, POOL_BIRTH_KEYWORDS};
use crate::logger::{self, LogTag};
use crate::services::Services;

const BASE_BACKOFF_SECS: f64 = 10.0;
const MAX_BACKOFF_SECS: f64 = 300.0;
/// Max candidate mints taken from one transaction
const MAX_MINTS_PER_TX: usize = 4;

fn source_key(provider: &str) -> String {
    format!("firehose-{}", provider)
}

pub async fn run(services: Services, provider: String, ws_url: String, is_primary: bool) {
    let mut shutdown = services.shutdown.clone();
    let key = source_key(&provider);
    let mut consecutive_failures: u32 = 0;

    loop {
        if shutdown.is_triggered() {
            break;
        }

        logger::log(
            LogTag::Firehose,
            "CONNECTING",
            &format!("{} ({})", provider, if is_primary { "primary" } else { "backup" }),
        );

        let session = tokio::select! {
            _ = shutdown.wait() => break,
            result = subscribe_and_listen(&services, &provider, &ws_url, is_primary) => result,
        };

        match session {
            Ok(()) => {
                consecutive_failures = 0;
            }
            Err(e) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                let backoff = (BASE_BACKOFF_SECS
                    * 2f64.powi(consecutive_failures.saturating_sub(1).min(10) as i32))
                .min(MAX_BACKOFF_SECS)
                    + rand::thread_rng().gen_range(0.0..0.5);
                services.sources.update(&key, |s| {
                    s.connected = false;
                    s.consecutive_failures = consecutive_failures;
                    s.current_backoff_secs = backoff;
                    s.last_error = e.clone();
                });
                logger::error(
                    LogTag::Firehose,
                    &format!(
                        "{}: connection failed after {} consecutive errors: {}. Retrying in {:.0}s",
                        provider, consecutive_failures, e, backoff
                    ),
                );
                tokio::select! {
                    _ = shutdown.wait() => break,
                    _ = tokio::time::sleep(Duration::from_secs_f64(backoff)) => {}
                }
            }
        }
    }
    logger::debug(LogTag::Firehose, &format!("{} subscriber stopped", provider));
}

async fn subscribe_and_listen(
    services: &Services,
    provider: &str,
    ws_url: &str,
    is_primary: bool,
) -> Result<(), String> {
    let key = source_key(provider);
    let (ws_stream, _) = connect_async(ws_url)
        .await
        .map_err(|e| format!("connect failed: {}", e))?;
    let (mut sender, mut receiver) = ws_stream.split();

    let programs = services.config.discovery.dex_program_ids.clone();
    if programs.is_empty() {
        return Err("no DEX programs configured".to_string());
    }
    for program in &programs {
        let subscription = json!({
            "jsonrpc": "2.0",
            "id": rand::thread_rng().gen_range(1000..999999),
            "method": "logsSubscribe",
            "params": [
                {"mentions": [program]},
                {"commitment": "processed"}
            ]
        });
        sender
            .send(Message::Text(subscription.to_string()))
            .await
            .map_err(|e| format!("subscribe failed: {}", e))?;
    }

    services.sources.update(&key, |s| {
        s.connected = true;
        s.consecutive_failures = 0;
        s.current_backoff_secs = 0.0;
        s.last_error.clear();
        s.last_success = Some(Utc::now());
    });
    logger::log(
        LogTag::Firehose,
        "CONNECTED",
        &format!("{}: subscribed to {} programs", provider, programs.len()),
    );

    loop {
        // Idle streams are normal: keep the connection, just note liveness
        let message =
            match tokio::time::timeout(Duration::from_secs(90), receiver.next()).await {
                Ok(Some(message)) => message,
                Ok(None) => return Err("stream ended".to_string()),
                Err(_) => {
                    logger::debug(LogTag::Firehose, &format!("{}: idle, connection alive", provider));
                    continue;
                }
            };

        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => return Err("closed by server".to_string()),
            Ok(_) => continue,
            Err(e) => return Err(format!("read error: {}", e)),
        };

        let parsed: Value = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(_) => continue,
        };
        if parsed.get("method").and_then(|m| m.as_str()) != Some("logsNotification") {
            continue;
        }

        let value = match parsed.pointer("/params/result/value") {
            Some(value) => value,
            None => continue,
        };
        let signature = match value.get("signature").and_then(|s| s.as_str()) {
            Some(signature) => signature.to_string(),
            None => continue,
        };

        services.sources.update(&key, |s| {
            s.messages_received += 1;
            s.last_success = Some(Utc::now());
        });

        // Backups only do the expensive resolution when the primary is down
        if !is_primary && primary_is_healthy(services) {
            continue;
        }

        if services.recent_signatures.contains(&signature) {
            continue;
        }

        let logs_text = value
            .get("logs")
            .and_then(|l| l.as_array())
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(|l| l.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
                    .to_lowercase()
            })
            .unwrap_or_default();
        if !POOL_BIRTH_KEYWORDS.iter().any(|k| logs_text.contains(k)) {
            continue;
        }

        let tx = match services.api.fetch_transaction(&signature).await {
            Some(tx) => tx,
            None => continue,
        };
        services.recent_signatures.insert(&signature);

        let block_time = tx.get("blockTime").and_then(|b| b.as_i64());
        if let Some(block_time) = block_time {
            // Stale replays are not discoveries
            if Utc::now().timestamp() - block_time > services.config.discovery.max_tx_age_secs {
                continue;
            }
        }

        for mint in extract_mints_from_tx(&tx) {
            if let Some(block_time) = block_time {
                services.pool_births.insert(mint.clone(), block_time);
            }
            logger::debug(
                LogTag::Firehose,
                &format!("{}: candidate {} from signature {}", provider, mint, signature),
            );
            admit_candidate(services, &key, &mint).await;
        }
    }
}

/// Best-effort extraction of candidate mints from a parsed transaction.
fn extract_mints_from_tx(tx: &Value) -> Vec<String> {
    let mut mints: Vec<String> = Vec::new();
    let mut push = |mint: &str| {
        if !is_known_quote_mint(mint) && !mints.iter().any(|m| m == mint) {
            mints.push(mint.to_string());
        }
    };

    if let Some(meta) = tx.get("meta") {
        for key in ["postTokenBalances", "preTokenBalances"] {
            if let Some(balances) = meta.get(key).and_then(|b| b.as_array()) {
                for balance in balances {
                    if let Some(mint) = balance.get("mint").and_then(|m| m.as_str()) {
                        push(mint);
                    }
                }
            }
        }
    }

    if let Some(instructions) = tx
        .pointer("/transaction/message/instructions")
        .and_then(|i| i.as_array())
    {
        for instruction in instructions {
            if let Some(mint) = instruction
                .pointer("/parsed/info/mint")
                .and_then(|m| m.as_str())
            {
                push(mint);
            }
        }
    }

    mints.truncate(MAX_MINTS_PER_TX);
    mints
}

/// The primary stream counts as healthy when connected with a success in the
/// last two minutes.
fn primary_is_healthy(services: &Services) -> bool {
    services
        .sources
        .snapshot()
        .iter()
        .filter(|(name, _)| name == "firehose-helius")
        .any(|(_, state)| {
            state.connected
                && state
                    .last_success
                    .map(|at| (Utc::now() - at).num_seconds() < 120)
                    .unwrap_or(false)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SOL_MINT;

    #[test]
    fn test_extract_mints_filters_quotes_and_dedupes() {
        let tx = json!({
            "meta": {
                "postTokenBalances": [
                    {"mint": "Mint1"},
                    {"mint": SOL_MINT},
                    {"mint": "Mint1"}
                ],
                "preTokenBalances": [
                    {"mint": "Mint2"}
                ]
            },
            "transaction": {
                "message": {
                    "instructions": [
                        {"parsed": {"info": {"mint": "Mint3"}}},
                        {"programId": "xyz"}
                    ]
                }
            }
        });
        let mints = extract_mints_from_tx(&tx);
        assert_eq!(mints, vec!["Mint1", "Mint2", "Mint3"]);
    }

    #[test]
    fn test_extract_mints_caps_per_tx() {
        let balances: Vec<Value> = (0..10)
            .map(|i| json!({"mint": format!("Mint{}", i)}))
            .collect();
        let tx = json!({"meta": {"postTokenBalances": balances}});
        assert_eq!(extract_mints_from_tx(&tx).len(), MAX_MINTS_PER_TX);
    }
}
