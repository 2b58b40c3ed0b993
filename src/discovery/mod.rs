//! Ingestion: live subscription workers, periodic pollers, and the shared
//! admission gate in front of the discovery queue.

pub mod aggregator;
pub mod firehose;
pub mod pumpportal;

use tokio::task::JoinHandle;

use crate::constants::{is_known_quote_mint, is_valid_address};
use crate::logger::{self, LogTag};
use crate::services::Services;

/// Heuristic cleanup for occasionally malformed mints from some sources:
/// strips known platform-name suffixes and validates the address format.
pub fn sanitize_mint(raw: &str) -> Option<String> {
    let candidate = raw.trim();
    if candidate.is_empty() {
        return None;
    }
    // Some feeds append the launch platform's name to the address
    for suffix in ["pump", "bonk"] {
        if let Some(stripped) = candidate.strip_suffix(suffix) {
            if is_valid_address(stripped) {
                return Some(stripped.to_string());
            }
        }
    }
    if is_valid_address(candidate) {
        Some(candidate.to_string())
    } else {
        None
    }
}

/// Admission gate for every candidate from every source.
///
/// Sanitize, drop quote assets, dedupe against the bounded recent-set, pass
/// the rate-limited admission bucket, and only then consult the store.
/// Returns true when a genuinely new asset entered the queue.
pub async fn admit_candidate(services: &Services, source: &str, raw: &str) -> bool {
    let mint = match sanitize_mint(raw) {
        Some(mint) => mint,
        None => return false,
    };
    if is_known_quote_mint(&mint) {
        return false;
    }
    if !services.recent_mints.insert(&mint) {
        return false;
    }

    // Bursty sources wait here instead of overwhelming the intake worker
    services.limits.acquire("discovery").await;

    match services.db.insert_discovered(&mint) {
        Ok(true) => {
            logger::log(
                LogTag::Discovery,
                "ADMITTED",
                &format!("{} via {}", mint, source),
            );
            true
        }
        Ok(false) => false,
        Err(e) => {
            logger::error(
                LogTag::Discovery,
                &format!("Failed to persist discovery {}: {}", mint, e),
            );
            false
        }
    }
}

/// Spawn every configured ingestion source.
pub fn spawn_all(services: &Services) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    handles.push(tokio::spawn(pumpportal::run(services.clone())));
    handles.push(tokio::spawn(aggregator::run(services.clone())));

    for (name, ws_url, is_primary) in firehose_providers(services) {
        handles.push(tokio::spawn(firehose::run(
            services.clone(),
            name,
            ws_url,
            is_primary,
        )));
    }

    handles
}

/// Configured logsSubscribe endpoints: Helius primary, Syndica/Alchemy backups.
fn firehose_providers(services: &Services) -> Vec<(String, String, bool)> {
    let mut providers = Vec::new();
    if let Some(url) = services.secrets.helius_ws_url() {
        providers.push(("helius".to_string(), url, true));
    }
    if services.config.discovery.enable_backup_streams {
        if !services.secrets.syndica_ws_url.is_empty() {
            providers.push((
                "syndica".to_string(),
                services.secrets.syndica_ws_url.clone(),
                false,
            ));
        }
        if !services.secrets.alchemy_ws_url.is_empty() {
            providers.push((
                "alchemy".to_string(),
                services.secrets.alchemy_ws_url.clone(),
                false,
            ));
        }
    }
    if providers.is_empty() {
        logger::warning(
            LogTag::Firehose,
            "No WS providers configured - firehose discovery disabled",
        );
    }
    providers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SOL_MINT;

    const VALID: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

    #[test]
    fn test_sanitize_accepts_valid_address() {
        assert_eq!(sanitize_mint(VALID), Some(VALID.to_string()));
        assert_eq!(sanitize_mint(&format!("  {}  ", VALID)), Some(VALID.to_string()));
    }

    #[test]
    fn test_sanitize_strips_platform_suffix() {
        let suffixed = format!("{}pump", VALID);
        assert_eq!(sanitize_mint(&suffixed), Some(VALID.to_string()));
        let suffixed = format!("{}bonk", VALID);
        assert_eq!(sanitize_mint(&suffixed), Some(VALID.to_string()));
    }

    #[test]
    fn test_sanitize_rejects_garbage() {
        assert_eq!(sanitize_mint(""), None);
        assert_eq!(sanitize_mint("not-an-address"), None);
        assert_eq!(sanitize_mint("pump"), None);
    }

    #[tokio::test]
    async fn test_admission_dedupes_and_persists() {
        let services = Services::for_tests();
        assert!(admit_candidate(&services, "test", VALID).await);
        // Second sighting: recent-set rejects before the store is touched
        assert!(!admit_candidate(&services, "test", VALID).await);
        // Quote assets never become discoveries
        assert!(!admit_candidate(&services, "test", SOL_MINT).await);
        assert!(services.db.asset_exists(VALID).unwrap());
    }
}
