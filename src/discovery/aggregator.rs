//! Aggregator poller: periodically sweeps several independent discovery
//! feeds, merges the address sets, and admits a bounded number per cycle.

use std::collections::BTreeSet;
use std::time::Duration;

use super::admit_candidate;
use crate::apis::{dexscreener, gecko};
use crate::logger::{self, LogTag};
use crate::services::Services;

const SOURCE: &str = "aggregator";

pub async fn run(services: Services) {
    let mut shutdown = services.shutdown.clone();
    let interval = Duration::from_secs(services.config.discovery.aggregator_poll_secs.max(5));
    logger::log(LogTag::Aggregator, "START", "Aggregator poller running");

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = tokio::time::sleep(interval) => {
                poll_once(&services).await;
            }
        }
    }
    logger::debug(LogTag::Aggregator, "Aggregator poller stopped");
}

/// One poll cycle. Every feed runs inside its own error boundary (a failed
/// feed just contributes nothing), so one flaky upstream never blocks the
/// others.
pub async fn poll_once(services: &Services) {
    let api = &services.api;
    let (gecko_new, gecko_search, ds_new, ds_search) = tokio::join!(
        gecko::discover_new_pools(api),
        gecko::discover_search_pools(api, "solana"),
        dexscreener::discover_new_pairs(api),
        dexscreener::discover_search_recent(api),
    );
    let feeds: Vec<(&str, Vec<String>)> = vec![
        ("gecko new_pools", gecko_new),
        ("gecko search", gecko_search),
        ("dexscreener new", ds_new),
        ("dexscreener search", ds_search),
    ];

    let mut merged: BTreeSet<String> = BTreeSet::new();
    for (name, mints) in feeds {
        if mints.is_empty() {
            logger::debug(
                LogTag::Aggregator,
                &format!("{} returned no candidates this cycle", name),
            );
        } else {
            logger::debug(
                LogTag::Aggregator,
                &format!("{} found {} candidates", name, mints.len()),
            );
            merged.extend(mints);
        }
    }

    if merged.is_empty() {
        return;
    }

    let total = merged.len();
    let cap = services.config.discovery.max_new_per_cycle;
    let candidates: Vec<String> = if cap > 0 && total > cap {
        logger::log(
            LogTag::Aggregator,
            "CAPPED",
            &format!("{} candidates found, admitting {} this cycle", total, cap),
        );
        merged.into_iter().take(cap).collect()
    } else {
        merged.into_iter().collect()
    };

    let mut admitted = 0usize;
    for mint in &candidates {
        if services.shutdown.is_triggered() {
            break;
        }
        if admit_candidate(services, SOURCE, mint).await {
            admitted += 1;
        }
    }

    services.sources.update(SOURCE, |s| {
        s.connected = true;
        s.messages_received += candidates.len() as u64;
        s.last_success = Some(chrono::Utc::now());
    });

    if admitted > 0 {
        logger::log(
            LogTag::Aggregator,
            "CYCLE",
            &format!("{} unique candidates, {} newly admitted", total, admitted),
        );
    }
}
