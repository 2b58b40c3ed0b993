//! Read-only diagnostics: provider health, ingestion source states, queue
//! depth and bucket distribution. Consumed by the chat front-end's /diag
//! surface and logged periodically for operators.

use std::time::Duration;

use crate::health::CircuitState;
use crate::logger::{self, LogTag};
use crate::services::Services;

/// One assembled diagnostics view.
#[derive(Debug, Clone)]
pub struct DiagnosticsSnapshot {
    pub providers: Vec<ProviderLine>,
    pub sources: Vec<SourceLine>,
    pub queue_depth: Vec<(String, i64)>,
    pub bucket_distribution: Vec<(String, i64)>,
    pub lite_mode: bool,
}

#[derive(Debug, Clone)]
pub struct ProviderLine {
    pub name: String,
    pub success: u64,
    pub failure: u64,
    pub circuit_open: bool,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Clone)]
pub struct SourceLine {
    pub name: String,
    pub connected: bool,
    pub messages: u64,
    pub consecutive_failures: u32,
    pub last_error: String,
}

pub fn snapshot(services: &Services) -> DiagnosticsSnapshot {
    let providers = services
        .health
        .snapshot()
        .into_iter()
        .map(|status| ProviderLine {
            name: status.name,
            success: status.success,
            failure: status.failure,
            circuit_open: status.state == CircuitState::Open,
            avg_latency_ms: status.avg_latency_ms,
        })
        .collect();

    let sources = services
        .sources
        .snapshot()
        .into_iter()
        .map(|(name, state)| SourceLine {
            name,
            connected: state.connected,
            messages: state.messages_received,
            consecutive_failures: state.consecutive_failures,
            last_error: state.last_error,
        })
        .collect();

    DiagnosticsSnapshot {
        providers,
        sources,
        queue_depth: services.db.status_counts().unwrap_or_default(),
        bucket_distribution: services.db.bucket_counts().unwrap_or_default(),
        lite_mode: services.health.lite_mode(),
    }
}

/// Periodic operator report until shutdown.
pub async fn run(services: Services) {
    let mut shutdown = services.shutdown.clone();
    let interval = Duration::from_secs(
        services.config.diagnostics.report_interval_secs.max(30),
    );

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = tokio::time::sleep(interval) => {
                report(&services);
            }
        }
    }
}

fn report(services: &Services) {
    let snapshot = snapshot(services);

    let queue: Vec<String> = snapshot
        .queue_depth
        .iter()
        .map(|(status, count)| format!("{}={}", status, count))
        .collect();
    logger::log(
        LogTag::Diag,
        "QUEUE",
        &if queue.is_empty() {
            "empty".to_string()
        } else {
            queue.join(" ")
        },
    );

    let buckets: Vec<String> = snapshot
        .bucket_distribution
        .iter()
        .map(|(bucket, count)| format!("{}={}", bucket, count))
        .collect();
    if !buckets.is_empty() {
        logger::log(LogTag::Diag, "BUCKETS", &buckets.join(" "));
    }

    for provider in &snapshot.providers {
        logger::log(
            LogTag::Diag,
            "PROVIDER",
            &format!(
                "{}: ok={} fail={} circuit={} latency={:.0}ms",
                provider.name,
                provider.success,
                provider.failure,
                if provider.circuit_open { "OPEN" } else { "closed" },
                provider.avg_latency_ms
            ),
        );
    }

    for source in &snapshot.sources {
        logger::log(
            LogTag::Diag,
            "SOURCE",
            &format!(
                "{}: {} messages={} failures={}",
                source.name,
                if source.connected { "connected" } else { "down" },
                source.messages,
                source.consecutive_failures
            ),
        );
    }

    if snapshot.lite_mode {
        logger::warning(LogTag::Diag, "Lite mode active - output marked degraded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_store_and_health() {
        let services = Services::for_tests();
        services.db.insert_discovered("mint-a").unwrap();
        services
            .health
            .record_failure("dexscreener", "timeout");
        services.sources.update("pumpportal", |s| {
            s.connected = true;
            s.messages_received = 3;
        });

        let snapshot = snapshot(&services);
        assert_eq!(
            snapshot.queue_depth,
            vec![("discovered".to_string(), 1)]
        );
        assert!(snapshot
            .providers
            .iter()
            .any(|p| p.name == "dexscreener" && p.failure == 1));
        assert!(snapshot
            .sources
            .iter()
            .any(|s| s.name == "pumpportal" && s.connected && s.messages == 3));
        assert!(!snapshot.lite_mode);
    }
}
