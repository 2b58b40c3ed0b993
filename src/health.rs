//! Provider health registry and circuit breaker.
//!
//! Every outbound call reports its outcome here; every outbound call asks
//! `is_available` first. A provider circuit opens when the failure ratio
//! crosses the threshold over a minimum sample, and opening it raises the
//! process-wide lite-mode flag so the dispatch layer can visibly soften its
//! output. The registry itself never fails: callers decide whether to skip,
//! fall back to cached data, or degrade.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::CircuitConfig;
use crate::logger::{self, LogTag};

/// Circuit state as reported by diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
}

#[derive(Debug, Clone)]
struct ProviderStats {
    success: u64,
    failure: f64,
    circuit_open: bool,
    opened_at: Option<Instant>,
    circuit_expires: Option<Instant>,
    last_success: Option<Instant>,
    last_failure: Option<Instant>,
    last_error: String,
    avg_latency_ms: f64,
}

impl ProviderStats {
    fn new() -> Self {
        Self {
            success: 0,
            failure: 0.0,
            circuit_open: false,
            opened_at: None,
            circuit_expires: None,
            last_success: None,
            last_failure: None,
            last_error: String::new(),
            avg_latency_ms: 0.0,
        }
    }

    fn total(&self) -> f64 {
        self.success as f64 + self.failure
    }
}

/// Read-only view of one provider's health, for diagnostics
#[derive(Debug, Clone)]
pub struct ProviderStatus {
    pub name: String,
    pub success: u64,
    pub failure: u64,
    pub state: CircuitState,
    pub last_error: String,
    pub avg_latency_ms: f64,
    pub cooldown_remaining: Option<Duration>,
}

/// Process-wide provider health registry. One instance, built at startup,
/// shared by reference with every fetch path.
pub struct ProviderHealth {
    config: CircuitConfig,
    providers: Mutex<HashMap<String, ProviderStats>>,
    lite_mode_until: Mutex<Option<Instant>>,
}

impl ProviderHealth {
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            providers: Mutex::new(HashMap::new()),
            lite_mode_until: Mutex::new(None),
        }
    }

    /// Record a successful call.
    ///
    /// A success while the cooldown has elapsed is the half-open probe
    /// passing: the circuit closes and the failure counter is halved so one
    /// good probe does not erase all history instantly.
    pub fn record_success(&self, provider: &str, latency: Duration) {
        let mut providers = match self.providers.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        let stats = providers
            .entry(provider.to_string())
            .or_insert_with(ProviderStats::new);
        stats.success += 1;
        stats.last_success = Some(Instant::now());
        let total = stats.total().max(1.0);
        let latency_ms = latency.as_secs_f64() * 1000.0;
        stats.avg_latency_ms += (latency_ms - stats.avg_latency_ms) / total;

        if stats.circuit_open {
            let expired = stats
                .circuit_expires
                .map(|at| Instant::now() >= at)
                .unwrap_or(true);
            if expired {
                stats.circuit_open = false;
                stats.opened_at = None;
                stats.circuit_expires = None;
                stats.failure /= 2.0;
                logger::log(
                    LogTag::Health,
                    "CIRCUIT_CLOSED",
                    &format!("{} recovered after probe success", provider),
                );
            }
        }
    }

    /// Record a failed call; opens the circuit when the ratio crosses the
    /// threshold over at least `min_requests` samples.
    pub fn record_failure(&self, provider: &str, error: &str) {
        let mut providers = match self.providers.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        let stats = providers
            .entry(provider.to_string())
            .or_insert_with(ProviderStats::new);
        stats.failure += 1.0;
        stats.last_failure = Some(Instant::now());
        stats.last_error = error.chars().take(200).collect();

        if stats.circuit_open {
            // Probe failed while open: re-arm the cooldown
            let expires = Instant::now() + Duration::from_secs(self.config.reset_secs);
            stats.opened_at = Some(Instant::now());
            stats.circuit_expires = Some(expires);
            drop(providers);
            self.raise_lite_mode(expires);
            return;
        }

        let total = stats.total();
        if total >= self.config.min_requests as f64 {
            let ratio = stats.failure / total.max(1.0);
            if ratio >= self.config.failure_threshold {
                stats.circuit_open = true;
                stats.opened_at = Some(Instant::now());
                let expires = Instant::now() + Duration::from_secs(self.config.reset_secs);
                stats.circuit_expires = Some(expires);
                logger::warning(
                    LogTag::Health,
                    &format!(
                        "Circuit opened for {} (failure ratio {:.2})",
                        provider, ratio
                    ),
                );
                drop(providers);
                self.raise_lite_mode(expires);
            }
        }
    }

    /// Whether the provider may be called right now.
    ///
    /// An expired cooldown lets one optimistic half-open probe through; the
    /// next `record_success`/`record_failure` decides the circuit's fate.
    pub fn is_available(&self, provider: &str) -> bool {
        let providers = match self.providers.lock() {
            Ok(guard) => guard,
            Err(_) => return true,
        };
        match providers.get(provider) {
            Some(stats) if stats.circuit_open => stats
                .circuit_expires
                .map(|at| Instant::now() >= at)
                .unwrap_or(true),
            _ => true,
        }
    }

    fn raise_lite_mode(&self, until: Instant) {
        if let Ok(mut lite) = self.lite_mode_until.lock() {
            match *lite {
                Some(current) if current >= until => {}
                _ => *lite = Some(until),
            }
        }
    }

    /// Process-wide degraded flag: raised while any circuit cooldown runs.
    pub fn lite_mode(&self) -> bool {
        self.lite_mode_until
            .lock()
            .map(|lite| lite.map(|until| Instant::now() < until).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Periodic relaxation: decay all failure counters so transient blips
    /// self-heal even without traffic.
    pub fn decay_failures(&self) {
        if let Ok(mut providers) = self.providers.lock() {
            for stats in providers.values_mut() {
                stats.failure *= self.config.decay_factor;
            }
        }
    }

    /// Diagnostics view over every known provider
    pub fn snapshot(&self) -> Vec<ProviderStatus> {
        let providers = match self.providers.lock() {
            Ok(guard) => guard,
            Err(_) => return Vec::new(),
        };
        let mut out: Vec<ProviderStatus> = providers
            .iter()
            .map(|(name, stats)| ProviderStatus {
                name: name.clone(),
                success: stats.success,
                failure: stats.failure.round() as u64,
                state: if stats.circuit_open {
                    CircuitState::Open
                } else {
                    CircuitState::Closed
                },
                last_error: stats.last_error.clone(),
                avg_latency_ms: stats.avg_latency_ms,
                cooldown_remaining: stats.circuit_expires.and_then(|at| {
                    let now = Instant::now();
                    if at > now {
                        Some(at - now)
                    } else {
                        None
                    }
                }),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Failure count for one provider (tests and diagnostics)
    pub fn failure_count(&self, provider: &str) -> u64 {
        self.providers
            .lock()
            .ok()
            .and_then(|providers| providers.get(provider).map(|s| s.failure.round() as u64))
            .unwrap_or(0)
    }
}

/// Background relaxation loop; runs until shutdown.
pub async fn run_decay_loop(
    health: std::sync::Arc<ProviderHealth>,
    mut shutdown: crate::shutdown::Shutdown,
) {
    let interval = Duration::from_secs(health.config.decay_interval_secs.max(1));
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = tokio::time::sleep(interval) => {
                health.decay_failures();
            }
        }
    }
    logger::debug(LogTag::Health, "Decay loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(reset_secs: u64) -> CircuitConfig {
        CircuitConfig {
            min_requests: 15,
            failure_threshold: 0.6,
            reset_secs,
            decay_factor: 0.8,
            decay_interval_secs: 120,
        }
    }

    fn drive(health: &ProviderHealth, provider: &str, successes: u32, failures: u32) {
        for _ in 0..successes {
            health.record_success(provider, Duration::from_millis(50));
        }
        for _ in 0..failures {
            health.record_failure(provider, "timeout");
        }
    }

    #[test]
    fn test_circuit_opens_at_threshold() {
        let health = ProviderHealth::new(test_config(300));
        // 20 calls, 13 failures = 65% >= 60% threshold
        drive(&health, "dexscreener", 7, 13);
        assert!(!health.is_available("dexscreener"));
        assert!(health.lite_mode());
    }

    #[test]
    fn test_circuit_stays_closed_below_threshold() {
        let health = ProviderHealth::new(test_config(300));
        // 20 calls, 11 failures = 55% < 60% threshold
        drive(&health, "gecko", 9, 11);
        assert!(health.is_available("gecko"));
        assert!(!health.lite_mode());
    }

    #[test]
    fn test_below_min_sample_never_opens() {
        let health = ProviderHealth::new(test_config(300));
        drive(&health, "birdeye", 0, 14);
        assert!(health.is_available("birdeye"));
    }

    #[test]
    fn test_probe_success_closes_and_halves_failures() {
        let health = ProviderHealth::new(test_config(0));
        drive(&health, "helius", 7, 13);
        // Cooldown of zero seconds: the next check half-opens immediately
        assert!(health.is_available("helius"));
        health.record_success("helius", Duration::from_millis(10));
        assert!(health.is_available("helius"));
        // 13 failures halved to ~6
        assert_eq!(health.failure_count("helius"), 7);
    }

    #[test]
    fn test_probe_failure_rearms_cooldown() {
        let health = ProviderHealth::new(test_config(300));
        drive(&health, "rugcheck", 7, 13);
        health.record_failure("rugcheck", "still down");
        assert!(!health.is_available("rugcheck"));
    }

    #[test]
    fn test_decay_shrinks_failure_counts() {
        let health = ProviderHealth::new(test_config(300));
        drive(&health, "jupiter", 0, 10);
        health.decay_failures();
        assert_eq!(health.failure_count("jupiter"), 8);
    }

    #[test]
    fn test_unknown_provider_is_available() {
        let health = ProviderHealth::new(test_config(300));
        assert!(health.is_available("never-seen"));
    }
}
