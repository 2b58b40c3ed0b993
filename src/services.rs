//! Service wiring.
//!
//! Everything with process lifetime is built once here and passed by `Arc`
//! to the workers that need it. No module-level mutable globals: each
//! component receives exactly the collaborators it uses, which keeps the
//! pieces unit-testable in isolation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::apis::ApiClient;
use crate::cache::{RecentSet, TtlCache};
use crate::config::{Config, Secrets};
use crate::database::Database;
use crate::health::ProviderHealth;
use crate::http::HttpFetcher;
use crate::rate_limit::RateLimits;
use crate::shutdown::Shutdown;

/// Connection state of one ingestion source, for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct SourceState {
    pub connected: bool,
    pub messages_received: u64,
    pub consecutive_failures: u32,
    pub current_backoff_secs: f64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: String,
}

/// Shared registry of ingestion source states.
#[derive(Default)]
pub struct SourceStates {
    states: Mutex<HashMap<String, SourceState>>,
}

impl SourceStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, name: &str, f: impl FnOnce(&mut SourceState)) {
        if let Ok(mut states) = self.states.lock() {
            f(states.entry(name.to_string()).or_default());
        }
    }

    pub fn snapshot(&self) -> Vec<(String, SourceState)> {
        let mut out: Vec<(String, SourceState)> = self
            .states
            .lock()
            .map(|states| {
                states
                    .iter()
                    .map(|(name, state)| (name.clone(), state.clone()))
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

/// The service graph shared by every worker.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub secrets: Arc<Secrets>,
    pub db: Arc<Database>,
    pub health: Arc<ProviderHealth>,
    pub limits: Arc<RateLimits>,
    pub api: ApiClient,
    /// Pool-creation block times observed on the firehose, by mint
    pub pool_births: Arc<TtlCache<String, i64>>,
    /// Recently admitted candidate addresses (ingestion dedupe)
    pub recent_mints: Arc<RecentSet>,
    /// Recently resolved transaction signatures (firehose dedupe)
    pub recent_signatures: Arc<RecentSet>,
    pub sources: Arc<SourceStates>,
    pub shutdown: Shutdown,
}

impl Services {
    pub fn build(
        config: Config,
        secrets: Secrets,
        db: Database,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let secrets = Arc::new(secrets);
        let health = Arc::new(ProviderHealth::new(config.circuit.clone()));
        let limits = Arc::new(RateLimits::new());
        let fetcher = Arc::new(
            HttpFetcher::new(
                health.clone(),
                limits.clone(),
                config.http.timeout_secs,
                config.http.retries,
            )
            .map_err(anyhow::Error::msg)
            .context("building HTTP fetcher")?,
        );
        let api = ApiClient::new(fetcher, secrets.clone());

        Ok(Self {
            pool_births: Arc::new(TtlCache::new(1000, std::time::Duration::from_secs(3600))),
            recent_mints: Arc::new(RecentSet::new(config.discovery.recent_set_capacity)),
            recent_signatures: Arc::new(RecentSet::new(config.discovery.signature_cache)),
            sources: Arc::new(SourceStates::new()),
            config,
            secrets,
            db: Arc::new(db),
            health,
            limits,
            api,
            shutdown,
        })
    }

    /// Test harness: everything backed by an in-memory store and dummy keys.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        use crate::shutdown::ShutdownHandle;
        let (_handle, shutdown) = ShutdownHandle::new();
        std::mem::forget(_handle);
        Self::build(
            Config::default(),
            Secrets::default(),
            Database::open_in_memory().expect("in-memory db"),
            shutdown,
        )
        .expect("test services")
    }
}
