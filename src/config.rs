//! Configuration for MintScout
//!
//! Tunables live in `config.toml` under the data directory (synthesized with
//! defaults on first run). Secrets and chat targets come from the
//! environment so they never land on disk.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::constants::{PUMPFUN_PROGRAM, RAYDIUM_AMM_PROGRAM};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub circuit: CircuitConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub intake: IntakeConfig,
    #[serde(default)]
    pub reanalysis: ReanalysisConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            retries: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Minimum calls before the failure ratio is meaningful
    pub min_requests: u64,
    /// Failure ratio that opens the circuit
    pub failure_threshold: f64,
    /// Cooldown before a half-open probe is allowed
    pub reset_secs: u64,
    /// Periodic failure-count decay factor
    pub decay_factor: f64,
    /// Interval between decay passes
    pub decay_interval_secs: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            min_requests: 15,
            failure_threshold: 0.6,
            reset_secs: 300,
            decay_factor: 0.8,
            decay_interval_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Seconds between aggregator poll cycles
    pub aggregator_poll_secs: u64,
    /// Cap on admissions per aggregator cycle (0 = unlimited)
    pub max_new_per_cycle: usize,
    /// Run backup logsSubscribe streams alongside the primary
    pub enable_backup_streams: bool,
    /// Bounded recent-set of processed transaction signatures
    pub signature_cache: usize,
    /// Bounded recent-set of admitted candidate addresses
    pub recent_set_capacity: usize,
    /// PumpPortal stream endpoint
    pub pumpportal_url: String,
    /// DEX programs whose pool-creation logs we subscribe to
    pub dex_program_ids: Vec<String>,
    /// Ignore resolved transactions older than this
    pub max_tx_age_secs: i64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            aggregator_poll_secs: 60,
            max_new_per_cycle: 30,
            enable_backup_streams: true,
            signature_cache: 8000,
            recent_set_capacity: 4096,
            pumpportal_url: "wss://pumpportal.fun/api/data".to_string(),
            dex_program_ids: vec![
                RAYDIUM_AMM_PROGRAM.to_string(),
                PUMPFUN_PROGRAM.to_string(),
            ],
            max_tx_age_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfig {
    pub tick_secs: u64,
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    pub initial_batch_size: usize,
    /// Target duration for one intake cycle; the batch size adapts toward it
    pub target_cycle_secs: f64,
    /// Rolling window of cycle durations used by adaptive sizing
    pub timing_window: usize,
    /// Simultaneous enrichment calls
    pub concurrency: usize,
    /// Leave newly discovered assets alone until providers have indexed them
    pub indexing_grace_secs: i64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            tick_secs: 20,
            min_batch_size: 5,
            max_batch_size: 16,
            initial_batch_size: 8,
            target_cycle_secs: 25.0,
            timing_window: 50,
            concurrency: 10,
            indexing_grace_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReanalysisConfig {
    pub tick_secs: u64,
    pub batch_limit: usize,
    pub concurrency: usize,
    /// Per-bucket refresh cadences (minutes)
    pub cadence_priority_mins: i64,
    pub cadence_hatching_mins: i64,
    pub cadence_cooking_mins: i64,
    pub cadence_fresh_mins: i64,
    pub cadence_other_mins: i64,
    /// A stored snapshot older than this no longer substitutes for live data
    pub snapshot_staleness_secs: i64,
    /// Interval between second-chance sweeps over rejected assets
    pub second_chance_mins: u64,
    /// Rejected assets re-checked per sweep
    pub second_chance_batch: usize,
}

impl Default for ReanalysisConfig {
    fn default() -> Self {
        Self {
            tick_secs: 60,
            batch_limit: 50,
            concurrency: 6,
            cadence_priority_mins: 2,
            cadence_hatching_mins: 2,
            cadence_cooking_mins: 5,
            cadence_fresh_mins: 12,
            cadence_other_mins: 45,
            snapshot_staleness_secs: 1200,
            second_chance_mins: 10,
            second_chance_batch: 100,
        }
    }
}

/// One age bracket for the market-health score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MmsBracket {
    /// Upper age bound in minutes; None = catch-all
    pub max_age_minutes: Option<f64>,
    pub weight_liquidity: f64,
    pub weight_volume: f64,
    pub weight_market_cap: f64,
    pub norm_liquidity: f64,
    pub norm_volume: f64,
    pub norm_market_cap: f64,
    pub cap: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    // Safety score
    pub sss_base: f64,
    pub authority_penalty: f64,
    pub top_holder_thresholds: Vec<f64>,
    pub top_holder_penalties: Vec<f64>,
    pub risk_label_penalty: f64,
    pub creator_penalty_start: u64,
    pub creator_penalty_per_token: f64,
    pub creator_penalty_cap: f64,
    // Market health score
    pub follower_weight: f64,
    pub follower_norm: f64,
    // Bucket tags
    pub hatching_max_age_mins: f64,
    pub hatching_min_liquidity: f64,
    pub cooking_min_change_pct: f64,
    pub cooking_min_volume: f64,
    pub fresh_max_age_mins: f64,
    // Bucket thresholds
    pub priority_bucket_floor: f64,
    pub top_bucket_score: i64,
    /// Age brackets for the market-health score (kept last: array of tables)
    pub mms_brackets: Vec<MmsBracket>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            sss_base: 80.0,
            authority_penalty: 60.0,
            top_holder_thresholds: vec![80.0, 60.0, 40.0],
            top_holder_penalties: vec![40.0, 25.0, 10.0],
            risk_label_penalty: 30.0,
            creator_penalty_start: 5,
            creator_penalty_per_token: 3.0,
            creator_penalty_cap: 25.0,
            follower_weight: 10.0,
            follower_norm: 10_000.0,
            hatching_max_age_mins: 180.0,
            hatching_min_liquidity: 300.0,
            cooking_min_change_pct: 25.0,
            cooking_min_volume: 1_000.0,
            fresh_max_age_mins: 1_440.0,
            priority_bucket_floor: 80.0,
            top_bucket_score: 70,
            mms_brackets: vec![
                MmsBracket {
                    max_age_minutes: Some(60.0),
                    weight_liquidity: 0.45,
                    weight_volume: 0.35,
                    weight_market_cap: 0.10,
                    norm_liquidity: 3_000.0,
                    norm_volume: 5_000.0,
                    norm_market_cap: 20_000.0,
                    cap: 85,
                },
                MmsBracket {
                    max_age_minutes: Some(1_440.0),
                    weight_liquidity: 0.40,
                    weight_volume: 0.35,
                    weight_market_cap: 0.15,
                    norm_liquidity: 5_000.0,
                    norm_volume: 25_000.0,
                    norm_market_cap: 50_000.0,
                    cap: 90,
                },
                MmsBracket {
                    max_age_minutes: Some(10_080.0),
                    weight_liquidity: 0.35,
                    weight_volume: 0.35,
                    weight_market_cap: 0.20,
                    norm_liquidity: 10_000.0,
                    norm_volume: 50_000.0,
                    norm_market_cap: 150_000.0,
                    cap: 95,
                },
                MmsBracket {
                    max_age_minutes: None,
                    weight_liquidity: 0.30,
                    weight_volume: 0.35,
                    weight_market_cap: 0.25,
                    norm_liquidity: 25_000.0,
                    norm_volume: 100_000.0,
                    norm_market_cap: 500_000.0,
                    cap: 100,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    pub interval_hours: u64,
    pub snapshot_retention_days: i64,
    pub rejected_retention_days: i64,
    /// Drop never-analyzed discoveries after this long to avoid queue bloat
    pub discovered_retention_hours: i64,
    /// Reset assets stuck in the analyzing claim state after this long
    pub stuck_claim_mins: i64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_hours: 24,
            snapshot_retention_days: 14,
            rejected_retention_days: 7,
            discovered_retention_hours: 8,
            stuck_claim_mins: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub items_per_segment: usize,
    pub push_cooldown_hours: i64,
    pub backoff_base_secs: u64,
    pub backoff_cap_secs: u64,
    pub min_score_default: i64,
    pub min_score_fresh: i64,
    pub min_score_hatching: i64,
    /// Volume floor for the cooking fallback query
    pub cooking_fallback_volume_min: f64,
    // Segment cadences (seconds)
    pub fresh_interval_secs: u64,
    pub cooking_interval_secs: u64,
    pub hatching_interval_secs: u64,
    pub top_interval_secs: u64,
    pub vip_hatching_interval_secs: u64,
    pub vip_top_interval_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            items_per_segment: 2,
            push_cooldown_hours: 1,
            backoff_base_secs: 30,
            backoff_cap_secs: 300,
            min_score_default: 15,
            min_score_fresh: 5,
            min_score_hatching: 0,
            cooking_fallback_volume_min: 100.0,
            fresh_interval_secs: 60,
            cooking_interval_secs: 60,
            hatching_interval_secs: 300,
            top_interval_secs: 3600,
            vip_hatching_interval_secs: 120,
            vip_top_interval_secs: 1200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    pub report_interval_secs: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 300,
        }
    }
}

impl Config {
    /// Load the config file, synthesizing one with defaults when missing.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

// =============================================================================
// SECRETS (environment only)
// =============================================================================

/// Secrets and deployment targets pulled from the environment at startup.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub telegram_token: String,
    pub public_chat_id: i64,
    pub vip_chat_id: i64,
    pub helius_api_key: String,
    pub birdeye_api_key: String,
    pub rugcheck_jwt: String,
    pub bitquery_api_key: String,
    pub x_bearer_token: String,
    pub syndica_rpc_url: String,
    pub syndica_ws_url: String,
    pub alchemy_rpc_url: String,
    pub alchemy_ws_url: String,
}

fn env_string(name: &str) -> String {
    std::env::var(name).unwrap_or_default().trim().to_string()
}

fn env_i64(name: &str) -> i64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            telegram_token: env_string("TELEGRAM_TOKEN"),
            public_chat_id: env_i64("PUBLIC_CHAT_ID"),
            vip_chat_id: env_i64("VIP_CHAT_ID"),
            helius_api_key: env_string("HELIUS_API_KEY"),
            birdeye_api_key: env_string("BIRDEYE_API_KEY"),
            rugcheck_jwt: env_string("RUGCHECK_JWT"),
            bitquery_api_key: env_string("BITQUERY_API_KEY"),
            x_bearer_token: env_string("X_BEARER_TOKEN"),
            syndica_rpc_url: env_string("SYNDICA_RPC_URL"),
            syndica_ws_url: env_string("SYNDICA_WS_URL"),
            alchemy_rpc_url: env_string("ALCHEMY_RPC_URL"),
            alchemy_ws_url: env_string("ALCHEMY_WS_URL"),
        }
    }

    /// Missing Telegram credentials abort startup; everything else degrades.
    pub fn validate(&self) -> Result<()> {
        if self.telegram_token.is_empty() {
            anyhow::bail!("TELEGRAM_TOKEN is required");
        }
        Ok(())
    }

    pub fn helius_rpc_url(&self) -> String {
        if self.helius_api_key.is_empty() {
            "https://api.mainnet-beta.solana.com".to_string()
        } else {
            format!(
                "https://mainnet.helius-rpc.com/?api-key={}",
                self.helius_api_key
            )
        }
    }

    pub fn helius_ws_url(&self) -> Option<String> {
        if self.helius_api_key.is_empty() {
            None
        } else {
            Some(format!(
                "wss://mainnet.helius-rpc.com/?api-key={}",
                self.helius_api_key
            ))
        }
    }

    /// HTTP RPC endpoints in failover order for transaction lookups
    pub fn rpc_providers(&self) -> Vec<(String, String)> {
        let mut providers = Vec::new();
        if !self.syndica_rpc_url.is_empty() {
            providers.push(("syndica".to_string(), self.syndica_rpc_url.clone()));
        }
        if !self.alchemy_rpc_url.is_empty() {
            providers.push(("alchemy".to_string(), self.alchemy_rpc_url.clone()));
        }
        providers.push(("helius".to_string(), self.helius_rpc_url()));
        providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.circuit.min_requests, 15);
        assert!((parsed.circuit.failure_threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(parsed.intake.max_batch_size, 16);
        assert_eq!(parsed.scoring.mms_brackets.len(), 4);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = toml::from_str("[http]\ntimeout_secs = 30\nretries = 1\n").unwrap();
        assert_eq!(parsed.http.timeout_secs, 30);
        assert_eq!(parsed.intake.min_batch_size, 5);
        assert_eq!(parsed.dispatch.items_per_segment, 2);
    }
}
