//! Adaptive intake worker: drains newly discovered assets in batches sized
//! by observed processing latency.
//!
//! Each tick claims a batch atomically (the store flips rows to `analyzing`
//! in one conditional UPDATE), enriches them under a concurrency cap, and
//! records the cycle duration in a rolling window that steers the next
//! batch size toward the target cycle time.

use futures::future::join_all;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::config::IntakeConfig;
use crate::enrich;
use crate::logger::{self, LogTag};
use crate::services::Services;

/// Rolling-window adaptive batch sizing. Grows while cycles finish well
/// under the target, shrinks when they overrun, always inside the
/// configured bounds.
pub struct AdaptiveBatch {
    size: usize,
    min: usize,
    max: usize,
    target_secs: f64,
    window: usize,
    durations: VecDeque<f64>,
}

impl AdaptiveBatch {
    pub fn new(config: &IntakeConfig) -> Self {
        Self {
            size: config
                .initial_batch_size
                .clamp(config.min_batch_size, config.max_batch_size),
            min: config.min_batch_size,
            max: config.max_batch_size,
            target_secs: config.target_cycle_secs,
            window: config.timing_window.max(1),
            durations: VecDeque::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn record_cycle(&mut self, duration_secs: f64) {
        self.durations.push_back(duration_secs);
        while self.durations.len() > self.window {
            self.durations.pop_front();
        }
        let average = self.durations.iter().sum::<f64>() / self.durations.len() as f64;
        if average < self.target_secs * 0.7 {
            self.size = (self.size + 1).min(self.max);
        } else if average > self.target_secs * 1.2 {
            self.size = self.size.saturating_sub(1).max(self.min);
        }
    }
}

pub async fn run(services: Services) {
    let mut shutdown = services.shutdown.clone();
    let config = services.config.intake.clone();
    let mut batch = AdaptiveBatch::new(&config);
    let interval = Duration::from_secs(config.tick_secs.max(1));

    logger::log(LogTag::Intake, "START", "Intake worker running");
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = tokio::time::sleep(interval) => {
                let started = Instant::now();
                let processed = process_batch(&services, &config, batch.size()).await;
                if processed > 0 {
                    batch.record_cycle(started.elapsed().as_secs_f64());
                    logger::debug(
                        LogTag::Intake,
                        &format!(
                            "Cycle processed {} assets in {:.1}s (next batch {})",
                            processed,
                            started.elapsed().as_secs_f64(),
                            batch.size()
                        ),
                    );
                }
            }
        }
    }
    logger::debug(LogTag::Intake, "Intake worker stopped");
}

/// Claim and process one batch. Returns how many assets were handled.
pub async fn process_batch(services: &Services, config: &IntakeConfig, batch_size: usize) -> usize {
    let claimed = match services.db.claim_discovered_batch(
        batch_size,
        Duration::from_secs(config.indexing_grace_secs.max(0) as u64),
    ) {
        Ok(claimed) => claimed,
        Err(e) => {
            logger::error(LogTag::Intake, &format!("Claim query failed: {}", e));
            return 0;
        }
    };
    if claimed.is_empty() {
        return 0;
    }

    logger::log(
        LogTag::Intake,
        "CLAIMED",
        &format!("{} assets for analysis", claimed.len()),
    );

    // Bounded concurrency keeps a large batch from bursting providers
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let tasks = claimed.iter().map(|mint| {
        let semaphore = semaphore.clone();
        let mint = mint.clone();
        let services = services.clone();
        async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            analyze_one(&services, &mint).await;
        }
    });
    join_all(tasks).await;
    claimed.len()
}

async fn analyze_one(services: &Services, mint: &str) {
    // First analysis is the deep one: creator dossier and social stats are
    // fetched once here, then carried forward by re-analysis refreshes
    match enrich::enrich_token_intel(services, mint, true).await {
        Some(result) => {
            if let Err(e) = services.db.persist_analysis(
                mint,
                &result.intel,
                result.tags,
                result.bucket,
                result.priority,
                false,
            ) {
                logger::error(
                    LogTag::Intake,
                    &format!("Failed to persist analysis for {}: {}", mint, e),
                );
                return;
            }
            if let Err(e) = services.db.save_snapshot(mint, &result.intel) {
                logger::error(
                    LogTag::Intake,
                    &format!("Failed to save snapshot for {}: {}", mint, e),
                );
            }
            logger::log(
                LogTag::Intake,
                "ANALYZED",
                &format!(
                    "{} score={} bucket={}",
                    mint,
                    result.intel.score,
                    result.bucket.as_str()
                ),
            );
        }
        None => {
            if let Err(e) = services.db.mark_rejected(mint) {
                logger::error(
                    LogTag::Intake,
                    &format!("Failed to reject {}: {}", mint, e),
                );
            } else {
                logger::debug(LogTag::Intake, &format!("{} rejected (no data)", mint));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> IntakeConfig {
        IntakeConfig::default()
    }

    #[test]
    fn test_adaptive_growth_under_target() {
        let mut batch = AdaptiveBatch::new(&config());
        let start = batch.size();
        for _ in 0..5 {
            batch.record_cycle(5.0); // well under the 25s target
        }
        assert!(batch.size() > start);
        assert!(batch.size() <= config().max_batch_size);
    }

    #[test]
    fn test_adaptive_shrink_over_target() {
        let mut batch = AdaptiveBatch::new(&config());
        let start = batch.size();
        for _ in 0..5 {
            batch.record_cycle(60.0); // far over target
        }
        assert!(batch.size() < start);
        assert!(batch.size() >= config().min_batch_size);
    }

    #[test]
    fn test_adaptive_respects_bounds() {
        let mut batch = AdaptiveBatch::new(&config());
        for _ in 0..100 {
            batch.record_cycle(1.0);
        }
        assert_eq!(batch.size(), config().max_batch_size);
        for _ in 0..100 {
            batch.record_cycle(300.0);
        }
        assert_eq!(batch.size(), config().min_batch_size);
    }

    #[test]
    fn test_adaptive_steady_inside_band() {
        let mut batch = AdaptiveBatch::new(&config());
        let start = batch.size();
        for _ in 0..10 {
            batch.record_cycle(25.0); // right on target: no oscillation
        }
        assert_eq!(batch.size(), start);
    }
}
