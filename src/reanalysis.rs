//! Re-analysis scheduler: keeps previously analyzed assets fresh at a
//! cadence set by their scheduling bucket, and gives rejected assets a
//! periodic second chance.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::config::ReanalysisConfig;
use crate::enrich;
use crate::logger::{self, LogTag};
use crate::services::Services;
use crate::types::Bucket;

fn cadence_mins(config: &ReanalysisConfig, bucket: Bucket) -> i64 {
    match bucket {
        Bucket::Priority => config.cadence_priority_mins,
        Bucket::Hatching => config.cadence_hatching_mins,
        Bucket::Cooking => config.cadence_cooking_mins,
        Bucket::Fresh => config.cadence_fresh_mins,
        Bucket::Top | Bucket::Standby => config.cadence_other_mins,
    }
}

fn min_cadence(config: &ReanalysisConfig) -> i64 {
    [
        config.cadence_priority_mins,
        config.cadence_hatching_mins,
        config.cadence_cooking_mins,
        config.cadence_fresh_mins,
        config.cadence_other_mins,
    ]
    .into_iter()
    .min()
    .unwrap_or(1)
    .max(1)
}

pub async fn run(services: Services) {
    let mut shutdown = services.shutdown.clone();
    let config = services.config.reanalysis.clone();
    let interval = Duration::from_secs(config.tick_secs.max(1));

    logger::log(LogTag::Reanalysis, "START", "Re-analysis scheduler running");
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = tokio::time::sleep(interval) => {
                tick(&services, &config).await;
            }
        }
    }
    logger::debug(LogTag::Reanalysis, "Re-analysis scheduler stopped");
}

pub async fn tick(services: &Services, config: &ReanalysisConfig) {
    let due = match services.db.due_for_reanalysis(
        &|bucket| cadence_mins(config, bucket),
        min_cadence(config),
        config.batch_limit,
    ) {
        Ok(due) => due,
        Err(e) => {
            logger::error(LogTag::Reanalysis, &format!("Due query failed: {}", e));
            return;
        }
    };
    if due.is_empty() {
        return;
    }

    logger::log(
        LogTag::Reanalysis,
        "DUE",
        &format!("{} assets due for refresh", due.len()),
    );

    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let tasks = due.iter().map(|candidate| {
        let semaphore = semaphore.clone();
        let mint = candidate.mint.clone();
        let services = services.clone();
        let staleness = config.snapshot_staleness_secs;
        async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            refresh_one(&services, &mint, staleness).await;
        }
    });
    join_all(tasks).await;
}

/// Refresh one asset. A transient provider outage must never regress an
/// analyzed asset: on failure we fall back to the latest stored snapshot if
/// it is still inside the staleness window, otherwise we leave the asset
/// untouched and log the miss.
async fn refresh_one(services: &Services, mint: &str, staleness_secs: i64) {
    match enrich::enrich_token_intel(services, mint, false).await {
        Some(mut result) => {
            // Carry deep-dive-only facts forward from the first analysis;
            // shallow refreshes never re-fetch them
            if let Ok(Some(previous)) = services.db.get_intel(mint) {
                let mut carried = false;
                if result.intel.creator_token_count.is_none() {
                    result.intel.creator_token_count = previous.creator_token_count;
                    carried = result.intel.creator_token_count.is_some();
                }
                if result.intel.twitter_followers.is_none() {
                    result.intel.twitter_followers = previous.twitter_followers;
                    carried |= result.intel.twitter_followers.is_some();
                }
                if carried {
                    let (tags, bucket, priority) =
                        crate::scoring::score_intel(&services.config.scoring, &mut result.intel);
                    result.tags = tags;
                    result.bucket = bucket;
                    result.priority = priority;
                }
            }

            // Persist intel, snapshot, bucket - in that order, one asset at
            // a time, to bound write contention
            if let Err(e) = services.db.persist_analysis(
                mint,
                &result.intel,
                result.tags,
                result.bucket,
                result.priority,
                true,
            ) {
                logger::error(
                    LogTag::Reanalysis,
                    &format!("Failed to persist refresh for {}: {}", mint, e),
                );
                return;
            }
            if let Err(e) = services.db.save_snapshot(mint, &result.intel) {
                logger::error(
                    LogTag::Reanalysis,
                    &format!("Failed to save snapshot for {}: {}", mint, e),
                );
            }
        }
        None => {
            let fallback = services.db.latest_snapshot(mint).ok().flatten();
            match fallback {
                Some(stored) if stored.age_secs <= staleness_secs => {
                    // Rescore on cached data so tags/bucket stay coherent
                    if let Ok(Some(mut intel)) = services.db.get_intel(mint) {
                        intel.apply_snapshot(&stored.snapshot);
                        let (tags, bucket, priority) =
                            crate::scoring::score_intel(&services.config.scoring, &mut intel);
                        if let Err(e) = services
                            .db
                            .persist_analysis(mint, &intel, tags, bucket, priority, true)
                        {
                            logger::error(
                                LogTag::Reanalysis,
                                &format!("Cached rescore failed for {}: {}", mint, e),
                            );
                        } else {
                            logger::debug(
                                LogTag::Reanalysis,
                                &format!("{} refreshed from cached snapshot", mint),
                            );
                        }
                    }
                }
                _ => {
                    logger::warning(
                        LogTag::Reanalysis,
                        &format!("{}: live refresh failed and snapshot too stale, leaving as-is", mint),
                    );
                }
            }
        }
    }
}

/// Second-chance sweep: rejected assets whose liquidity has since risen
/// above the hatching floor go back to `discovered` and re-enter intake.
pub async fn run_second_chance(services: Services) {
    let mut shutdown = services.shutdown.clone();
    let config = services.config.reanalysis.clone();
    let interval = Duration::from_secs(config.second_chance_mins.max(1) * 60);

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = tokio::time::sleep(interval) => {
                second_chance_tick(&services).await;
            }
        }
    }
    logger::debug(LogTag::Reanalysis, "Second-chance sweep stopped");
}

pub async fn second_chance_tick(services: &Services) {
    let candidates = match services
        .db
        .second_chance_candidates(services.config.reanalysis.second_chance_batch)
    {
        Ok(candidates) => candidates,
        Err(e) => {
            logger::error(
                LogTag::Reanalysis,
                &format!("Second-chance query failed: {}", e),
            );
            return;
        }
    };

    let floor = services.config.scoring.hatching_min_liquidity;
    let mut revived = 0usize;
    for mint in candidates {
        if services.shutdown.is_triggered() {
            break;
        }
        // Cached snapshot first; only fall back to a light live fetch when
        // we have nothing stored at all
        let liquidity = match services.db.latest_snapshot(&mint) {
            Ok(Some(stored)) => stored.snapshot.liquidity_usd,
            _ => services
                .api
                .fetch_market_snapshot(&mint)
                .await
                .and_then(|snapshot| snapshot.liquidity_usd),
        };
        if let Some(liquidity) = liquidity {
            if liquidity >= floor {
                match services.db.revive(&mint) {
                    Ok(true) => {
                        revived += 1;
                        logger::log(
                            LogTag::Reanalysis,
                            "REVIVED",
                            &format!("{} liquidity ${:.0} above floor", mint, liquidity),
                        );
                    }
                    Ok(false) => {}
                    Err(e) => {
                        logger::error(
                            LogTag::Reanalysis,
                            &format!("Failed to revive {}: {}", mint, e),
                        );
                    }
                }
            }
        }
    }
    if revived > 0 {
        logger::log(
            LogTag::Reanalysis,
            "SECOND_CHANCE",
            &format!("{} rejected assets re-entered the queue", revived),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssetTags, TokenIntel};

    #[tokio::test]
    async fn test_second_chance_revives_above_floor() {
        let services = Services::for_tests();
        let db = &services.db;

        // Rejected asset with a cached snapshot above the hatching floor
        db.insert_discovered("reborn").unwrap();
        db.claim_discovered_batch(1, Duration::from_secs(0)).unwrap();
        db.mark_rejected("reborn").unwrap();
        let intel = TokenIntel {
            mint: "reborn".to_string(),
            liquidity_usd: Some(500.0),
            ..Default::default()
        };
        db.save_snapshot("reborn", &intel).unwrap();

        // Rejected asset with liquidity below the floor stays parked
        db.insert_discovered("dud").unwrap();
        db.claim_discovered_batch(1, Duration::from_secs(0)).unwrap();
        db.mark_rejected("dud").unwrap();
        let poor = TokenIntel {
            mint: "dud".to_string(),
            liquidity_usd: Some(10.0),
            ..Default::default()
        };
        db.save_snapshot("dud", &poor).unwrap();

        second_chance_tick(&services).await;

        let counts = db.status_counts().unwrap();
        assert!(counts.contains(&("discovered".to_string(), 1)));
        assert!(counts.contains(&("rejected".to_string(), 1)));

        // Only now does the revived asset re-enter the intake pipeline
        let claimed = db.claim_discovered_batch(5, Duration::from_secs(0)).unwrap();
        assert_eq!(claimed, vec!["reborn".to_string()]);
    }

    #[test]
    fn test_cadence_mapping() {
        let config = ReanalysisConfig::default();
        assert_eq!(cadence_mins(&config, Bucket::Priority), 2);
        assert_eq!(cadence_mins(&config, Bucket::Hatching), 2);
        assert_eq!(cadence_mins(&config, Bucket::Cooking), 5);
        assert_eq!(cadence_mins(&config, Bucket::Fresh), 12);
        assert_eq!(cadence_mins(&config, Bucket::Standby), 45);
        assert_eq!(min_cadence(&config), 2);
    }

    #[tokio::test]
    async fn test_due_ordering_prefers_hot_buckets() {
        let services = Services::for_tests();
        let db = &services.db;
        for (mint, bucket) in [("cold", Bucket::Standby), ("hot", Bucket::Priority)] {
            db.insert_discovered(mint).unwrap();
            let intel = TokenIntel::new(mint);
            db.persist_analysis(mint, &intel, AssetTags::default(), bucket, 0.0, false)
                .unwrap();
        }
        // Nothing is due yet: both were analyzed this instant
        let config = ReanalysisConfig::default();
        let due = db
            .due_for_reanalysis(&|b| cadence_mins(&config, b), min_cadence(&config), 10)
            .unwrap();
        assert!(due.is_empty());
    }
}
