//! Enrichment pipeline: gather everything known about one mint and score it.
//!
//! Primary sources are fetched concurrently; each is optional. Sparse data
//! flows through scoring with a confidence drag instead of dropping the
//! asset, so a provider outage can never blank the worklist.

use chrono::Utc;

use crate::logger::{self, LogTag};
use crate::scoring;
use crate::services::Services;
use crate::types::{AssetTags, Bucket, TokenIntel};

/// Grace window before a missing Jupiter route clamps liquidity to zero:
/// newborns are often not routable yet and should not be penalized for it.
const JUP_CLAMP_MIN_AGE_MINUTES: f64 = 180.0;

pub struct EnrichmentResult {
    pub intel: TokenIntel,
    pub tags: AssetTags,
    pub bucket: Bucket,
    pub priority: f64,
}

/// Build the full intel record for a mint.
///
/// Returns None only when *no* source produced anything at all - the caller
/// treats that as a rejection (the asset may earn a second chance later).
pub async fn enrich_token_intel(
    services: &Services,
    mint: &str,
    deep_dive: bool,
) -> Option<EnrichmentResult> {
    let (facts, risk_label, snapshot) = tokio::join!(
        services.api.fetch_asset_facts(mint),
        services.api.fetch_risk_label(mint),
        services.api.fetch_market_snapshot(mint),
    );

    if facts.is_none() && snapshot.is_none() {
        logger::debug(
            LogTag::Intake,
            &format!("{}: no core or market data from any provider", mint),
        );
        return None;
    }

    let mut intel = TokenIntel::new(mint);
    intel.risk_label = risk_label;

    if let Some(facts) = facts {
        intel.symbol = facts.symbol;
        intel.name = facts.name;
        intel.mint_authority = facts.mint_authority;
        intel.freeze_authority = facts.freeze_authority;
        intel.creator_address = facts.creator_address;
        intel.top10_holder_pct = facts.top10_holder_pct;
        intel.holders_count = facts.holders_count;
        intel.socials = facts.socials;
        if let Some(created_at) = facts.created_at {
            intel.age_minutes = Some((Utc::now() - created_at).num_seconds() as f64 / 60.0);
        }
    }

    if let Some(snapshot) = &snapshot {
        intel.apply_snapshot(snapshot);
        // Pool creation time is more authoritative than token creation time
        if let Some(pair_created) = snapshot.pair_created_at {
            intel.pool_created_at = Some(pair_created);
            intel.age_minutes = Some((Utc::now() - pair_created).num_seconds() as f64 / 60.0);
        }
    }

    // The firehose may have seen this pool's birth before any aggregator did
    if intel.pool_created_at.is_none() {
        if let Some(birth) = services.pool_births.get(&mint.to_string()) {
            if let Some(born) = chrono::DateTime::from_timestamp(birth, 0) {
                intel.pool_created_at = Some(born);
                intel.age_minutes = Some((Utc::now() - born).num_seconds() as f64 / 60.0);
            }
        }
    }

    // Last resort for age: our own discovery time. Leaving age unset would
    // cap confidence instead, so only the store fallback applies here.
    if intel.age_minutes.is_none() {
        if let Ok(Some(discovered_at)) = services.db.asset_discovered_at(mint) {
            let age = (Utc::now() - discovered_at).num_seconds() as f64 / 60.0;
            logger::debug(
                LogTag::Intake,
                &format!("{}: no age from providers, using discovery time ({:.1}m)", mint, age),
            );
            intel.age_minutes = Some(age);
        }
    }

    // Untradable clamp: no Jupiter route past the grace window means the
    // advertised liquidity is not actionable
    if let Some(false) = services.api.fetch_jupiter_has_route(mint).await {
        let age = intel.age_minutes.unwrap_or(f64::MAX);
        if age >= JUP_CLAMP_MIN_AGE_MINUTES {
            intel.liquidity_usd = Some(0.0);
            intel.volume_24h_usd = Some(0.0);
        }
    }

    if deep_dive {
        if let Some(creator) = intel.creator_address.clone() {
            intel.creator_token_count = services.api.fetch_creator_token_count(&creator).await;
        }
        if let Some(twitter) = intel.socials.get("twitter").cloned() {
            intel.twitter_followers = services.api.fetch_twitter_followers(&twitter).await;
        }
    }

    let (tags, bucket, priority) = scoring::score_intel(&services.config.scoring, &mut intel);
    logger::debug(
        LogTag::Scoring,
        &format!(
            "{}: sss={} mms={} score={} bucket={} priority={:.1}",
            mint,
            intel.sss_score,
            intel.mms_score,
            intel.score,
            bucket.as_str(),
            priority
        ),
    );

    Some(EnrichmentResult {
        intel,
        tags,
        bucket,
        priority,
    })
}
