//! Scoring engine: safety score, market-health score, age-weighted blend,
//! confidence dampening, tags, bucket assignment and scheduling priority.
//!
//! All knobs live in `ScoringConfig` so deployments can recalibrate without
//! touching code. Scores are robust to missing data: absent fields skip
//! their penalty or contribution instead of failing.

use crate::config::{MmsBracket, ScoringConfig};
use crate::types::{AssetTags, Bucket, TokenIntel};

/// Diminishing-returns saturation: x / (x + k), clamped to [0, 1]
fn saturate(x: f64, k: f64) -> f64 {
    if x < 0.0 {
        return 0.0;
    }
    if k <= 0.0 {
        return if x > 0.0 { 1.0 } else { 0.0 };
    }
    x / (x + k)
}

/// Safety score: starts from a base and applies deductions for on-chain
/// rugpull risks. Deductions, not a hard kill - a token with an active
/// authority can still surface with a deeply discounted score.
pub fn compute_sss(config: &ScoringConfig, intel: &TokenIntel) -> i64 {
    let mut score = config.sss_base;

    if intel.mint_authority.is_some() || intel.freeze_authority.is_some() {
        score -= config.authority_penalty;
    }

    if let Some(pct) = intel.top10_holder_pct {
        // Highest threshold met wins; tiers do not stack
        let mut tiers: Vec<(f64, f64)> = config
            .top_holder_thresholds
            .iter()
            .copied()
            .zip(config.top_holder_penalties.iter().copied())
            .collect();
        tiers.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        for (threshold, penalty) in tiers {
            if pct >= threshold {
                score -= penalty;
                break;
            }
        }
    }

    if let Some(label) = &intel.risk_label {
        if label.to_lowercase().contains("high risk") {
            score -= config.risk_label_penalty;
        }
    }

    if let Some(count) = intel.creator_token_count {
        if count > config.creator_penalty_start {
            let extra = (count - config.creator_penalty_start) as f64;
            score -= (extra * config.creator_penalty_per_token).min(config.creator_penalty_cap);
        }
    }

    score.max(0.0) as i64
}

fn bracket_for_age<'a>(brackets: &'a [MmsBracket], age_minutes: f64) -> Option<&'a MmsBracket> {
    brackets
        .iter()
        .find(|b| match b.max_age_minutes {
            Some(max) => age_minutes < max,
            None => true,
        })
        .or_else(|| brackets.last())
}

/// Market-health score with age-aware expectations: younger tokens are
/// graded against smaller normalization constants and a lower cap.
pub fn compute_mms(config: &ScoringConfig, intel: &TokenIntel) -> i64 {
    let liquidity = intel.liquidity_usd.unwrap_or(0.0);
    let volume = intel.volume_24h_usd.unwrap_or(0.0);
    let market_cap = intel.market_cap_usd.unwrap_or(0.0);
    let age_minutes = intel.age_minutes.unwrap_or(0.0);

    let bracket = match bracket_for_age(&config.mms_brackets, age_minutes) {
        Some(bracket) => bracket,
        None => return 0,
    };

    let mut score = bracket.weight_liquidity * 100.0 * saturate(liquidity, bracket.norm_liquidity)
        + bracket.weight_volume * 100.0 * saturate(volume, bracket.norm_volume)
        + bracket.weight_market_cap * 100.0 * saturate(market_cap, bracket.norm_market_cap);

    if let Some(followers) = intel.twitter_followers {
        score += config.follower_weight * saturate(followers as f64, config.follower_norm);
    }

    // Suspicious-combination clamps cap the score, they never zero it:
    // dead volume at old age, flat price with no volume, or heavy liquidity
    // that nobody trades against (one-sided/fake liquidity).
    if age_minutes >= 1_440.0 && volume < 1_000.0 {
        score = score.min(20.0);
    } else if age_minutes >= 360.0 && volume < 500.0 {
        score = score.min(25.0);
    } else if volume < 100.0 {
        score = score.min(15.0);
    }

    let price_change = intel.price_change_24h.unwrap_or(0.0).abs();
    if volume < 100.0 && price_change < 0.1 {
        score = score.min(10.0);
    }

    if liquidity > 100_000.0 && volume < 1_000.0 {
        score = score.min(20.0);
    }

    (score.max(0.0) as i64).min(bracket.cap)
}

/// Data-quality confidence in [0.3, 1.0]: sparse intel cannot produce an
/// extreme score in either direction.
pub fn score_confidence(intel: &TokenIntel) -> f64 {
    let signals = 5.0;
    let mut present = 0.0;
    if intel.liquidity_usd.is_some() {
        present += 1.0;
    }
    if intel.market_cap_usd.is_some() {
        present += 1.0;
    }
    if intel.volume_24h_usd.is_some() {
        present += 1.0;
    }
    if intel.age_minutes.is_some() {
        present += 1.0;
    }
    if intel.risk_label.is_some() {
        present += 1.0;
    }

    let mut confidence: f64 = 0.3 + 0.7 * (present / signals);
    // Unknown age is the most dangerous gap: cap lower
    if intel.age_minutes.is_none() {
        confidence = confidence.min(0.6);
    }
    confidence.clamp(0.3, 1.0)
}

/// Blend SSS and MMS by asset age, then apply the confidence drag.
pub fn compute_final_score(intel: &TokenIntel) -> i64 {
    let sss = intel.sss_score as f64;
    let mms = intel.mms_score as f64;
    let age_days = intel.age_minutes.unwrap_or(0.0) / 1_440.0;

    let blended = if age_days < 7.0 {
        sss * 0.5 + mms * 0.5
    } else if age_days <= 30.0 {
        sss * 0.35 + mms * 0.65
    } else {
        sss * 0.25 + mms * 0.75
    };

    let final_score = blended * score_confidence(intel);
    (final_score.round().max(0.0) as i64).min(100)
}

/// Boolean tags feeding bucket assignment.
pub fn derive_tags(config: &ScoringConfig, intel: &TokenIntel) -> AssetTags {
    let age = intel.age_minutes;

    // Hatching: a newborn whose liquidity meets the floor or is still unknown
    let hatching = match age {
        Some(age) if age <= config.hatching_max_age_mins => match intel.liquidity_usd {
            Some(liquidity) => liquidity >= config.hatching_min_liquidity,
            None => true,
        },
        _ => false,
    };

    let cooking = match (intel.price_change_24h, intel.volume_24h_usd) {
        (Some(change), Some(volume)) => {
            change >= config.cooking_min_change_pct && volume >= config.cooking_min_volume
        }
        _ => false,
    };

    let fresh = matches!(age, Some(age) if age <= config.fresh_max_age_mins);

    AssetTags {
        hatching,
        cooking,
        fresh,
    }
}

/// Scheduling priority in [0, 100]: a weighted sum of score and
/// diminishing-returns liquidity/volume terms, minus an age-decay penalty
/// past the first hour.
pub fn compute_priority(intel: &TokenIntel) -> f64 {
    let score = intel.score as f64;
    let liquidity = intel.liquidity_usd.unwrap_or(0.0);
    let volume = intel.volume_24h_usd.unwrap_or(0.0);
    let age_minutes = intel.age_minutes.unwrap_or(0.0);

    let age_decay = 0.05 * (age_minutes - 60.0).max(0.0);
    let priority = 0.5 * score
        + 25.0 * saturate(liquidity, 10_000.0)
        + 25.0 * saturate(volume, 25_000.0)
        - age_decay;
    priority.clamp(0.0, 100.0)
}

/// Assign exactly one bucket by fixed precedence:
/// priority > hatching > fresh > cooking > top > standby.
pub fn assign_bucket(
    config: &ScoringConfig,
    intel: &TokenIntel,
    tags: AssetTags,
    priority: f64,
) -> Bucket {
    if priority >= config.priority_bucket_floor {
        Bucket::Priority
    } else if tags.hatching {
        Bucket::Hatching
    } else if tags.fresh {
        Bucket::Fresh
    } else if tags.cooking {
        Bucket::Cooking
    } else if intel.score >= config.top_bucket_score {
        Bucket::Top
    } else {
        Bucket::Standby
    }
}

/// Run the full scoring pass over an intel record in place.
pub fn score_intel(config: &ScoringConfig, intel: &mut TokenIntel) -> (AssetTags, Bucket, f64) {
    intel.sss_score = compute_sss(config, intel);
    intel.mms_score = compute_mms(config, intel);
    intel.confidence = score_confidence(intel);
    intel.score = compute_final_score(intel);

    let tags = derive_tags(config, intel);
    let priority = compute_priority(intel);
    let bucket = assign_bucket(config, intel, tags, priority);
    (tags, bucket, priority)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ScoringConfig {
        ScoringConfig::default()
    }

    fn intel_with(f: impl FnOnce(&mut TokenIntel)) -> TokenIntel {
        let mut intel = TokenIntel::new("test-mint");
        f(&mut intel);
        intel
    }

    #[test]
    fn test_sss_no_penalties() {
        let intel = intel_with(|i| {
            i.top10_holder_pct = Some(30.0);
            i.risk_label = Some("Low".to_string());
            i.creator_token_count = Some(1);
        });
        assert_eq!(compute_sss(&config(), &intel), 80);
    }

    #[test]
    fn test_sss_authority_penalty() {
        let intel = intel_with(|i| {
            i.mint_authority = Some("SomeAuthority".to_string());
        });
        assert_eq!(compute_sss(&config(), &intel), 20);
    }

    #[test]
    fn test_sss_holder_tiers_do_not_stack() {
        let cfg = config();
        let at = |pct: f64| {
            let intel = intel_with(|i| {
                i.top10_holder_pct = Some(pct);
            });
            compute_sss(&cfg, &intel)
        };
        assert_eq!(at(85.0), 40); // only the 80% tier applies
        assert_eq!(at(65.0), 55);
        assert_eq!(at(45.0), 70);
        assert_eq!(at(30.0), 80);
    }

    #[test]
    fn test_sss_creator_penalty_capped() {
        let cfg = config();
        let at = |count: u64| {
            let intel = intel_with(|i| {
                i.creator_token_count = Some(count);
            });
            compute_sss(&cfg, &intel)
        };
        assert_eq!(at(5), 80);
        assert_eq!(at(7), 74); // 2 beyond start, 3 each
        assert_eq!(at(50), 55); // capped at 25
    }

    #[test]
    fn test_sss_floors_at_zero() {
        let intel = intel_with(|i| {
            i.mint_authority = Some("auth".to_string());
            i.top10_holder_pct = Some(95.0);
            i.risk_label = Some("High Risk".to_string());
        });
        assert_eq!(compute_sss(&config(), &intel), 0);
    }

    #[test]
    fn test_mms_clamps_cap_but_never_zero() {
        // Old token, high liquidity, dead volume: one-sided liquidity clamp
        let intel = intel_with(|i| {
            i.age_minutes = Some(20_000.0);
            i.liquidity_usd = Some(500_000.0);
            i.volume_24h_usd = Some(200.0);
            i.market_cap_usd = Some(1_000_000.0);
            i.price_change_24h = Some(5.0);
        });
        let mms = compute_mms(&config(), &intel);
        assert!(mms > 0);
        assert!(mms <= 20);
    }

    #[test]
    fn test_mms_respects_bracket_cap() {
        let intel = intel_with(|i| {
            i.age_minutes = Some(10.0);
            i.liquidity_usd = Some(10_000_000.0);
            i.volume_24h_usd = Some(10_000_000.0);
            i.market_cap_usd = Some(10_000_000.0);
            i.price_change_24h = Some(50.0);
        });
        let mms = compute_mms(&config(), &intel);
        assert!(mms <= 85); // youngest bracket cap
    }

    #[test]
    fn test_confidence_sparse_vs_full() {
        // 2 of 5 signals present
        let sparse = intel_with(|i| {
            i.volume_24h_usd = Some(100.0);
            i.age_minutes = Some(60.0);
        });
        let confidence = score_confidence(&sparse);
        assert!(confidence <= 0.6 + 1e-9);
        assert!(confidence < 1.0);

        let full = intel_with(|i| {
            i.liquidity_usd = Some(100.0);
            i.market_cap_usd = Some(100.0);
            i.volume_24h_usd = Some(100.0);
            i.age_minutes = Some(60.0);
            i.risk_label = Some("Low".to_string());
        });
        assert!((score_confidence(&full) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_missing_age_caps_low() {
        let intel = intel_with(|i| {
            i.liquidity_usd = Some(100.0);
            i.market_cap_usd = Some(100.0);
            i.volume_24h_usd = Some(100.0);
            i.risk_label = Some("Low".to_string());
        });
        assert!(score_confidence(&intel) <= 0.6);
    }

    #[test]
    fn test_blend_shifts_with_age() {
        let scored = |age_minutes: f64| {
            let mut intel = intel_with(|i| {
                i.age_minutes = Some(age_minutes);
                i.liquidity_usd = Some(1.0);
                i.market_cap_usd = Some(1.0);
                i.volume_24h_usd = Some(1.0);
                i.risk_label = Some("Low".to_string());
            });
            intel.sss_score = 100;
            intel.mms_score = 0;
            compute_final_score(&intel)
        };
        // Full confidence in all cases; only the blend weights differ
        assert_eq!(scored(1_440.0), 50); // 50/50 under 7 days
        assert_eq!(scored(20_160.0), 35); // 35/65 up to 30 days
        assert_eq!(scored(100_000.0), 25); // 25/75 beyond
    }

    #[test]
    fn test_priority_strictly_decreases_past_one_hour() {
        let at_age = |age: f64| {
            let mut intel = intel_with(|i| {
                i.age_minutes = Some(age);
                i.liquidity_usd = Some(5_000.0);
                i.volume_24h_usd = Some(10_000.0);
            });
            intel.score = 60;
            compute_priority(&intel)
        };
        assert_eq!(at_age(30.0), at_age(59.0)); // no decay before the hour
        assert!(at_age(61.0) < at_age(60.0) + 1e-9);
        assert!(at_age(120.0) < at_age(61.0));
        assert!(at_age(600.0) < at_age(120.0));
    }

    #[test]
    fn test_priority_non_decreasing_in_score() {
        let at_score = |score: i64| {
            let mut intel = intel_with(|i| {
                i.age_minutes = Some(90.0);
                i.liquidity_usd = Some(5_000.0);
                i.volume_24h_usd = Some(10_000.0);
            });
            intel.score = score;
            compute_priority(&intel)
        };
        assert!(at_score(10) <= at_score(50));
        assert!(at_score(50) <= at_score(90));
    }

    #[test]
    fn test_bucket_precedence_priority_beats_hatching() {
        let cfg = config();
        let intel = intel_with(|i| {
            i.score = 90;
        });
        let tags = AssetTags {
            hatching: true,
            cooking: true,
            fresh: true,
        };
        assert_eq!(assign_bucket(&cfg, &intel, tags, 85.0), Bucket::Priority);
        assert_eq!(assign_bucket(&cfg, &intel, tags, 50.0), Bucket::Hatching);
    }

    #[test]
    fn test_bucket_precedence_chain() {
        let cfg = config();
        let intel = intel_with(|i| {
            i.score = 75;
        });
        let fresh_only = AssetTags {
            hatching: false,
            cooking: true,
            fresh: true,
        };
        assert_eq!(assign_bucket(&cfg, &intel, fresh_only, 10.0), Bucket::Fresh);

        let cooking_only = AssetTags {
            hatching: false,
            cooking: true,
            fresh: false,
        };
        assert_eq!(
            assign_bucket(&cfg, &intel, cooking_only, 10.0),
            Bucket::Cooking
        );

        let no_tags = AssetTags::default();
        assert_eq!(assign_bucket(&cfg, &intel, no_tags, 10.0), Bucket::Top);

        let dull = intel_with(|i| {
            i.score = 30;
        });
        assert_eq!(assign_bucket(&cfg, &dull, no_tags, 10.0), Bucket::Standby);
    }

    #[test]
    fn test_end_to_end_newly_discovered_hatchling() {
        // $500 liquidity, 10 minutes old, no authorities, 30% top-10 holders
        let cfg = config();
        let mut intel = intel_with(|i| {
            i.liquidity_usd = Some(500.0);
            i.age_minutes = Some(10.0);
            i.top10_holder_pct = Some(30.0);
            i.volume_24h_usd = Some(50.0);
            i.market_cap_usd = Some(2_000.0);
            i.risk_label = Some("Low".to_string());
        });
        let (tags, bucket, _priority) = score_intel(&cfg, &mut intel);

        assert_eq!(intel.sss_score, 80); // no penalties
        assert!(tags.hatching); // young, liquidity above the floor
        assert!(tags.fresh);
        assert_eq!(bucket, Bucket::Hatching); // hatching wins over fresh
    }
}
