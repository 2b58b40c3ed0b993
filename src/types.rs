//! Core data model shared across the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Asset lifecycle status as persisted in the store.
///
/// `Analyzing` is the transient claim state: the intake worker flips
/// `discovered` rows to `analyzing` in a single conditional UPDATE so two
/// workers can never pick up the same row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetStatus {
    Discovered,
    Analyzing,
    Analyzed,
    Rejected,
    Served,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Discovered => "discovered",
            AssetStatus::Analyzing => "analyzing",
            AssetStatus::Analyzed => "analyzed",
            AssetStatus::Rejected => "rejected",
            AssetStatus::Served => "served",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "discovered" => Some(AssetStatus::Discovered),
            "analyzing" => Some(AssetStatus::Analyzing),
            "analyzed" => Some(AssetStatus::Analyzed),
            "rejected" => Some(AssetStatus::Rejected),
            "served" => Some(AssetStatus::Served),
            _ => None,
        }
    }
}

/// Scheduling bucket assigned by the scoring engine.
///
/// Precedence when several tags apply: Priority > Hatching > Fresh > Cooking
/// > Top > Standby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bucket {
    Standby,
    Fresh,
    Hatching,
    Cooking,
    Top,
    Priority,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Standby => "standby",
            Bucket::Fresh => "fresh",
            Bucket::Hatching => "hatching",
            Bucket::Cooking => "cooking",
            Bucket::Top => "top",
            Bucket::Priority => "priority",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "fresh" => Bucket::Fresh,
            "hatching" => Bucket::Hatching,
            "cooking" => Bucket::Cooking,
            "top" => Bucket::Top,
            "priority" => Bucket::Priority,
            _ => Bucket::Standby,
        }
    }

    /// Ordering weight for re-analysis selection (higher refreshes first)
    pub fn precedence(&self) -> i32 {
        match self {
            Bucket::Priority => 5,
            Bucket::Hatching => 4,
            Bucket::Fresh => 3,
            Bucket::Cooking => 2,
            Bucket::Top => 1,
            Bucket::Standby => 0,
        }
    }
}

/// One normalized market-data sample for an asset.
///
/// Providers return wildly different shapes; each client module reduces its
/// payload to this struct at the edge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub price_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub volume_24h_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,
    pub price_change_24h: Option<f64>,
    pub pair_address: Option<String>,
    pub pair_created_at: Option<DateTime<Utc>>,
    pub source: Option<String>,
}

/// On-chain facts about the asset itself (authorities, metadata, holders).
#[derive(Debug, Clone, Default)]
pub struct AssetFacts {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub mint_authority: Option<String>,
    pub freeze_authority: Option<String>,
    pub creator_address: Option<String>,
    pub top10_holder_pct: Option<f64>,
    pub holders_count: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
    pub socials: HashMap<String, String>,
}

/// The full enrichment record persisted per asset.
///
/// Every field is optional by design: providers fail, lie or omit, and sparse
/// intel must flow through scoring rather than abort the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenIntel {
    pub mint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquidity_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_24h_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_change_24h: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_minutes: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top10_holder_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holders_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint_authority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freeze_authority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator_token_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_followers: Option<u64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub socials: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sss_score: i64,
    #[serde(default)]
    pub mms_score: i64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub confidence: f64,
}

impl TokenIntel {
    pub fn new(mint: &str) -> Self {
        Self {
            mint: mint.to_string(),
            ..Default::default()
        }
    }

    /// Apply a market snapshot onto this record
    pub fn apply_snapshot(&mut self, snap: &MarketSnapshot) {
        if snap.price_usd.is_some() {
            self.price_usd = snap.price_usd;
        }
        if snap.liquidity_usd.is_some() {
            self.liquidity_usd = snap.liquidity_usd;
        }
        if snap.volume_24h_usd.is_some() {
            self.volume_24h_usd = snap.volume_24h_usd;
        }
        if snap.market_cap_usd.is_some() {
            self.market_cap_usd = snap.market_cap_usd;
        }
        if snap.price_change_24h.is_some() {
            self.price_change_24h = snap.price_change_24h;
        }
        if snap.pair_address.is_some() {
            self.pair_address = snap.pair_address.clone();
        }
    }
}

/// Boolean tags derived by the scoring engine before bucket assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetTags {
    pub hatching: bool,
    pub cooking: bool,
    pub fresh: bool,
}

/// A snapshot row read back from the store, with its age attached.
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub snapshot: MarketSnapshot,
    pub snapshot_at: DateTime<Utc>,
    pub age_secs: i64,
}
