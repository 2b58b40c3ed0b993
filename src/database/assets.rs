//! Asset state machine queries.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, ToSql};
use std::collections::HashSet;
use std::time::Duration;

use super::{cutoff_str, now_str, parse_ts, Database};
use crate::types::{AssetStatus, AssetTags, Bucket, TokenIntel};

/// An asset due for re-analysis, with enough context to order the batch.
#[derive(Debug, Clone)]
pub struct ReanalysisCandidate {
    pub mint: String,
    pub bucket: Bucket,
    pub last_analyzed_at: DateTime<Utc>,
}

impl Database {
    /// Insert a fresh discovery. Returns false when the asset already exists
    /// in any state - an asset is created exactly once.
    pub fn insert_discovered(&self, mint: &str) -> Result<bool> {
        let conn = self.conn();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO assets (mint, status, discovered_at) VALUES (?1, 'discovered', ?2)",
                params![mint, now_str()],
            )
            .context("insert_discovered")?;
        Ok(inserted > 0)
    }

    pub fn asset_exists(&self, mint: &str) -> Result<bool> {
        let conn = self.conn();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM assets WHERE mint = ?1 LIMIT 1",
                params![mint],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Atomically claim a batch of discovered assets for analysis.
    ///
    /// Claiming and the status transition happen in one conditional UPDATE so
    /// concurrent intake workers can never double-process a row. Only rows
    /// past the indexing grace period are eligible, oldest first.
    pub fn claim_discovered_batch(
        &self,
        limit: usize,
        indexing_grace: Duration,
    ) -> Result<Vec<String>> {
        let conn = self.conn();
        let grace_cutoff = cutoff_str(indexing_grace);
        let mut stmt = conn.prepare(
            "UPDATE assets SET status = 'analyzing', claimed_at = ?1
             WHERE mint IN (
                 SELECT mint FROM assets
                 WHERE status = 'discovered' AND discovered_at <= ?2
                 ORDER BY discovered_at ASC
                 LIMIT ?3
             )
             RETURNING mint",
        )?;
        let mints = stmt
            .query_map(params![now_str(), grace_cutoff, limit as i64], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("claim_discovered_batch")?;
        Ok(mints)
    }

    /// Enrichment failed or came back empty: park the asset.
    pub fn mark_rejected(&self, mint: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE assets SET status = 'rejected', claimed_at = NULL WHERE mint = ?1",
            params![mint],
        )?;
        Ok(())
    }

    /// Persist a completed analysis: intel, scores, tags, bucket, priority.
    ///
    /// With `preserve_served` a previously served asset keeps its status so
    /// re-analysis never un-serves it; otherwise the asset lands in
    /// `analyzed`.
    pub fn persist_analysis(
        &self,
        mint: &str,
        intel: &TokenIntel,
        tags: AssetTags,
        bucket: Bucket,
        priority: f64,
        preserve_served: bool,
    ) -> Result<()> {
        let conn = self.conn();
        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM assets WHERE mint = ?1",
                params![mint],
                |row| row.get(0),
            )
            .optional()?;
        let status = match current.as_deref().and_then(AssetStatus::from_str) {
            Some(AssetStatus::Served) if preserve_served => AssetStatus::Served,
            _ => AssetStatus::Analyzed,
        };

        let intel_json =
            serde_json::to_string(intel).context("serialize intel")?;
        conn.execute(
            "INSERT INTO assets (
                mint, status, intel_json, discovered_at, last_analyzed_at,
                final_score, sss_score, mms_score, age_minutes,
                is_hatching, is_cooking, is_fresh, bucket, priority,
                liquidity_usd, volume_24h_usd
            ) VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(mint) DO UPDATE SET
                status = excluded.status,
                intel_json = excluded.intel_json,
                last_analyzed_at = excluded.last_analyzed_at,
                final_score = excluded.final_score,
                sss_score = excluded.sss_score,
                mms_score = excluded.mms_score,
                age_minutes = excluded.age_minutes,
                is_hatching = excluded.is_hatching,
                is_cooking = excluded.is_cooking,
                is_fresh = excluded.is_fresh,
                bucket = excluded.bucket,
                priority = excluded.priority,
                liquidity_usd = excluded.liquidity_usd,
                volume_24h_usd = excluded.volume_24h_usd,
                claimed_at = NULL",
            params![
                mint,
                status.as_str(),
                intel_json,
                now_str(),
                intel.score,
                intel.sss_score,
                intel.mms_score,
                intel.age_minutes,
                tags.hatching as i64,
                tags.cooking as i64,
                tags.fresh as i64,
                bucket.as_str(),
                priority,
                intel.liquidity_usd,
                intel.volume_24h_usd,
            ],
        )
        .context("persist_analysis")?;
        Ok(())
    }

    /// Load the stored intel record for one asset
    pub fn get_intel(&self, mint: &str) -> Result<Option<TokenIntel>> {
        let conn = self.conn();
        let json: Option<String> = conn
            .query_row(
                "SELECT intel_json FROM assets WHERE mint = ?1",
                params![mint],
                |row| row.get(0),
            )
            .optional()?;
        Ok(json
            .as_deref()
            .and_then(|j| serde_json::from_str(j).ok()))
    }

    pub fn asset_discovered_at(&self, mint: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn();
        let raw: Option<String> = conn
            .query_row(
                "SELECT discovered_at FROM assets WHERE mint = ?1",
                params![mint],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.as_deref().and_then(parse_ts))
    }

    /// Assets due for a refresh: analyzed/served rows whose last analysis is
    /// older than their bucket's cadence. The minimum cadence prefilters the
    /// scan; exact per-bucket filtering and ordering happen here.
    pub fn due_for_reanalysis(
        &self,
        cadence_mins: &dyn Fn(Bucket) -> i64,
        min_cadence_mins: i64,
        limit: usize,
    ) -> Result<Vec<ReanalysisCandidate>> {
        let prefilter = cutoff_str(Duration::from_secs((min_cadence_mins.max(1) as u64) * 60));
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT mint, bucket, last_analyzed_at FROM assets
             WHERE status IN ('analyzed', 'served')
               AND last_analyzed_at IS NOT NULL
               AND last_analyzed_at <= ?1",
        )?;
        let rows = stmt
            .query_map(params![prefilter], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        drop(conn);

        let now = Utc::now();
        let mut due: Vec<ReanalysisCandidate> = rows
            .into_iter()
            .filter_map(|(mint, bucket, analyzed_at)| {
                let bucket = Bucket::from_str(&bucket);
                let last = parse_ts(&analyzed_at)?;
                let cadence = cadence_mins(bucket);
                if (now - last).num_minutes() >= cadence {
                    Some(ReanalysisCandidate {
                        mint,
                        bucket,
                        last_analyzed_at: last,
                    })
                } else {
                    None
                }
            })
            .collect();

        // Hot buckets first, then stalest first
        due.sort_by(|a, b| {
            b.bucket
                .precedence()
                .cmp(&a.bucket.precedence())
                .then(a.last_analyzed_at.cmp(&b.last_analyzed_at))
        });
        due.truncate(limit);
        Ok(due)
    }

    /// Rejected assets eligible for a second look, oldest first
    pub fn second_chance_candidates(&self, limit: usize) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT mint FROM assets WHERE status = 'rejected'
             ORDER BY discovered_at ASC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Second chance: a rejected asset re-enters the discovery queue
    pub fn revive(&self, mint: &str) -> Result<bool> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE assets SET status = 'discovered', claimed_at = NULL
             WHERE mint = ?1 AND status = 'rejected'",
            params![mint],
        )?;
        Ok(updated > 0)
    }

    /// Mark assets as served by the dispatcher
    pub fn mark_served(&self, mints: &[String]) -> Result<()> {
        if mints.is_empty() {
            return Ok(());
        }
        let now = now_str();
        let conn = self.conn();
        for mint in mints {
            conn.execute(
                "UPDATE assets SET status = 'served', last_served_at = ?1 WHERE mint = ?2",
                params![now, mint],
            )?;
            conn.execute(
                "INSERT OR IGNORE INTO served_history (mint, served_at) VALUES (?1, ?2)",
                params![mint, now],
            )?;
        }
        Ok(())
    }

    /// Mints served within the cooldown window (excluded from new pushes)
    pub fn recently_served(&self, cooldown: Duration) -> Result<HashSet<String>> {
        let cutoff = cutoff_str(cooldown);
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT DISTINCT mint FROM served_history WHERE served_at >= ?1")?;
        let rows = stmt
            .query_map(params![cutoff], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(rows)
    }

    fn select_intel(
        &self,
        where_clause: &str,
        order_clause: &str,
        leading: &[&dyn ToSql],
        cooldown: &HashSet<String>,
        limit: usize,
    ) -> Result<Vec<TokenIntel>> {
        let cooldown: Vec<&String> = cooldown.iter().collect();
        let exclusion = if cooldown.is_empty() {
            String::new()
        } else {
            let placeholders = vec!["?"; cooldown.len()].join(",");
            format!(" AND mint NOT IN ({})", placeholders)
        };
        let sql = format!(
            "SELECT intel_json FROM assets
             WHERE status IN ('analyzed', 'served') AND intel_json IS NOT NULL {} {}
             {} LIMIT {}",
            where_clause, exclusion, order_clause, limit
        );

        let mut bound: Vec<&dyn ToSql> = Vec::with_capacity(leading.len() + cooldown.len());
        bound.extend_from_slice(leading);
        for mint in &cooldown {
            bound.push(*mint);
        }

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(bound.as_slice(), |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .iter()
            .filter_map(|json| serde_json::from_str(json).ok())
            .collect())
    }

    /// Primary segment query: by boolean tag with a score floor
    pub fn select_by_tag(
        &self,
        tag_column: &str,
        min_score: i64,
        cooldown: &HashSet<String>,
        limit: usize,
    ) -> Result<Vec<TokenIntel>> {
        // tag_column is one of our own identifiers, never user input
        let clause = format!("AND {} = 1 AND final_score >= ?", tag_column);
        self.select_intel(
            &clause,
            "ORDER BY last_analyzed_at DESC, final_score DESC",
            &[&min_score],
            cooldown,
            limit,
        )
    }

    /// Top segment: best scores outright
    pub fn select_top(
        &self,
        min_score: i64,
        cooldown: &HashSet<String>,
        limit: usize,
    ) -> Result<Vec<TokenIntel>> {
        self.select_intel(
            "AND final_score >= ?",
            "ORDER BY final_score DESC, last_analyzed_at DESC",
            &[&min_score],
            cooldown,
            limit,
        )
    }

    /// Fallback: highest recent volume when a tag query comes back empty
    pub fn select_by_volume(
        &self,
        min_volume: f64,
        cooldown: &HashSet<String>,
        limit: usize,
    ) -> Result<Vec<TokenIntel>> {
        self.select_intel(
            "AND volume_24h_usd >= ?",
            "ORDER BY volume_24h_usd DESC",
            &[&min_volume],
            cooldown,
            limit,
        )
    }

    /// Last resort: most recently analyzed assets
    pub fn select_by_recency(
        &self,
        cooldown: &HashSet<String>,
        limit: usize,
    ) -> Result<Vec<TokenIntel>> {
        self.select_intel(
            "",
            "ORDER BY last_analyzed_at DESC",
            &[],
            cooldown,
            limit,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzed_intel(mint: &str, score: i64, volume: f64) -> TokenIntel {
        TokenIntel {
            mint: mint.to_string(),
            score,
            volume_24h_usd: Some(volume),
            liquidity_usd: Some(1000.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_discovery_is_create_once() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.insert_discovered("mint-a").unwrap());
        assert!(!db.insert_discovered("mint-a").unwrap());
        assert!(db.asset_exists("mint-a").unwrap());
        assert!(!db.asset_exists("mint-b").unwrap());
    }

    #[test]
    fn test_claim_is_atomic_and_disjoint() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..6 {
            db.insert_discovered(&format!("mint-{}", i)).unwrap();
        }
        let first = db
            .claim_discovered_batch(4, Duration::from_secs(0))
            .unwrap();
        let second = db
            .claim_discovered_batch(4, Duration::from_secs(0))
            .unwrap();
        assert_eq!(first.len(), 4);
        assert_eq!(second.len(), 2);
        let overlap: Vec<_> = first.iter().filter(|m| second.contains(m)).collect();
        assert!(overlap.is_empty());
        // Nothing left to claim
        assert!(db
            .claim_discovered_batch(4, Duration::from_secs(0))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_indexing_grace_defers_claims() {
        let db = Database::open_in_memory().unwrap();
        db.insert_discovered("young").unwrap();
        let claimed = db
            .claim_discovered_batch(10, Duration::from_secs(3600))
            .unwrap();
        assert!(claimed.is_empty());
    }

    #[test]
    fn test_persist_analysis_preserves_served() {
        let db = Database::open_in_memory().unwrap();
        db.insert_discovered("mint-a").unwrap();
        let intel = analyzed_intel("mint-a", 50, 100.0);
        db.persist_analysis(
            "mint-a",
            &intel,
            AssetTags::default(),
            Bucket::Standby,
            10.0,
            true,
        )
        .unwrap();
        db.mark_served(&["mint-a".to_string()]).unwrap();
        // Re-analysis with preserve keeps served
        db.persist_analysis(
            "mint-a",
            &intel,
            AssetTags::default(),
            Bucket::Standby,
            10.0,
            true,
        )
        .unwrap();
        let counts = db.status_counts().unwrap();
        assert_eq!(counts, vec![("served".to_string(), 1)]);
    }

    #[test]
    fn test_second_chance_revive() {
        let db = Database::open_in_memory().unwrap();
        db.insert_discovered("mint-a").unwrap();
        db.claim_discovered_batch(1, Duration::from_secs(0)).unwrap();
        db.mark_rejected("mint-a").unwrap();
        assert_eq!(
            db.second_chance_candidates(10).unwrap(),
            vec!["mint-a".to_string()]
        );
        assert!(db.revive("mint-a").unwrap());
        // Already revived: no-op
        assert!(!db.revive("mint-a").unwrap());
        let claimed = db
            .claim_discovered_batch(1, Duration::from_secs(0))
            .unwrap();
        assert_eq!(claimed, vec!["mint-a".to_string()]);
    }

    #[test]
    fn test_segment_selection_with_cooldown() {
        let db = Database::open_in_memory().unwrap();
        for (mint, score, volume) in
            [("a", 80, 500.0), ("b", 60, 5000.0), ("c", 40, 50.0)]
        {
            db.insert_discovered(mint).unwrap();
            let intel = analyzed_intel(mint, score, volume);
            let tags = AssetTags {
                hatching: true,
                ..Default::default()
            };
            db.persist_analysis(mint, &intel, tags, Bucket::Hatching, 50.0, false)
                .unwrap();
        }

        let none = HashSet::new();
        let picked = db.select_by_tag("is_hatching", 0, &none, 10).unwrap();
        assert_eq!(picked.len(), 3);

        let mut cooldown = HashSet::new();
        cooldown.insert("a".to_string());
        let picked = db.select_by_tag("is_hatching", 50, &cooldown, 10).unwrap();
        let mints: Vec<_> = picked.iter().map(|i| i.mint.as_str()).collect();
        assert_eq!(mints, vec!["b"]);

        let by_volume = db.select_by_volume(100.0, &none, 10).unwrap();
        assert_eq!(by_volume[0].mint, "b");
    }

    #[test]
    fn test_served_cooldown_window() {
        let db = Database::open_in_memory().unwrap();
        db.insert_discovered("mint-a").unwrap();
        db.mark_served(&["mint-a".to_string()]).unwrap();
        let served = db.recently_served(Duration::from_secs(3600)).unwrap();
        assert!(served.contains("mint-a"));
    }
}
