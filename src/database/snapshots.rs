//! Snapshot history: immutable market-data samples per asset.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{now_str, parse_ts, Database};
use crate::types::{MarketSnapshot, StoredSnapshot, TokenIntel};

impl Database {
    /// Append a snapshot and stamp the asset's last_snapshot_at.
    /// Snapshots are never mutated afterwards; retention prunes them by age.
    pub fn save_snapshot(&self, mint: &str, intel: &TokenIntel) -> Result<()> {
        let now = now_str();
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO snapshots (
                mint, snapshot_at, liquidity_usd, volume_24h_usd,
                market_cap_usd, price_usd, price_change_24h
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                mint,
                now,
                intel.liquidity_usd,
                intel.volume_24h_usd,
                intel.market_cap_usd,
                intel.price_usd,
                intel.price_change_24h,
            ],
        )
        .context("save_snapshot")?;
        conn.execute(
            "UPDATE assets SET last_snapshot_at = ?1 WHERE mint = ?2",
            params![now, mint],
        )?;
        Ok(())
    }

    /// Latest stored sample for an asset, with its age attached. Used as the
    /// "last known good" fallback when a live refresh fails.
    pub fn latest_snapshot(&self, mint: &str) -> Result<Option<StoredSnapshot>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT snapshot_at, liquidity_usd, volume_24h_usd, market_cap_usd,
                        price_usd, price_change_24h
                 FROM snapshots WHERE mint = ?1
                 ORDER BY snapshot_at DESC LIMIT 1",
                params![mint],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<f64>>(1)?,
                        row.get::<_, Option<f64>>(2)?,
                        row.get::<_, Option<f64>>(3)?,
                        row.get::<_, Option<f64>>(4)?,
                        row.get::<_, Option<f64>>(5)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.and_then(
            |(at, liquidity, volume, market_cap, price, price_change)| {
                let snapshot_at = parse_ts(&at)?;
                Some(StoredSnapshot {
                    snapshot: MarketSnapshot {
                        liquidity_usd: liquidity,
                        volume_24h_usd: volume,
                        market_cap_usd: market_cap,
                        price_usd: price,
                        price_change_24h: price_change,
                        ..Default::default()
                    },
                    snapshot_at,
                    age_secs: (Utc::now() - snapshot_at).num_seconds(),
                })
            },
        ))
    }

    pub fn snapshot_count(&self, mint: &str) -> Result<i64> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM snapshots WHERE mint = ?1",
            params![mint],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_roundtrip_with_age() {
        let db = Database::open_in_memory().unwrap();
        db.insert_discovered("mint-a").unwrap();
        let intel = TokenIntel {
            mint: "mint-a".to_string(),
            liquidity_usd: Some(1234.5),
            volume_24h_usd: Some(678.9),
            price_usd: Some(0.001),
            ..Default::default()
        };
        db.save_snapshot("mint-a", &intel).unwrap();

        let stored = db.latest_snapshot("mint-a").unwrap().expect("snapshot");
        assert_eq!(stored.snapshot.liquidity_usd, Some(1234.5));
        assert_eq!(stored.snapshot.volume_24h_usd, Some(678.9));
        assert!(stored.age_secs >= 0);
        assert!(stored.age_secs < 5);
        assert!(db.latest_snapshot("missing").unwrap().is_none());
    }

    #[test]
    fn test_latest_snapshot_picks_newest() {
        let db = Database::open_in_memory().unwrap();
        db.insert_discovered("mint-a").unwrap();
        let mut intel = TokenIntel::new("mint-a");
        intel.liquidity_usd = Some(1.0);
        db.save_snapshot("mint-a", &intel).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        intel.liquidity_usd = Some(2.0);
        db.save_snapshot("mint-a", &intel).unwrap();

        assert_eq!(db.snapshot_count("mint-a").unwrap(), 2);
        let stored = db.latest_snapshot("mint-a").unwrap().unwrap();
        assert_eq!(stored.snapshot.liquidity_usd, Some(2.0));
    }
}
