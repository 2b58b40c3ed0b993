//! SQLite persistence layer.
//!
//! A single configured connection behind a mutex is the system of record and
//! the synchronization point of last resort: all cross-task coordination
//! (what has been discovered, what needs re-analysis, what was served) flows
//! through it, which is what makes the daemon crash-restart-safe.

mod assets;
mod dispatch;
mod maintenance;
mod snapshots;

pub use assets::ReanalysisCandidate;
pub use maintenance::RetentionReport;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::logger::{self, LogTag};

/// Timestamp format used for every stored datetime. Lexicographic order
/// matches chronological order, so plain string comparisons work in SQL.
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Current UTC time in storage format
pub fn now_str() -> String {
    Utc::now().format(TS_FORMAT).to_string()
}

/// Storage-format timestamp `duration` in the past
pub fn cutoff_str(duration: Duration) -> String {
    let delta = chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
    (Utc::now() - delta).format(TS_FORMAT).to_string()
}

/// Parse a stored timestamp back to a DateTime
pub fn parse_ts(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, TS_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[derive(Clone)]
pub struct Database {
    connection: Arc<Mutex<Connection>>,
}

fn configure_connection(connection: &Connection) -> rusqlite::Result<()> {
    connection.pragma_update(None, "journal_mode", "WAL")?;
    connection.pragma_update(None, "synchronous", "NORMAL")?;
    connection.pragma_update(None, "temp_store", "memory")?;
    connection.busy_timeout(std::time::Duration::from_millis(30_000))?;
    Ok(())
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let connection = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        configure_connection(&connection).context("Failed to configure database connection")?;
        let database = Self {
            connection: Arc::new(Mutex::new(connection)),
        };
        database.init_schema()?;
        logger::log(LogTag::Database, "OPENED", &path.display().to_string());
        Ok(database)
    }

    /// In-memory database for tests
    pub fn open_in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory().context("Failed to open in-memory db")?;
        let database = Self {
            connection: Arc::new(Mutex::new(connection)),
        };
        database.init_schema()?;
        Ok(database)
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        // A poisoned mutex means another thread panicked mid-write; the data
        // itself is still protected by SQLite, so keep going.
        match self.connection.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS assets (
                mint TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                intel_json TEXT,
                discovered_at TEXT NOT NULL,
                last_analyzed_at TEXT,
                last_snapshot_at TEXT,
                last_served_at TEXT,
                claimed_at TEXT,
                final_score INTEGER DEFAULT 0,
                sss_score INTEGER DEFAULT 0,
                mms_score INTEGER DEFAULT 0,
                age_minutes REAL,
                is_hatching INTEGER DEFAULT 0,
                is_cooking INTEGER DEFAULT 0,
                is_fresh INTEGER DEFAULT 0,
                bucket TEXT DEFAULT 'standby',
                priority REAL DEFAULT 0,
                liquidity_usd REAL,
                volume_24h_usd REAL
            );

            CREATE TABLE IF NOT EXISTS snapshots (
                mint TEXT NOT NULL,
                snapshot_at TEXT NOT NULL,
                liquidity_usd REAL,
                volume_24h_usd REAL,
                market_cap_usd REAL,
                price_usd REAL,
                price_change_24h REAL,
                PRIMARY KEY (mint, snapshot_at)
            );

            CREATE TABLE IF NOT EXISTS dispatch_records (
                chat_id INTEGER NOT NULL,
                segment TEXT NOT NULL,
                message_id INTEGER,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (chat_id, segment)
            );

            CREATE TABLE IF NOT EXISTS served_history (
                mint TEXT NOT NULL,
                served_at TEXT NOT NULL,
                PRIMARY KEY (mint, served_at)
            );

            CREATE INDEX IF NOT EXISTS idx_assets_status ON assets(status);
            CREATE INDEX IF NOT EXISTS idx_assets_bucket ON assets(bucket);
            CREATE INDEX IF NOT EXISTS idx_assets_last_snapshot ON assets(last_snapshot_at);
            CREATE INDEX IF NOT EXISTS idx_snapshots_mint_time ON snapshots(mint, snapshot_at DESC);
            CREATE INDEX IF NOT EXISTS idx_served_history_time ON served_history(served_at);",
        )
        .context("Failed to initialize schema")?;
        Ok(())
    }

    /// Queue depth by status, for diagnostics
    pub fn status_counts(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM assets GROUP BY status ORDER BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Bucket distribution over live assets, for diagnostics
    pub fn bucket_counts(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT bucket, COUNT(*) FROM assets
             WHERE status IN ('analyzed', 'served')
             GROUP BY bucket ORDER BY bucket",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_roundtrip() {
        let now = now_str();
        let parsed = parse_ts(&now).expect("parse own output");
        let delta = (Utc::now() - parsed).num_seconds().abs();
        assert!(delta < 2);
    }

    #[test]
    fn test_cutoff_sorts_before_now() {
        let cutoff = cutoff_str(Duration::from_secs(60));
        assert!(cutoff < now_str());
    }

    #[test]
    fn test_schema_initializes_in_memory() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.status_counts().unwrap().is_empty());
        assert!(db.bucket_counts().unwrap().is_empty());
    }

    #[test]
    fn test_reopen_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mintscout.db");
        {
            let db = Database::open(&path).unwrap();
            db.insert_discovered("mint-a").unwrap();
        }
        // A restart picks up exactly where the last process stopped
        let db = Database::open(&path).unwrap();
        assert!(db.asset_exists("mint-a").unwrap());
        assert_eq!(
            db.status_counts().unwrap(),
            vec![("discovered".to_string(), 1)]
        );
    }
}
