//! Retention sweeps and store upkeep.

use anyhow::Result;
use rusqlite::params;
use std::time::Duration;

use super::{cutoff_str, Database};
use crate::config::MaintenanceConfig;

/// What one retention pass removed or repaired.
#[derive(Debug, Default, Clone, Copy)]
pub struct RetentionReport {
    pub snapshots_deleted: usize,
    pub rejected_deleted: usize,
    pub discovered_deleted: usize,
    pub claims_reset: usize,
}

impl Database {
    /// Terminal pruning: old snapshots, stale rejected rows, never-analyzed
    /// discoveries, plus recovery of claims orphaned by a crash.
    pub fn run_retention(&self, config: &MaintenanceConfig) -> Result<RetentionReport> {
        let mut report = RetentionReport::default();

        let snapshot_cutoff = cutoff_str(Duration::from_secs(
            (config.snapshot_retention_days.max(0) as u64) * 86_400,
        ));
        let rejected_cutoff = cutoff_str(Duration::from_secs(
            (config.rejected_retention_days.max(0) as u64) * 86_400,
        ));
        let discovered_cutoff = cutoff_str(Duration::from_secs(
            (config.discovered_retention_hours.max(0) as u64) * 3_600,
        ));

        let conn = self.conn();
        report.snapshots_deleted = conn.execute(
            "DELETE FROM snapshots WHERE snapshot_at < ?1",
            params![snapshot_cutoff],
        )?;
        report.rejected_deleted = conn.execute(
            "DELETE FROM assets WHERE status = 'rejected' AND discovered_at < ?1",
            params![rejected_cutoff],
        )?;
        report.discovered_deleted = conn.execute(
            "DELETE FROM assets WHERE status = 'discovered'
             AND last_analyzed_at IS NULL AND discovered_at < ?1",
            params![discovered_cutoff],
        )?;
        drop(conn);

        report.claims_reset = self.reset_stuck_claims(config.stuck_claim_mins)?;
        Ok(report)
    }

    /// Crash recovery: claims older than the window go back to discovered.
    pub fn reset_stuck_claims(&self, stuck_mins: i64) -> Result<usize> {
        let cutoff = cutoff_str(Duration::from_secs((stuck_mins.max(0) as u64) * 60));
        let conn = self.conn();
        let reset = conn.execute(
            "UPDATE assets SET status = 'discovered', claimed_at = NULL
             WHERE status = 'analyzing' AND claimed_at < ?1",
            params![cutoff],
        )?;
        Ok(reset)
    }

    /// WAL truncation + vacuum, run on the weekly maintenance tick
    pub fn compact(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        conn.execute_batch("VACUUM;")?;
        Ok(())
    }

    /// Final WAL flush on shutdown
    pub fn checkpoint(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stuck_claims_recovered() {
        let db = Database::open_in_memory().unwrap();
        db.insert_discovered("mint-a").unwrap();
        let claimed = db
            .claim_discovered_batch(1, Duration::from_secs(0))
            .unwrap();
        assert_eq!(claimed.len(), 1);

        // A zero-minute window treats the fresh claim as already stuck
        let reset = db.reset_stuck_claims(0).unwrap();
        assert_eq!(reset, 1);
        let counts = db.status_counts().unwrap();
        assert_eq!(counts, vec![("discovered".to_string(), 1)]);
    }

    #[test]
    fn test_retention_leaves_recent_rows() {
        let db = Database::open_in_memory().unwrap();
        db.insert_discovered("mint-a").unwrap();
        let config = MaintenanceConfig::default();
        let report = db.run_retention(&config).unwrap();
        assert_eq!(report.rejected_deleted, 0);
        assert_eq!(report.discovered_deleted, 0);
        assert_eq!(report.snapshots_deleted, 0);
        assert!(db.asset_exists("mint-a").unwrap());
    }
}
