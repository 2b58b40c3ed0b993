//! Maintenance worker: retention sweeps, stuck-claim recovery, and weekly
//! store compaction.

use std::time::Duration;

use crate::logger::{self, LogTag};
use crate::services::Services;

pub async fn run(services: Services) {
    let mut shutdown = services.shutdown.clone();
    let config = services.config.maintenance.clone();
    let interval = Duration::from_secs(config.interval_hours.max(1) * 3600);
    let mut runs_since_compaction: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = tokio::time::sleep(interval) => {
                match services.db.run_retention(&config) {
                    Ok(report) => {
                        logger::log(
                            LogTag::Maintenance,
                            "RETENTION",
                            &format!(
                                "snapshots={} rejected={} discovered={} claims_reset={}",
                                report.snapshots_deleted,
                                report.rejected_deleted,
                                report.discovered_deleted,
                                report.claims_reset
                            ),
                        );
                    }
                    Err(e) => {
                        logger::error(
                            LogTag::Maintenance,
                            &format!("Retention sweep failed: {}", e),
                        );
                    }
                }

                runs_since_compaction += 1;
                if runs_since_compaction >= 7 {
                    runs_since_compaction = 0;
                    match services.db.compact() {
                        Ok(()) => logger::log(
                            LogTag::Maintenance,
                            "COMPACTED",
                            "WAL truncated and store vacuumed",
                        ),
                        Err(e) => logger::error(
                            LogTag::Maintenance,
                            &format!("Compaction failed: {}", e),
                        ),
                    }
                }
            }
        }
    }
    logger::debug(LogTag::Maintenance, "Maintenance worker stopped");
}
