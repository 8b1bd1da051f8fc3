//! Periodic log rotation: archive every non-empty check log, then empty it.

use monitor_core::{
    Result,
    logs::{Archive, LogSink},
};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::clock::Clock;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationReport {
    pub rotated: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct LogRotator {
    logs: Arc<dyn LogSink>,
    clock: Arc<dyn Clock>,
}

impl LogRotator {
    pub fn new(logs: Arc<dyn LogSink>, clock: Arc<dyn Clock>) -> Self {
        Self { logs, clock }
    }

    /// Compress each open log into `<name>-<now millis>` and truncate it once
    /// the archive is written. A log that fails is left untouched and the
    /// others still rotate. Failing to list the logs ends the run.
    pub async fn rotate(&self) -> Result<RotationReport> {
        let names = self.logs.list(false).await?;
        let mut report = RotationReport::default();
        if names.is_empty() {
            debug!("no logs to rotate");
            return Ok(report);
        }

        let stamp = self.clock.now_millis();
        for name in names {
            let archive = format!("{name}-{stamp}");
            match self.logs.compress(&name, &archive).await {
                Ok(Archive::Written) => match self.logs.truncate(&name).await {
                    Ok(()) => {
                        debug!(log = %name, %archive, "log rotated");
                        report.rotated += 1;
                    }
                    Err(e) => {
                        error!(log = %name, "could not truncate log after compressing: {}", e);
                        report.failed += 1;
                    }
                },
                Ok(Archive::Empty) => report.skipped += 1,
                Err(e) => {
                    error!(log = %name, "could not compress log: {}", e);
                    report.failed += 1;
                }
            }
        }

        info!(
            rotated = report.rotated,
            skipped = report.skipped,
            failed = report.failed,
            "log rotation finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, testing::MemoryLogSink};
    use std::sync::atomic::Ordering;

    const NOW: i64 = 1_700_000_000_000;

    fn rotator(logs: Arc<MemoryLogSink>) -> LogRotator {
        LogRotator::new(logs, Arc::new(ManualClock::new(NOW)))
    }

    #[tokio::test]
    async fn rotates_non_empty_logs_and_skips_empty_ones() {
        let logs = Arc::new(MemoryLogSink::default());
        logs.append("a", "one").await.unwrap();
        logs.append("a", "two").await.unwrap();
        logs.append("b", "x").await.unwrap();
        logs.truncate("b").await.unwrap();

        let report = rotator(logs.clone()).rotate().await.unwrap();

        assert_eq!(report, RotationReport { rotated: 1, skipped: 1, failed: 0 });
        assert!(logs.lines("a").is_empty());
        assert_eq!(
            logs.archives().get(&format!("a-{NOW}")).map(String::as_str),
            Some("one\ntwo\n")
        );
    }

    #[tokio::test]
    async fn one_failing_log_does_not_stop_the_rest() {
        let logs = Arc::new(MemoryLogSink::default());
        logs.append("bad", "keep me").await.unwrap();
        logs.append("good", "line").await.unwrap();
        logs.fail_compress.lock().unwrap().insert("bad".to_string());

        let report = rotator(logs.clone()).rotate().await.unwrap();

        assert_eq!(report, RotationReport { rotated: 1, skipped: 0, failed: 1 });
        assert_eq!(logs.lines("bad"), vec!["keep me"]);
        assert!(logs.lines("good").is_empty());
    }

    #[tokio::test]
    async fn listing_failure_ends_the_run() {
        let logs = Arc::new(MemoryLogSink::default());
        logs.fail_list.store(true, Ordering::SeqCst);

        assert!(rotator(logs).rotate().await.is_err());
    }
}
