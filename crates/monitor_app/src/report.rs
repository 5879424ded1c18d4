//! Periodic and final statistics reports.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use monitor_core::{DedupLedger, RunStatistics};
use monitor_logging::{monitor_info, monitor_warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct StatsReporter {
    stats: Arc<RunStatistics>,
    ledger: Arc<DedupLedger>,
    output_dir: PathBuf,
    categories: Vec<String>,
}

impl StatsReporter {
    pub fn new(
        stats: Arc<RunStatistics>,
        ledger: Arc<DedupLedger>,
        output_dir: PathBuf,
        categories: Vec<String>,
    ) -> Self {
        Self {
            stats,
            ledger,
            output_dir,
            categories,
        }
    }

    pub fn render(&self) -> Vec<String> {
        let s = self.stats.snapshot();
        let categories = if self.categories.is_empty() {
            "all".to_string()
        } else {
            self.categories.join(", ")
        };
        vec![
            format!("Runtime: {}", s.uptime_label()),
            format!("RSS polls: {} | IRC connections: {}", s.rss_polls, s.irc_connections),
            format!(
                "Matched: {} | Downloaded: {} | Forwarded: {} | Skipped: {}",
                s.matched, s.downloaded, s.forwarded, s.skipped
            ),
            format!(
                "Errors: {} (parse {}, download {}, relay {}, connection {})",
                s.errors, s.parse_errors, s.download_failures, s.relay_failures, s.connection_errors
            ),
            format!("Processed IDs: {}", self.ledger.len()),
            format!("Output: {}", self.output_dir.display()),
            format!("Categories: {categories}"),
        ]
    }

    pub fn log(&self, heading: &str) {
        monitor_info!("[STATS] {heading}");
        for line in self.render() {
            monitor_info!("[STATS] {line}");
        }
    }

    /// Log a report every `interval` until cancelled.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.log("Periodic report"),
            }
        }
    }

    /// Run the periodic report on its own task.
    pub fn spawn_periodic(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> PeriodicReport {
        let reporter = self.clone();
        PeriodicReport {
            handle: tokio::spawn(async move { reporter.run(interval, cancel).await }),
        }
    }
}

pub struct PeriodicReport {
    handle: JoinHandle<()>,
}

impl PeriodicReport {
    /// Wait for the task after cancellation. `false` if it panicked.
    pub async fn finish(self) -> bool {
        match self.handle.await {
            Ok(()) => true,
            Err(err) => {
                monitor_warn!("[STATS] Reporter ended abnormally: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_core::ReleaseId;
    use pretty_assertions::assert_eq;

    #[test]
    fn report_lists_counters_and_filter() {
        let stats = Arc::new(RunStatistics::new());
        let ledger = Arc::new(DedupLedger::new());
        stats.record_poll();
        stats.record_match();
        stats.record_downloaded();
        stats.record_download_failure();
        ledger.admit(&ReleaseId::parse("TL-1").unwrap());

        let reporter = StatsReporter::new(
            stats,
            ledger,
            PathBuf::from("./torrents"),
            vec!["TV".to_string(), "Movies".to_string()],
        );
        let lines = reporter.render();

        assert_eq!(lines[0], "Runtime: 0h 0m");
        assert_eq!(lines[1], "RSS polls: 1 | IRC connections: 0");
        assert_eq!(lines[2], "Matched: 1 | Downloaded: 1 | Forwarded: 0 | Skipped: 0");
        assert_eq!(lines[3], "Errors: 1 (parse 0, download 1, relay 0, connection 0)");
        assert_eq!(lines[4], "Processed IDs: 1");
        assert_eq!(lines[6], "Categories: TV, Movies");
    }

    #[test]
    fn empty_filter_reads_as_all() {
        let reporter = StatsReporter::new(
            Arc::new(RunStatistics::new()),
            Arc::new(DedupLedger::new()),
            PathBuf::from("out"),
            Vec::new(),
        );
        assert_eq!(reporter.render().last().unwrap(), "Categories: all");
    }

    #[tokio::test]
    async fn periodic_report_stops_on_cancel() {
        let reporter = Arc::new(StatsReporter::new(
            Arc::new(RunStatistics::new()),
            Arc::new(DedupLedger::new()),
            PathBuf::from("out"),
            Vec::new(),
        ));
        let cancel = CancellationToken::new();
        let periodic = reporter.spawn_periodic(Duration::from_secs(3600), cancel.clone());

        cancel.cancel();
        assert!(periodic.finish().await);
    }

    #[tokio::test]
    async fn panicked_reporter_is_reported_not_swallowed() {
        let periodic = PeriodicReport {
            handle: tokio::spawn(async { panic!("reporter failed") }),
        };
        assert!(!periodic.finish().await);
    }
}
