use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Run counters shared by the scheduler and the pipeline.
///
/// Every error kind also bumps the `errors` total.
#[derive(Debug)]
pub struct RunStatistics {
    started_at: Instant,
    rss_polls: AtomicU64,
    irc_connections: AtomicU64,
    matched: AtomicU64,
    downloaded: AtomicU64,
    forwarded: AtomicU64,
    skipped: AtomicU64,
    parse_errors: AtomicU64,
    download_failures: AtomicU64,
    relay_failures: AtomicU64,
    connection_errors: AtomicU64,
    errors: AtomicU64,
}

/// Plain copy of the counters at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub uptime: Duration,
    pub rss_polls: u64,
    pub irc_connections: u64,
    pub matched: u64,
    pub downloaded: u64,
    pub forwarded: u64,
    pub skipped: u64,
    pub parse_errors: u64,
    pub download_failures: u64,
    pub relay_failures: u64,
    pub connection_errors: u64,
    pub errors: u64,
}

impl StatsSnapshot {
    /// `"{h}h {m}m"`, the way the periodic report prints runtime.
    pub fn uptime_label(&self) -> String {
        let secs = self.uptime.as_secs();
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

impl Default for RunStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStatistics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            rss_polls: AtomicU64::new(0),
            irc_connections: AtomicU64::new(0),
            matched: AtomicU64::new(0),
            downloaded: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            download_failures: AtomicU64::new(0),
            relay_failures: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn record_poll(&self) {
        bump(&self.rss_polls);
    }

    pub fn record_connection(&self) {
        bump(&self.irc_connections);
    }

    pub fn record_match(&self) {
        bump(&self.matched);
    }

    pub fn record_downloaded(&self) {
        bump(&self.downloaded);
    }

    pub fn record_forwarded(&self) {
        bump(&self.forwarded);
    }

    pub fn record_skipped(&self) {
        bump(&self.skipped);
    }

    pub fn record_parse_error(&self) {
        bump(&self.parse_errors);
        bump(&self.errors);
    }

    pub fn record_download_failure(&self) {
        bump(&self.download_failures);
        bump(&self.errors);
    }

    pub fn record_relay_failure(&self) {
        bump(&self.relay_failures);
        bump(&self.errors);
    }

    pub fn record_connection_error(&self) {
        bump(&self.connection_errors);
        bump(&self.errors);
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime: self.uptime(),
            rss_polls: load(&self.rss_polls),
            irc_connections: load(&self.irc_connections),
            matched: load(&self.matched),
            downloaded: load(&self.downloaded),
            forwarded: load(&self.forwarded),
            skipped: load(&self.skipped),
            parse_errors: load(&self.parse_errors),
            download_failures: load(&self.download_failures),
            relay_failures: load(&self.relay_failures),
            connection_errors: load(&self.connection_errors),
            errors: load(&self.errors),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn load(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}
