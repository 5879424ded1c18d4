use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use monitor_core::{format_gigabytes, torrent_size, ReleaseEvent, RunStatistics, SizeBounds};
use monitor_logging::{monitor_debug, monitor_error, monitor_info, monitor_warn};

use crate::fetch::Fetcher;
use crate::filename::deterministic_filename;
use crate::persist::AtomicFileWriter;
use crate::relay::Relay;
use crate::{FailureKind, FetchError, Outcome};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub output_dir: PathBuf,
    /// Pause between saving and uploading.
    pub settle_delay: Duration,
    pub relay_folder: String,
    /// Applied to the metainfo when the announcement carried no size.
    pub size_bounds: SizeBounds,
}

impl PipelineSettings {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            settle_delay: Duration::from_secs(5),
            relay_folder: "/".to_string(),
            size_bounds: SizeBounds::default(),
        }
    }
}

/// Fetch, save and optionally relay one admitted release.
pub struct Pipeline {
    fetcher: Arc<dyn Fetcher>,
    relay: Option<Arc<dyn Relay>>,
    writer: AtomicFileWriter,
    settings: PipelineSettings,
    stats: Arc<RunStatistics>,
}

impl Pipeline {
    pub fn new(fetcher: Arc<dyn Fetcher>, settings: PipelineSettings, stats: Arc<RunStatistics>) -> Self {
        Self {
            fetcher,
            relay: None,
            writer: AtomicFileWriter::new(settings.output_dir.clone()),
            settings,
            stats,
        }
    }

    pub fn with_relay(mut self, relay: Arc<dyn Relay>) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn output_dir(&self) -> &std::path::Path {
        self.writer.dir()
    }

    pub fn relay_enabled(&self) -> bool {
        self.relay.is_some()
    }

    pub async fn process(&self, event: &ReleaseEvent) -> Outcome {
        let outcome = self.run(event).await;
        match &outcome {
            Outcome::Downloaded(_) => self.stats.record_downloaded(),
            Outcome::Forwarded(_) => {
                self.stats.record_downloaded();
                self.stats.record_forwarded();
            }
            Outcome::ForwardFailed { .. } => {
                self.stats.record_downloaded();
                self.stats.record_relay_failure();
            }
            Outcome::DownloadFailed(_) => self.stats.record_download_failure(),
            Outcome::Skipped(_) => self.stats.record_skipped(),
        }
        outcome
    }

    async fn run(&self, event: &ReleaseEvent) -> Outcome {
        let filename = deterministic_filename(event);
        let target = self.writer.target(&filename);
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            monitor_info!("[DOWNLOAD] Skipping {}, already saved at {}", event.id, target.display());
            return Outcome::Skipped(target);
        }

        let size = event
            .size_bytes
            .map(format_gigabytes)
            .unwrap_or_else(|| "unknown size".to_string());
        monitor_info!(
            "[DOWNLOAD] {} {} [{}] ({size}) from {}",
            event.id,
            event.title,
            event.category,
            event.source
        );

        let output = match self.fetcher.fetch(&event.download_url).await {
            Ok(output) => output,
            Err(err) => {
                monitor_error!("[DOWNLOAD] Failed {}: {err}", event.id);
                return Outcome::DownloadFailed(err);
            }
        };

        if event.size_bytes.is_none() && !self.within_bounds(event, &output.bytes) {
            return Outcome::Skipped(target);
        }

        let writer = self.writer.clone();
        let written = tokio::task::spawn_blocking(move || writer.write(&filename, &output.bytes)).await;
        let path = match written {
            Ok(Ok(path)) => path,
            Ok(Err(err)) => return self.persist_failed(event, err.to_string()),
            Err(err) => return self.persist_failed(event, err.to_string()),
        };
        monitor_info!("[DOWNLOAD] Saved {}", path.display());

        let Some(relay) = &self.relay else {
            return Outcome::Downloaded(path);
        };

        tokio::time::sleep(self.settings.settle_delay).await;
        match relay.upload(&path, &self.settings.relay_folder).await {
            Ok(()) => {
                monitor_info!("[FTP] Forwarded {}", event.id);
                Outcome::Forwarded(path)
            }
            Err(err) => {
                monitor_warn!("[FTP] Giving up on {}, file kept at {}: {err}", event.id, path.display());
                Outcome::ForwardFailed {
                    path,
                    error: err.to_string(),
                }
            }
        }
    }

    /// Unreadable metainfo passes, same as a missing announced size.
    fn within_bounds(&self, event: &ReleaseEvent, metainfo: &[u8]) -> bool {
        let bounds = self.settings.size_bounds;
        if bounds.is_unbounded() {
            return true;
        }
        match torrent_size(metainfo) {
            Ok(size) if bounds.contains(Some(size)) => {
                monitor_debug!("[DOWNLOAD] {} declares {}", event.id, format_gigabytes(size));
                true
            }
            Ok(size) => {
                monitor_info!(
                    "[DOWNLOAD] Skipping {}, {} is outside the size bounds",
                    event.id,
                    format_gigabytes(size)
                );
                false
            }
            Err(err) => {
                monitor_warn!("[DOWNLOAD] Could not read the size of {}: {err}", event.id);
                true
            }
        }
    }

    fn persist_failed(&self, event: &ReleaseEvent, message: String) -> Outcome {
        monitor_error!("[DOWNLOAD] Could not save {}: {message}", event.id);
        Outcome::DownloadFailed(FetchError::new(FailureKind::Persist, message))
    }
}
