use std::sync::Arc;
use std::time::Duration;

use monitor_core::{classify_rss_entry, AnnounceParser, RunStatistics};
use monitor_logging::{monitor_debug, monitor_info, monitor_warn};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::engine::EventSender;
use crate::irc::IrcClient;
use crate::rss::FeedSource;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
}

/// Drives both producers and feeds their events to the dispatcher.
pub struct Scheduler {
    sender: EventSender,
    stats: Arc<RunStatistics>,
    announce: AnnounceParser,
    poll_interval: Duration,
    irc: Option<IrcClient>,
    feed: Option<Arc<dyn FeedSource>>,
    poll_state: watch::Sender<PollState>,
}

impl Scheduler {
    pub fn new(sender: EventSender, stats: Arc<RunStatistics>, announce: AnnounceParser) -> Self {
        let (poll_state, _) = watch::channel(PollState::Idle);
        Self {
            sender,
            stats,
            announce,
            poll_interval: DEFAULT_POLL_INTERVAL,
            irc: None,
            feed: None,
            poll_state,
        }
    }

    pub fn with_irc(mut self, client: IrcClient) -> Self {
        self.irc = Some(client);
        self
    }

    pub fn with_feed(mut self, feed: Arc<dyn FeedSource>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn irc(&self) -> Option<&IrcClient> {
        self.irc.as_ref()
    }

    pub fn poll_state(&self) -> watch::Receiver<PollState> {
        self.poll_state.subscribe()
    }

    /// Run both producers until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        tokio::join!(self.listen(cancel.clone()), self.poll_loop(cancel));
        monitor_info!("[MONITOR] Producers stopped");
    }

    async fn listen(&self, cancel: CancellationToken) {
        let Some(client) = &self.irc else {
            return;
        };
        client.run(cancel, |line| self.handle_announcement(&line)).await;
    }

    fn handle_announcement(&self, line: &str) {
        match self.announce.classify(line) {
            Ok(Some(event)) => {
                monitor_debug!("[IRC] Announcement {} {}", event.id, event.title);
                self.sender.submit(event);
            }
            Ok(None) => {}
            Err(err) => {
                self.stats.record_parse_error();
                monitor_warn!("[IRC] Unparseable announcement ({err}): {line}");
            }
        }
    }

    async fn poll_loop(&self, cancel: CancellationToken) {
        let Some(feed) = &self.feed else {
            return;
        };
        monitor_info!("[RSS] Polling every {}s", self.poll_interval.as_secs());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.poll_once(feed.as_ref()) => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        self.poll_state.send_replace(PollState::Idle);
    }

    /// One poll: fetch the feed and submit every classifiable entry.
    /// Returns how many events were submitted.
    pub async fn poll_once(&self, feed: &dyn FeedSource) -> usize {
        self.poll_state.send_replace(PollState::Polling);
        self.stats.record_poll();

        let submitted = match feed.poll().await {
            Ok(entries) => {
                monitor_debug!("[RSS] Feed returned {} entries", entries.len());
                let mut submitted = 0;
                for entry in &entries {
                    match classify_rss_entry(entry) {
                        Ok(event) => {
                            if self.sender.submit(event) {
                                submitted += 1;
                            }
                        }
                        Err(err) => {
                            self.stats.record_parse_error();
                            monitor_debug!("[RSS] Skipping entry: {err}");
                        }
                    }
                }
                submitted
            }
            Err(err) => {
                self.stats.record_connection_error();
                monitor_warn!("[RSS] Poll failed: {err}");
                0
            }
        };

        self.poll_state.send_replace(PollState::Idle);
        submitted
    }
}
