use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use monitor_core::{
    AnnounceParser, Criteria, DedupLedger, FeedEntry, Gate, ReleaseEvent, ReleaseId,
    RunStatistics, SizeBounds, Source, BYTES_PER_GIB,
};
use monitor_engine::{
    ConnectionError, Connector, Engine, FeedSource, FetchSettings, IrcClient, IrcSettings,
    IrcStream, Pipeline, PipelineSettings, ReqwestFetcher, Scheduler,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GRACE: Duration = Duration::from_secs(5);

struct Harness {
    server: MockServer,
    temp: TempDir,
    stats: Arc<RunStatistics>,
    ledger: Arc<DedupLedger>,
}

impl Harness {
    async fn new(expected_downloads: u64) -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rss/download/12345/key/Some.Show.torrent"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                b"d4:infod4:name4:showee".as_slice(),
                "application/x-bittorrent",
            ))
            .expect(expected_downloads)
            .mount(&server)
            .await;
        Self {
            server,
            temp: TempDir::new().unwrap(),
            stats: Arc::new(RunStatistics::new()),
            ledger: Arc::new(DedupLedger::new()),
        }
    }

    fn download_url(&self) -> String {
        format!("{}/rss/download/12345/key/Some.Show.torrent", self.server.uri())
    }

    fn engine(&self, bounds: SizeBounds) -> Engine {
        let settings = PipelineSettings {
            settle_delay: Duration::ZERO,
            ..PipelineSettings::new(self.temp.path())
        };
        let pipeline = Pipeline::new(
            Arc::new(ReqwestFetcher::new(FetchSettings::default())),
            settings,
            self.stats.clone(),
        );
        let gate = Gate::new(
            Criteria::new(["TV"], bounds),
            self.ledger.clone(),
        );
        Engine::new(gate, Arc::new(pipeline), self.stats.clone())
    }

    fn event(&self, source: Source, size_bytes: Option<u64>) -> ReleaseEvent {
        ReleaseEvent {
            id: ReleaseId::parse("TL-12345").unwrap(),
            title: "Some.Show".to_string(),
            category: "TV :: Episodes HD".to_string(),
            size_bytes,
            download_url: self.download_url(),
            source,
            freeleech: true,
        }
    }

    fn saved_files(&self) -> usize {
        std::fs::read_dir(self.temp.path()).unwrap().count()
    }
}

#[tokio::test]
async fn same_release_from_both_sources_downloads_once() {
    let harness = Harness::new(1).await;
    let handle = harness.engine(SizeBounds::default()).spawn();

    assert!(handle.submit(harness.event(Source::LiveFeed, Some(BYTES_PER_GIB))));
    assert!(handle.submit(harness.event(Source::PolledFeed, None)));
    assert!(handle.shutdown(GRACE).await);

    let snapshot = harness.stats.snapshot();
    assert_eq!(snapshot.matched, 1);
    assert_eq!(snapshot.downloaded, 1);
    assert_eq!(snapshot.errors, 0);
    assert_eq!(harness.ledger.len(), 1);
    assert_eq!(harness.saved_files(), 1);
}

#[tokio::test]
async fn oversized_release_is_filtered_before_the_ledger() {
    let harness = Harness::new(0).await;
    let bounds = SizeBounds::from_gigabytes(Some(5.0), Some(50.0));
    let engine = harness.engine(bounds);

    let decision = engine.decide(harness.event(Source::LiveFeed, Some(60 * BYTES_PER_GIB)));
    assert_eq!(decision, monitor_core::Decision::Filtered);
    assert!(harness.ledger.is_empty());

    engine.tracker().close();
    engine.tracker().wait().await;
    assert_eq!(harness.stats.snapshot().matched, 0);
    assert_eq!(harness.saved_files(), 0);
}

#[tokio::test]
async fn submit_fails_after_shutdown() {
    let harness = Harness::new(0).await;
    let handle = harness.engine(SizeBounds::default()).spawn();
    let sender = handle.sender();
    assert!(handle.shutdown(GRACE).await);
    assert!(!sender.submit(harness.event(Source::LiveFeed, None)));
}

/// Feed that always returns the same entries.
struct StaticFeed {
    entries: Vec<FeedEntry>,
}

#[async_trait::async_trait]
impl FeedSource for StaticFeed {
    async fn poll(&self) -> Result<Vec<FeedEntry>, ConnectionError> {
        Ok(self.entries.clone())
    }
}

struct OneShotConnector {
    stream: Mutex<VecDeque<tokio::io::DuplexStream>>,
}

#[async_trait::async_trait]
impl Connector for OneShotConnector {
    async fn connect(&self, _settings: &IrcSettings) -> Result<Box<dyn IrcStream>, ConnectionError> {
        match self.stream.lock().unwrap().pop_front() {
            Some(stream) => Ok(Box::new(stream)),
            None => Err(ConnectionError::Closed),
        }
    }
}

#[tokio::test]
async fn scheduler_poll_submits_classifiable_entries() {
    let harness = Harness::new(1).await;
    let handle = harness.engine(SizeBounds::default()).spawn();
    let scheduler = Scheduler::new(handle.sender(), harness.stats.clone(), AnnounceParser::new());

    let feed = StaticFeed {
        entries: vec![
            FeedEntry {
                title: Some("Some.Show".into()),
                link: Some(harness.download_url()),
                guid: Some("https://www.torrentleech.org/torrent/12345".into()),
                categories: vec!["TV :: Episodes HD".into(), "freeleech".into()],
                ..FeedEntry::default()
            },
            FeedEntry {
                title: Some("No identity".into()),
                ..FeedEntry::default()
            },
        ],
    };

    assert_eq!(scheduler.poll_once(&feed).await, 1);
    assert!(handle.shutdown(GRACE).await);

    let snapshot = harness.stats.snapshot();
    assert_eq!(snapshot.rss_polls, 1);
    assert_eq!(snapshot.parse_errors, 1);
    assert_eq!(snapshot.downloaded, 1);
}

#[tokio::test]
async fn live_and_polled_reports_converge_on_one_download() {
    let harness = Harness::new(1).await;
    let handle = harness.engine(SizeBounds::default()).spawn();

    let (client_io, server_io) = tokio::io::duplex(16 * 1024);
    let connector = Arc::new(OneShotConnector {
        stream: Mutex::new(VecDeque::from([client_io])),
    });
    let irc = IrcClient::new(
        IrcSettings::new("tlrss_test"),
        connector,
        harness.stats.clone(),
    );
    let feed = Arc::new(StaticFeed {
        entries: vec![FeedEntry {
            title: Some("Some.Show".into()),
            link: Some(harness.download_url()),
            guid: Some("https://www.torrentleech.org/torrent/12345".into()),
            categories: vec!["TV".into(), "freeleech".into()],
            ..FeedEntry::default()
        }],
    });
    let scheduler = Arc::new(
        Scheduler::new(handle.sender(), harness.stats.clone(), AnnounceParser::new())
            .with_irc(irc)
            .with_feed(feed)
            .with_poll_interval(Duration::from_millis(20)),
    );

    let cancel = CancellationToken::new();
    let producers = tokio::spawn({
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        async move { scheduler.run(cancel).await }
    });

    let (read, mut write) = tokio::io::split(server_io);
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await.unwrap() {
        if line.starts_with("USER") {
            break;
        }
    }
    write.write_all(b":irc.test 001 tlrss_test :Welcome\r\n").await.unwrap();
    write
        .write_all(b":irc.test 366 tlrss_test #tlannounces :End of /NAMES list.\r\n")
        .await
        .unwrap();
    let announce = format!(
        ":Bot!bot@host PRIVMSG #tlannounces :New Torrent Announcement | TL-12345 | Some.Show | TV | 1GB | FREELEECH | {}\r\n",
        harness.download_url()
    );
    write.write_all(announce.as_bytes()).await.unwrap();

    tokio::time::timeout(GRACE, async {
        while harness.stats.snapshot().rss_polls < 3 || harness.stats.snapshot().downloaded < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("both producers reported the release");

    cancel.cancel();
    producers.await.unwrap();
    assert!(handle.shutdown(GRACE).await);

    let snapshot = harness.stats.snapshot();
    assert_eq!(snapshot.matched, 1);
    assert_eq!(snapshot.downloaded, 1);
    assert_eq!(harness.saved_files(), 1);
}
