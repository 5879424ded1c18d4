use std::sync::Arc;

use monitor_core::{classify_rss_entry, ReleaseId, Source, BYTES_PER_GIB};
use monitor_engine::{
    decode_feed, ConnectionError, FailureKind, FeedSource, FetchSettings, ReqwestFetcher, RssClient,
};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>TorrentLeech RSS</title>
    <link>https://www.torrentleech.org</link>
    <item>
      <title><![CDATA[Some.Show.S01E01.1080p]]></title>
      <link>https://www.torrentleech.org/rss/download/12345/secretkey/Some.Show.S01E01.1080p.torrent</link>
      <guid isPermaLink="true">https://www.torrentleech.org/torrent/12345</guid>
      <category>TV :: Episodes HD</category>
      <category>freeleech</category>
      <description>Category: TV :: Episodes HD - Size: 1.5 GB</description>
      <enclosure url="https://www.torrentleech.org/rss/download/12345/secretkey/Some.Show.S01E01.1080p.torrent" length="2147483648" type="application/x-bittorrent"/>
    </item>
    <item>
      <title>Paid.Movie.2024</title>
      <link>https://www.torrentleech.org/rss/download/777/secretkey/Paid.Movie.2024.torrent</link>
      <guid>https://www.torrentleech.org/torrent/777</guid>
      <category>Movies</category>
      <description>Size: 700 MB</description>
    </item>
  </channel>
</rss>"#;

#[test]
fn decodes_items_with_all_fields() {
    let entries = decode_feed(FEED.as_bytes()).unwrap();
    assert_eq!(entries.len(), 2);

    let first = &entries[0];
    assert_eq!(first.title.as_deref(), Some("Some.Show.S01E01.1080p"));
    assert_eq!(
        first.guid.as_deref(),
        Some("https://www.torrentleech.org/torrent/12345")
    );
    assert_eq!(first.categories, vec!["TV :: Episodes HD", "freeleech"]);
    assert_eq!(first.enclosure_length, Some(2 * BYTES_PER_GIB));
    assert!(first
        .enclosure_url
        .as_deref()
        .is_some_and(|url| url.ends_with(".torrent")));

    let second = &entries[1];
    assert_eq!(second.enclosure_length, None);
    assert_eq!(second.description.as_deref(), Some("Size: 700 MB"));
}

#[test]
fn decoded_items_classify_into_polled_events() {
    let entries = decode_feed(FEED.as_bytes()).unwrap();
    let event = classify_rss_entry(&entries[0]).unwrap();

    assert_eq!(event.id, ReleaseId::parse("TL-12345").unwrap());
    assert_eq!(event.category, "TV :: Episodes HD");
    assert_eq!(event.size_bytes, Some(2 * BYTES_PER_GIB));
    assert_eq!(event.source, Source::PolledFeed);
    assert!(event.freeleech);

    let paid = classify_rss_entry(&entries[1]).unwrap();
    assert!(!paid.freeleech);
    assert_eq!(paid.size_bytes, Some(700 * 1024 * 1024));
}

#[test]
fn channel_level_elements_are_not_entries() {
    let xml = r#"<rss><channel><title>Only a channel</title></channel></rss>"#;
    assert!(decode_feed(xml.as_bytes()).unwrap().is_empty());
}

#[test]
fn broken_document_is_a_decode_error() {
    let xml = r#"<rss><channel><item><title>x</item></channel></rss>"#;
    assert!(matches!(
        decode_feed(xml.as_bytes()),
        Err(ConnectionError::Decode(_))
    ));
}

#[tokio::test]
async fn client_polls_feed_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rss/secretkey"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(FEED, "application/rss+xml"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = Arc::new(ReqwestFetcher::new(FetchSettings::for_feed()));
    let client = RssClient::new(format!("{}/rss/secretkey", server.uri()), fetcher);

    let entries = client.poll().await.unwrap();
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn http_failure_surfaces_as_connection_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rss/secretkey"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let fetcher = Arc::new(ReqwestFetcher::new(FetchSettings::for_feed()));
    let client = RssClient::new(format!("{}/rss/secretkey", server.uri()), fetcher);

    match client.poll().await {
        Err(ConnectionError::Fetch(err)) => assert_eq!(err.kind, FailureKind::HttpStatus(503)),
        other => panic!("expected fetch error, got {other:?}"),
    }
}
