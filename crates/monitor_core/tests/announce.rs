use monitor_core::{
    parse_irc_line, AnnounceParser, DownloadLinks, ParseError, ReleaseId, Source, BYTES_PER_GIB,
    UNKNOWN_CATEGORY,
};
use pretty_assertions::assert_eq;

const SCENARIO_LINE: &str = "New Torrent Announcement | TL-12345 | Some.Movie.2024 | Movies | 10GB | FREELEECH | http://x/12345.torrent";

const BOT_LINE: &str = ":_AnnounceBot_!Announce@torrentleech.org PRIVMSG #tlannounces :\x0300,04New Torrent Announcement:\x0300,12 <TV :: Episodes HD>  Name:'Show.S01E01.1080p' uploaded by 'Anonymous' freeleech - \x0301,15 https://www.torrentleech.org/torrent/240001";

fn init_logging() {
    monitor_logging::initialize_for_tests();
}

#[test]
fn delimited_announcement_yields_full_event() {
    init_logging();
    let event = parse_irc_line(SCENARIO_LINE).expect("announcement parses");

    assert_eq!(event.id, ReleaseId::parse("12345").unwrap());
    assert_eq!(event.id.to_string(), "TL-12345");
    assert_eq!(event.title, "Some.Movie.2024");
    assert_eq!(event.category, "Movies");
    assert_eq!(event.size_bytes, Some(10 * BYTES_PER_GIB));
    assert_eq!(event.download_url, "http://x/12345.torrent");
    assert_eq!(event.source, Source::LiveFeed);
    assert!(event.freeleech);
}

#[test]
fn full_protocol_line_is_accepted() {
    init_logging();
    let raw = format!(":Bot!bot@host PRIVMSG #tlannounces :{SCENARIO_LINE}\r\n");
    let event = parse_irc_line(&raw).expect("announcement parses");
    assert_eq!(event.id.as_str(), "12345");
}

#[test]
fn missing_trailing_fields_are_tolerated() {
    init_logging();
    let event =
        parse_irc_line("New Torrent Announcement | TL-77 | Bare.Title | http://x/77.torrent")
            .expect("partial line still parses");

    assert_eq!(event.title, "Bare.Title");
    assert_eq!(event.category, UNKNOWN_CATEGORY);
    assert_eq!(event.size_bytes, None);
    assert!(!event.freeleech);
}

#[test]
fn non_numeric_size_becomes_none() {
    init_logging();
    let event = parse_irc_line(
        "New Torrent Announcement | TL-8 | T | Movies | lots | FREELEECH | http://x/8.torrent",
    )
    .expect("size failure is not fatal");
    assert_eq!(event.size_bytes, None);
    assert!(event.freeleech);
}

#[test]
fn chatter_is_noise_not_an_error() {
    init_logging();
    let parser = AnnounceParser::new();
    assert_eq!(parser.classify("hello everyone"), Ok(None));
    assert_eq!(parser.classify(""), Ok(None));
}

#[test]
fn announcement_without_id_is_malformed() {
    init_logging();
    let parser = AnnounceParser::new();
    let result = parser.classify("New Torrent Announcement | ??? | Title");
    assert!(matches!(result, Err(ParseError::MissingId(_))));
    assert_eq!(parse_irc_line("New Torrent Announcement | ??? | Title"), None);
}

#[test]
fn announcement_without_link_is_malformed_unless_template_exists() {
    init_logging();
    let line = "New Torrent Announcement | TL-9 | Title | Movies | 1GB | FREELEECH";
    let err = AnnounceParser::new().classify(line).unwrap_err();
    assert_eq!(err, ParseError::MissingDownloadUrl(ReleaseId::parse("9").unwrap()));

    let links = DownloadLinks::from_feed_url("https://www.torrentleech.org/rss/secretkey").unwrap();
    let event = AnnounceParser::with_links(links)
        .classify(line)
        .unwrap()
        .unwrap();
    assert_eq!(
        event.download_url,
        "https://www.torrentleech.org/rss/download/9/secretkey/Title.torrent"
    );
}

#[test]
fn bot_layout_is_parsed() {
    init_logging();
    let event = parse_irc_line(BOT_LINE).expect("bot line parses");

    assert_eq!(event.id.as_str(), "240001");
    assert_eq!(event.title, "Show.S01E01.1080p");
    assert_eq!(event.category, "TV :: Episodes HD");
    assert_eq!(event.size_bytes, None);
    assert!(event.freeleech);
    assert_eq!(
        event.download_url,
        "https://www.torrentleech.org/torrent/240001"
    );
}

#[test]
fn bot_layout_uses_link_template_for_page_urls() {
    init_logging();
    let links = DownloadLinks::from_feed_url("https://www.torrentleech.org/rss/abc123").unwrap();
    let event = AnnounceParser::with_links(links)
        .classify(BOT_LINE)
        .unwrap()
        .unwrap();
    assert_eq!(
        event.download_url,
        "https://www.torrentleech.org/rss/download/240001/abc123/Show.S01E01.1080p.torrent"
    );
}

#[test]
fn bot_layout_freeleech_requires_marker_after_uploader() {
    init_logging();
    let line = "New Torrent Announcement: <Games> Name:'freeleech.tools' uploaded by 'Someone' - https://www.torrentleech.org/torrent/5";
    let event = parse_irc_line(line).expect("bot line parses");
    assert!(!event.freeleech);
}

#[test]
fn link_template_needs_an_rss_key() {
    assert!(DownloadLinks::from_feed_url("https://www.torrentleech.org/").is_none());
    assert!(DownloadLinks::from_feed_url("ftp://host/rss/key").is_none());
    assert!(DownloadLinks::from_feed_url("not a url").is_none());
}
