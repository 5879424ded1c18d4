use std::sync::Arc;

use monitor_core::{
    parse_irc_line, parse_rss_entry, Criteria, Decision, DedupLedger, FeedEntry, Gate, SizeBounds,
};

fn scenario_gate() -> Gate {
    Gate::new(
        Criteria::new(["Movies"], SizeBounds::from_gigabytes(Some(5.0), Some(50.0))),
        Arc::new(DedupLedger::new()),
    )
}

fn rss_twin() -> FeedEntry {
    FeedEntry {
        title: Some("Some.Movie.2024 freeleech".to_string()),
        link: Some("https://www.torrentleech.org/rss/download/12345/key/Some.Movie.2024.torrent".to_string()),
        guid: Some("https://www.torrentleech.org/torrent/12345".to_string()),
        categories: vec!["Movies".to_string()],
        ..FeedEntry::default()
    }
}

#[test]
fn live_then_polled_report_is_admitted_once() {
    monitor_logging::initialize_for_tests();
    let gate = scenario_gate();
    let live = parse_irc_line(
        "New Torrent Announcement | TL-12345 | Some.Movie.2024 | Movies | 10GB | FREELEECH | http://x/12345.torrent",
    )
    .unwrap();
    let polled = parse_rss_entry(&rss_twin()).unwrap();

    assert_eq!(gate.evaluate(&live), Decision::Admitted);
    assert_eq!(gate.evaluate(&polled), Decision::Duplicate);
    assert_eq!(gate.evaluate(&live), Decision::Duplicate);
    assert_eq!(gate.ledger().len(), 1);
}

#[test]
fn oversize_release_never_reaches_the_ledger() {
    let gate = scenario_gate();
    let event = parse_irc_line(
        "New Torrent Announcement | TL-6 | Huge.Movie | Movies | 60GB | FREELEECH | http://x/6.torrent",
    )
    .unwrap();

    assert_eq!(gate.evaluate(&event), Decision::Filtered);
    assert!(gate.ledger().is_empty());
}

#[test]
fn non_freeleech_release_is_dropped_first() {
    let gate = scenario_gate();
    let event = parse_irc_line(
        "New Torrent Announcement | TL-7 | Paid.Movie | Movies | 10GB | http://x/7.torrent",
    )
    .unwrap();

    assert_eq!(gate.evaluate(&event), Decision::NotFreeleech);
    assert!(gate.ledger().is_empty());
}

#[test]
fn filtered_release_can_still_be_admitted_when_it_later_matches() {
    let gate = scenario_gate();
    let mut event = parse_rss_entry(&rss_twin()).unwrap();
    event.size_bytes = Some(60 * monitor_core::BYTES_PER_GIB);
    assert_eq!(gate.evaluate(&event), Decision::Filtered);

    event.size_bytes = None;
    assert_eq!(gate.evaluate(&event), Decision::Admitted);
}
