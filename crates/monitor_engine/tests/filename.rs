use monitor_core::{ReleaseEvent, ReleaseId, Source};
use monitor_engine::deterministic_filename;

fn event(id: &str, title: &str) -> ReleaseEvent {
    ReleaseEvent {
        id: ReleaseId::parse(id).unwrap(),
        title: title.to_string(),
        category: "TV".to_string(),
        size_bytes: None,
        download_url: "https://host/rss/download/1/k/x.torrent".to_string(),
        source: Source::LiveFeed,
        freeleech: true,
    }
}

#[test]
fn filename_carries_release_id_and_title() {
    let name = deterministic_filename(&event("12345", "Some.Movie.2024"));
    assert_eq!(name, "TL-12345.Some.Movie.2024.torrent");
}

#[test]
fn forbidden_characters_are_replaced_and_collapsed() {
    let name = deterministic_filename(&event("7", "What? A: Movie / Cut*"));
    assert_eq!(name, "TL-7.What_ A_ Movie _ Cut.torrent");
}

#[test]
fn empty_title_falls_back_to_id_only() {
    assert_eq!(deterministic_filename(&event("7", "  ...  ")), "TL-7.torrent");
}

#[test]
fn reserved_names_are_patched() {
    assert_eq!(deterministic_filename(&event("7", "con")), "TL-7.con_.torrent");
}

#[test]
fn long_titles_are_truncated_on_char_boundary() {
    let title = "é".repeat(200);
    let name = deterministic_filename(&event("9", &title));
    assert!(name.len() < 140);
    assert!(name.starts_with("TL-9."));
    assert!(name.ends_with(".torrent"));
}

#[test]
fn both_sources_share_one_filename() {
    let live = event("TL-42", "Show.S01E01");
    let mut polled = live.clone();
    polled.source = Source::PolledFeed;
    polled.download_url = "https://other/42.torrent".to_string();
    assert_eq!(deterministic_filename(&live), deterministic_filename(&polled));
}

#[test]
fn differing_titles_share_only_the_id_prefix() {
    let live = event("TL-42", "Show.S01E01");
    let mut polled = live.clone();
    polled.source = Source::PolledFeed;
    polled.title = "Show S01E01 1080p".to_string();

    let (a, b) = (deterministic_filename(&live), deterministic_filename(&polled));
    assert_ne!(a, b);
    assert!(a.starts_with("TL-42.") && b.starts_with("TL-42."));
}
