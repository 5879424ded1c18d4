use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::{parse_size, ParseError, ReleaseEvent, ReleaseId, Source, UNKNOWN_CATEGORY};

/// Leading text of every announce-bot release line.
pub const ANNOUNCE_HEADER: &str = "New Torrent Announcement";

pub(crate) const FREELEECH_MARKER: &str = "freeleech";

const MAX_LINK_TITLE_CHARS: usize = 200;

static BOT_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"torrent[:/](\d+)").unwrap());
static BOT_CATEGORY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<([^>]+)>").unwrap());
static BOT_TITLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Name:'([^']+)'").unwrap());
static BOT_FREELEECH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)uploaded by '[^']*'\s+freeleech\b").unwrap());
static BOT_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());

/// Builds direct metainfo links from the personal key embedded in the feed URL
/// (`https://host/rss/<key>` → `https://host/rss/download/<id>/<key>/<title>.torrent`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLinks {
    base: Url,
    rss_key: String,
}

impl DownloadLinks {
    pub fn from_feed_url(feed_url: &str) -> Option<Self> {
        let url = Url::parse(feed_url.trim()).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
        let rss_key = match segments.as_slice() {
            [.., marker, key] if marker.eq_ignore_ascii_case("rss") => key.to_string(),
            _ => return None,
        };

        let mut base = url.clone();
        base.set_path("");
        base.set_query(None);
        base.set_fragment(None);
        Some(Self { base, rss_key })
    }

    pub fn download_url(&self, id: &ReleaseId, title: &str) -> String {
        let filename = format!("{}.torrent", link_safe_title(title));
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.clear().extend([
                "rss",
                "download",
                id.as_str(),
                self.rss_key.as_str(),
                filename.as_str(),
            ]);
        }
        url.to_string()
    }
}

/// Turns raw live-feed lines into release events.
#[derive(Debug, Clone, Default)]
pub struct AnnounceParser {
    links: Option<DownloadLinks>,
}

impl AnnounceParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_links(links: DownloadLinks) -> Self {
        Self { links: Some(links) }
    }

    /// `Ok(None)` for chatter that is not an announcement, `Err` for an
    /// announcement that cannot be turned into an event.
    pub fn classify(&self, raw: &str) -> Result<Option<ReleaseEvent>, ParseError> {
        let text = strip_formatting(message_text(raw));
        let Some(body) = after_header(&text) else {
            return Ok(None);
        };

        let event = if body.trim_start().starts_with('|') {
            self.parse_delimited(body)?
        } else {
            self.parse_bot_layout(body)?
        };
        Ok(Some(event))
    }

    fn parse_delimited(&self, body: &str) -> Result<ReleaseEvent, ParseError> {
        let mut fields = body.split('|').map(str::trim).skip(1);
        let raw_id = fields.next().unwrap_or_default();

        let mut announced_url = None;
        let mut freeleech = false;
        let mut positional = Vec::new();
        for field in fields.filter(|f| !f.is_empty()) {
            if is_url(field) {
                announced_url.get_or_insert(field);
            } else if field.eq_ignore_ascii_case(FREELEECH_MARKER) {
                freeleech = true;
            } else {
                positional.push(field);
            }
        }

        let id = ReleaseId::parse(raw_id)
            .or_else(|| announced_url.and_then(ReleaseId::from_locator))
            .ok_or_else(|| ParseError::MissingId(body.trim().to_string()))?;
        let title = positional
            .first()
            .map(|t| t.to_string())
            .unwrap_or_else(|| id.to_string());
        let category = positional
            .get(1)
            .map(|c| c.to_string())
            .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
        let size_bytes = positional.get(2).and_then(|s| parse_size(s));
        let download_url = self.resolve_download_url(&id, &title, announced_url)?;

        Ok(ReleaseEvent {
            id,
            title,
            category,
            size_bytes,
            download_url,
            source: Source::LiveFeed,
            freeleech,
        })
    }

    fn parse_bot_layout(&self, body: &str) -> Result<ReleaseEvent, ParseError> {
        let id = BOT_ID
            .captures(body)
            .and_then(|caps| ReleaseId::parse(&caps[1]))
            .ok_or_else(|| ParseError::MissingId(body.trim().to_string()))?;
        let title = BOT_TITLE
            .captures(body)
            .map(|caps| caps[1].trim().to_string())
            .unwrap_or_else(|| id.to_string());
        let category = BOT_CATEGORY
            .captures(body)
            .map(|caps| caps[1].trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
        let announced_url = BOT_URL.find(body).map(|m| m.as_str());
        let download_url = self.resolve_download_url(&id, &title, announced_url)?;

        Ok(ReleaseEvent {
            id,
            title,
            category,
            size_bytes: None,
            download_url,
            source: Source::LiveFeed,
            freeleech: BOT_FREELEECH.is_match(body),
        })
    }

    fn resolve_download_url(
        &self,
        id: &ReleaseId,
        title: &str,
        announced: Option<&str>,
    ) -> Result<String, ParseError> {
        if let Some(url) = announced.filter(|u| is_direct_download(u)) {
            return Ok(url.to_string());
        }
        if let Some(links) = &self.links {
            return Ok(links.download_url(id, title));
        }
        announced
            .map(str::to_string)
            .ok_or_else(|| ParseError::MissingDownloadUrl(id.clone()))
    }
}

/// Parse one live-feed line with no link template; noise and malformed lines
/// both yield `None`.
pub fn parse_irc_line(raw: &str) -> Option<ReleaseEvent> {
    AnnounceParser::new().classify(raw).ok().flatten()
}

/// Remove mIRC formatting codes (colour, bold, italic, underline, reverse, reset).
pub fn strip_formatting(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\x03' => {
                skip_digits(&mut chars);
                let mut lookahead = chars.clone();
                if lookahead.next() == Some(',')
                    && lookahead.peek().is_some_and(|d| d.is_ascii_digit())
                {
                    chars.next();
                    skip_digits(&mut chars);
                }
            }
            '\x02' | '\x0f' | '\x11' | '\x16' | '\x1d' | '\x1e' | '\x1f' => {}
            _ => out.push(c),
        }
    }
    out
}

fn skip_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    for _ in 0..2 {
        if chars.peek().is_some_and(|d| d.is_ascii_digit()) {
            chars.next();
        } else {
            break;
        }
    }
}

/// The trailing parameter of a `PRIVMSG`, or the input itself when it is
/// already bare message text.
fn message_text(raw: &str) -> &str {
    let line = raw.trim_end_matches(['\r', '\n']);
    if !line.starts_with(':') {
        return line;
    }
    line.find(" PRIVMSG ")
        .and_then(|at| line[at..].find(" :").map(|offset| &line[at + offset + 2..]))
        .unwrap_or(line)
}

fn after_header(text: &str) -> Option<&str> {
    let lower = text.to_ascii_lowercase();
    let at = lower.find(&ANNOUNCE_HEADER.to_ascii_lowercase())?;
    Some(&text[at + ANNOUNCE_HEADER.len()..])
}

fn is_url(field: &str) -> bool {
    let lower = field.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn is_direct_download(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or_default();
    path.ends_with(".torrent") || path.contains("/download/")
}

pub(crate) fn contains_marker(text: &str) -> bool {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| word.eq_ignore_ascii_case(FREELEECH_MARKER))
}

fn link_safe_title(title: &str) -> String {
    title
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .take(MAX_LINK_TITLE_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colour_codes_are_removed() {
        assert_eq!(
            strip_formatting("\x0300,04New Torrent Announcement\x03:\x0300,12 <TV>\x0f"),
            "New Torrent Announcement: <TV>"
        );
        assert_eq!(strip_formatting("\x0312,x"), ",x");
    }

    #[test]
    fn privmsg_prefix_is_stripped() {
        let raw = ":_AnnounceBot_!Announce@torrentleech.org PRIVMSG #tlannounces :hello there\r\n";
        assert_eq!(message_text(raw), "hello there");
        assert_eq!(message_text("bare text"), "bare text");
    }

    #[test]
    fn marker_matches_whole_words_only() {
        assert!(contains_marker("[FREELEECH] Some.Movie"));
        assert!(!contains_marker("freeleeching"));
    }
}
