use std::fmt;

use url::Url;

/// Category reported when an announcement or entry carries none.
pub const UNKNOWN_CATEGORY: &str = "unknown";

const ID_PREFIX: &str = "TL-";

/// Which producer reported a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// The live IRC announce channel.
    LiveFeed,
    /// The periodically polled RSS feed.
    PolledFeed,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::LiveFeed => write!(f, "IRC"),
            Source::PolledFeed => write!(f, "RSS"),
        }
    }
}

/// Canonical tracker identifier, the dedup key shared by both sources.
///
/// Every raw form the tracker uses for one release (`TL-12345`,
/// `https://host/torrent/12345`, `https://host/rss/download/12345/key/name.torrent`,
/// `http://host/12345.torrent`) reduces to the same token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReleaseId(String);

impl ReleaseId {
    /// Parse a bare identifier token such as `TL-12345`, `12345` or `12345.torrent`.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut token = raw.trim();
        if let Some(stem) = strip_suffix_ignore_case(token, ".torrent") {
            token = stem;
        }
        if let Some(rest) = strip_prefix_ignore_case(token, ID_PREFIX) {
            token = rest;
        }
        if token.is_empty() || !token.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(Self(token.to_ascii_lowercase()))
    }

    /// Extract the identifier from a URL (guid, permalink or download link),
    /// falling back to [`ReleaseId::parse`] for values that are not URLs.
    ///
    /// The segment following `torrent` or `download` wins; otherwise the last
    /// path segment is used.
    pub fn from_locator(locator: &str) -> Option<Self> {
        let trimmed = locator.trim();
        let Ok(url) = Url::parse(trimmed) else {
            return Self::parse(trimmed);
        };
        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        let marked = segments.windows(2).find_map(|pair| {
            let marker = pair[0];
            if marker.eq_ignore_ascii_case("torrent") || marker.eq_ignore_ascii_case("download") {
                Self::parse(pair[1])
            } else {
                None
            }
        });
        marked.or_else(|| segments.last().and_then(|last| Self::parse(last)))
    }

    /// The canonical token without the display prefix.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ID_PREFIX}{}", self.0)
    }
}

/// The canonical unit flowing through the decision path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseEvent {
    pub id: ReleaseId,
    pub title: String,
    pub category: String,
    pub size_bytes: Option<u64>,
    pub download_url: String,
    pub source: Source,
    pub freeleech: bool,
}

pub(crate) fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let split = s.len().checked_sub(suffix.len())?;
    let tail = s.get(split..)?;
    tail.eq_ignore_ascii_case(suffix).then(|| &s[..split])
}

#[cfg(test)]
mod tests {
    use super::ReleaseId;

    #[test]
    fn prefix_and_suffix_are_stripped() {
        assert_eq!(ReleaseId::parse("TL-12345").unwrap().as_str(), "12345");
        assert_eq!(ReleaseId::parse(" tl-12345 ").unwrap().as_str(), "12345");
        assert_eq!(ReleaseId::parse("12345.TORRENT").unwrap().as_str(), "12345");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(ReleaseId::parse("").is_none());
        assert!(ReleaseId::parse("TL-").is_none());
        assert!(ReleaseId::parse("Some Movie").is_none());
    }

    #[test]
    fn display_carries_prefix() {
        assert_eq!(ReleaseId::parse("12345").unwrap().to_string(), "TL-12345");
    }
}
