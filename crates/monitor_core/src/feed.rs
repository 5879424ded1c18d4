use std::sync::LazyLock;

use regex::Regex;

use crate::announce::{contains_marker, FREELEECH_MARKER};
use crate::{parse_size, ParseError, ReleaseEvent, ReleaseId, Source, UNKNOWN_CATEGORY};

static SIZE_ANNOTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)size:\s*(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)(?:\s*([kmgt]i?b|bytes?|b)\b)?")
        .unwrap()
});

/// One decoded `<item>` of the polled feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub guid: Option<String>,
    pub categories: Vec<String>,
    pub description: Option<String>,
    pub enclosure_url: Option<String>,
    pub enclosure_length: Option<u64>,
}

/// Build an event from a feed entry, reporting why when it cannot.
///
/// The id comes from the guid (falling back to the link), never from the
/// title, so both sources converge on the same key.
pub fn classify_rss_entry(entry: &FeedEntry) -> Result<ReleaseEvent, ParseError> {
    let id = entry
        .guid
        .as_deref()
        .and_then(ReleaseId::from_locator)
        .or_else(|| entry.link.as_deref().and_then(ReleaseId::from_locator))
        .ok_or_else(|| {
            ParseError::MissingId(entry.title.clone().unwrap_or_else(|| "<untitled>".into()))
        })?;

    let download_url = non_empty(entry.link.as_deref())
        .or_else(|| non_empty(entry.enclosure_url.as_deref()))
        .map(str::to_string)
        .ok_or_else(|| ParseError::MissingDownloadUrl(id.clone()))?;

    let title = non_empty(entry.title.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| id.to_string());

    let category = entry
        .categories
        .iter()
        .map(|c| c.trim())
        .find(|c| !c.is_empty() && !c.eq_ignore_ascii_case(FREELEECH_MARKER))
        .unwrap_or(UNKNOWN_CATEGORY)
        .to_string();

    let size_bytes = entry
        .enclosure_length
        .filter(|len| *len > 0)
        .or_else(|| entry.description.as_deref().and_then(size_annotation));

    let freeleech = entry
        .categories
        .iter()
        .any(|c| c.trim().eq_ignore_ascii_case(FREELEECH_MARKER))
        || contains_marker(&title)
        || entry.description.as_deref().is_some_and(contains_marker);

    Ok(ReleaseEvent {
        id,
        title,
        category,
        size_bytes,
        download_url,
        source: Source::PolledFeed,
        freeleech,
    })
}

/// Build an event from a feed entry; entries without an id or link yield `None`.
pub fn parse_rss_entry(entry: &FeedEntry) -> Option<ReleaseEvent> {
    classify_rss_entry(entry).ok()
}

/// Reads a `Size: 1.4 GB` annotation from an entry description. Only the
/// number and its unit are taken; whatever follows is ignored.
fn size_annotation(description: &str) -> Option<u64> {
    let captures = SIZE_ANNOTATION.captures(description)?;
    let number = captures.get(1)?.as_str();
    let unit = captures.get(2).map_or("", |unit| unit.as_str());
    parse_size(&format!("{number} {unit}"))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::size_annotation;
    use crate::BYTES_PER_GIB;

    #[test]
    fn reads_size_from_description() {
        assert_eq!(
            size_annotation("Category: Movies :: HD, Size: 2 GB, Uploaded by X"),
            Some(2 * BYTES_PER_GIB)
        );
        assert_eq!(size_annotation("no annotation here"), None);
        assert_eq!(size_annotation("Size: unknown"), None);
        assert_eq!(size_annotation("Size: 512, Seeders: 3"), Some(512));
    }
}
