use std::sync::Arc;

use monitor_core::FeedEntry;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::fetch::Fetcher;
use crate::ConnectionError;

/// A source of feed entries polled on an interval.
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn poll(&self) -> Result<Vec<FeedEntry>, ConnectionError>;
}

/// Fetches the configured RSS URL and decodes it into [`FeedEntry`] values.
pub struct RssClient {
    url: String,
    fetcher: Arc<dyn Fetcher>,
}

impl RssClient {
    pub fn new(url: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            url: url.into(),
            fetcher,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl FeedSource for RssClient {
    async fn poll(&self) -> Result<Vec<FeedEntry>, ConnectionError> {
        let output = self.fetcher.fetch(&self.url).await?;
        decode_feed(&output.bytes)
    }
}

/// Decode an RSS 2.0 document. Entries without any usable field are kept;
/// identity checks happen later in classification.
pub fn decode_feed(xml: &[u8]) -> Result<Vec<FeedEntry>, ConnectionError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut buf = Vec::new();

    let mut current: Option<FeedEntry> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(&e);
                if name == "item" || name == "entry" {
                    current = Some(FeedEntry::default());
                } else if let Some(entry) = current.as_mut() {
                    if name == "enclosure" {
                        read_enclosure(&e, entry);
                    }
                }
                text.clear();
            }
            Ok(Event::Empty(e)) => {
                if let Some(entry) = current.as_mut() {
                    if local_name(&e) == "enclosure" {
                        read_enclosure(&e, entry);
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if current.is_some() {
                    // HTML entities such as `&nbsp;` are not XML; keep them raw.
                    match e.unescape() {
                        Ok(chunk) => text.push_str(&chunk),
                        Err(_) => text.push_str(&String::from_utf8_lossy(&e)),
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if current.is_some() {
                    text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if name == "item" || name == "entry" {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                } else if let Some(entry) = current.as_mut() {
                    assign_field(entry, &name, std::mem::take(&mut text));
                }
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ConnectionError::Decode(format!("XML parse error: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_string()
}

fn assign_field(entry: &mut FeedEntry, name: &str, value: String) {
    let value = value.trim().to_string();
    if value.is_empty() {
        return;
    }
    match name {
        "title" => entry.title = Some(value),
        "link" => entry.link = Some(value),
        "guid" | "id" => entry.guid = Some(value),
        "category" => entry.categories.push(value),
        "description" | "summary" => entry.description = Some(value),
        "size" | "contentLength" => {
            if entry.enclosure_length.is_none() {
                entry.enclosure_length = value.parse().ok().filter(|len| *len > 0);
            }
        }
        _ => {}
    }
}

fn read_enclosure(e: &BytesStart<'_>, entry: &mut FeedEntry) {
    for attr in e.attributes().flatten() {
        let Ok(value) = attr.unescape_value() else {
            continue;
        };
        match attr.key.local_name().as_ref() {
            b"url" => entry.enclosure_url = Some(value.trim().to_string()),
            b"length" => {
                entry.enclosure_length = value.trim().parse().ok().filter(|len| *len > 0);
            }
            _ => {}
        }
    }
}
