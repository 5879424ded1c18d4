//! Monitor core: release identity, announcement parsing, filtering and dedup.
mod announce;
mod error;
mod feed;
mod filter;
mod gate;
mod ledger;
mod metainfo;
mod release;
mod size;
mod stats;

pub use announce::{parse_irc_line, strip_formatting, AnnounceParser, DownloadLinks, ANNOUNCE_HEADER};
pub use error::ParseError;
pub use feed::{classify_rss_entry, parse_rss_entry, FeedEntry};
pub use filter::{matches, Criteria, SizeBounds};
pub use gate::{Decision, Gate};
pub use ledger::DedupLedger;
pub use metainfo::{torrent_size, MetainfoError};
pub use release::{ReleaseEvent, ReleaseId, Source, UNKNOWN_CATEGORY};
pub use size::{format_gigabytes, gigabytes_to_bytes, parse_size, BYTES_PER_GIB};
pub use stats::{RunStatistics, StatsSnapshot};
