use thiserror::Error;

use crate::ReleaseId;

/// Malformed announcement line or feed entry. Always non-fatal: the input is
/// dropped and counted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("announcement carries no release id: {0}")]
    MissingId(String),
    #[error("release {0} has no download link")]
    MissingDownloadUrl(ReleaseId),
}
