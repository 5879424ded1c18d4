use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Terminal result of pushing one admitted release through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Saved locally; relay disabled.
    Downloaded(PathBuf),
    /// Saved locally and uploaded to the relay.
    Forwarded(PathBuf),
    /// Fetch or write failed; the release is abandoned.
    DownloadFailed(FetchError),
    /// Saved locally, upload failed; the file stays in the output directory.
    ForwardFailed { path: PathBuf, error: String },
    /// Nothing written: the deterministic target already exists, or the
    /// metainfo size falls outside the configured bounds.
    Skipped(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub bytes: Vec<u8>,
    pub metadata: FetchMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchMetadata {
    pub original_url: String,
    pub final_url: String,
    pub redirect_count: usize,
    pub content_type: Option<String>,
    pub byte_len: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    UnsupportedContentType { content_type: String },
    EmptyBody,
    Persist,
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            FailureKind::EmptyBody => write!(f, "empty response body"),
            FailureKind::Persist => write!(f, "could not write output file"),
            FailureKind::Network => write!(f, "network error"),
        }
    }
}

/// Producer-level transport failure. Never fatal: IRC reconnects with
/// backoff, RSS retries on the next interval.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("tls error: {0}")]
    Tls(String),
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("registration did not complete within {0:?}")]
    RegistrationTimeout(Duration),
    #[error("no traffic from server for {0:?}")]
    Idle(Duration),
    #[error("server closed the connection")]
    Closed,
    #[error("server ended the session: {0}")]
    Refused(String),
    #[error("feed request failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("feed could not be decoded: {0}")]
    Decode(String),
}

/// Upload failure. The local file is always left in place.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("`{command}` rejected: {reply}")]
    Rejected { command: String, reply: String },
    #[error("malformed server reply: {0}")]
    MalformedReply(String),
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<RelayError>,
    },
}
