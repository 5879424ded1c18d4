//! Command line and JSON file configuration, merged into one validated
//! [`MonitorConfig`].
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use monitor_engine::{DEFAULT_IRC_CHANNEL, DEFAULT_IRC_PORT, DEFAULT_IRC_SERVER};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_OUTPUT_DIR: &str = "./torrents";
const DEFAULT_FTP_PORT: u16 = 21;
const DEFAULT_FTP_FOLDER: &str = "/";
const DEFAULT_POLL_SECS: u64 = 30;
const DEFAULT_STATS_SECS: u64 = 300;

#[derive(Debug, Default, Parser)]
#[command(
    name = "tlmonitor",
    version,
    about = "Watch TorrentLeech IRC announces and RSS for freeleech releases and download them",
    after_help = "Examples:\n  tlmonitor --url https://www.torrentleech.org/rss/KEY -c \"TV :: Episodes HD\" --min-size 1 --max-size 20\n  tlmonitor --config monitor.json --no-ftp"
)]
pub struct Cli {
    /// JSON config file; command line values take precedence.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// RSS feed URL (the last path segment is the personal RSS key).
    #[arg(long)]
    pub url: Option<String>,
    /// Only download these categories.
    #[arg(short = 'c', long, num_args = 1..)]
    pub categories: Vec<String>,
    /// Download directory.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
    #[arg(long)]
    pub irc_server: Option<String>,
    #[arg(long)]
    pub irc_port: Option<u16>,
    #[arg(long)]
    pub irc_channel: Option<String>,
    /// IRC nickname (default `tlrss_<unix time>`).
    #[arg(long)]
    pub irc_nick: Option<String>,
    /// IRC server password, if the network requires one.
    #[arg(long)]
    pub irc_pass: Option<String>,
    /// Connect to IRC without TLS.
    #[arg(long)]
    pub no_irc_tls: bool,
    /// Keep TLS but accept the IRC server certificate without checking it.
    /// Needed when the server's certificate does not chain to a public root.
    #[arg(long)]
    pub irc_insecure_tls: bool,
    /// Disable the IRC listener and rely on RSS alone.
    #[arg(long)]
    pub no_irc: bool,
    #[arg(long)]
    pub ftp_host: Option<String>,
    #[arg(long)]
    pub ftp_port: Option<u16>,
    #[arg(long)]
    pub ftp_user: Option<String>,
    #[arg(long)]
    pub ftp_pass: Option<String>,
    /// Remote folder for uploads.
    #[arg(long)]
    pub ftp_folder: Option<String>,
    /// Disable FTP upload even when credentials are configured.
    #[arg(long)]
    pub no_ftp: bool,
    /// Minimum size in GB.
    #[arg(long)]
    pub min_size: Option<f64>,
    /// Maximum size in GB.
    #[arg(long)]
    pub max_size: Option<f64>,
    /// Seconds between RSS polls.
    #[arg(long)]
    pub poll_interval: Option<u64>,
    /// Seconds between statistics reports.
    #[arg(long)]
    pub stats_interval: Option<u64>,
    /// Also write logs to this file.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
    /// Debug-level logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// The JSON file layout: the command line keys in snake_case.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub url: Option<String>,
    pub categories: Option<Vec<String>>,
    pub output: Option<PathBuf>,
    pub irc_server: Option<String>,
    pub irc_port: Option<u16>,
    pub irc_channel: Option<String>,
    pub irc_nick: Option<String>,
    pub irc_pass: Option<String>,
    pub no_irc_tls: Option<bool>,
    pub irc_insecure_tls: Option<bool>,
    pub no_irc: Option<bool>,
    pub ftp_host: Option<String>,
    pub ftp_port: Option<u16>,
    pub ftp_user: Option<String>,
    pub ftp_pass: Option<String>,
    pub ftp_folder: Option<String>,
    pub no_ftp: Option<bool>,
    pub min_size: Option<f64>,
    pub max_size: Option<f64>,
    pub poll_interval: Option<u64>,
    pub stats_interval: Option<u64>,
    pub log_file: Option<PathBuf>,
    pub verbose: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("could not parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("an RSS feed URL is required (--url or \"url\" in the config file)")]
    MissingUrl,
    #[error("invalid RSS feed URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("{name} must be a non-negative number of GB, got {value}")]
    InvalidSize { name: &'static str, value: f64 },
    #[error("min size {min} GB is larger than max size {max} GB")]
    InvertedBounds { min: f64, max: f64 },
    #[error("{name} must be at least one second")]
    ZeroInterval { name: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrcConfig {
    pub server: String,
    pub port: u16,
    pub channel: String,
    pub nickname: String,
    pub password: Option<String>,
    pub use_tls: bool,
    pub verify_tls: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub folder: String,
}

/// Validated runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub feed_url: String,
    pub categories: Vec<String>,
    pub output_dir: PathBuf,
    /// `None` when the IRC listener is disabled.
    pub irc: Option<IrcConfig>,
    /// `None` unless host, user and password are all set and FTP is not disabled.
    pub ftp: Option<FtpConfig>,
    pub min_size_gb: Option<f64>,
    pub max_size_gb: Option<f64>,
    pub poll_interval: Duration,
    pub stats_interval: Duration,
    pub log_file: Option<PathBuf>,
    pub verbose: bool,
}

impl MonitorConfig {
    /// Read the optional config file named on the command line and merge it.
    pub fn load(cli: Cli) -> Result<Self, ConfigError> {
        let file = match cli.config.as_deref() {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(cli, file, chrono::Utc::now().timestamp())
    }

    /// Command line values win over file values; `now_unix` seeds the default nick.
    pub fn merge(cli: Cli, file: FileConfig, now_unix: i64) -> Result<Self, ConfigError> {
        let feed_url = non_empty(cli.url)
            .or_else(|| non_empty(file.url))
            .ok_or(ConfigError::MissingUrl)?;
        validate_url(&feed_url)?;

        let categories = if cli.categories.is_empty() {
            file.categories.unwrap_or_default()
        } else {
            cli.categories
        };
        let categories = categories
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        let min_size_gb = cli.min_size.or(file.min_size);
        let max_size_gb = cli.max_size.or(file.max_size);
        check_size("min size", min_size_gb)?;
        check_size("max size", max_size_gb)?;
        if let (Some(min), Some(max)) = (min_size_gb, max_size_gb) {
            if min > max {
                return Err(ConfigError::InvertedBounds { min, max });
            }
        }

        let no_irc = cli.no_irc || file.no_irc.unwrap_or(false);
        let irc = (!no_irc).then(|| IrcConfig {
            server: non_empty(cli.irc_server)
                .or_else(|| non_empty(file.irc_server))
                .unwrap_or_else(|| DEFAULT_IRC_SERVER.to_string()),
            port: cli.irc_port.or(file.irc_port).unwrap_or(DEFAULT_IRC_PORT),
            channel: non_empty(cli.irc_channel)
                .or_else(|| non_empty(file.irc_channel))
                .unwrap_or_else(|| DEFAULT_IRC_CHANNEL.to_string()),
            nickname: non_empty(cli.irc_nick)
                .or_else(|| non_empty(file.irc_nick))
                .unwrap_or_else(|| format!("tlrss_{now_unix}")),
            password: non_empty(cli.irc_pass).or_else(|| non_empty(file.irc_pass)),
            use_tls: !(cli.no_irc_tls || file.no_irc_tls.unwrap_or(false)),
            verify_tls: !(cli.irc_insecure_tls || file.irc_insecure_tls.unwrap_or(false)),
        });

        let no_ftp = cli.no_ftp || file.no_ftp.unwrap_or(false);
        let ftp_host = non_empty(cli.ftp_host).or_else(|| non_empty(file.ftp_host));
        let ftp_user = non_empty(cli.ftp_user).or_else(|| non_empty(file.ftp_user));
        let ftp_pass = non_empty(cli.ftp_pass).or_else(|| non_empty(file.ftp_pass));
        let ftp = match (no_ftp, ftp_host, ftp_user, ftp_pass) {
            (false, Some(host), Some(username), Some(password)) => Some(FtpConfig {
                host,
                port: cli.ftp_port.or(file.ftp_port).unwrap_or(DEFAULT_FTP_PORT),
                username,
                password,
                folder: non_empty(cli.ftp_folder)
                    .or_else(|| non_empty(file.ftp_folder))
                    .unwrap_or_else(|| DEFAULT_FTP_FOLDER.to_string()),
            }),
            _ => None,
        };

        let poll_secs = cli.poll_interval.or(file.poll_interval).unwrap_or(DEFAULT_POLL_SECS);
        let stats_secs = cli.stats_interval.or(file.stats_interval).unwrap_or(DEFAULT_STATS_SECS);
        if poll_secs == 0 {
            return Err(ConfigError::ZeroInterval { name: "poll interval" });
        }
        if stats_secs == 0 {
            return Err(ConfigError::ZeroInterval { name: "stats interval" });
        }

        Ok(Self {
            feed_url,
            categories,
            output_dir: cli
                .output
                .or(file.output)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            irc,
            ftp,
            min_size_gb,
            max_size_gb,
            poll_interval: Duration::from_secs(poll_secs),
            stats_interval: Duration::from_secs(stats_secs),
            log_file: cli.log_file.or(file.log_file),
            verbose: cli.verbose || file.verbose.unwrap_or(false),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_url(raw: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let url = url::Url::parse(raw).map_err(|err| invalid(err.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme {other}"))),
    }
}

fn check_size(name: &'static str, value: Option<f64>) -> Result<(), ConfigError> {
    match value {
        Some(value) if !value.is_finite() || value < 0.0 => {
            Err(ConfigError::InvalidSize { name, value })
        }
        _ => Ok(()),
    }
}
