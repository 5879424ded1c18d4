//! Monitor engine: network producers, dispatcher and the fetch-and-relay
//! pipeline.
mod engine;
mod fetch;
mod filename;
mod irc;
mod persist;
mod pipeline;
mod relay;
mod rss;
mod scheduler;
mod types;

pub use engine::{Engine, EngineHandle, EventSender};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher};
pub use filename::deterministic_filename;
pub use irc::{
    parse_message, Connector, IrcClient, IrcMessage, IrcSettings, IrcState, IrcStream,
    TcpConnector, DEFAULT_IRC_CHANNEL, DEFAULT_IRC_PORT, DEFAULT_IRC_SERVER,
};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use pipeline::{Pipeline, PipelineSettings};
pub use relay::{FtpRelay, FtpSettings, Relay, RetryingRelay};
pub use rss::{decode_feed, FeedSource, RssClient};
pub use scheduler::{PollState, Scheduler, DEFAULT_POLL_INTERVAL};
pub use types::{
    ConnectionError, FailureKind, FetchError, FetchMetadata, FetchOutput, Outcome, RelayError,
};
