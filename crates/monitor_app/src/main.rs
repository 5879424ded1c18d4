//! `tlmonitor`: watch TorrentLeech announces and RSS for freeleech releases.
mod config;
mod report;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;
use monitor_core::{AnnounceParser, Criteria, DedupLedger, DownloadLinks, Gate, RunStatistics, SizeBounds};
use monitor_engine::{
    ensure_output_dir, Engine, FetchSettings, FtpRelay, FtpSettings, IrcClient, IrcSettings,
    Pipeline, PipelineSettings, ReqwestFetcher, RetryingRelay, RssClient, Scheduler, TcpConnector,
};
use monitor_logging::{monitor_info, monitor_warn, LogDestination};
use tokio_util::sync::CancellationToken;

use crate::config::{Cli, MonitorConfig};
use crate::report::StatsReporter;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = MonitorConfig::load(cli).context("invalid configuration")?;

    let level = if config.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let destination = match &config.log_file {
        Some(path) => LogDestination::Both(path.clone()),
        None => LogDestination::Terminal,
    };
    monitor_logging::initialize(destination, level);

    run(config).await
}

async fn run(config: MonitorConfig) -> anyhow::Result<()> {
    ensure_output_dir(&config.output_dir)
        .with_context(|| format!("cannot use output directory {:?}", config.output_dir))?;

    let stats = Arc::new(RunStatistics::new());
    let ledger = Arc::new(DedupLedger::new());
    let bounds = SizeBounds::from_gigabytes(config.min_size_gb, config.max_size_gb);
    let gate = Gate::new(Criteria::new(&config.categories, bounds), ledger.clone());

    let pipeline_settings = PipelineSettings {
        relay_folder: config
            .ftp
            .as_ref()
            .map(|ftp| ftp.folder.clone())
            .unwrap_or_else(|| "/".to_string()),
        size_bounds: bounds,
        ..PipelineSettings::new(config.output_dir.clone())
    };
    let mut pipeline = Pipeline::new(
        Arc::new(ReqwestFetcher::new(FetchSettings::default())),
        pipeline_settings,
        stats.clone(),
    );
    if let Some(ftp) = &config.ftp {
        let settings = FtpSettings {
            port: ftp.port,
            ..FtpSettings::new(&ftp.host, &ftp.username, &ftp.password)
        };
        let relay = RetryingRelay::new(Arc::new(FtpRelay::new(settings)));
        pipeline = pipeline.with_relay(Arc::new(relay));
    }

    log_startup(&config);
    let engine = Engine::start(gate, Arc::new(pipeline), stats.clone());

    let announce = match DownloadLinks::from_feed_url(&config.feed_url) {
        Some(links) => AnnounceParser::with_links(links),
        None => {
            monitor_warn!("[MONITOR] Feed URL carries no RSS key; IRC releases use the announced link");
            AnnounceParser::new()
        }
    };
    let feed = RssClient::new(
        config.feed_url.clone(),
        Arc::new(ReqwestFetcher::new(FetchSettings::for_feed())),
    );
    let mut scheduler = Scheduler::new(engine.sender(), stats.clone(), announce)
        .with_feed(Arc::new(feed))
        .with_poll_interval(config.poll_interval);
    if let Some(irc) = &config.irc {
        let settings = IrcSettings {
            server: irc.server.clone(),
            port: irc.port,
            use_tls: irc.use_tls,
            verify_tls: irc.verify_tls,
            password: irc.password.clone(),
            channel: irc.channel.clone(),
            ..IrcSettings::new(irc.nickname.clone())
        };
        scheduler = scheduler.with_irc(IrcClient::new(settings, Arc::new(TcpConnector), stats.clone()));
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            monitor_info!("[MONITOR] Shutdown requested");
            cancel.cancel();
        }
    });

    let reporter = Arc::new(StatsReporter::new(
        stats.clone(),
        ledger.clone(),
        config.output_dir.clone(),
        config.categories.clone(),
    ));
    let periodic = reporter.spawn_periodic(config.stats_interval, cancel.clone());

    scheduler.run(cancel.clone()).await;
    periodic.finish().await;
    if !engine.shutdown(SHUTDOWN_GRACE).await {
        monitor_warn!("[MONITOR] Some transfers did not finish before the grace period");
    }

    reporter.log("Final statistics");
    monitor_info!("[MONITOR] Stopped");
    Ok(())
}

fn log_startup(config: &MonitorConfig) {
    monitor_info!("[MONITOR] Output directory: {}", config.output_dir.display());
    if config.categories.is_empty() {
        monitor_info!("[MONITOR] Categories: all");
    } else {
        monitor_info!("[MONITOR] Categories: {}", config.categories.join(", "));
    }
    match (config.min_size_gb, config.max_size_gb) {
        (None, None) => {}
        (min, max) => monitor_info!(
            "[MONITOR] Size filter: {} - {} GB",
            min.map_or_else(|| "0".to_string(), |v| v.to_string()),
            max.map_or_else(|| "unbounded".to_string(), |v| v.to_string())
        ),
    }
    match &config.irc {
        Some(irc) => monitor_info!("[MONITOR] IRC: {}:{} {} as {}", irc.server, irc.port, irc.channel, irc.nickname),
        None => monitor_info!("[MONITOR] IRC: disabled"),
    }
    monitor_info!("[MONITOR] RSS: every {}s", config.poll_interval.as_secs());
    match &config.ftp {
        Some(ftp) => monitor_info!("[MONITOR] FTP: {}:{}{}", ftp.host, ftp.port, ftp.folder),
        None => monitor_info!("[MONITOR] FTP: disabled"),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(err) => {
                monitor_warn!("[MONITOR] Cannot listen for SIGTERM: {err}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
