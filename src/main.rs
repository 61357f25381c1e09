use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use rssagg::config::Config;
use rssagg::feed::HttpFeedSource;
use rssagg::scraper::{Scheduler, ScraperSettings};
use rssagg::storage::Database;

/// Get the default config path (~/.config/rssagg/config.toml)
fn default_config_path() -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("rssagg")
            .join("config.toml"),
    )
}

#[derive(Parser, Debug)]
#[command(name = "rssagg", about = "Scheduled RSS feed scraper", version)]
struct Args {
    /// Config file (defaults to ~/.config/rssagg/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database path, overrides config and environment
    #[arg(long, value_name = "PATH")]
    database: Option<String>,

    /// Maximum feeds fetched per cycle
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Seconds between cycles
    #[arg(long, value_name = "N")]
    interval_secs: Option<u64>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

/// Cancels `shutdown` on SIGINT or SIGTERM.
fn spawn_signal_handler(shutdown: CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
                _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down gracefully"),
            }
            shutdown.cancel();
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, shutting down gracefully");
        }
        shutdown.cancel();
    });

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match args.config.as_deref() {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from '{}'", path.display()))?,
        None => match default_config_path() {
            Some(path) => Config::load(&path).with_context(|| {
                format!("Failed to load config from '{}'", path.display())
            })?,
            None => Config::default(),
        },
    };
    config.apply_env();
    if let Some(database) = args.database {
        config.database_path = database;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(interval_secs) = args.interval_secs {
        config.interval_secs = interval_secs;
    }

    config.validate().context("Invalid configuration")?;
    let settings = ScraperSettings::new(config.concurrency, config.interval())
        .context("Invalid scraper settings")?
        .with_invalid_date_policy(config.invalid_date_policy);

    let db = Database::open(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database '{}'", config.database_path))?;

    let source = HttpFeedSource::new(
        &config.user_agent,
        config.request_timeout(),
        config.max_feed_bytes,
    )
    .context("Failed to build HTTP client")?;

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone())?;

    let mut scheduler = Scheduler::new(Arc::new(db), Arc::new(source), settings, shutdown);
    if args.once {
        let report = scheduler.run_cycle().await;
        if let Some(e) = report.selection_error {
            return Err(e).context("Failed to select feeds");
        }
    } else {
        scheduler.run().await;
    }

    Ok(())
}
