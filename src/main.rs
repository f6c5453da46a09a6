mod config;
mod download;
mod http;
mod inventory;
mod listing;
mod reconciliation;
mod trigger;
mod updater;
mod utils;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::{read_config, ListingConfig, NotifyConfig, UpdaterConfig, DEFAULT_NOTIFY_TOPIC};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use trigger::{NotifyClient, ShutdownSignal, TriggerCoordinator};
use updater::MapUpdater;

/// Map updater - keeps a game server's map directory in sync with a remote map listing
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file. Flags given on the command line override its values.
    #[arg(long, env = "MAPUPDATER_CONFIG")]
    config: Option<PathBuf>,

    /// Path to maps
    #[arg(long, env = "MAPUPDATER_MAPS_PATH")]
    maps_path: Option<PathBuf>,

    /// Notification server address, e.g. wss://notify.example.com/ws
    #[arg(long, env = "MAPUPDATER_NOTIFY_SERVER")]
    notify_server: Option<String>,

    /// Notification realm
    #[arg(long, env = "MAPUPDATER_NOTIFY_REALM")]
    notify_realm: Option<String>,

    /// Topic announcing finished uploads
    #[arg(long, env = "MAPUPDATER_NOTIFY_TOPIC")]
    notify_topic: Option<String>,

    /// Delete maps not present at the remote server instead of moving them to deletez/
    #[arg(long)]
    delete_if_not_present: bool,

    /// Maximum number of maps downloaded at once
    #[arg(long, env = "MAPUPDATER_DOWNLOAD_LIMIT")]
    download_limit: Option<usize>,

    /// Seconds between periodic checks
    #[arg(long, env = "MAPUPDATER_CHECK_INTERVAL")]
    check_interval: Option<u64>,

    /// Archive extraction tool, invoked as `<tool> <archive> -X <dir>`
    #[arg(long, env = "MAPUPDATER_EXTRACT_COMMAND")]
    extract_command: Option<String>,

    /// Seconds an extraction may take before it is killed
    #[arg(long, env = "MAPUPDATER_EXTRACT_TIMEOUT")]
    extract_timeout: Option<u64>,

    #[command(subcommand)]
    listing: Option<ListingCommand>,
}

#[derive(Subcommand, Debug)]
enum ListingCommand {
    /// Web list updater: scrape the HTML index at the fetch URL
    Weblist {
        /// URL to fetch maps from
        #[arg(long)]
        fetch_url: String,
    },
    /// S3 updater: read a bucket listing document
    S3 {
        /// S3 bucket or CDN URL to fetch maps from
        #[arg(long)]
        fetch_url: String,

        /// S3 bucket URL to get the file list from
        #[arg(long)]
        list_url: String,

        /// S3 object prefix to match
        #[arg(long)]
        key_prefix: String,
    },
}

impl Args {
    /// Layer command-line values over the file configuration
    fn apply(self, config: &mut UpdaterConfig) {
        if let Some(maps_path) = self.maps_path {
            config.maps_path = maps_path;
        }
        if self.delete_if_not_present {
            config.delete_if_not_present = true;
        }
        if let Some(limit) = self.download_limit {
            config.download_limit = limit;
        }
        if let Some(interval) = self.check_interval {
            config.check_interval_secs = interval;
        }
        if let Some(command) = self.extract_command {
            config.extract_command = command;
        }
        if let Some(timeout) = self.extract_timeout {
            config.extract_timeout_secs = timeout;
        }

        match self.listing {
            Some(ListingCommand::Weblist { fetch_url }) => {
                config.fetch_url = fetch_url;
                config.listing = ListingConfig::WebList;
            }
            Some(ListingCommand::S3 {
                fetch_url,
                list_url,
                key_prefix,
            }) => {
                config.fetch_url = fetch_url;
                config.listing = ListingConfig::Bucket {
                    list_url,
                    key_prefix,
                };
            }
            None => {}
        }

        if self.notify_server.is_some() || self.notify_realm.is_some() || self.notify_topic.is_some() {
            let current = config.notify.take();
            let topic = self
                .notify_topic
                .or_else(|| current.as_ref().map(|n| n.topic.clone()))
                .unwrap_or_else(|| DEFAULT_NOTIFY_TOPIC.to_string());
            config.notify = Some(NotifyConfig {
                server: self
                    .notify_server
                    .or_else(|| current.as_ref().map(|n| n.server.clone()))
                    .unwrap_or_default(),
                realm: self
                    .notify_realm
                    .or_else(|| current.as_ref().map(|n| n.realm.clone()))
                    .unwrap_or_default(),
                topic,
            });
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse CLI arguments
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => read_config(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?,
        None => UpdaterConfig::default(),
    };
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        maps_path = %config.maps_path.display(),
        fetch_url = %config.fetch_url,
        stale_policy = ?config.stale_policy(),
        download_limit = config.download_limit,
        "Starting map updater"
    );

    let updater = Arc::new(MapUpdater::from_config(&config).context("Failed to build updater")?);
    let coordinator = TriggerCoordinator::new(updater);

    // Create shutdown signal channel
    let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownSignal::None);

    let periodic = coordinator.run_periodic(config.check_interval(), shutdown_rx.clone());

    let notifications = async {
        match config.notify.clone() {
            Some(notify) => {
                info!(server = %notify.server, realm = %notify.realm, "Connecting to notification server");
                NotifyClient::new(notify, coordinator.clone())
                    .run(shutdown_rx.clone())
                    .await;
            }
            None => info!("No notification server configured, relying on periodic checks"),
        }
    };

    let signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Received shutdown signal, stopping map updater...");
        let _ = shutdown_tx.send(ShutdownSignal::Shutdown);
    };

    tokio::join!(periodic, notifications, signal);

    info!("Map updater stopped");
    Ok(())
}
