//! uptimed — the uptime daemon.
//!
//! Runs the background worker (gather + rotation loops) against an embedded
//! record store and a history log directory, and offers a few operator
//! commands for seeding checks and reading history.
//!
//! # Usage
//!
//! ```text
//! uptimed run --config uptime.toml
//! uptimed checks import checks.json
//! uptimed logs show abcdefghij0123456789
//! ```

mod ops;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use uptime_core::UptimeConfig;
use uptime_logs::HistoryLog;
use uptime_state::StateStore;
use uptime_worker::{HttpClient, LogNotifier, Notifier, TwilioNotifier, Worker};

const DEFAULT_FILTER: &str =
    "info,uptimed=debug,uptime_worker=debug,uptime_logs=debug,uptime_state=debug";

#[derive(Parser)]
#[command(name = "uptimed", about = "Uptime monitoring daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the worker until interrupted.
    Run {
        #[command(flatten)]
        common: CommonArgs,

        /// Seconds between gather cycles.
        #[arg(long)]
        gather_interval: Option<u64>,

        /// Seconds between log rotations.
        #[arg(long)]
        rotate_interval: Option<u64>,
    },
    /// Manage stored checks.
    Checks {
        #[command(flatten)]
        common: CommonArgs,

        #[command(subcommand)]
        command: ChecksCommand,
    },
    /// Inspect check history.
    Logs {
        #[command(flatten)]
        common: CommonArgs,

        #[command(subcommand)]
        command: LogsCommand,
    },
}

#[derive(Subcommand)]
enum ChecksCommand {
    /// Create checks from a JSON object or array of objects.
    Import { file: PathBuf },
    /// Show every stored check.
    List,
}

#[derive(Subcommand)]
enum LogsCommand {
    /// List live logs (and archives with --all).
    List {
        #[arg(long)]
        all: bool,
    },
    /// Print a live log, or an archive with --archive.
    Show {
        id: String,
        #[arg(long)]
        archive: bool,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Path to uptime.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the record store.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory for history logs.
    #[arg(long)]
    logs_dir: Option<PathBuf>,
}

impl CommonArgs {
    fn load(&self) -> anyhow::Result<UptimeConfig> {
        let mut config = match &self.config {
            Some(path) => UptimeConfig::from_file(path)?,
            None => UptimeConfig::default(),
        };
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(dir) = &self.logs_dir {
            config.logs_dir = dir.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER)),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            common,
            gather_interval,
            rotate_interval,
        } => {
            let mut config = common.load()?;
            if let Some(secs) = gather_interval {
                config.gather_interval_secs = secs;
            }
            if let Some(secs) = rotate_interval {
                config.rotate_interval_secs = secs;
            }
            config.validate()?;
            run(config).await
        }
        Command::Checks { common, command } => {
            let config = common.load()?;
            let store = open_store(&config)?;
            match command {
                ChecksCommand::Import { file } => ops::import_checks(&store, &config, &file),
                ChecksCommand::List => ops::list_checks(&store, &config),
            }
        }
        Command::Logs { common, command } => {
            let config = common.load()?;
            let history = HistoryLog::open(config.logs_dir.clone())?;
            match command {
                LogsCommand::List { all } => ops::list_logs(&history, all).await,
                LogsCommand::Show { id, archive } => ops::show_log(&history, &id, archive).await,
            }
        }
    }
}

fn open_store(config: &UptimeConfig) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(&config.data_dir)?;
    let path = config.store_path();
    let store = StateStore::open(&path)?;
    info!(path = ?path, "record store opened");
    Ok(store)
}

fn build_notifier(config: &UptimeConfig, client: &HttpClient) -> Arc<dyn Notifier> {
    match &config.twilio {
        Some(twilio) => {
            info!(from = %twilio.from_phone, "sms alerts enabled");
            Arc::new(TwilioNotifier::new(
                twilio.clone(),
                config.checks.owner_id_length,
                client.clone(),
            ))
        }
        None => {
            warn!("no [twilio] section configured, alerts go to the log only");
            Arc::new(LogNotifier)
        }
    }
}

async fn run(config: UptimeConfig) -> anyhow::Result<()> {
    info!("uptime daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let store = open_store(&config)?;
    let history = HistoryLog::open(config.logs_dir.clone())?;
    info!(path = ?history.root(), "history log opened");

    let client = HttpClient::new()?;
    let notifier = build_notifier(&config, &client);

    let worker = Worker::new(Arc::new(store), history, notifier, client, &config);

    // ── Start background tasks ─────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = worker.spawn(shutdown_rx);

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    handles.join().await;
    info!("uptime daemon stopped");
    Ok(())
}
