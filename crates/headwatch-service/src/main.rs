//! Headwatch Service - audio device connection tracker.
//!
//! Run with: `bridge | cargo run -p headwatch-service`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use time::UtcOffset;
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use headwatch_service::config::{default_config_path, offset_from_minutes};
use headwatch_service::{Config, ConsoleIndicator, Service, SqliteHistory, line_events, report};
use headwatch_store::Store;

/// How long shutdown waits for pending history writes.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Headwatch Service - tracks audio device connections.
#[derive(Parser, Debug)]
#[command(name = "headwatch-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Enable duration watching (overrides config).
    #[arg(short, long, global = true)]
    watch: bool,

    /// Alert threshold in seconds (overrides config).
    #[arg(long, global = true, value_name = "SECS")]
    alert_threshold: Option<u64>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Track devices from the event stream (default behavior).
    Run {
        /// Read events from a file instead of stdin.
        #[arg(long, value_name = "FILE")]
        events: Option<PathBuf>,
    },

    /// Show one day's connections.
    History {
        /// Date to show (YYYY-MM-DD).
        #[arg(long)]
        date: String,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show per-device totals for one day.
    Summary {
        /// Date to summarize (YYYY-MM-DD).
        #[arg(long)]
        date: String,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// List dates with recorded connections.
    Dates {
        /// Print JSON instead of a list.
        #[arg(long)]
        json: bool,
    },

    /// Write the effective configuration to the config file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    // The local offset can only be read safely before other threads exist.
    let local_offset = UtcOffset::current_local_offset().unwrap_or_else(|e| {
        warn!(error = %e, "Cannot determine local UTC offset; using UTC");
        UtcOffset::UTC
    });

    let config = load_config(&args)?;

    match &args.command {
        Some(Command::History { date, json }) => show_history(&config, date, *json, local_offset),
        Some(Command::Summary { date, json }) => show_summary(&config, date, *json),
        Some(Command::Dates { json }) => show_dates(&config, *json),
        Some(Command::InitConfig { force }) => init_config(&args, &config, *force),
        Some(Command::Run { events }) => run_tracker(config, events.clone(), local_offset),
        None => run_tracker(config, None, local_offset),
    }
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "headwatch=debug" } else { "headwatch=info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.parse()?),
        )
        .init();
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    // Override config with CLI args
    if let Some(db_path) = &args.database {
        config.storage.path = db_path.clone();
    }
    if args.watch {
        config.tracker.duration_watching = true;
    }
    if let Some(secs) = args.alert_threshold {
        config.tracker.alert_threshold_secs = secs;
    }

    config.validate()?;
    Ok(config)
}

fn run_tracker(
    config: Config,
    events: Option<PathBuf>,
    local_offset: UtcOffset,
) -> anyhow::Result<()> {
    let tracker_config = config.tracker.to_tracker_config(local_offset)?;
    let store = open_store(&config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;

    let result = runtime.block_on(async move {
        let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &events {
            Some(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("Failed to open event file {}", path.display()))?;
                Box::new(BufReader::new(file))
            }
            None => Box::new(BufReader::new(tokio::io::stdin())),
        };

        let indicator = Arc::new(ConsoleIndicator::stdout());
        let service = Service::start(
            tracker_config,
            Arc::new(SqliteHistory::new(store)),
            Arc::clone(&indicator),
        )?;
        indicator.print()?;

        let cancel = CancellationToken::new();
        let ctrl_c = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Interrupted, shutting down"),
                Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C"),
            }
            ctrl_c.cancel();
        });

        service.run(line_events(reader), &cancel).await;
        let report = service.shutdown(SHUTDOWN_TIMEOUT).await;
        if report.persisted.pending() > 0 {
            warn!(
                pending = report.persisted.pending(),
                "History writes still pending at exit"
            );
        }
        Ok::<(), anyhow::Error>(())
    });

    // A pending stdin read would otherwise keep the runtime alive.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

fn open_store(config: &Config) -> anyhow::Result<Store> {
    Store::open(&config.storage.path).with_context(|| {
        format!(
            "Failed to open history database {}",
            config.storage.path.display()
        )
    })
}

fn history_offset(config: &Config, local_offset: UtcOffset) -> UtcOffset {
    config
        .tracker
        .utc_offset_minutes
        .and_then(offset_from_minutes)
        .unwrap_or(local_offset)
}

fn show_history(
    config: &Config,
    date: &str,
    json: bool,
    local_offset: UtcOffset,
) -> anyhow::Result<()> {
    let store = open_store(config)?;
    if json {
        println!("{}", store.export_json(date)?);
    } else {
        let records = store.query_by_date(date)?;
        let offset = history_offset(config, local_offset);
        print!("{}", report::render_history(date, &records, offset));
    }
    Ok(())
}

fn show_summary(config: &Config, date: &str, json: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let summaries = store.query_summary_by_date(date)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        print!("{}", report::render_summary(date, &summaries));
    }
    Ok(())
}

fn show_dates(config: &Config, json: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let dates = store.dates()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&dates)?);
    } else {
        print!("{}", report::render_dates(&dates));
    }
    Ok(())
}

fn init_config(args: &Args, config: &Config, force: bool) -> anyhow::Result<()> {
    let path = args.config.clone().unwrap_or_else(default_config_path);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    config.save(&path)?;
    println!("Wrote configuration to {}", path.display());
    Ok(())
}
