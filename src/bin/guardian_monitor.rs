//! Host binary for the guardian monitor.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use guardian::{
    FileSignalSource, GuardianConfig, LogNotifier, Monitor, MonitorService, MonitorStore,
    SqliteStore,
};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Background monitoring scheduler and alert-state engine.
#[derive(Parser)]
#[command(name = "guardian-monitor", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until Ctrl-C.
    Run,

    /// Show every entity with its tier.
    Status,

    /// Show recent evaluations for one entity.
    History {
        entity: String,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Show recent alerts.
    Alerts {
        entity: Option<String>,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Suppress alerts for an entity.
    Ack {
        entity: String,
        /// Suppression window in seconds (defaults to the configured window).
        #[arg(long)]
        secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(GuardianConfig::default_config_path);
    let config = if config_path.exists() {
        GuardianConfig::from_file(&config_path)
            .with_context(|| format!("loading {}", config_path.display()))?
    } else {
        GuardianConfig::default()
    };
    config.validate().context("invalid configuration")?;

    let _log_guard = init_tracing(&config);

    let store: Arc<dyn MonitorStore> = Arc::new(
        SqliteStore::open(&config.store.root_dir)
            .with_context(|| format!("opening store at {}", config.store.root_dir.display()))?,
    );
    let signals = Arc::new(FileSignalSource::new(config.store.signals_dir.clone()));
    let entities = config.entities.clone();
    let monitor = Arc::new(Monitor::new(store, signals, Arc::new(LogNotifier), config)?);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            for entity in &entities {
                monitor
                    .ensure_entity(&entity.id, entity.kind, entity.enabled)
                    .await?;
            }
            run(monitor).await
        }
        Command::Status => {
            for entity in monitor.list_entities().await? {
                println!(
                    "{:<32} {:<12} {:<10} {:<8} last={} missed={} failed={}",
                    entity.id,
                    entity.kind,
                    entity.tier,
                    if entity.enabled { "on" } else { "off" },
                    format_ts(entity.last_evaluated_at),
                    entity.missed_cycles,
                    entity.failed_passes,
                );
            }
            Ok(())
        }
        Command::History { entity, limit } => {
            for record in monitor.history(&entity, limit).await? {
                println!(
                    "{} reported={:<8} tier={:<10} {}",
                    format_ts(Some(record.evaluated_at)),
                    record.reported_tier,
                    record.resulting_tier,
                    record.rationale
                );
            }
            Ok(())
        }
        Command::Alerts { entity, limit } => {
            for alert in monitor.alerts(entity.as_deref(), limit).await? {
                println!(
                    "{} {} {:<24} {:<8} {:<9} attempts={} {}",
                    format_ts(Some(alert.created_at)),
                    alert.id,
                    alert.entity_id,
                    alert.tier,
                    alert.status,
                    alert.attempts,
                    alert.rationale
                );
            }
            Ok(())
        }
        Command::Ack { entity, secs } => {
            let acked = match secs {
                Some(secs) => monitor.acknowledge(&entity, secs).await?,
                None => monitor.acknowledge_default(&entity).await?,
            };
            println!(
                "{} suppressed until {}",
                acked.id,
                format_ts(acked.tracking.suppressed_until)
            );
            Ok(())
        }
    }
}

async fn run(monitor: Arc<Monitor>) -> anyhow::Result<()> {
    println!("guardian-monitor v{}", env!("CARGO_PKG_VERSION"));
    let service = MonitorService::start(monitor, CancellationToken::new());
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("shutdown requested");
    service.shutdown().await;
    Ok(())
}

/// Stderr logging plus an optional daily-rolled file. The returned guard
/// flushes the file writer on drop.
fn init_tracing(config: &GuardianConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    let (file_layer, guard) = match &config.logging.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "guardian.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                ),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    guard
}

fn format_ts(ms: Option<u64>) -> String {
    ms.and_then(|ms| i64::try_from(ms).ok())
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_owned())
}
