use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use gn_core::{ArticleStorage, Config, Error, LogLevel, Result};
use gn_processor::{
    init_logging, parse_schedule, run_scheduled, ArticlePostProcessor, BatchProcessor, Environment,
};
use gn_storage::{create_storage, StorageKind};
use tracing::{info, warn};

const STORAGE_RETRIES: u32 = 3;
const STORAGE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "gnpp", author, version, about = "Globe News post-processor", long_about = None)]
pub struct Cli {
    /// Runtime environment; prod logs JSON at info level
    #[arg(long, env = "PROCESSOR_ENV", value_enum, ignore_case = true, default_value = "dev")]
    env: Environment,
    /// Overrides LOG_LEVEL (debug, info, warning, error)
    #[arg(long, env = "PROCESSOR_LOG_LEVEL")]
    log_level: Option<LogLevel>,
    #[arg(long, default_value = "mongo")]
    storage: StorageKind,
    /// Cron expression, 5 fields (minute precision) or 6/7 fields with seconds
    #[arg(long, global = true, env = "PROCESSOR_CRON_SCHEDULE")]
    schedule: Option<String>,
    /// With a schedule, also run once at startup
    #[arg(long, global = true, env = "PROCESSOR_RUN_NOW")]
    run_now: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug, PartialEq)]
enum Commands {
    /// Process pending articles once, or on a cron schedule (the default)
    Run,
    /// Verify configuration, storage and model setup, then exit
    Check,
}

async fn open_storage(kind: StorageKind, config: &Config) -> Result<Arc<dyn ArticleStorage>> {
    let storage = create_storage(kind, config).await?;
    storage.verify().await?;
    Ok(storage)
}

async fn connect_storage(kind: StorageKind, config: &Config) -> Result<Arc<dyn ArticleStorage>> {
    let mut last_error = None;

    for attempt in 1..=STORAGE_RETRIES {
        match tokio::time::timeout(STORAGE_TIMEOUT, open_storage(kind, config)).await {
            Ok(Ok(storage)) => {
                info!("💾 Storage initialized successfully (using {})", kind);
                return Ok(storage);
            }
            Ok(Err(e)) => last_error = Some(e),
            Err(_) => {
                last_error = Some(Error::Storage(format!(
                    "Storage health check timed out after {:?}",
                    STORAGE_TIMEOUT
                )))
            }
        }
        if attempt < STORAGE_RETRIES {
            warn!("Storage initialization failed, retrying {}/{}...", attempt, STORAGE_RETRIES);
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }

    Err(last_error.unwrap_or_else(|| Error::Storage("Storage initialization failed after all retries".to_string())))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let _log_guard = init_logging(
        cli.env,
        cli.log_level.unwrap_or(config.log_level),
        Some(config.logging_dir.as_path()),
    )?;
    info!("🌍 Starting GlobeNewsPostProcessor (environment: {})", cli.env);

    let storage = connect_storage(cli.storage, &config).await?;
    let processor = ArticlePostProcessor::from_config(&config)?;
    info!("🧠 Inference model initialized successfully (using {})", processor.model_name());

    if cli.command == Some(Commands::Check) {
        info!("✨ Configuration, storage and model verified");
        return Ok(());
    }

    let batch = BatchProcessor::new(storage, processor, config.batch_size);
    match cli.schedule {
        None => {
            let summary = batch.process_pending_articles().await?;
            info!("✅ GlobeNewsPostProcessor completed successfully: {}", summary);
        }
        Some(expression) => {
            let schedule = parse_schedule(&expression)?;
            info!("⏰ Running on schedule {:?} (run now: {})", expression, cli.run_now);
            run_scheduled(&schedule, cli.run_now, || batch.process_pending_articles(), shutdown_signal()).await?;
        }
    }

    Ok(())
}
