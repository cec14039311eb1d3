#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result as AnyResult};
use clap::{Parser, Subcommand};
use loadgen_agent::config::{AppConfig, StoreConfig};
use loadgen_agent::{serve, store, AppState, CpuAccountant, CpuBurner, LoadCoordinator, Metrics, WorkVariant};
use tracing::info;

/// Synthetic CPU / wait / corpus-lookup backend.
#[derive(Parser)]
#[command(name = "loadgen-agent", version)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "LOADGEN_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file
    #[arg(short, long, env = "LOADGEN_BIND")]
    bind: Option<String>,

    /// Use the in-memory corpus regardless of the configured store
    #[arg(long)]
    memory_store: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Reseed the configured store and exit
    Seed {
        /// Record count, defaults to corpus.count
        #[arg(long)]
        count: Option<u64>,
    },
    /// Empty the configured store and exit
    Clear,
}

fn init_tracing() {
    let fmt = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env());
    fmt.json().init();
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if cli.memory_store {
        config.store = StoreConfig::Memory;
    }

    let metrics = Metrics::new().context("metrics init")?;
    let accountant = CpuAccountant::detect(config.burn.allow_wall_clock_fallback)
        .context("cpu accounting")?;
    let burner = CpuBurner::from_entropy(config.burn.buffer_size, accountant, config.burn.safety_factor)
        .context("burn buffer")?;
    let unit_ms = burner.calibrate(WorkVariant::Light, 64).context("calibrate burner")?;
    info!(
        accounting = %accountant.mode(),
        buffer = burner.buffer_len(),
        light_unit_ms = unit_ms,
        "cpu burner ready"
    );

    let backend = config.store.backend_name();
    let corpus_store = store::connect(&config.store, &config.corpus, &config.pool)
        .await
        .with_context(|| format!("connect {backend} store"))?;
    let coordinator = LoadCoordinator::new(Arc::new(burner), Some(corpus_store), metrics.clone());

    match cli.command.unwrap_or(Command::Serve) {
        Command::Seed { count } => {
            coordinator
                .seed(count.unwrap_or(config.corpus.count))
                .await
                .context("seed corpus")?;
            Ok(())
        }
        Command::Clear => {
            coordinator.clear().await.context("clear corpus")?;
            Ok(())
        }
        Command::Serve => {
            let needs_seed = config.corpus.seed_on_start
                || matches!(config.store, StoreConfig::Memory);
            if needs_seed {
                coordinator
                    .seed(config.corpus.count)
                    .await
                    .context("seed corpus on start")?;
            }
            coordinator.check_store().await;
            if let Some(interval) = config.pool.health_check_interval() {
                let _health = coordinator.spawn_health_check(interval);
            }
            let state = AppState {
                coordinator,
                metrics,
                limits: config.limits.clone(),
                default_seed_count: config.corpus.count,
            };
            info!(bind = %config.bind, backend, "starting agent");
            serve(state, &config.bind, config.shutdown_timeout_seconds).await?;
            info!("agent stopped");
            Ok(())
        }
    }
}
