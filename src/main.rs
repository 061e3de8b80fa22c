use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::{fmt::Debug, path::PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use snippet_runner::config::{AppConfig, CliConfig, FileConfig, StorageSettings};
use snippet_runner::execution::{Dispatcher, ExecutionRegistry, RecoveryPolicy};
use snippet_runner::job_store::{InMemoryJobStore, JobStore, SqliteJobStore};
use snippet_runner::sandbox::{QuickJsEngine, SandboxRunner, ScriptEngine};
use snippet_runner::server::{self, run_server, RequestsLoggingLevel, ServerConfig};
use snippet_runner::JobService;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite database file holding the jobs.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Keep jobs in memory only. Everything is lost on exit.
    #[clap(long)]
    pub in_memory: bool,

    /// Optional TOML config file. Its values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// How often the dispatcher looks for jobs to run, in milliseconds.
    #[clap(long, default_value_t = 2000)]
    pub poll_interval_ms: u64,

    /// Maximum number of scripts executing at the same time.
    #[clap(long, default_value_t = 4)]
    pub worker_pool_size: usize,

    /// What to do with jobs left running by a previous process.
    #[clap(long, value_enum, default_value_t = RecoveryPolicy::Rerun)]
    pub recovery_policy: RecoveryPolicy,

    /// Maximum wall-clock duration of a single script, in seconds.
    #[clap(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_path: self.db_path.clone(),
            in_memory: self.in_memory,
            port: self.port,
            logging_level: self.logging_level.clone(),
            poll_interval_ms: self.poll_interval_ms,
            worker_pool_size: self.worker_pool_size,
            recovery_policy: self.recovery_policy,
            timeout_secs: self.timeout_secs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}...", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let app_config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    let store: Arc<dyn JobStore> = match &app_config.storage {
        StorageSettings::Sqlite(path) => {
            info!("Opening SQLite job database at {:?}...", path);
            Arc::new(SqliteJobStore::new(path)?)
        }
        StorageSettings::InMemory => {
            info!("Using in-memory job storage");
            Arc::new(InMemoryJobStore::new())
        }
    };

    info!("Initializing metrics...");
    server::metrics::init_metrics();

    let registry = Arc::new(ExecutionRegistry::new());
    let engine: Arc<dyn ScriptEngine> =
        Arc::new(QuickJsEngine::new(app_config.sandbox.memory_limit_bytes));
    let runner = Arc::new(SandboxRunner::new(
        engine.clone(),
        app_config.sandbox.timeout,
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        registry.clone(),
        runner,
        app_config.dispatcher.clone(),
    ));
    let job_service = Arc::new(JobService::new(store, registry, engine));

    let shutdown = CancellationToken::new();

    let dispatcher_handle = {
        let dispatcher = dispatcher.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { dispatcher.run(shutdown).await })
    };

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        signal_token.cancel();
    });

    let server_config = ServerConfig {
        requests_logging_level: app_config.logging_level.clone(),
        port: app_config.port,
    };
    info!("Ready to serve at port {}!", app_config.port);
    let served = run_server(server_config, job_service, shutdown.clone()).await;

    // A failing server still stops the dispatcher cleanly.
    shutdown.cancel();
    if let Err(e) = dispatcher_handle.await {
        error!("Dispatcher task failed: {}", e);
    }

    served
}
