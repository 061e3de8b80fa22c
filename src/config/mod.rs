mod file_config;

pub use file_config::{DispatcherConfig, FileConfig, SandboxConfig};

use crate::execution::RecoveryPolicy;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub in_memory: bool,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub poll_interval_ms: u64,
    pub worker_pool_size: usize,
    pub recovery_policy: RecoveryPolicy,
    pub timeout_secs: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            in_memory: false,
            port: 3001,
            logging_level: RequestsLoggingLevel::default(),
            poll_interval_ms: DispatcherSettings::default().poll_interval.as_millis() as u64,
            worker_pool_size: DispatcherSettings::default().worker_pool_size,
            recovery_policy: RecoveryPolicy::default(),
            timeout_secs: SandboxSettings::default().timeout.as_secs(),
        }
    }
}

/// Where jobs are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageSettings {
    Sqlite(PathBuf),
    InMemory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage: StorageSettings,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub dispatcher: DispatcherSettings,
    pub sandbox: SandboxSettings,
}

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub poll_interval: Duration,
    pub worker_pool_size: usize,
    pub recovery_policy: RecoveryPolicy,
    /// How long shutdown waits for cancelled runs to wind down.
    pub shutdown_grace: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2000),
            worker_pool_size: 4,
            recovery_policy: RecoveryPolicy::Rerun,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SandboxSettings {
    pub timeout: Duration,
    pub memory_limit_bytes: Option<usize>,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            memory_limit_bytes: None,
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let in_memory = file.in_memory.unwrap_or(cli.in_memory);
        let db_path = file.db_path.map(PathBuf::from).or_else(|| cli.db_path.clone());
        let storage = match (in_memory, db_path) {
            (true, _) => StorageSettings::InMemory,
            (false, Some(path)) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    if !parent.is_dir() {
                        bail!("Database directory does not exist: {:?}", parent);
                    }
                }
                StorageSettings::Sqlite(path)
            }
            (false, None) => bail!(
                "db_path must be specified via --db-path or in config file (or use --in-memory)"
            ),
        };

        let port = file.port.unwrap_or(cli.port);

        let logging_level = match file.logging_level {
            Some(s) => match RequestsLoggingLevel::from_str(&s, true) {
                Ok(level) => level,
                Err(_) => bail!("Invalid logging_level in config file: {}", s),
            },
            None => cli.logging_level.clone(),
        };

        let dispatcher_file = file.dispatcher.unwrap_or_default();
        let poll_interval_ms = dispatcher_file
            .poll_interval_ms
            .unwrap_or(cli.poll_interval_ms);
        if poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        let worker_pool_size = dispatcher_file
            .worker_pool_size
            .unwrap_or(cli.worker_pool_size);
        if worker_pool_size == 0 {
            bail!("worker_pool_size must be greater than zero");
        }
        let recovery_policy = match dispatcher_file.recovery_policy {
            Some(s) => match RecoveryPolicy::from_str(&s, true) {
                Ok(policy) => policy,
                Err(_) => bail!("Invalid recovery_policy in config file: {}", s),
            },
            None => cli.recovery_policy,
        };
        let dispatcher = DispatcherSettings {
            poll_interval: Duration::from_millis(poll_interval_ms),
            worker_pool_size,
            recovery_policy,
            shutdown_grace: dispatcher_file
                .shutdown_grace_secs
                .map(Duration::from_secs)
                .unwrap_or(DispatcherSettings::default().shutdown_grace),
        };

        let sandbox_file = file.sandbox.unwrap_or_default();
        let timeout_secs = sandbox_file.timeout_secs.unwrap_or(cli.timeout_secs);
        if timeout_secs == 0 {
            bail!("timeout_secs must be greater than zero");
        }
        let sandbox = SandboxSettings {
            timeout: Duration::from_secs(timeout_secs),
            memory_limit_bytes: sandbox_file.memory_limit_mb.map(|mb| mb * 1024 * 1024),
        };

        Ok(Self {
            storage,
            port,
            logging_level,
            dispatcher,
            sandbox,
        })
    }
}
