use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub in_memory: Option<bool>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,

    // Feature configs
    pub dispatcher: Option<DispatcherConfig>,
    pub sandbox: Option<SandboxConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DispatcherConfig {
    pub poll_interval_ms: Option<u64>,
    pub worker_pool_size: Option<usize>,
    /// "rerun" or "mark-errored"
    pub recovery_policy: Option<String>,
    pub shutdown_grace_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SandboxConfig {
    pub timeout_secs: Option<u64>,
    pub memory_limit_mb: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
