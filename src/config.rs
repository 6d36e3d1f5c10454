use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

fn default_log_file() -> String {
    "relay.log".to_string()
}

fn default_max_log_size() -> u64 {
    10 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_queue_capacity() -> usize {
    4096
}

/// Startup configuration, read once from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Capture device facing the game console.
    pub console_interface: String,
    /// Capture device facing the internet link.
    pub internet_interface: String,
    /// Path to the external traffic shaper executable.
    pub shaper_path: String,
    /// Log file path; empty means stderr only.
    #[serde(default = "default_log_file")]
    pub log_file: String,
    /// Rotate the log file aside once it grows past this size.
    #[serde(default = "default_max_log_size")]
    pub max_log_size_bytes: u64,
    /// Minimum severity to emit: debug, info, warn or error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Forwarder pool size; defaults to min(cpus, 4) when unset.
    #[serde(default)]
    pub forward_workers: Option<usize>,
    #[serde(default = "default_queue_capacity")]
    pub forward_queue_capacity: usize,
}

impl Config {
    pub fn worker_count(&self) -> usize {
        self.forward_workers
            .unwrap_or_else(|| num_cpus::get().clamp(1, 4))
    }

    fn validate(&self) -> Result<()> {
        if self.console_interface.is_empty() {
            bail!("console_interface must not be empty");
        }
        if self.internet_interface.is_empty() {
            bail!("internet_interface must not be empty");
        }
        if self.shaper_path.is_empty() {
            bail!("shaper_path must not be empty");
        }
        if self.forward_queue_capacity == 0 {
            bail!("forward_queue_capacity must be at least 1");
        }
        Ok(())
    }
}

pub fn load(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration file {}", path.display()))?;
    let config: Config = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse configuration file {}", path.display()))?;
    config.validate()?;
    Ok(config)
}
