use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;

use crate::config::Config;

/// Install the global tracing subscriber per the configuration: plain text,
/// no ANSI, written to the configured log file (stderr when unset), with the
/// configured level as the minimum severity emitted.
pub fn init(config: &Config) -> Result<()> {
    let level = parse_level(&config.log_level);

    if config.log_file.is_empty() {
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .init();
        return Ok(());
    }

    rotate_if_oversized(&config.log_file, config.max_log_size_bytes);

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
        .with_context(|| format!("failed to open log file {}", config.log_file))?;

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .init();

    Ok(())
}

/// Map the configured level name onto a tracing filter. Unknown names fall
/// back to info rather than failing startup.
pub fn parse_level(name: &str) -> LevelFilter {
    match name.to_ascii_lowercase().as_str() {
        "debug" => LevelFilter::DEBUG,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    }
}

/// Startup-time log rotation: once the file passes `max_size` it is renamed
/// aside with a timestamp suffix and a fresh file starts. Best-effort; runs
/// before the subscriber exists, so failures stay silent.
pub fn rotate_if_oversized(path: impl AsRef<Path>, max_size: u64) {
    let path = path.as_ref();
    if let Ok(meta) = fs::metadata(path) {
        if meta.len() > max_size {
            let timestamp = Local::now().format("%Y%m%d_%H%M%S");
            let backup = format!("{}.{}.bak", path.display(), timestamp);
            let _ = fs::rename(path, backup);
        }
    }
}
