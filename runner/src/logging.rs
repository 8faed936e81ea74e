//! Tracing setup for a run.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Progress and tool output as it happens, to
//!   stderr and optionally an append-only log file. `RUST_LOG` overrides the
//!   configured level.
//!
//! - **Run reports (`io/report`)**: Per-run artifacts rendered from the
//!   finished outcome. Unaffected by the log level.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber.
///
/// Reads `RUST_LOG` first and falls back to `level`.
/// Output: stderr, compact format; plus `file` without ANSI colors when set.
///
/// # Example
/// ```bash
/// RUST_LOG=snapraid_btrfs_runner=debug snapraid-btrfs-runner -c runner.toml
/// ```
pub fn init(level: &str, file: Option<&Path>) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log level {level:?}"))?,
    };

    let file_layer = match file {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create log dir {}", parent.display()))?;
            }
            let handle = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(handle))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;
    Ok(())
}
