// src/logging.rs

//! Logging setup for `dagrun` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log filter:
//! 1. explicit `level` argument (if provided)
//! 2. `DAGRUN_LOG` environment variable (e.g. "info", "dagrun=debug")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout stays free for task output.

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

/// Initialise the global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(lvl) => EnvFilter::try_new(lvl)?,
        None => EnvFilter::try_from_env("DAGRUN_LOG")
            .unwrap_or_else(|_| EnvFilter::new("info")),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
