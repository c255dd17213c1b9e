//! Log setup: timestamped lines to stdout and `resources/logs/app.log`,
//! thread names included.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_DIR: &str = "resources/logs";
pub const LOG_FILE: &str = "resources/logs/app.log";

/// Installs the global subscriber. `RUST_LOG` overrides the default `info`
/// filter.
pub fn init() -> eyre::Result<()> {
    std::fs::create_dir_all(LOG_DIR)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(Path::new(LOG_FILE))?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_thread_names(true))
        .with(
            fmt::layer()
                .with_thread_names(true)
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
        .init();
    Ok(())
}
