//! Tracing subscriber setup for the binary.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the log filter, e.g. `debug` or `bulk_importer=trace`.
pub const LOG_ENV: &str = "BULK_LOG";

const DEFAULT_FILTER: &str = "info";

/// Installs a stderr fmt layer filtered by `BULK_LOG` (default `info`).
///
/// Stdout is left to the command summaries.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(filter)
        .init();
}
