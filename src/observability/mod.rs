//! Observability.
//!
//! The library only emits `tracing` events and `metrics` values; installing a
//! subscriber is left to the binary, which calls [`init`] once at startup.

mod logging;

pub use logging::{LOG_ENV, LogFormat, LoggingConfig};

use crate::{Error, Result};
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static OBSERVABILITY_INIT: OnceLock<()> = OnceLock::new();

/// Installs the global log subscriber, writing to stderr.
///
/// # Errors
///
/// Returns an error if a subscriber has already been installed.
pub fn init(verbose: bool, format: LogFormat) -> Result<()> {
    if OBSERVABILITY_INIT.get().is_some() {
        return Err(Error::persistence(
            "observability_init",
            "observability already initialized",
        ));
    }

    let config = LoggingConfig::from_env(verbose, format);
    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .with(config.filter)
            .try_init()
            .map_err(init_error)?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .with(config.filter)
            .try_init()
            .map_err(init_error)?,
    }

    OBSERVABILITY_INIT
        .set(())
        .map_err(|()| Error::persistence("observability_init", "failed to mark observability initialized"))
}

/// Helper to convert init errors.
#[allow(clippy::needless_pass_by_value)]
fn init_error(e: tracing_subscriber::util::TryInitError) -> Error {
    Error::persistence("observability_init", e)
}
