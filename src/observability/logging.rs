//! Structured logging.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "MOUNTSTORE_LOG";

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, multi-line.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name (`pretty` or `json`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Event filter.
    pub filter: EnvFilter,
}

impl LoggingConfig {
    /// Builds the configuration from the environment.
    ///
    /// The filter comes from `MOUNTSTORE_LOG`, then `RUST_LOG`, then the
    /// default level (`debug` when verbose, `warn` otherwise).
    #[must_use]
    pub fn from_env(verbose: bool, format: LogFormat) -> Self {
        let directives = std::env::var(LOG_ENV)
            .or_else(|_| std::env::var("RUST_LOG"))
            .ok()
            .filter(|v| !v.trim().is_empty());
        Self {
            format,
            filter: build_filter(directives.as_deref(), verbose),
        }
    }
}

/// Parses filter directives, falling back to the default level.
pub(crate) fn build_filter(directives: Option<&str>, verbose: bool) -> EnvFilter {
    let default = if verbose { "mountstore=debug" } else { "warn" };
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(default))
}
