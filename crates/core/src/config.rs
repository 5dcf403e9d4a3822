//! Command-line/environment settings shared by every adapter binary.

use clap::{Args, ValueEnum};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Flags every adapter binary accepts (flattened into each binary's own `clap` struct).
#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// Log level (overridden by `RUST_LOG`).
    #[arg(long, env = "TOOLBRIDGE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format. Logs always go to stderr; stdout carries the MCP transport.
    #[arg(long, env = "TOOLBRIDGE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Per-request upstream timeout in seconds (`0` disables the timeout).
    #[arg(long, env = "TOOLBRIDGE_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,
}

impl CommonArgs {
    /// Effective upstream timeout: the flag if given, otherwise the adapter's default.
    #[must_use]
    pub fn request_timeout(&self, adapter_default: Option<Duration>) -> Option<Duration> {
        match self.request_timeout_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => adapter_default,
        }
    }

    /// Install the global `tracing` subscriber.
    ///
    /// # Errors
    ///
    /// Returns an error if the log level does not parse or a subscriber is already installed.
    pub fn init_tracing(&self) -> anyhow::Result<()> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(f) => f,
            Err(_) => EnvFilter::try_new(&self.log_level)?,
        };
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false);

        match self.log_format {
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Text => builder.try_init(),
        }
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
    }
}

/// Trim an optional environment-provided value, treating blank as absent.
#[must_use]
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
