//! Logging bootstrap for the `tandem` binary.
//!
//! `RUST_LOG` always wins when it is set. Otherwise the `-v` flags pick
//! the default filter: our crates at info, then debug, then trace for
//! everything in the process.

use std::fmt;

use clap::ValueEnum;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter};

/// Output shape for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines with event targets.
    Plain,
    /// Terse single-line output without targets.
    Compact,
    /// One JSON object per line, for log collectors.
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::Compact => "compact",
            Self::Json => "json",
        })
    }
}

/// Install the global tracing subscriber.
///
/// Called once from `main` before anything worth logging happens.
pub fn init_logging(verbosity: u8, format: LogFormat) {
    let default_filter = match verbosity {
        0 => "tandem=info,tandem_protocol=info,tandem_contracts=info",
        1 => "tandem=debug,tandem_protocol=debug,tandem_contracts=debug",
        _ => "trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Plain => registry
            .with(tracing_fmt::layer().with_target(true))
            .init(),
        LogFormat::Compact => registry
            .with(tracing_fmt::layer().compact().with_target(false))
            .init(),
        LogFormat::Json => registry.with(tracing_fmt::layer().json()).init(),
    }

    tracing::debug!(verbosity, %format, "logging initialized");
}
