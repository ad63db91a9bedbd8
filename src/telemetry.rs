//! Telemetry initialization for embedders.
//!
//! The engine only emits `tracing` spans and events; this module installs a
//! subscriber for them. Controlled by two environment variables:
//!
//! | Variable            | Values                         | Default |
//! |---------------------|--------------------------------|---------|
//! | `STRATA_LOG`        | any `EnvFilter` directive      | `info`  |
//! | `STRATA_LOG_FORMAT` | `json`, `text`, `off`          | `json`  |
//!
//! Output goes to stderr. Span close events are included, so each table
//! merge is logged with its duration.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Filter directive variable.
pub const LOG_ENV: &str = "STRATA_LOG";
/// Output format variable.
pub const LOG_FORMAT_ENV: &str = "STRATA_LOG_FORMAT";

/// How events are written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
    Off,
}

impl LogFormat {
    /// Parse a `STRATA_LOG_FORMAT` value. Unknown or empty values fall back
    /// to JSON.
    #[must_use]
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("text") => Self::Text,
            Some(v) if v.eq_ignore_ascii_case("off") => Self::Off,
            _ => Self::Json,
        }
    }
}

/// Held until exit. Flushes stderr on drop.
pub struct TelemetryGuard {
    format: LogFormat,
}

impl TelemetryGuard {
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.format != LogFormat::Off {
            use std::io::Write as _;
            let _ = std::io::stderr().flush();
        }
    }
}

/// Install the global subscriber described by the environment.
///
/// A second call, or a call after the embedder installed its own subscriber,
/// leaves the existing one in place.
#[must_use]
pub fn init() -> TelemetryGuard {
    let format = LogFormat::from_env_value(std::env::var(LOG_FORMAT_ENV).ok().as_deref());
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = match format {
        LogFormat::Off => Ok(()),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init(),
    };
    if installed.is_err() {
        tracing::debug!("subscriber already installed");
    }

    TelemetryGuard { format }
}
