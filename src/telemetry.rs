//! Logging initialization.
//!
//! Controlled by `FEVAL_LOG`:
//! - unset or empty → compact human-readable events to stderr at `warn`
//! - `"json"` → JSON events to stderr, with span close events
//!
//! Filter directives come from `RUST_LOG` in both modes. Stdout is left to
//! the run summary.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Environment variable selecting the log mode.
pub const LOG_MODE_ENV: &str = "FEVAL_LOG";

/// Output mode chosen from the environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogMode {
    /// Compact text on stderr.
    Compact,
    /// JSON lines on stderr.
    Json,
}

impl LogMode {
    /// Mode for a `FEVAL_LOG` value. Unknown values fall back to compact.
    #[must_use]
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Compact,
        }
    }

    const fn default_directive(self) -> &'static str {
        match self {
            Self::Compact => "warn",
            Self::Json => "info",
        }
    }
}

/// Held by `main()` until exit.
#[derive(Debug)]
pub struct TelemetryGuard {
    mode: LogMode,
}

impl TelemetryGuard {
    /// The mode that was installed.
    #[must_use]
    pub const fn mode(&self) -> LogMode {
        self.mode
    }
}

/// Install the global subscriber based on `FEVAL_LOG`.
///
/// A second call is harmless: the existing subscriber stays.
#[must_use]
pub fn init() -> TelemetryGuard {
    let raw = std::env::var(LOG_MODE_ENV).ok();
    let mode = LogMode::from_env_value(raw.as_deref());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(mode.default_directive()));

    let result = match mode {
        LogMode::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogMode::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init(),
    };
    if let Err(e) = result {
        tracing::debug!(error = %e, "subscriber already installed");
    }
    if let Some(v) = raw.as_deref()
        && !v.trim().is_empty()
        && mode == LogMode::Compact
        && !v.trim().eq_ignore_ascii_case("compact")
    {
        tracing::warn!(value = v, "unknown {LOG_MODE_ENV} value, using compact logs");
    }
    TelemetryGuard { mode }
}
