//! # chessie-telemetry
//!
//! Logging setup for Chessie binaries and an in-memory event capture layer
//! for tests that assert on emitted diagnostics.
//!
//! ```rust,ignore
//! chessie_telemetry::init_telemetry(LogFormat::Pretty)?;
//! tracing::info!("ready");
//! ```

pub mod capture;

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

pub use capture::{CapturedEvent, CapturedEvents, EventCaptureLayer};

/// Default filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, one line per event.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The filter directive could not be parsed.
    #[error("Invalid log filter '{directive}': {message}")]
    InvalidFilter {
        /// The directive that failed to parse.
        directive: String,
        /// Parser message.
        message: String,
    },

    /// A global subscriber was already installed.
    #[error("Failed to install subscriber: {0}")]
    Init(String),
}

/// Install the global subscriber, reading the filter from `RUST_LOG`.
/// Log lines go to stderr so command output stays machine-readable.
///
/// # Errors
///
/// Returns [`TelemetryError::Init`] if a global subscriber already exists.
pub fn init_telemetry(format: LogFormat) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter, format)
}

/// Install the global subscriber with an explicit filter directive
/// (for example `chessie_rag=debug`), ignoring `RUST_LOG`.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] for a malformed directive and
/// [`TelemetryError::Init`] if a global subscriber already exists.
pub fn init_with_filter(directive: &str, format: LogFormat) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(directive).map_err(|e| TelemetryError::InvalidFilter {
        directive: directive.to_string(),
        message: e.to_string(),
    })?;
    install(filter, format)
}

fn install(filter: EnvFilter, format: LogFormat) -> Result<(), TelemetryError> {
    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Pretty => {
            registry.with(fmt::layer().with_target(true).with_writer(std::io::stderr)).try_init()
        }
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false).with_writer(std::io::stderr))
            .try_init(),
    };
    result.map_err(|e| TelemetryError::Init(e.to_string()))
}
