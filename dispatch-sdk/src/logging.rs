//! Logging setup for applications using the SDK.
//!
//! The listeners log through `tracing`; nothing is printed until the
//! application installs a subscriber, either its own or one of these.

use tracing_subscriber::{fmt, EnvFilter, Registry};

pub const ENV_LOG_MODE: &str = "DISPATCH_LOG_MODE";
pub const ENV_LOG_LEVEL: &str = "DISPATCH_LOG_LEVEL";

/// Logging mode for different use cases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No subscriber is installed
    Silent,
    /// Compact stderr output
    Development,
    /// Verbose output with source locations
    Debug,
    /// One JSON object per line, for log shippers
    Json,
}

impl LoggingMode {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "silent" => Some(Self::Silent),
            "development" => Some(Self::Development),
            "debug" => Some(Self::Debug),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid environment variable: {0}")]
    InvalidEnv(String),
}

/// Initialize logging with the specified mode.
///
/// Call once, early. `DISPATCH_LOG_LEVEL` (then `RUST_LOG`) overrides the
/// mode's default filter, e.g. `DISPATCH_LOG_LEVEL=dispatch_stream=debug`.
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let result = match mode {
        LoggingMode::Silent => return Ok(()),
        LoggingMode::Development => Registry::default()
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .compact(),
            )
            .with(create_env_filter("info"))
            .try_init(),
        LoggingMode::Debug => Registry::default()
            .with(
                fmt::layer()
                    .pretty()
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(create_env_filter("debug"))
            .try_init(),
        LoggingMode::Json => Registry::default()
            .with(fmt::layer().json().with_current_span(false))
            .with(create_env_filter("info"))
            .try_init(),
    };

    result.map_err(|e| LoggingError::TracingInit(e.to_string()))
}

/// Initialize logging from `DISPATCH_LOG_MODE` (silent, development, debug, json).
///
/// Unset means silent; an unknown mode is an error.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    let mode = match std::env::var(ENV_LOG_MODE) {
        Ok(name) => LoggingMode::from_name(&name.to_ascii_lowercase())
            .ok_or_else(|| LoggingError::InvalidEnv(format!("{ENV_LOG_MODE}={name}")))?,
        Err(_) => LoggingMode::Silent,
    };

    init_logging(mode)
}

/// Install the development subscriber.
pub fn init_tracing() -> Result<(), LoggingError> {
    init_logging(LoggingMode::Development)
}

fn create_env_filter(default_level: &str) -> EnvFilter {
    if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
        EnvFilter::new(level)
    } else if let Ok(rust_log) = std::env::var("RUST_LOG") {
        EnvFilter::new(rust_log)
    } else {
        EnvFilter::new(default_level)
    }
}

/// Whether a global subscriber has been installed.
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}
