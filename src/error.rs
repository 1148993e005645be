//! Error types for the change propagation engine.

use std::fmt;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the change propagation engine.
///
/// Errors surface in two places: synchronously from builders (configuration
/// problems caught before anything runs) and as `Err` items on a
/// [`ChangeSetStream`](crate::engine::ChangeSetStream) (failures that happen
/// while the engine is live). A stream item error is always terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The upstream batch source reported a failure.
    ///
    /// Forwarded to the subscriber as the final item of the stream.
    /// The engine tears its cache down and honors no further timers.
    ///
    /// **Recovery:** None inside the engine. Resubscribe with a fresh source.
    SourceError(String),

    /// Configuration error detected at construction time.
    ///
    /// Common causes:
    /// - No key selector was supplied
    /// - A zero pause timeout
    /// - No tokio runtime available to drive the engine
    ///
    /// **Recovery:** Fix configuration and rebuild.
    ConfigError(String),

    /// The time source could not schedule an expiry timer.
    ///
    /// A missed expiry breaks the cache's time-based contract, so this is
    /// fatal to the engine and forwarded to the subscriber.
    SchedulerError(String),

    /// The stream was cancelled by its subscriber.
    Cancelled,

    /// Generic error with custom message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SourceError(msg) => write!(f, "Source error: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::SchedulerError(msg) => write!(f, "Scheduler error: {}", msg),
            Error::Cancelled => write!(f, "Cancelled"),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::ConfigError(e.to_string())
    }
}

impl From<tokio::runtime::TryCurrentError> for Error {
    fn from(e: tokio::runtime::TryCurrentError) -> Self {
        Error::SchedulerError(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}
