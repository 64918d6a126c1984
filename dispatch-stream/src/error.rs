//! Error types for the dispatch-stream crate.

use crate::types::SubscriberId;

/// Errors surfaced to callers of a pooled listener.
///
/// Connection-level failures never show up here directly: the connection
/// manager retries them internally. Callers only see their own cancellation,
/// the listener being torn down, or permanent retry exhaustion.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The caller's cancellation signal fired before an event arrived
    #[error("Operation cancelled")]
    Cancelled,

    /// A newer subscriber for the same key displaced this waiter
    #[error("Subscription {0} was replaced by a newer subscriber for the same key")]
    SubscriptionReplaced(SubscriberId),

    /// The listener gave up reconnecting and is no longer usable
    #[error("Listener gave up after {attempts} reconnection attempts")]
    RetriesExhausted {
        /// Number of reconnection attempts that were made
        attempts: u32,
    },

    /// The listener has been shut down
    #[error("Listener has been shut down")]
    Shutdown,

    /// No Tokio runtime was available to drive the connection
    #[error("No Tokio runtime available to drive the listener connection")]
    NoRuntime,

    /// Registering a durable event with the dispatcher failed
    #[error("Durable event registration failed: {0}")]
    Registration(#[source] TransportError),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An error occurred during shutdown
    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}

impl ListenerError {
    /// Whether this error is the caller's own cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ListenerError::Cancelled)
    }
}

/// Errors reported by a [`DispatcherTransport`](crate::DispatcherTransport).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The dispatcher could not be reached
    #[error("Dispatcher unavailable: {0}")]
    Unavailable(String),

    /// The stream broke mid-flight
    #[error("Stream error: {0}")]
    Stream(String),

    /// The dispatcher answered with a non-OK status
    #[error("Status {code}: {message}")]
    Status {
        /// Status code reported by the dispatcher
        code: i32,
        /// Human-readable status message
        message: String,
    },
}

/// Convenience type alias for Results using ListenerError.
pub type Result<T> = std::result::Result<T, ListenerError>;

/// Result type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_error_display() {
        assert_eq!(ListenerError::Cancelled.to_string(), "Operation cancelled");

        let error = ListenerError::SubscriptionReplaced(SubscriberId::new(7));
        assert!(error.to_string().contains("sub-7"));

        let error = ListenerError::RetriesExhausted { attempts: 5 };
        assert_eq!(
            error.to_string(),
            "Listener gave up after 5 reconnection attempts"
        );

        let error = ListenerError::Configuration("max retries must be positive".to_string());
        assert_eq!(
            error.to_string(),
            "Configuration error: max retries must be positive"
        );
    }

    #[test]
    fn test_transport_error_display() {
        let error = TransportError::Unavailable("connection refused".to_string());
        assert_eq!(error.to_string(), "Dispatcher unavailable: connection refused");

        let error = TransportError::Status {
            code: 14,
            message: "unavailable".to_string(),
        };
        assert_eq!(error.to_string(), "Status 14: unavailable");
    }

    #[test]
    fn test_registration_error_keeps_source() {
        use std::error::Error;

        let error = ListenerError::Registration(TransportError::Stream("reset".to_string()));
        let source = error.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Stream error: reset"));
    }

    #[test]
    fn test_only_cancellation_is_cancelled() {
        assert!(ListenerError::Cancelled.is_cancelled());
        assert!(!ListenerError::Shutdown.is_cancelled());
        assert!(!ListenerError::RetriesExhausted { attempts: 1 }.is_cancelled());
    }
}
