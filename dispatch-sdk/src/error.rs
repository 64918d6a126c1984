use dispatch_stream::{ListenerError, RunId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("Workflow run {run_id} failed: {}", errors.join("; "))]
    RunFailed { run_id: RunId, errors: Vec<String> },

    #[error("Failed to decode run output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SdkError {
    /// Whether the caller's own signal ended the wait.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SdkError::Listener(e) if e.is_cancelled())
    }
}

pub type Result<T> = std::result::Result<T, SdkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_failed_display() {
        let error = SdkError::RunFailed {
            run_id: RunId::new("wf-1"),
            errors: vec!["step a exploded".to_string(), "step b timed out".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "Workflow run wf-1 failed: step a exploded; step b timed out"
        );
    }

    #[test]
    fn test_listener_error_conversion() {
        let error: SdkError = ListenerError::Cancelled.into();
        assert!(error.is_cancelled());
        assert!(!SdkError::Config("bad".to_string()).is_cancelled());
    }
}
