//! Error types for the CLI

use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// Live runs need the `browser` feature
    #[error("Browser support not compiled in. Rebuild with --features browser, or use --fixture")]
    BrowserUnavailable,

    /// The flow ran but did not reach its goal
    #[error("Flow did not complete: {step}")]
    FlowIncomplete {
        /// Step that stopped the flow, with the reason
        step: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ridebook library error
    #[error("{0}")]
    Ridebook(#[from] ridebook::RidebookError),
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a flow-incomplete error
    #[must_use]
    pub fn flow_incomplete(step: impl Into<String>) -> Self {
        Self::FlowIncomplete { step: step.into() }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error() {
        let err = CliError::config("missing credentials");
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("missing credentials"));
    }

    #[test]
    fn test_invalid_argument_error() {
        let err = CliError::invalid_argument("--max-iterations must be positive");
        assert!(err.to_string().contains("Invalid argument"));
    }

    #[test]
    fn test_flow_incomplete_error() {
        let err = CliError::flow_incomplete("submit: 'submit' not found");
        assert_eq!(
            err.to_string(),
            "Flow did not complete: submit: 'submit' not found"
        );
    }

    #[test]
    fn test_from_library_error() {
        let err: CliError = ridebook::RidebookError::config("bad url").into();
        assert!(matches!(err, CliError::Ridebook(_)));
        assert!(err.to_string().contains("bad url"));
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "page.html");
        let err: CliError = io.into();
        assert!(err.to_string().contains("I/O error"));
    }
}
