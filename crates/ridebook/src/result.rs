//! Result and error types for Ridebook.
//!
//! Only faults live here. "Not found", "commit failed" and "ambiguous role"
//! are ordinary outcomes and are modelled as values by the components that
//! produce them.

use thiserror::Error;

/// Result type for Ridebook operations
pub type RidebookResult<T> = Result<T, RidebookError>;

/// Errors that can occur in Ridebook
#[derive(Debug, Error)]
pub enum RidebookError {
    /// A locator could not be evaluated because it is malformed
    #[error("Invalid locator in chain '{chain}': {message}")]
    InvalidLocator {
        /// Chain the locator belongs to
        chain: String,
        /// Error message
        message: String,
    },

    /// The browser automation interface faulted
    #[error("Driver fault during {operation}: {message}")]
    Driver {
        /// Operation that was running
        operation: String,
        /// Error message
        message: String,
    },

    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl RidebookError {
    /// Create a driver fault
    #[must_use]
    pub fn driver(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Driver {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid locator error
    #[must_use]
    pub fn invalid_locator(chain: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidLocator {
            chain: chain.into(),
            message: message.into(),
        }
    }

    /// Whether this error came from the browser itself (crashed page,
    /// failed navigation, lost connection). These end the current flow.
    #[must_use]
    pub const fn is_driver_fault(&self) -> bool {
        matches!(
            self,
            Self::Driver { .. } | Self::BrowserLaunch { .. } | Self::Navigation { .. }
        )
    }
}
