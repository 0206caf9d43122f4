/// Structured error types for chatexport-core.
///
/// Uses `thiserror` so the CLI (which works in `anyhow`) and tests can match
/// on the failure kind. Every variant renders as one short human-readable
/// line; that line is what the user sees.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for chatexport-core operations
#[derive(Error, Debug)]
pub enum ExportError {
    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// JSON parsing or serialization failed
    #[error("JSON error at {context}: {source}")]
    Json {
        context: String,
        source: serde_json::Error,
    },

    /// Page fixture could not be used
    #[error("Invalid page fixture {path:?}: {reason}")]
    InvalidFixture { path: PathBuf, reason: String },

    /// Not on the chat application, or the page lacks what we need
    #[error("Please use this on a Gemini chat page (current page: {url})")]
    UnsupportedPage { url: String },

    /// Another export is still running on this exporter
    #[error("An export is already in progress")]
    SessionActive,

    /// The user cancelled the export
    #[error("Export cancelled by user")]
    Cancelled,

    /// A collector was driven out of order (e.g. reused after completing)
    #[error("Invalid collector transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Batch delete was asked to do something its state does not allow
    #[error("{reason}")]
    Batch { reason: String },

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Config { reason: String },
}

/// Result type alias for chatexport-core operations
pub type Result<T> = std::result::Result<T, ExportError>;

impl ExportError {
    /// Create a JSON error with context
    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }

    /// Create an invalid fixture error
    pub fn invalid_fixture(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidFixture {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported_page(url: impl Into<String>) -> Self {
        Self::UnsupportedPage { url: url.into() }
    }

    pub fn batch(reason: impl Into<String>) -> Self {
        Self::Batch {
            reason: reason.into(),
        }
    }

    /// Create a config error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Cancellation is an outcome, not a failure; callers use this to pick
    /// the wording and exit status.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Failure of one step while deleting a single sidebar conversation.
///
/// These never abort a batch; they are collected into the delete report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeleteStepError {
    #[error("Could not find menu button for conversation")]
    MenuButtonNotFound,

    #[error("Could not find Delete option in menu")]
    DeleteOptionNotFound,

    #[error("Could not find confirmation button")]
    ConfirmButtonNotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExportError::unsupported_page("https://example.com/");
        assert!(err.to_string().contains("Gemini chat page"));
        assert!(err.to_string().contains("https://example.com/"));

        let err = ExportError::invalid_fixture("/tmp/page.json", "no turns");
        assert!(err.to_string().contains("Invalid page fixture"));
        assert!(err.to_string().contains("/tmp/page.json"));

        assert_eq!(ExportError::Cancelled.to_string(), "Export cancelled by user");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: ExportError = io_err.into();

        assert!(matches!(err, ExportError::Io { .. }));
        assert!(!err.is_cancelled());
    }
}
