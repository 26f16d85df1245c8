//! Error types and handling for pagetree-core operations.
//!
//! A single error enum covers every failure the export pipeline can hit.
//! Errors are categorized for logging and carry a recoverability hint that the
//! [`RetryPolicy`](crate::retry::RetryPolicy) and the polling loop consult.
//!
//! ## Error Categories
//!
//! - **Configuration**: missing credentials, out-of-range settings
//! - **Network / API**: connection failures, throttling (429), server errors (5xx)
//! - **Remote jobs**: an export job reported `failed` or never completed
//! - **Scheduling**: operations cancelled while waiting for rate-limit admission
//!
//! ## Propagation
//!
//! Discovery errors abort the whole export. Errors raised while exporting a
//! single page are captured into a
//! [`FailedExport`](crate::types::FailedExport) and never abort siblings.
//!
//! ```rust
//! use pagetree_core::{Error, RateLimitCategory};
//!
//! let err = Error::QueueCleared { category: RateLimitCategory::Read };
//! assert_eq!(err.category(), "cancelled");
//! assert!(!err.is_recoverable());
//! ```

use thiserror::Error;

use crate::limiter::RateLimitCategory;

/// The main error type for pagetree-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed (config files, output files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network operation failed before a response was received.
    ///
    /// Connection and timeout failures are recoverable; builder and
    /// redirect-policy failures are not.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The remote API answered with a non-success status.
    ///
    /// `429` and `5xx` responses are treated as transient.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code returned by the API.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// The API rejected the credentials (401/403).
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The requested document, page, or export job does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration is missing or invalid.
    ///
    /// Raised before any remote call is made. Never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A response could not be interpreted.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The operation was still waiting for rate-limit admission when the
    /// category's queue was cleared.
    #[error("Rate limit queue cleared for category '{category}'")]
    QueueCleared {
        /// Category whose queue was cleared.
        category: RateLimitCategory,
    },

    /// The remote export job finished in a failed state, or completed without
    /// a usable download reference.
    #[error("Export failed for page '{page}': {reason}")]
    ExportFailed {
        /// Page identifier.
        page: String,
        /// Reason reported by the remote side.
        reason: String,
    },

    /// An operation did not finish within its bound (poll attempts, request
    /// timeout).
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Generic error for uncategorized failures.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl Error {
    /// Check if the error is transient and worth another attempt.
    ///
    /// Status polling uses this directly. The retry policy uses
    /// [`Error::is_retryable`], which also covers failed export jobs.
    ///
    /// ```rust
    /// use pagetree_core::Error;
    ///
    /// assert!(Error::Api { status: 503, message: "busy".into() }.is_recoverable());
    /// assert!(Error::Api { status: 429, message: "slow down".into() }.is_recoverable());
    /// assert!(!Error::Api { status: 400, message: "bad".into() }.is_recoverable());
    /// assert!(!Error::Config("missing token".into()).is_recoverable());
    /// ```
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status == 429 || (500..=599).contains(status),
            Self::Timeout(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Whether a [`RetryPolicy`](crate::retry::RetryPolicy) should try again.
    ///
    /// Transient errors plus failed export jobs and unclassified errors.
    /// Authentication, missing pages, other 4xx responses, configuration
    /// problems and cancellations fail on the first attempt.
    ///
    /// ```rust
    /// use pagetree_core::Error;
    ///
    /// assert!(Error::Api { status: 502, message: "bad gateway".into() }.is_retryable());
    /// assert!(!Error::Auth("token rejected".into()).is_retryable());
    /// assert!(!Error::NotFound("doc/page".into()).is_retryable());
    /// assert!(!Error::Api { status: 422, message: "invalid".into() }.is_retryable());
    /// ```
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.is_recoverable() || matches!(self, Self::ExportFailed { .. } | Self::Other(_))
    }

    /// Get the error category as a string identifier for logs.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Network(_) => "network",
            Self::Api { .. } => "api",
            Self::Auth(_) => "auth",
            Self::NotFound(_) => "not_found",
            Self::Config(_) => "config",
            Self::Parse(_) => "parse",
            Self::Serialization(_) => "serialization",
            Self::QueueCleared { .. } => "cancelled",
            Self::ExportFailed { .. } => "export_failed",
            Self::Timeout(_) => "timeout",
            Self::Other(_) => "other",
        }
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_api_status_recoverability() {
        for status in [429, 500, 502, 503, 599] {
            let err = Error::Api {
                status,
                message: String::new(),
            };
            assert!(err.is_recoverable(), "{status} should be recoverable");
        }
        for status in [400, 401, 404, 422] {
            let err = Error::Api {
                status,
                message: String::new(),
            };
            assert!(!err.is_recoverable(), "{status} should not be recoverable");
        }
    }

    #[test]
    fn test_permanent_errors_are_not_retryable() {
        assert!(!Error::Config("no token".into()).is_retryable());
        assert!(!Error::Auth("401 Unauthorized".into()).is_retryable());
        assert!(!Error::NotFound("doc/canvas-1".into()).is_retryable());
        for status in [400, 403, 404, 422] {
            let err = Error::Api {
                status,
                message: String::new(),
            };
            assert!(!err.is_retryable(), "{status} should not be retried");
        }
        assert!(Error::Timeout("status check".into()).is_retryable());
        assert!(
            !Error::QueueCleared {
                category: RateLimitCategory::WriteContent
            }
            .is_retryable()
        );
        assert!(Error::Other("boom".into()).is_retryable());
        assert!(
            Error::ExportFailed {
                page: "canvas-1".into(),
                reason: "failed".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_display_messages() {
        let err = Error::QueueCleared {
            category: RateLimitCategory::WriteContent,
        };
        assert_eq!(
            err.to_string(),
            "Rate limit queue cleared for category 'writeContent'"
        );

        let err = Error::ExportFailed {
            page: "canvas-7".into(),
            reason: "renderer crashed".into(),
        };
        assert_eq!(
            err.to_string(),
            "Export failed for page 'canvas-7': renderer crashed"
        );
    }

    #[test]
    fn test_io_recoverability() {
        let timed_out = Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "t"));
        let denied = Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "d",
        ));
        assert!(timed_out.is_recoverable());
        assert!(!denied.is_recoverable());
    }

    #[test]
    fn test_categories() {
        assert_eq!(Error::Auth("x".into()).category(), "auth");
        assert_eq!(Error::Timeout("x".into()).category(), "timeout");
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(Error::from(json_err).category(), "serialization");
    }
}
