//! Exit codes for shell scripts and CI.
//!
//! | Code | Category | Description |
//! |------|----------|-------------|
//! | 0 | Success | Every page exported |
//! | 1 | `Internal` | Unexpected error |
//! | 2 | `Usage` | Invalid arguments, configuration, or credentials |
//! | 3 | `NotFound` | Document or page not found |
//! | 4 | `Partial` | Export finished but some pages failed |
//! | 5 | `Network` | Network or remote service failure |
//! | 6 | `Timeout` | Operation timed out |

use std::fmt;
use std::process::ExitCode;

use pagetree_core::Error as CoreError;

/// Semantic error category determining the exit code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCategory {
    /// Unexpected internal error (exit code 1)
    Internal = 1,
    /// Invalid arguments, configuration, or credentials (exit code 2)
    Usage = 2,
    /// Document or page not found (exit code 3)
    NotFound = 3,
    /// Export finished but some pages failed (exit code 4)
    Partial = 4,
    /// Network or remote service failure (exit code 5)
    Network = 5,
    /// Operation timed out (exit code 6)
    Timeout = 6,
}

impl ErrorCategory {
    pub const fn exit_code(self) -> u8 {
        self as u8
    }

    pub fn as_exit_code(self) -> ExitCode {
        ExitCode::from(self.exit_code())
    }

    /// Categorize an error by the first library error in its chain.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        if let Some(partial) = err.downcast_ref::<PartialExport>() {
            return partial.category();
        }
        err.chain()
            .find_map(|cause| cause.downcast_ref::<CoreError>())
            .map_or(Self::Internal, Self::from_core)
    }

    pub const fn from_core(err: &CoreError) -> Self {
        match err {
            CoreError::Config(_) | CoreError::Auth(_) => Self::Usage,
            CoreError::NotFound(_) => Self::NotFound,
            CoreError::Network(_) | CoreError::Api { .. } => Self::Network,
            CoreError::Timeout(_) => Self::Timeout,
            _ => Self::Internal,
        }
    }
}

/// Export finished with failed pages.
#[derive(Debug)]
pub struct PartialExport {
    /// Pages that ended in a failure record.
    pub failed: usize,
    /// Pages discovered in the tree.
    pub total: usize,
}

impl PartialExport {
    pub const fn category(&self) -> ErrorCategory {
        ErrorCategory::Partial
    }
}

impl fmt::Display for PartialExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} pages failed to export", self.failed, self.total)
    }
}

impl std::error::Error for PartialExport {}
