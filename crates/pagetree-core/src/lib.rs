//! # pagetree-core
//!
//! Core functionality for pagetree: export a whole tree of nested remote pages
//! as one Markdown document while staying inside the remote service's rate
//! limits.
//!
//! ## Architecture
//!
//! - **Rate limiting**: per-category admission control guarding every remote call
//! - **Retry**: bounded exponential backoff around individual calls
//! - **Discovery**: depth-bounded, cycle-safe traversal of the page hierarchy
//! - **Workflow**: the submit/poll/download state machine for one page
//! - **Caches**: job-id and content memoization with lazy expiry
//! - **Orchestration**: submit everything, settle, poll everything, combine
//! - **Configuration**: TOML settings with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagetree_core::{BatchOrchestrator, Config, NestedExportSettings, PageRef};
//!
//! # async fn example() -> pagetree_core::Result<()> {
//! let config = Config::load(None)?;
//! let orchestrator = BatchOrchestrator::new(config.api_client()?)
//!     .with_settings(config.orchestrator_settings())
//!     .with_progress(|p| eprintln!("{:?}: {}", p.state, p.message));
//!
//! let result = orchestrator
//!     .export_tree(&PageRef::new("AbCdEf", "canvas-1"), config.nested)
//!     .await?;
//! println!("{}", result.combined_content);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use pagetree_core::Error;
//!
//! fn describe(err: &Error) -> &'static str {
//!     match err {
//!         Error::Config(_) => "fix your settings",
//!         e if e.is_recoverable() => "try again later",
//!         _ => "giving up",
//!     }
//! }
//!
//! assert_eq!(describe(&Error::Timeout("slow".into())), "try again later");
//! ```

/// Remote API seam and its HTTP implementation
pub mod api;
/// Job and content caches
pub mod cache;
/// Wall-clock abstraction
pub mod clock;
/// Pre-order document assembly
pub mod combine;
/// Configuration loading
pub mod config;
/// Page-tree discovery
pub mod discovery;
/// Error types and result aliases
pub mod error;
/// Per-category rate limiting
pub mod limiter;
/// Whole-tree export
pub mod orchestrator;
/// Exponential-backoff retries
pub mod retry;
/// Core data types
pub mod types;
/// Per-page export state machine
pub mod workflow;

// Re-export commonly used types
pub use api::{ExportApi, HttpExportApi};
pub use cache::{ContentCache, JobCache};
pub use combine::{CombinedDocument, ContentCombiner};
pub use config::Config;
pub use discovery::{DiscoveryResult, HierarchyDiscoverer};
pub use error::{Error, Result};
pub use limiter::{RateLimitCategory, RateLimitQuota, RateLimiter, RateLimits};
pub use orchestrator::{BatchOrchestrator, ExportResult, OrchestratorSettings, ProgressCallback};
pub use retry::{RetryPolicy, with_retry};
pub use types::*;
pub use workflow::{ExportState, ExportWorkflow, WorkflowSettings};
