//! Command implementations.

mod export;
mod limits;
mod tree;

pub use export::{ExportArgs, execute as export};
pub use limits::execute as limits;
pub use tree::execute as tree;

use pagetree_core::{BatchOrchestrator, Config, HttpExportApi, RateLimitCategory, RateLimiter};
use tokio::task::JoinHandle;
use tracing::warn;

/// Orchestrator wired with the configured client, settings, and quotas.
pub fn orchestrator(config: &Config) -> pagetree_core::Result<BatchOrchestrator<HttpExportApi>> {
    Ok(BatchOrchestrator::new(config.api_client()?)
        .with_settings(config.orchestrator_settings())
        .with_limiter(RateLimiter::new(&config.rate_limits())))
}

/// Drop all queued remote calls on Ctrl-C so the run winds down promptly.
///
/// Calls already in flight finish normally; abort the handle once the run is
/// over.
pub fn cancel_on_interrupt(limiter: RateLimiter) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let dropped: usize = RateLimitCategory::ALL
                .into_iter()
                .map(|category| limiter.clear_queue(category))
                .sum();
            warn!(dropped, "Interrupted; cancelled queued requests");
        }
    })
}
