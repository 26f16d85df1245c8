//! Whole-tree export.
//!
//! [`BatchOrchestrator::export_tree`] runs four phases:
//!
//! 1. **Discover** the hierarchy below the root.
//! 2. **Submit** one export job per page, one page at a time in breadth-first
//!    order. Pages with valid cached content skip the remote side entirely;
//!    pages with a remembered job reuse it.
//! 3. **Settle** once, then **poll** every pending job concurrently. The rate
//!    limiter is the only throttle.
//! 4. **Combine** the collected content in tree order.
//!
//! A discovery failure aborts the export. Anything that goes wrong for a
//! single page afterwards is recorded in [`ExportResult::failed_pages`] and
//! never affects its siblings.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::Result;
use crate::api::ExportApi;
use crate::cache::{
    CachedContent, ContentCache, DEFAULT_CONTENT_FRESHNESS_SECS, DEFAULT_JOB_TTL_SECS, JobCache,
};
use crate::clock::{Clock, SystemClock};
use crate::combine::{ContentCombiner, SectionEntry};
use crate::discovery::{DiscoveryResult, HierarchyDiscoverer};
use crate::limiter::RateLimiter;
use crate::retry::RetryPolicy;
use crate::types::{
    ExportPhase, ExportProgress, FailedExport, HierarchyNode, MaxDepth, NestedExportSettings,
    PageRef,
};
use crate::workflow::{Exporter, WorkflowSettings};

/// Progress callback type for reporting export progress.
pub type ProgressCallback = Arc<dyn Fn(&ExportProgress) + Send + Sync>;

/// Timing and caching knobs for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Per-page submission and polling settings.
    pub workflow: WorkflowSettings,
    /// Retry policy for metadata fetches during discovery.
    pub discovery_retry: RetryPolicy,
    /// Pause between the submission and polling phases.
    pub settle_delay: Duration,
    /// How long a submitted job id may be reused.
    pub job_ttl: chrono::Duration,
    /// How long unversioned content stays valid.
    pub content_freshness: chrono::Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            workflow: WorkflowSettings::default(),
            discovery_retry: RetryPolicy::default(),
            settle_delay: Duration::from_secs(3),
            job_ttl: chrono::Duration::seconds(DEFAULT_JOB_TTL_SECS),
            content_freshness: chrono::Duration::seconds(DEFAULT_CONTENT_FRESHNESS_SECS),
        }
    }
}

/// Outcome of one [`BatchOrchestrator::export_tree`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    /// True when no page failed.
    pub success: bool,
    /// Pages that were to be exported.
    pub total_pages: usize,
    /// Pages whose content made it into the document.
    pub successful_pages: usize,
    /// Of the successful pages, those served from the content cache.
    pub cached_pages: usize,
    /// Pages that could not be exported, in breadth-first order.
    pub failed_pages: Vec<FailedExport>,
    /// Placeholders found during discovery.
    pub circular_references: usize,
    /// Combined document.
    #[serde(skip)]
    pub combined_content: String,
    /// Where each page landed in the combined document.
    pub sections: Vec<SectionEntry>,
}

/// Drives discovery, export, and combination for page trees.
///
/// Caches and the rate limiter live as long as the orchestrator, so repeated
/// exports through one instance reuse jobs and content.
pub struct BatchOrchestrator<A: ExportApi> {
    api: A,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    jobs: JobCache,
    contents: ContentCache,
    settings: OrchestratorSettings,
    progress_callback: Option<ProgressCallback>,
}

impl<A: ExportApi> BatchOrchestrator<A> {
    /// Create with default settings, default quotas, and the system clock.
    #[must_use]
    pub fn new(api: A) -> Self {
        let settings = OrchestratorSettings::default();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            api,
            limiter: RateLimiter::default(),
            jobs: JobCache::new(settings.job_ttl, Arc::clone(&clock)),
            contents: ContentCache::new(settings.content_freshness, Arc::clone(&clock)),
            clock,
            settings,
            progress_callback: None,
        }
    }

    /// Replace the timing and caching settings. Clears both caches.
    #[must_use]
    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self.rebuild_caches();
        self
    }

    /// Share an existing rate limiter.
    #[must_use]
    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// Read cache time from `clock`. Clears both caches.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self.rebuild_caches();
        self
    }

    /// Set progress callback.
    #[must_use]
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ExportProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    fn rebuild_caches(&mut self) {
        self.jobs = JobCache::new(self.settings.job_ttl, Arc::clone(&self.clock));
        self.contents = ContentCache::new(self.settings.content_freshness, Arc::clone(&self.clock));
    }

    /// The remote API.
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// The shared rate limiter; clone it to cancel queued work from elsewhere.
    pub const fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Remembered export jobs.
    pub const fn job_cache(&self) -> &JobCache {
        &self.jobs
    }

    /// Remembered page content.
    pub const fn content_cache(&self) -> &ContentCache {
        &self.contents
    }

    /// Active settings.
    pub const fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    fn report(&self, progress: ExportProgress) {
        debug!(state = ?progress.state, message = %progress.message, "Progress");
        if let Some(cb) = &self.progress_callback {
            cb(&progress);
        }
    }

    /// Discover the tree below `root` without exporting anything.
    pub async fn discover(&self, root: &PageRef, max_depth: MaxDepth) -> Result<DiscoveryResult> {
        HierarchyDiscoverer::new(&self.api, &self.limiter, self.settings.discovery_retry)
            .discover(root, max_depth)
            .await
    }

    /// Export `root` and, per `nested`, its descendants into one document.
    pub async fn export_tree(
        &self,
        root: &PageRef,
        nested: NestedExportSettings,
    ) -> Result<ExportResult> {
        let max_depth = nested.effective_depth();
        info!(root = %root, max_depth = %max_depth, "Starting export");

        if !nested.include_nested {
            if let Some(hit) = self.contents.get(root, None) {
                info!(root = %root, "Serving root page from cache");
                return Ok(self.cached_root(root, hit));
            }
        }

        self.report(ExportProgress::phase(
            ExportPhase::Discovering,
            format!("Discovering pages under {root}"),
        ));
        let discovery = match self.discover(root, max_depth).await {
            Ok(discovery) => discovery,
            Err(err) => {
                self.report(ExportProgress::phase(
                    ExportPhase::Failed,
                    format!("Discovery failed: {err}"),
                ));
                return Err(err);
            },
        };

        let nodes = discovery.flatten();
        let total = nodes.len();
        let order: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.page_id.as_str(), index))
            .collect();
        self.report(
            ExportProgress::phase(ExportPhase::Exporting, format!("Exporting {total} pages"))
                .with_counts(0, total),
        );

        let exporter = Exporter::new(
            &self.api,
            &self.limiter,
            &self.jobs,
            &self.contents,
            self.settings.workflow,
        );
        let mut content_by_page = HashMap::with_capacity(total);
        let mut failed_pages = Vec::new();
        let mut pending = Vec::new();
        let mut cached_pages = 0;

        for (index, node) in nodes.iter().copied().enumerate() {
            if let Some(hit) = self.contents.get(&node.page_ref(), node.updated_at.as_deref()) {
                content_by_page.insert(node.page_id.clone(), hit.content);
                cached_pages += 1;
            } else {
                let mut workflow = exporter.workflow(node);
                workflow.submit().await;
                if workflow.state().is_terminal() {
                    if let Err(failure) = workflow.into_content() {
                        warn!(page = %failure.page_id, error = %failure.error, "Page export failed");
                        failed_pages.push(failure);
                    }
                } else {
                    pending.push(workflow);
                }
            }
            self.report(
                ExportProgress::phase(
                    ExportPhase::Exporting,
                    format!("Submitted {}/{total}: {}", index + 1, node.name),
                )
                .with_counts(index + 1, total),
            );
        }

        if !pending.is_empty() {
            info!(
                pending = pending.len(),
                settle_ms = u64::try_from(self.settings.settle_delay.as_millis()).unwrap_or(u64::MAX),
                "Waiting before polling export jobs"
            );
            tokio::time::sleep(self.settings.settle_delay).await;
        }

        let resolved = AtomicUsize::new(total - pending.len());
        let concurrency = pending.len().max(1);
        let outcomes: Vec<_> = stream::iter(pending)
            .map(|mut workflow| {
                let resolved = &resolved;
                async move {
                    workflow.complete().await;
                    let node = workflow.node();
                    let outcome = workflow.into_content();
                    let done = resolved.fetch_add(1, Ordering::SeqCst) + 1;
                    self.report(
                        ExportProgress::phase(
                            ExportPhase::Exporting,
                            format!("Exported {done}/{total}: {}", node.name),
                        )
                        .with_counts(done, total),
                    );
                    (node, outcome)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for (node, outcome) in outcomes {
            match outcome {
                Ok(content) => {
                    content_by_page.insert(node.page_id.clone(), content);
                },
                Err(failure) => {
                    warn!(page = %failure.page_id, error = %failure.error, "Page export failed");
                    failed_pages.push(failure);
                },
            }
        }
        failed_pages.sort_by_key(|f| order.get(f.page_id.as_str()).copied().unwrap_or(usize::MAX));

        self.report(ExportProgress::phase(
            ExportPhase::Combining,
            format!("Combining {} pages", content_by_page.len()),
        ));
        let document = ContentCombiner::combine(&content_by_page, &discovery.tree);

        let result = ExportResult {
            success: failed_pages.is_empty(),
            total_pages: total,
            successful_pages: content_by_page.len(),
            cached_pages,
            failed_pages,
            circular_references: discovery.circular_references,
            combined_content: document.content,
            sections: document.sections,
        };
        self.report(
            ExportProgress::phase(
                ExportPhase::Complete,
                format!(
                    "Exported {}/{} pages ({} failed)",
                    result.successful_pages,
                    result.total_pages,
                    result.failed_pages.len()
                ),
            )
            .with_counts(result.successful_pages, result.total_pages),
        );
        info!(
            successful = result.successful_pages,
            cached = result.cached_pages,
            failed = result.failed_pages.len(),
            "Export finished"
        );
        Ok(result)
    }

    fn cached_root(&self, root: &PageRef, hit: CachedContent) -> ExportResult {
        let node = HierarchyNode {
            page_id: root.page_id.clone(),
            doc_id: root.doc_id.clone(),
            name: hit.page_name,
            depth: 0,
            path: "0".to_string(),
            updated_at: hit.source_version,
            circular: false,
            children: Vec::new(),
        };
        let content_by_page = HashMap::from([(root.page_id.clone(), hit.content)]);

        self.report(ExportProgress::phase(ExportPhase::Combining, "Combining 1 page"));
        let document = ContentCombiner::combine(&content_by_page, &node);
        self.report(
            ExportProgress::phase(ExportPhase::Complete, "Exported 1/1 pages (cached)")
                .with_counts(1, 1),
        );

        ExportResult {
            success: true,
            total_pages: 1,
            successful_pages: 1,
            cached_pages: 1,
            failed_pages: Vec::new(),
            circular_references: 0,
            combined_content: document.content,
            sections: document.sections,
        }
    }
}
