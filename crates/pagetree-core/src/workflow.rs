//! Per-page export state machine.
//!
//! ```text
//! NotStarted ──submit──▶ Submitted ──poll──▶ Polling ──▶ Complete
//!      │                                        │
//!      └──────────────▶ Failed ◀────────────────┼──▶ TimedOut
//! ```
//!
//! Submission goes through the `WriteContent` category with retries. Polling
//! goes through the `Read` category at a fixed interval, up to a fixed number
//! of attempts, and does not use the retry policy: a transient error simply
//! consumes one attempt. The download itself is retried but not throttled.
//!
//! A successful run writes one [`ContentCache`] entry and, if a new job was
//! submitted, one [`JobCache`] entry. A job that fails or times out is evicted
//! from the job cache so the next run submits afresh.

use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::api::{ExportApi, JobStatus};
use crate::cache::{ContentCache, JobCache};
use crate::limiter::{RateLimitCategory, RateLimiter};
use crate::retry::RetryPolicy;
use crate::types::{FailedExport, HierarchyNode, OutputFormat, PageRef};
use crate::Error;

/// Knobs for submission and polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowSettings {
    /// Format requested from the export endpoint.
    pub format: OutputFormat,
    /// Pause between status checks.
    pub poll_interval: Duration,
    /// Status checks before giving up.
    pub max_poll_attempts: u32,
    /// Retry policy for submission and download.
    pub retry: RetryPolicy,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::Markdown,
            poll_interval: Duration::from_secs(2),
            max_poll_attempts: 30,
            retry: RetryPolicy::default(),
        }
    }
}

/// Shared collaborators every workflow in a batch uses.
pub struct Exporter<'a, A: ExportApi + ?Sized> {
    api: &'a A,
    limiter: &'a RateLimiter,
    jobs: &'a JobCache,
    contents: &'a ContentCache,
    settings: WorkflowSettings,
}

impl<A: ExportApi + ?Sized> Clone for Exporter<'_, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: ExportApi + ?Sized> Copy for Exporter<'_, A> {}

impl<'a, A: ExportApi + ?Sized> Exporter<'a, A> {
    /// Bundle the collaborators.
    #[must_use]
    pub const fn new(
        api: &'a A,
        limiter: &'a RateLimiter,
        jobs: &'a JobCache,
        contents: &'a ContentCache,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            api,
            limiter,
            jobs,
            contents,
            settings,
        }
    }

    /// Start a workflow for `node`.
    #[must_use]
    pub const fn workflow(self, node: &'a HierarchyNode) -> ExportWorkflow<'a, A> {
        ExportWorkflow {
            exporter: self,
            node,
            state: ExportState::NotStarted,
        }
    }
}

/// Where one page's export stands.
#[derive(Debug)]
pub enum ExportState {
    /// Nothing sent yet.
    NotStarted,
    /// A job exists for the page.
    Submitted {
        /// Remote job id.
        job_id: String,
        /// Whether the id came from the job cache.
        reused: bool,
    },
    /// Waiting for the job to finish.
    Polling {
        /// Remote job id.
        job_id: String,
        /// Status checks made so far.
        attempt: u32,
    },
    /// Content downloaded.
    Complete {
        /// Exported text.
        content: String,
    },
    /// Submission, the job, or the download failed.
    Failed(Error),
    /// The job never finished within the poll bound.
    TimedOut {
        /// Status checks made.
        attempts: u32,
    },
}

impl ExportState {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete { .. } | Self::Failed(_) | Self::TimedOut { .. }
        )
    }

    /// Short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Submitted { .. } => "submitted",
            Self::Polling { .. } => "polling",
            Self::Complete { .. } => "complete",
            Self::Failed(_) => "failed",
            Self::TimedOut { .. } => "timed_out",
        }
    }
}

/// Export of a single page.
pub struct ExportWorkflow<'a, A: ExportApi + ?Sized> {
    exporter: Exporter<'a, A>,
    node: &'a HierarchyNode,
    state: ExportState,
}

impl<'a, A: ExportApi + ?Sized> ExportWorkflow<'a, A> {
    /// Page this workflow exports.
    #[must_use]
    pub const fn node(&self) -> &'a HierarchyNode {
        self.node
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &ExportState {
        &self.state
    }

    /// Get a job id for the page: reuse a cached one or submit a new export.
    ///
    /// A cached job is only reused when it was submitted against the node's
    /// current `updated_at`; otherwise it is evicted and a new job submitted.
    ///
    /// Ends in `Submitted` or `Failed`. Calling it in any other state than
    /// `NotStarted` does nothing.
    #[instrument(skip(self), fields(page = %self.node.page_id, path = %self.node.path))]
    pub async fn submit(&mut self) {
        if !matches!(self.state, ExportState::NotStarted) {
            return;
        }
        let page = self.node.page_ref();
        let Exporter {
            api,
            limiter,
            jobs,
            settings,
            ..
        } = self.exporter;

        if let Some(job) = jobs.get(&page) {
            if job.source_version == self.node.updated_at {
                debug!(job_id = %job.export_id, "Reusing cached export job");
                self.state = ExportState::Submitted {
                    job_id: job.export_id,
                    reused: true,
                };
                return;
            }
            debug!(
                job_id = %job.export_id,
                submitted_version = ?job.source_version,
                "Page changed since export job was submitted"
            );
            jobs.remove(&page);
        }

        let page_ref = &page;
        let submitted = settings
            .retry
            .run("begin_export", move || {
                limiter.schedule(RateLimitCategory::WriteContent, move || {
                    api.begin_export(page_ref, settings.format)
                })
            })
            .await;

        self.state = match submitted {
            Ok(handle) if handle.status == JobStatus::Failed => {
                warn!(job_id = %handle.job_id, "Export rejected at submission");
                ExportState::Failed(Error::ExportFailed {
                    page: page.page_id,
                    reason: "export job failed at submission".to_string(),
                })
            },
            Ok(handle) => {
                debug!(job_id = %handle.job_id, "Export submitted");
                jobs.insert(page, handle.job_id.clone(), self.node.updated_at.clone());
                ExportState::Submitted {
                    job_id: handle.job_id,
                    reused: false,
                }
            },
            Err(err) => {
                warn!(error = %err, "Export submission failed");
                ExportState::Failed(err)
            },
        };
    }

    /// Poll a submitted job to a terminal state and download its content.
    ///
    /// Does nothing unless the workflow is `Submitted`.
    #[instrument(skip(self), fields(page = %self.node.page_id, path = %self.node.path))]
    pub async fn complete(&mut self) {
        let job_id = match &self.state {
            ExportState::Submitted { job_id, .. } => job_id.clone(),
            _ => return,
        };
        let page = self.node.page_ref();
        let Exporter {
            api,
            limiter,
            jobs,
            settings,
            ..
        } = self.exporter;
        let max_attempts = settings.max_poll_attempts;

        for attempt in 1..=max_attempts {
            self.state = ExportState::Polling {
                job_id: job_id.clone(),
                attempt,
            };
            let (page_ref, job) = (&page, job_id.as_str());
            let polled = limiter
                .schedule(RateLimitCategory::Read, move || api.export_status(page_ref, job))
                .await;

            match polled {
                Ok(report) => match report.status() {
                    JobStatus::Complete => {
                        let link = report.download_ref.filter(|l| !l.trim().is_empty());
                        if let Some(link) = link {
                            self.fetch(&page, &link).await;
                        } else {
                            jobs.remove(&page);
                            self.state = ExportState::Failed(Error::ExportFailed {
                                page: page.page_id.clone(),
                                reason: "export completed without a download link".to_string(),
                            });
                        }
                        return;
                    },
                    JobStatus::Failed => {
                        jobs.remove(&page);
                        let reason = report
                            .error
                            .unwrap_or_else(|| "export job failed".to_string());
                        warn!(job_id = %job_id, reason = %reason, "Export job failed");
                        self.state = ExportState::Failed(Error::ExportFailed {
                            page: page.page_id.clone(),
                            reason,
                        });
                        return;
                    },
                    JobStatus::InProgress => {
                        debug!(job_id = %job_id, attempt, "Export still in progress");
                    },
                },
                Err(err) if err.is_recoverable() => {
                    warn!(job_id = %job_id, attempt, error = %err, "Status check failed; will poll again");
                },
                Err(err) => {
                    jobs.remove(&page);
                    self.state = ExportState::Failed(err);
                    return;
                },
            }

            if attempt < max_attempts {
                tokio::time::sleep(settings.poll_interval).await;
            }
        }

        warn!(job_id = %job_id, attempts = max_attempts, "Export timed out");
        jobs.remove(&page);
        self.state = ExportState::TimedOut {
            attempts: max_attempts,
        };
    }

    async fn fetch(&mut self, page: &PageRef, link: &str) {
        let Exporter {
            api,
            contents,
            settings,
            ..
        } = self.exporter;
        let fetched = settings
            .retry
            .run("fetch_content", move || api.fetch_content(link))
            .await;

        self.state = match fetched {
            Ok(content) => {
                contents.insert(
                    page.clone(),
                    self.node.name.clone(),
                    content.clone(),
                    self.node.updated_at.clone(),
                );
                debug!(bytes = content.len(), "Export complete");
                ExportState::Complete { content }
            },
            Err(err) => {
                warn!(error = %err, "Download failed");
                ExportState::Failed(err)
            },
        };
    }

    /// Run from `NotStarted` to a terminal state in one go.
    pub async fn run(mut self) -> Result<String, FailedExport> {
        self.submit().await;
        self.complete().await;
        self.into_content()
    }

    /// Terminal content, or a failure record for the page.
    pub fn into_content(self) -> Result<String, FailedExport> {
        match self.state {
            ExportState::Complete { content } => Ok(content),
            ExportState::Failed(err) => Err(FailedExport::new(self.node, err.to_string())),
            ExportState::TimedOut { attempts } => Err(FailedExport::new(
                self.node,
                Error::Timeout(format!("export not ready after {attempts} status checks"))
                    .to_string(),
            )),
            other => Err(FailedExport::new(
                self.node,
                format!("export stopped in state '{}'", other.label()),
            )),
        }
    }
}
