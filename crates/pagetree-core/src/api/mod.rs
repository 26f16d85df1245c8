//! Remote API seam.
//!
//! Everything the export pipeline needs from the remote service goes through
//! [`ExportApi`]. The production implementation is [`HttpExportApi`]; tests
//! drive the orchestrator with in-memory fakes.

mod http;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use http::{DEFAULT_BASE_URL, HttpExportApi};

use crate::Result;
use crate::types::{OutputFormat, PageRef};

/// Metadata returned for one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Display name.
    pub name: String,
    /// Child page ids, in display order.
    pub children: Vec<String>,
    /// Last-modified marker, if the service reports one.
    pub updated_at: Option<String>,
}

/// State of a remote export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    /// Still rendering.
    InProgress,
    /// Finished; a download reference should be available.
    Complete,
    /// Finished unsuccessfully.
    Failed,
}

impl JobStatus {
    /// Interpret a status string from the service.
    ///
    /// Unknown values are treated as still in progress so polling continues
    /// until the attempt bound.
    #[must_use]
    pub fn from_wire(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "complete" | "completed" => Self::Complete,
            "failed" | "error" => Self::Failed,
            _ => Self::InProgress,
        }
    }
}

/// Response to an export submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportHandle {
    /// Identifier used to poll the job.
    pub job_id: String,
    /// Status at submission time.
    pub status: JobStatus,
}

/// Response to a status poll.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExportStatusReport {
    /// Current status.
    pub status: Option<JobStatus>,
    /// Where to download the rendered content once complete.
    pub download_ref: Option<String>,
    /// Failure reason when the job failed.
    pub error: Option<String>,
}

impl ExportStatusReport {
    /// Report for a job that is still running.
    #[must_use]
    pub const fn in_progress() -> Self {
        Self {
            status: Some(JobStatus::InProgress),
            download_ref: None,
            error: None,
        }
    }

    /// Report for a finished job.
    #[must_use]
    pub fn complete(download_ref: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Complete),
            download_ref: Some(download_ref.into()),
            error: None,
        }
    }

    /// Report for a failed job.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            download_ref: None,
            error: Some(error.into()),
        }
    }

    /// Status, defaulting to in-progress when the service omitted it.
    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.status.unwrap_or(JobStatus::InProgress)
    }
}

/// Remote operations used by discovery and export (allows mocking in tests).
#[async_trait::async_trait]
pub trait ExportApi: Send + Sync {
    /// Fetch a page's name, children, and modification marker.
    async fn get_page(&self, page: &PageRef) -> Result<PageInfo>;

    /// Submit an export job for a page.
    async fn begin_export(&self, page: &PageRef, format: OutputFormat) -> Result<ExportHandle>;

    /// Check an export job.
    async fn export_status(&self, page: &PageRef, job_id: &str) -> Result<ExportStatusReport>;

    /// Download rendered content from a completed job.
    async fn fetch_content(&self, download_ref: &str) -> Result<String>;
}

#[async_trait::async_trait]
impl<T: ExportApi + ?Sized> ExportApi for Arc<T> {
    async fn get_page(&self, page: &PageRef) -> Result<PageInfo> {
        (**self).get_page(page).await
    }

    async fn begin_export(&self, page: &PageRef, format: OutputFormat) -> Result<ExportHandle> {
        (**self).begin_export(page, format).await
    }

    async fn export_status(&self, page: &PageRef, job_id: &str) -> Result<ExportStatusReport> {
        (**self).export_status(page, job_id).await
    }

    async fn fetch_content(&self, download_ref: &str) -> Result<String> {
        (**self).fetch_content(download_ref).await
    }
}
