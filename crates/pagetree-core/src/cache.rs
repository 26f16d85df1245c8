//! In-memory memoization of export jobs and exported content.
//!
//! Two caches live for as long as the orchestrator that owns them:
//!
//! - [`JobCache`] remembers the remote job id issued for a page so a rerun can
//!   poll the existing job instead of submitting a new one. Entries expire
//!   after a fixed TTL.
//! - [`ContentCache`] remembers the final content for a page. An entry stays
//!   valid while the page's modification marker is unchanged; when either side
//!   has no marker, a freshness window applies instead.
//!
//! Expiry is lazy: stale entries are deleted when a read finds them.
//!
//! Neither cache deduplicates concurrent work. Two tasks that both miss on the
//! same page will both do the remote work and both write; the later write
//! replaces the earlier one whole.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::types::PageRef;

/// Default lifetime of a remembered export job, in seconds.
pub const DEFAULT_JOB_TTL_SECS: i64 = 600;

/// Default freshness window for content without a modification marker, in seconds.
pub const DEFAULT_CONTENT_FRESHNESS_SECS: i64 = 300;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A remote export job remembered for a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJob {
    /// Job id returned by the export endpoint.
    pub export_id: String,
    /// When the job was submitted.
    pub submitted_at: DateTime<Utc>,
    /// Page modification marker at submission time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_version: Option<String>,
}

/// Page → export job, with a fixed TTL.
pub struct JobCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<PageRef, ExportJob>>,
}

impl std::fmt::Debug for JobCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for JobCache {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_JOB_TTL_SECS), Arc::new(SystemClock))
    }
}

impl JobCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Job id for `page`, unless the entry is missing or older than the TTL.
    pub fn get(&self, page: &PageRef) -> Option<ExportJob> {
        let now = self.clock.now();
        let mut entries = lock(&self.entries);
        let job = entries.get(page)?;
        if now - job.submitted_at < self.ttl {
            return Some(job.clone());
        }
        debug!(page = %page, export_id = %job.export_id, "Export job expired");
        entries.remove(page);
        None
    }

    /// Remember `export_id` for `page`, stamped with the current time and
    /// the page version the job was submitted against.
    pub fn insert(
        &self,
        page: PageRef,
        export_id: impl Into<String>,
        source_version: Option<String>,
    ) -> ExportJob {
        let job = ExportJob {
            export_id: export_id.into(),
            submitted_at: self.clock.now(),
            source_version,
        };
        lock(&self.entries).insert(page, job.clone());
        job
    }

    /// Forget the job for `page`.
    pub fn remove(&self, page: &PageRef) -> Option<ExportJob> {
        lock(&self.entries).remove(page)
    }

    /// Number of stored entries, including ones not yet found stale.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Content remembered for a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedContent {
    /// Exported text.
    pub content: String,
    /// Page name at the time of export.
    pub page_name: String,
    /// When the content was fetched.
    pub fetched_at: DateTime<Utc>,
    /// Modification marker of the page at fetch time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_version: Option<String>,
}

/// Page → content, invalidated by modification marker or age.
pub struct ContentCache {
    freshness: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<PageRef, CachedContent>>,
}

impl std::fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCache")
            .field("freshness", &self.freshness)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for ContentCache {
    fn default() -> Self {
        Self::new(
            Duration::seconds(DEFAULT_CONTENT_FRESHNESS_SECS),
            Arc::new(SystemClock),
        )
    }
}

impl ContentCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(freshness: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            freshness,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Valid content for `page`.
    ///
    /// `current_version` is the page's modification marker as just observed,
    /// or `None` when it is unknown. When both the entry and the caller have
    /// a marker they must match; otherwise the entry must be younger than the
    /// freshness window. Invalid entries are deleted.
    pub fn get(&self, page: &PageRef, current_version: Option<&str>) -> Option<CachedContent> {
        let now = self.clock.now();
        let mut entries = lock(&self.entries);
        let entry = entries.get(page)?;

        let valid = match (entry.source_version.as_deref(), current_version) {
            (Some(cached), Some(current)) => cached == current,
            _ => now - entry.fetched_at < self.freshness,
        };
        if valid {
            debug!(page = %page, "Content cache hit");
            return Some(entry.clone());
        }

        debug!(page = %page, "Content cache entry invalidated");
        entries.remove(page);
        None
    }

    /// Store `content` for `page`, replacing any previous entry.
    pub fn insert(
        &self,
        page: PageRef,
        page_name: impl Into<String>,
        content: impl Into<String>,
        source_version: Option<String>,
    ) {
        let entry = CachedContent {
            content: content.into(),
            page_name: page_name.into(),
            fetched_at: self.clock.now(),
            source_version,
        };
        lock(&self.entries).insert(page, entry);
    }

    /// Forget the content for `page`.
    pub fn remove(&self, page: &PageRef) -> Option<CachedContent> {
        lock(&self.entries).remove(page)
    }

    /// Number of stored entries, including ones not yet found stale.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
