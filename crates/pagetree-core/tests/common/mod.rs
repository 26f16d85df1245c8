#![allow(clippy::expect_used, clippy::unwrap_used, dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pagetree_core::api::{ExportApi, ExportHandle, ExportStatusReport, JobStatus, PageInfo};
use pagetree_core::clock::ManualClock;
use pagetree_core::{
    BatchOrchestrator, Error, ExportProgress, OrchestratorSettings, OutputFormat, PageRef,
    Result, RetryPolicy, WorkflowSettings,
};

pub const DOC: &str = "doc-1";

#[derive(Debug, Clone)]
struct Page {
    name: String,
    children: Vec<String>,
    updated_at: Option<String>,
}

/// Call counters per remote operation.
#[derive(Debug, Default)]
pub struct Calls {
    pub get_page: AtomicUsize,
    pub begin_export: AtomicUsize,
    pub export_status: AtomicUsize,
    pub fetch_content: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Calls that touch the export side of the API.
    pub fn export_side(&self) -> usize {
        Self::get(&self.begin_export) + Self::get(&self.export_status) + Self::get(&self.fetch_content)
    }

    pub fn total(&self) -> usize {
        Self::get(&self.get_page) + self.export_side()
    }
}

/// In-memory stand-in for the remote service.
///
/// Every page completes after `polls_to_complete` status checks unless it is
/// listed in one of the failure sets.
#[derive(Default)]
pub struct MockApi {
    pages: Mutex<HashMap<String, Page>>,
    submit_failures: Mutex<HashSet<String>>,
    job_failures: Mutex<HashSet<String>>,
    never_complete: Mutex<HashSet<String>>,
    status_delays: Mutex<HashMap<String, Duration>>,
    polls: Mutex<HashMap<String, usize>>,
    submitted: Mutex<HashMap<String, (String, Option<String>)>>,
    fetched_pages: Mutex<Vec<String>>,
    next_job: AtomicUsize,
    pub polls_to_complete: usize,
    pub calls: Calls,
}

impl MockApi {
    pub fn new() -> Self {
        Self {
            polls_to_complete: 2,
            ..Self::default()
        }
    }

    pub fn page(self, id: &str, children: &[&str]) -> Self {
        self.pages.lock().unwrap().insert(
            id.to_string(),
            Page {
                name: format!("Page {id}"),
                children: children.iter().map(ToString::to_string).collect(),
                updated_at: Some("v1".to_string()),
            },
        );
        self
    }

    pub fn failing_submit(self, id: &str) -> Self {
        self.submit_failures.lock().unwrap().insert(id.to_string());
        self
    }

    pub fn failing_job(self, id: &str) -> Self {
        self.job_failures.lock().unwrap().insert(id.to_string());
        self
    }

    pub fn stuck(self, id: &str) -> Self {
        self.never_complete.lock().unwrap().insert(id.to_string());
        self
    }

    pub fn status_delay(self, id: &str, delay: Duration) -> Self {
        self.status_delays
            .lock()
            .unwrap()
            .insert(id.to_string(), delay);
        self
    }

    pub fn touch(&self, id: &str, version: &str) {
        let mut pages = self.pages.lock().unwrap();
        pages.get_mut(id).unwrap().updated_at = Some(version.to_string());
    }

    pub fn fetched_pages(&self) -> Vec<String> {
        self.fetched_pages.lock().unwrap().clone()
    }

    /// Rendered content of a page at its initial `v1` version.
    pub fn content_for(id: &str) -> String {
        format!("Content of {id}")
    }

    /// Rendered content of a page at `version`.
    pub fn content_at(id: &str, version: Option<&str>) -> String {
        match version {
            Some(version) if version != "v1" => format!("Content of {id} at {version}"),
            _ => Self::content_for(id),
        }
    }
}

#[async_trait::async_trait]
impl ExportApi for MockApi {
    async fn get_page(&self, page: &PageRef) -> Result<PageInfo> {
        self.calls.get_page.fetch_add(1, Ordering::SeqCst);
        let found = self.pages.lock().unwrap().get(&page.page_id).cloned();
        let found = found.ok_or_else(|| Error::NotFound(page.to_string()))?;
        self.fetched_pages.lock().unwrap().push(page.page_id.clone());
        Ok(PageInfo {
            name: found.name,
            children: found.children,
            updated_at: found.updated_at,
        })
    }

    async fn begin_export(&self, page: &PageRef, _: OutputFormat) -> Result<ExportHandle> {
        self.calls.begin_export.fetch_add(1, Ordering::SeqCst);
        if self.submit_failures.lock().unwrap().contains(&page.page_id) {
            return Err(Error::Api {
                status: 500,
                message: "export unavailable".into(),
            });
        }
        let n = self.next_job.fetch_add(1, Ordering::SeqCst);
        let job_id = format!("job-{n}-{}", page.page_id);
        let version = self
            .pages
            .lock()
            .unwrap()
            .get(&page.page_id)
            .and_then(|p| p.updated_at.clone());
        self.submitted
            .lock()
            .unwrap()
            .insert(job_id.clone(), (page.page_id.clone(), version));
        Ok(ExportHandle {
            job_id,
            status: JobStatus::InProgress,
        })
    }

    async fn export_status(&self, page: &PageRef, job_id: &str) -> Result<ExportStatusReport> {
        self.calls.export_status.fetch_add(1, Ordering::SeqCst);
        let delay = self.status_delays.lock().unwrap().get(&page.page_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.job_failures.lock().unwrap().contains(&page.page_id) {
            return Ok(ExportStatusReport::failed("renderer crashed"));
        }
        if self.never_complete.lock().unwrap().contains(&page.page_id) {
            return Ok(ExportStatusReport::in_progress());
        }
        let polls = {
            let mut polls = self.polls.lock().unwrap();
            let count = polls.entry(page.page_id.clone()).or_insert(0);
            *count += 1;
            *count
        };
        if polls >= self.polls_to_complete {
            polls_reset(&self.polls, &page.page_id);
            Ok(ExportStatusReport::complete(format!("mem://{job_id}")))
        } else {
            Ok(ExportStatusReport::in_progress())
        }
    }

    async fn fetch_content(&self, download_ref: &str) -> Result<String> {
        self.calls.fetch_content.fetch_add(1, Ordering::SeqCst);
        let job = download_ref
            .strip_prefix("mem://")
            .and_then(|job_id| self.submitted.lock().unwrap().get(job_id).cloned());
        let (id, version) = job.ok_or_else(|| Error::NotFound(download_ref.to_string()))?;
        Ok(Self::content_at(&id, version.as_deref()))
    }
}

fn polls_reset(polls: &Mutex<HashMap<String, usize>>, id: &str) {
    polls.lock().unwrap().remove(id);
}

/// Settings with short but non-zero delays.
pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        workflow: WorkflowSettings {
            format: OutputFormat::Markdown,
            poll_interval: Duration::from_millis(500),
            max_poll_attempts: 5,
            retry: RetryPolicy::new(2, Duration::from_millis(100)),
        },
        discovery_retry: RetryPolicy::new(1, Duration::from_millis(100)),
        settle_delay: Duration::from_secs(1),
        job_ttl: chrono::Duration::minutes(10),
        content_freshness: chrono::Duration::minutes(5),
    }
}

pub struct Harness {
    pub api: Arc<MockApi>,
    pub clock: Arc<ManualClock>,
    pub events: Arc<Mutex<Vec<ExportProgress>>>,
    pub orchestrator: BatchOrchestrator<Arc<MockApi>>,
}

impl Harness {
    pub fn new(api: MockApi) -> Self {
        let api = Arc::new(api);
        let clock = Arc::new(ManualClock::default());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let orchestrator = BatchOrchestrator::new(Arc::clone(&api))
            .with_settings(fast_settings())
            .with_clock(clock.clone())
            .with_progress(move |p| sink.lock().unwrap().push(p.clone()));
        Self {
            api,
            clock,
            events,
            orchestrator,
        }
    }

    pub fn root() -> PageRef {
        PageRef::new(DOC, "root")
    }

    pub fn events(&self) -> Vec<ExportProgress> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().unwrap().clear();
    }
}
