//! Per-category admission control for remote calls.
//!
//! Every remote operation belongs to one [`RateLimitCategory`]. Each category
//! owns an independent bucket with three limits:
//!
//! - **Concurrency cap**: at most `max_concurrent` admitted operations run at once.
//! - **Spacing**: consecutive admissions are at least `min_spacing` apart.
//! - **Reservoir**: each admission consumes one token; the reservoir is reset to
//!   its configured size every `refresh_interval`.
//!
//! Callers that cannot be admitted wait in a FIFO queue. Admission is decided
//! lazily whenever something changes (a new caller, a finished operation, or a
//! timer for the next refill/spacing deadline), so an idle limiter costs
//! nothing.
//!
//! ## Example
//!
//! ```rust
//! use pagetree_core::{RateLimitCategory, RateLimiter, RateLimits};
//!
//! # async fn example() -> pagetree_core::Result<()> {
//! let limiter = RateLimiter::new(&RateLimits::default());
//! let answer = limiter
//!     .schedule(RateLimitCategory::Read, || async { Ok(42) })
//!     .await?;
//! assert_eq!(answer, 42);
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::{Error, Result};

/// Class of remote operation sharing one quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitCategory {
    /// Metadata and status reads.
    Read,
    /// Mutations that do not touch page content.
    Write,
    /// Mutations on page content, including export submission.
    WriteContent,
    /// Document listing.
    ListDocs,
    /// Analytics endpoints.
    Analytics,
}

impl RateLimitCategory {
    /// Every category, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Read,
        Self::Write,
        Self::WriteContent,
        Self::ListDocs,
        Self::Analytics,
    ];

    /// Name used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::WriteContent => "writeContent",
            Self::ListDocs => "listDocs",
            Self::Analytics => "analytics",
        }
    }

    /// Default quota, matching the remote service's published limits.
    #[must_use]
    pub const fn default_quota(self) -> RateLimitQuota {
        match self {
            Self::Read => RateLimitQuota::new(10, Duration::from_millis(50), 100, Duration::from_secs(6)),
            Self::Write => RateLimitQuota::new(5, Duration::from_millis(100), 10, Duration::from_secs(6)),
            Self::WriteContent => {
                RateLimitQuota::new(2, Duration::from_millis(250), 5, Duration::from_secs(10))
            },
            Self::ListDocs => RateLimitQuota::new(2, Duration::from_millis(200), 4, Duration::from_secs(6)),
            Self::Analytics => {
                RateLimitQuota::new(10, Duration::from_millis(50), 100, Duration::from_secs(6))
            },
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Read => 0,
            Self::Write => 1,
            Self::WriteContent => 2,
            Self::ListDocs => 3,
            Self::Analytics => 4,
        }
    }
}

impl fmt::Display for RateLimitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits applied to one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitQuota {
    /// Maximum admitted operations in flight.
    pub max_concurrent: usize,
    /// Minimum time between two admissions.
    pub min_spacing: Duration,
    /// Admissions allowed per refresh window.
    pub reservoir: u32,
    /// Length of the refresh window.
    pub refresh_interval: Duration,
}

impl RateLimitQuota {
    /// Create a quota.
    #[must_use]
    pub const fn new(
        max_concurrent: usize,
        min_spacing: Duration,
        reservoir: u32,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            max_concurrent,
            min_spacing,
            reservoir,
            refresh_interval,
        }
    }

    /// Reject quotas that could never admit anything.
    pub fn validate(&self, category: RateLimitCategory) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(Error::Config(format!(
                "limits.{category}: max_concurrent must be at least 1"
            )));
        }
        if self.reservoir == 0 {
            return Err(Error::Config(format!(
                "limits.{category}: reservoir must be at least 1"
            )));
        }
        if self.refresh_interval.is_zero() {
            return Err(Error::Config(format!(
                "limits.{category}: refresh interval must be positive"
            )));
        }
        Ok(())
    }
}

/// Quotas for every category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimits {
    quotas: [RateLimitQuota; 5],
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            quotas: RateLimitCategory::ALL.map(RateLimitCategory::default_quota),
        }
    }
}

impl RateLimits {
    /// Quota configured for `category`.
    #[must_use]
    pub const fn get(&self, category: RateLimitCategory) -> RateLimitQuota {
        self.quotas[category.index()]
    }

    /// Replace the quota for one category.
    #[must_use]
    pub const fn with(mut self, category: RateLimitCategory, quota: RateLimitQuota) -> Self {
        self.quotas[category.index()] = quota;
        self
    }

    /// Validate every category's quota.
    pub fn validate(&self) -> Result<()> {
        RateLimitCategory::ALL
            .iter()
            .try_for_each(|category| self.get(*category).validate(*category))
    }
}

/// Snapshot of one category's bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCounts {
    /// Callers waiting for admission.
    pub queued: usize,
    /// Admitted operations still running.
    pub running: usize,
    /// Tokens left in the current window.
    pub reservoir: u32,
}

/// Shared admission controller. Cloning is cheap and shares state.
#[derive(Clone)]
pub struct RateLimiter {
    buckets: [Arc<Bucket>; 5],
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_map();
        for category in RateLimitCategory::ALL {
            list.entry(&category.as_str(), &self.counts(category));
        }
        list.finish()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(&RateLimits::default())
    }
}

impl RateLimiter {
    /// Build a limiter with one bucket per category.
    #[must_use]
    pub fn new(limits: &RateLimits) -> Self {
        let now = Instant::now();
        Self {
            buckets: RateLimitCategory::ALL.map(|category| {
                Arc::new(Bucket::new(category, limits.get(category), now))
            }),
        }
    }

    /// Run `op` once `category` admits it.
    ///
    /// The operation's own error is returned unchanged. If the category's
    /// queue is cleared while this call is waiting, [`Error::QueueCleared`] is
    /// returned and `op` never runs.
    pub async fn schedule<F, Fut, T>(&self, category: RateLimitCategory, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let permit = self.admit(category).await?;
        let result = op().await;
        drop(permit);
        result
    }

    /// Cancel every caller still waiting in `category`.
    ///
    /// Operations already admitted keep running. Returns the number of
    /// callers that were rejected.
    pub fn clear_queue(&self, category: RateLimitCategory) -> usize {
        let bucket = self.bucket(category);
        let cleared: Vec<_> = bucket.lock().queue.drain(..).collect();
        let rejected = cleared.iter().filter(|tx| !tx.is_closed()).count();
        debug!(category = %category, rejected, "Cleared rate limit queue");
        rejected
    }

    /// Callers waiting for admission in `category`.
    #[must_use]
    pub fn queued(&self, category: RateLimitCategory) -> usize {
        self.counts(category).queued
    }

    /// Admitted operations still running in `category`.
    #[must_use]
    pub fn running(&self, category: RateLimitCategory) -> usize {
        self.counts(category).running
    }

    /// Snapshot of queue, running, and reservoir state for `category`.
    #[must_use]
    pub fn counts(&self, category: RateLimitCategory) -> CategoryCounts {
        let bucket = self.bucket(category);
        let mut state = bucket.lock();
        state.refill(Instant::now(), &bucket.quota);
        CategoryCounts {
            queued: state.queue.iter().filter(|tx| !tx.is_closed()).count(),
            running: state.running,
            reservoir: state.reservoir,
        }
    }

    /// Quota in force for `category`.
    #[must_use]
    pub fn quota(&self, category: RateLimitCategory) -> RateLimitQuota {
        self.bucket(category).quota
    }

    fn bucket(&self, category: RateLimitCategory) -> &Arc<Bucket> {
        &self.buckets[category.index()]
    }

    async fn admit(&self, category: RateLimitCategory) -> Result<Permit> {
        let bucket = self.bucket(category);
        let (tx, rx) = oneshot::channel();
        bucket.lock().queue.push_back(tx);
        bucket.pump();
        rx.await.map_err(|_| Error::QueueCleared { category })
    }
}

/// Admission token; releases its slot when dropped.
struct Permit {
    bucket: Arc<Bucket>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.bucket.release();
    }
}

struct Bucket {
    category: RateLimitCategory,
    quota: RateLimitQuota,
    state: Mutex<BucketState>,
}

struct BucketState {
    running: usize,
    reservoir: u32,
    window_start: Instant,
    last_start: Option<Instant>,
    queue: VecDeque<oneshot::Sender<Permit>>,
    wake_at: Option<Instant>,
}

impl BucketState {
    fn refill(&mut self, now: Instant, quota: &RateLimitQuota) {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < quota.refresh_interval {
            return;
        }
        let periods = elapsed.as_nanos() / quota.refresh_interval.as_nanos();
        let periods = u32::try_from(periods).unwrap_or(u32::MAX);
        self.window_start += quota.refresh_interval.saturating_mul(periods);
        self.reservoir = quota.reservoir;
    }
}

impl Bucket {
    fn new(category: RateLimitCategory, quota: RateLimitQuota, now: Instant) -> Self {
        Self {
            category,
            quota,
            state: Mutex::new(BucketState {
                running: 0,
                reservoir: quota.reservoir,
                window_start: now,
                last_start: None,
                queue: VecDeque::new(),
                wake_at: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit as many queued callers as the quota allows right now.
    ///
    /// Permits are handed out after the lock is released: a permit whose
    /// receiver is gone is dropped on the spot and its `release` re-enters
    /// this function.
    fn pump(self: &Arc<Self>) {
        let mut admitted = Vec::new();
        let mut timer = None;
        {
            let mut state = self.lock();
            let now = Instant::now();
            state.refill(now, &self.quota);

            while !state.queue.is_empty() {
                if state.running >= self.quota.max_concurrent {
                    break;
                }
                if state.reservoir == 0 {
                    timer = Some(state.window_start + self.quota.refresh_interval);
                    break;
                }
                if let Some(last) = state.last_start {
                    let ready = last + self.quota.min_spacing;
                    if now < ready {
                        timer = Some(ready);
                        break;
                    }
                }
                let Some(tx) = state.queue.pop_front() else {
                    break;
                };
                if tx.is_closed() {
                    continue;
                }
                state.running += 1;
                state.reservoir -= 1;
                state.last_start = Some(now);
                admitted.push(tx);
            }

            timer = timer.filter(|at| state.wake_at.is_none_or(|armed| *at < armed));
            if let Some(at) = timer {
                state.wake_at = Some(at);
            }

            if !admitted.is_empty() {
                debug!(
                    category = %self.category,
                    admitted = admitted.len(),
                    running = state.running,
                    reservoir = state.reservoir,
                    queued = state.queue.len(),
                    "Admitted operations"
                );
            }
        }

        for tx in admitted {
            // A closed receiver hands the permit back, and dropping it releases the slot.
            let _ = tx.send(Permit {
                bucket: Arc::clone(self),
            });
        }

        if let Some(at) = timer {
            self.arm_timer(at);
        }
    }

    fn arm_timer(self: &Arc<Self>, at: Instant) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let bucket = Arc::clone(self);
        handle.spawn(async move {
            tokio::time::sleep_until(at).await;
            {
                let mut state = bucket.lock();
                if state.wake_at == Some(at) {
                    state.wake_at = None;
                }
            }
            bucket.pump();
        });
    }

    fn release(self: &Arc<Self>) {
        {
            let mut state = self.lock();
            state.running = state.running.saturating_sub(1);
        }
        self.pump();
    }
}
