//! Page-tree discovery.
//!
//! Starting from a root page, the discoverer fetches each page's metadata and
//! descends into its children until the depth bound is hit. Siblings are
//! fetched concurrently; a node returns only once its whole subtree is built.
//!
//! A visited set scoped to one [`HierarchyDiscoverer::discover`] call keeps
//! the result acyclic: a page seen before becomes a leaf placeholder marked
//! [`circular`](HierarchyNode::circular) and is neither fetched nor expanded.
//! The set covers the whole run, so two distinct paths converging on one page
//! also yield a placeholder on the path that reaches it second.
//!
//! Any metadata fetch that still fails after retries aborts the run.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use futures::future::try_join_all;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::Result;
use crate::api::{ExportApi, PageInfo};
use crate::limiter::{RateLimitCategory, RateLimiter};
use crate::retry::RetryPolicy;
use crate::types::{HierarchyNode, MaxDepth, PageRef};

/// Discovered tree plus aggregate statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResult {
    /// Root of the discovered hierarchy.
    pub tree: HierarchyNode,
    /// Real (non-placeholder) pages in the tree.
    pub total_pages: usize,
    /// Real pages per depth.
    pub by_depth: BTreeMap<usize, usize>,
    /// Deepest depth holding a real page.
    pub max_depth_reached: usize,
    /// Placeholder leaves standing in for already-visited pages.
    pub circular_references: usize,
}

impl DiscoveryResult {
    /// Compute statistics with a full walk of `tree`.
    #[must_use]
    pub fn from_tree(tree: HierarchyNode) -> Self {
        let mut total_pages = 0;
        let mut by_depth = BTreeMap::new();
        let mut max_depth_reached = 0;
        let mut circular_references = 0;

        for node in tree.iter() {
            if node.circular {
                circular_references += 1;
                continue;
            }
            total_pages += 1;
            *by_depth.entry(node.depth).or_insert(0) += 1;
            max_depth_reached = max_depth_reached.max(node.depth);
        }

        Self {
            tree,
            total_pages,
            by_depth,
            max_depth_reached,
            circular_references,
        }
    }

    /// Exportable nodes in breadth-first order, placeholders excluded.
    #[must_use]
    pub fn flatten(&self) -> Vec<&HierarchyNode> {
        let mut out = Vec::with_capacity(self.total_pages);
        let mut queue = VecDeque::from([&self.tree]);
        while let Some(node) = queue.pop_front() {
            if node.circular {
                continue;
            }
            out.push(node);
            queue.extend(node.children.iter());
        }
        out
    }
}

/// Walks the page hierarchy through rate-limited, retried metadata fetches.
pub struct HierarchyDiscoverer<'a, A: ExportApi + ?Sized> {
    api: &'a A,
    limiter: &'a RateLimiter,
    retry: RetryPolicy,
}

struct RunContext {
    doc_id: String,
    max_depth: MaxDepth,
    visited: Mutex<HashSet<String>>,
}

impl RunContext {
    /// Mark `page_id` visited; false if it already was.
    fn claim(&self, page_id: &str) -> bool {
        self.visited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(page_id.to_string())
    }
}

type NodeFuture<'f> = Pin<Box<dyn Future<Output = Result<HierarchyNode>> + Send + 'f>>;

impl<'a, A: ExportApi + ?Sized> HierarchyDiscoverer<'a, A> {
    /// Create a discoverer sharing the caller's limiter.
    #[must_use]
    pub const fn new(api: &'a A, limiter: &'a RateLimiter, retry: RetryPolicy) -> Self {
        Self {
            api,
            limiter,
            retry,
        }
    }

    /// Build the tree below `root`, descending at most `max_depth` levels.
    #[instrument(skip(self), fields(root = %root, max_depth = %max_depth))]
    pub async fn discover(&self, root: &PageRef, max_depth: MaxDepth) -> Result<DiscoveryResult> {
        let ctx = RunContext {
            doc_id: root.doc_id.clone(),
            max_depth,
            visited: Mutex::new(HashSet::new()),
        };
        let tree = self.visit(&ctx, root.page_id.clone(), 0, "0".to_string()).await?;
        let result = DiscoveryResult::from_tree(tree);
        info!(
            total_pages = result.total_pages,
            max_depth_reached = result.max_depth_reached,
            circular_references = result.circular_references,
            "Discovery complete"
        );
        Ok(result)
    }

    fn visit<'f>(
        &'f self,
        ctx: &'f RunContext,
        page_id: String,
        depth: usize,
        path: String,
    ) -> NodeFuture<'f> {
        Box::pin(async move {
            if !ctx.claim(&page_id) {
                debug!(page_id = %page_id, path = %path, "Page already visited; emitting placeholder");
                return Ok(HierarchyNode {
                    name: format!("Circular reference to {page_id}"),
                    page_id,
                    doc_id: ctx.doc_id.clone(),
                    depth,
                    path,
                    updated_at: None,
                    circular: true,
                    children: Vec::new(),
                });
            }

            let page = PageRef::new(ctx.doc_id.clone(), page_id);
            let info = self.fetch(&page).await?;
            debug!(page = %page, depth, children = info.children.len(), "Fetched page metadata");

            let children = if ctx.max_depth.allows_children(depth) {
                try_join_all(info.children.iter().enumerate().map(|(index, child)| {
                    self.visit(ctx, child.clone(), depth + 1, format!("{path}.{index}"))
                }))
                .await?
            } else {
                Vec::new()
            };

            Ok(HierarchyNode {
                page_id: page.page_id,
                doc_id: page.doc_id,
                name: info.name,
                depth,
                path,
                updated_at: info.updated_at,
                circular: false,
                children,
            })
        })
    }

    async fn fetch(&self, page: &PageRef) -> Result<PageInfo> {
        let api = self.api;
        let limiter = self.limiter;
        self.retry
            .run("get_page", move || {
                limiter.schedule(RateLimitCategory::Read, move || api.get_page(page))
            })
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::api::{ExportHandle, ExportStatusReport};
    use crate::types::OutputFormat;
    use crate::Error;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Page graph keyed by page id; ids missing from the map fail with 404.
    #[derive(Default)]
    struct GraphApi {
        pages: HashMap<String, Vec<String>>,
        fetched: Mutex<Vec<String>>,
        flaky: Mutex<HashMap<String, usize>>,
        unauthorized: bool,
        calls: AtomicUsize,
    }

    impl GraphApi {
        fn with(mut self, id: &str, children: &[&str]) -> Self {
            self.pages.insert(
                id.to_string(),
                children.iter().map(ToString::to_string).collect(),
            );
            self
        }

        fn failing_first(self, id: &str, times: usize) -> Self {
            self.flaky.lock().unwrap().insert(id.to_string(), times);
            self
        }

        fn unauthorized(mut self) -> Self {
            self.unauthorized = true;
            self
        }

        fn fetched(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ExportApi for GraphApi {
        async fn get_page(&self, page: &PageRef) -> Result<PageInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.unauthorized {
                return Err(Error::Auth("401 Unauthorized".into()));
            }
            if let Some(left) = self.flaky.lock().unwrap().get_mut(&page.page_id) {
                if *left > 0 {
                    *left -= 1;
                    return Err(Error::Api {
                        status: 503,
                        message: "busy".into(),
                    });
                }
            }
            self.fetched.lock().unwrap().push(page.page_id.clone());
            let children = self
                .pages
                .get(&page.page_id)
                .ok_or_else(|| Error::NotFound(page.to_string()))?;
            Ok(PageInfo {
                name: page.page_id.to_uppercase(),
                children: children.clone(),
                updated_at: Some(format!("v-{}", page.page_id)),
            })
        }

        async fn begin_export(&self, _: &PageRef, _: OutputFormat) -> Result<ExportHandle> {
            panic!("discovery must not submit exports")
        }

        async fn export_status(&self, _: &PageRef, _: &str) -> Result<ExportStatusReport> {
            panic!("discovery must not poll exports")
        }

        async fn fetch_content(&self, _: &str) -> Result<String> {
            panic!("discovery must not download content")
        }
    }

    async fn discover(api: &GraphApi, depth: MaxDepth) -> Result<DiscoveryResult> {
        let limiter = RateLimiter::default();
        HierarchyDiscoverer::new(api, &limiter, RetryPolicy::new(2, std::time::Duration::ZERO))
            .discover(&PageRef::new("doc", "root"), depth)
            .await
    }

    #[tokio::test]
    async fn test_depth_one_stops_at_children() {
        let api = GraphApi::default()
            .with("root", &["a", "b"])
            .with("a", &["a1"])
            .with("b", &["b1", "b2"]);

        let result = discover(&api, MaxDepth::Limited(1)).await.unwrap();

        assert_eq!(result.total_pages, 3);
        assert_eq!(result.by_depth, BTreeMap::from([(0, 1), (1, 2)]));
        assert_eq!(result.max_depth_reached, 1);
        let mut fetched = api.fetched();
        fetched.sort();
        assert_eq!(fetched, vec!["a", "b", "root"]);
    }

    #[tokio::test]
    async fn test_depth_zero_fetches_root_only() {
        let api = GraphApi::default().with("root", &["a"]);
        let result = discover(&api, MaxDepth::Limited(0)).await.unwrap();
        assert_eq!(result.total_pages, 1);
        assert!(result.tree.children.is_empty());
        assert_eq!(api.fetched(), vec!["root"]);
    }

    #[tokio::test]
    async fn test_paths_follow_child_order() {
        let api = GraphApi::default()
            .with("root", &["a", "b"])
            .with("a", &[])
            .with("b", &["b1", "b2", "b3"])
            .with("b1", &[])
            .with("b2", &[])
            .with("b3", &[]);

        let result = discover(&api, MaxDepth::Unlimited).await.unwrap();
        let paths: Vec<_> = result
            .tree
            .iter()
            .map(|n| (n.page_id.as_str(), n.path.as_str(), n.depth))
            .collect();
        assert_eq!(
            paths,
            vec![
                ("root", "0", 0),
                ("a", "0.0", 1),
                ("b", "0.1", 1),
                ("b1", "0.1.0", 2),
                ("b2", "0.1.1", 2),
                ("b3", "0.1.2", 2),
            ]
        );
        assert_eq!(result.tree.name, "ROOT");
        assert_eq!(result.tree.updated_at.as_deref(), Some("v-root"));
    }

    #[tokio::test]
    async fn test_cycle_becomes_placeholder() {
        let api = GraphApi::default()
            .with("root", &["a"])
            .with("a", &["b"])
            .with("b", &["root"]);

        let result = discover(&api, MaxDepth::Unlimited).await.unwrap();

        assert_eq!(result.total_pages, 3);
        assert_eq!(result.circular_references, 1);
        let placeholder = &result.tree.children[0].children[0].children[0];
        assert!(placeholder.circular);
        assert_eq!(placeholder.page_id, "root");
        assert_eq!(placeholder.depth, 3);
        assert!(placeholder.children.is_empty());
        assert_eq!(api.calls.load(Ordering::SeqCst), 3, "no refetch of visited page");
    }

    #[tokio::test]
    async fn test_converging_paths_yield_one_real_node() {
        let api = GraphApi::default()
            .with("root", &["a", "b"])
            .with("a", &["shared"])
            .with("b", &["shared"])
            .with("shared", &[]);

        let result = discover(&api, MaxDepth::Unlimited).await.unwrap();

        assert_eq!(result.total_pages, 4);
        assert_eq!(result.circular_references, 1);
        let real: Vec<_> = result
            .tree
            .iter()
            .filter(|n| n.page_id == "shared" && !n.circular)
            .collect();
        assert_eq!(real.len(), 1);
    }

    #[tokio::test]
    async fn test_unlimited_depth_follows_long_chain() {
        let ids: Vec<String> = (0..15).map(|i| format!("p{i}")).collect();
        let mut api = GraphApi::default().with("root", &["p0"]);
        for pair in ids.windows(2) {
            api = api.with(&pair[0], &[pair[1].as_str()]);
        }
        api = api.with("p14", &[]);

        let result = discover(&api, MaxDepth::Unlimited).await.unwrap();
        assert_eq!(result.total_pages, 16);
        assert_eq!(result.max_depth_reached, 15);
    }

    #[tokio::test]
    async fn test_transient_fetch_failure_is_retried() {
        let api = GraphApi::default()
            .with("root", &["a"])
            .with("a", &[])
            .failing_first("a", 2);

        let result = discover(&api, MaxDepth::Unlimited).await.unwrap();
        assert_eq!(result.total_pages, 2);
        assert_eq!(api.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_token_is_not_retried() {
        let api = GraphApi::default().with("root", &[]).unauthorized();
        let limiter = RateLimiter::default();
        let start = tokio::time::Instant::now();

        let err = HierarchyDiscoverer::new(&api, &limiter, RetryPolicy::default())
            .discover(&PageRef::new("doc", "root"), MaxDepth::Unlimited)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Auth(_)), "{err:?}");
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), std::time::Duration::ZERO);
    }

    #[tokio::test]
    async fn test_missing_page_is_not_retried() {
        let api = GraphApi::default().with("root", &["missing"]);

        let err = discover(&api, MaxDepth::Unlimited).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)), "{err:?}");
        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_discovery() {
        let api = GraphApi::default().with("root", &["a", "missing"]).with("a", &[]);

        let err = discover(&api, MaxDepth::Unlimited).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_flatten_is_breadth_first_without_placeholders() {
        let api = GraphApi::default()
            .with("root", &["a", "b"])
            .with("a", &["a1", "root"])
            .with("b", &["b1"])
            .with("a1", &[])
            .with("b1", &[]);

        let result = discover(&api, MaxDepth::Unlimited).await.unwrap();
        let order: Vec<_> = result.flatten().iter().map(|n| n.page_id.as_str()).collect();
        assert_eq!(order, vec!["root", "a", "b", "a1", "b1"]);
        assert_eq!(result.circular_references, 1);
    }
}
