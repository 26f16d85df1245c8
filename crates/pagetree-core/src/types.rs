//! Core data types shared across discovery, export, and combination.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Deepest nesting level accepted for a limited export.
pub const MAX_LIMITED_DEPTH: u8 = 10;

/// Identifies one page within one document.
///
/// Both parts are opaque strings issued by the remote service. Page ids are
/// unique within a document, so the pair is globally unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRef {
    /// Document identifier.
    pub doc_id: String,
    /// Page identifier within the document.
    pub page_id: String,
}

impl PageRef {
    /// Create a page reference.
    #[must_use]
    pub fn new(doc_id: impl Into<String>, page_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            page_id: page_id.into(),
        }
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.doc_id, self.page_id)
    }
}

/// How deep below the root discovery may descend.
///
/// Serialized as an integer (`0..=10`) or the string `"unlimited"`.
///
/// ```rust
/// use pagetree_core::MaxDepth;
///
/// assert!(MaxDepth::Limited(2).allows_children(1));
/// assert!(!MaxDepth::Limited(2).allows_children(2));
/// assert!(MaxDepth::Unlimited.allows_children(500));
/// assert_eq!("unlimited".parse::<MaxDepth>().unwrap(), MaxDepth::Unlimited);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MaxDepthRepr", into = "MaxDepthRepr")]
pub enum MaxDepth {
    /// Stop descending once this depth is reached.
    Limited(u8),
    /// Descend until the tree runs out.
    Unlimited,
}

impl MaxDepth {
    /// Whether a node at `current_depth` may have its children explored.
    #[must_use]
    pub const fn allows_children(self, current_depth: usize) -> bool {
        match self {
            Self::Limited(max) => current_depth < max as usize,
            Self::Unlimited => true,
        }
    }

    /// Reject limited depths above [`MAX_LIMITED_DEPTH`].
    pub fn validate(self) -> Result<Self> {
        match self {
            Self::Limited(d) if d > MAX_LIMITED_DEPTH => Err(Error::Config(format!(
                "depth {d} is out of range (0..={MAX_LIMITED_DEPTH} or \"unlimited\")"
            ))),
            other => Ok(other),
        }
    }
}

impl Default for MaxDepth {
    fn default() -> Self {
        Self::Limited(3)
    }
}

impl fmt::Display for MaxDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(d) => write!(f, "{d}"),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

impl FromStr for MaxDepth {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("unlimited") {
            return Ok(Self::Unlimited);
        }
        trimmed
            .parse::<u8>()
            .map_err(|_| Error::Config(format!("invalid depth '{s}'")))
            .and_then(|d| Self::Limited(d).validate())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum MaxDepthRepr {
    Number(u8),
    Keyword(String),
}

impl TryFrom<MaxDepthRepr> for MaxDepth {
    type Error = Error;

    fn try_from(repr: MaxDepthRepr) -> Result<Self> {
        match repr {
            MaxDepthRepr::Number(d) => Self::Limited(d).validate(),
            MaxDepthRepr::Keyword(k) => k.parse(),
        }
    }
}

impl From<MaxDepth> for MaxDepthRepr {
    fn from(depth: MaxDepth) -> Self {
        match depth {
            MaxDepth::Limited(d) => Self::Number(d),
            MaxDepth::Unlimited => Self::Keyword("unlimited".to_string()),
        }
    }
}

/// Settings controlling whether and how far nested pages are exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct NestedExportSettings {
    /// Export child pages as well as the root.
    pub include_nested: bool,
    /// Maximum depth below the root.
    pub depth: MaxDepth,
}

impl Default for NestedExportSettings {
    fn default() -> Self {
        Self {
            include_nested: true,
            depth: MaxDepth::default(),
        }
    }
}

impl NestedExportSettings {
    /// Depth bound actually used for discovery.
    ///
    /// Exports without nesting only ever visit the root.
    #[must_use]
    pub const fn effective_depth(&self) -> MaxDepth {
        if self.include_nested {
            self.depth
        } else {
            MaxDepth::Limited(0)
        }
    }
}

/// Format requested from the remote export endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown text.
    #[default]
    Markdown,
    /// HTML text.
    Html,
}

impl OutputFormat {
    /// Wire name used by the API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
        }
    }
}

/// One page in the discovered hierarchy.
///
/// Nodes own their children; there is no parent pointer. A node is built once
/// by the discoverer and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyNode {
    /// Page identifier.
    pub page_id: String,
    /// Document identifier.
    pub doc_id: String,
    /// Display name.
    pub name: String,
    /// Distance from the root (root = 0).
    pub depth: usize,
    /// Dotted positional path (`"0"`, `"0.1"`, `"0.1.2"`).
    pub path: String,
    /// Last-modified marker reported by the API, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// True for placeholder leaves standing in for an already-visited page.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub circular: bool,
    /// Children in API order.
    #[serde(default)]
    pub children: Vec<HierarchyNode>,
}

impl HierarchyNode {
    /// Identity of the page this node represents.
    #[must_use]
    pub fn page_ref(&self) -> PageRef {
        PageRef::new(self.doc_id.clone(), self.page_id.clone())
    }

    /// Pre-order iterator over this node and all descendants.
    pub fn iter(&self) -> impl Iterator<Item = &Self> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

/// Terminal failure record for one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedExport {
    /// Page identifier.
    pub page_id: String,
    /// Display name.
    pub page_name: String,
    /// Dotted path of the node in the tree.
    pub path: String,
    /// Human-readable failure message.
    pub error: String,
}

impl FailedExport {
    /// Build a failure record for `node`.
    #[must_use]
    pub fn new(node: &HierarchyNode, error: impl Into<String>) -> Self {
        Self {
            page_id: node.page_id.clone(),
            page_name: node.name.clone(),
            path: node.path.clone(),
            error: error.into(),
        }
    }
}

/// Phase reported through the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportPhase {
    /// Walking the page tree.
    Discovering,
    /// Submitting or polling export jobs.
    Exporting,
    /// Assembling the final document.
    Combining,
    /// Finished (possibly with per-page failures).
    Complete,
    /// Aborted before any content was produced.
    Failed,
}

/// Progress event delivered to the caller's callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportProgress {
    /// Current phase.
    pub state: ExportPhase,
    /// Human-readable status line.
    pub message: String,
    /// Pages finished so far in this phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages_processed: Option<usize>,
    /// Pages expected in this phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<usize>,
}

impl ExportProgress {
    /// Progress event without counters.
    #[must_use]
    pub fn phase(state: ExportPhase, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
            pages_processed: None,
            total_pages: None,
        }
    }

    /// Attach `processed / total` counters.
    #[must_use]
    pub const fn with_counts(mut self, processed: usize, total: usize) -> Self {
        self.pages_processed = Some(processed);
        self.total_pages = Some(total);
        self
    }
}
