//! Assembles per-page content into one document in tree order.
//!
//! ## Format
//!
//! Each exported page becomes a section:
//!
//! ```markdown
//! ## Page Name
//! <!-- page: canvas-2 | path: 0.1 | depth: 1 -->
//!
//! Page content here...
//! ```
//!
//! The heading level is the node's depth plus one, capped at six. Sections
//! are separated by a horizontal rule with a blank line on each side.
//!
//! ## Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use pagetree_core::combine::ContentCombiner;
//! use pagetree_core::types::HierarchyNode;
//!
//! let root = HierarchyNode {
//!     page_id: "canvas-1".into(),
//!     doc_id: "doc".into(),
//!     name: "Handbook".into(),
//!     depth: 0,
//!     path: "0".into(),
//!     updated_at: None,
//!     circular: false,
//!     children: Vec::new(),
//! };
//! let content = HashMap::from([("canvas-1".to_string(), "Welcome.".to_string())]);
//!
//! let doc = ContentCombiner::combine(&content, &root);
//! assert!(doc.content.starts_with("# Handbook\n"));
//! assert_eq!(doc.sections[0].line_range, "1-4");
//! ```

use std::collections::HashMap;

use serde::Serialize;

use crate::types::HierarchyNode;

const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Lines the separator adds between the end of one section and the start of
/// the next.
const SEPARATOR_LINES: usize = 3;

/// Where one page landed in the combined document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionEntry {
    /// Page identifier.
    pub page_id: String,
    /// Page name used as the heading.
    pub name: String,
    /// Dotted tree path.
    pub path: String,
    /// Line range in format "start-end" (1-indexed).
    pub line_range: String,
}

/// Combined document and its section map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedDocument {
    /// The assembled text.
    pub content: String,
    /// One entry per section, in document order.
    pub sections: Vec<SectionEntry>,
}

/// Walks a hierarchy in pre-order and stitches page content together.
pub struct ContentCombiner;

impl ContentCombiner {
    /// Combine `content_by_page` (keyed by page id) following `tree`.
    ///
    /// Placeholders and pages without content are skipped. The output depends
    /// only on the tree and the map, never on the order content arrived in.
    #[must_use]
    pub fn combine(content_by_page: &HashMap<String, String>, tree: &HierarchyNode) -> CombinedDocument {
        let mut content = String::new();
        let mut sections = Vec::new();
        let mut next_line = 1;

        for node in tree.iter().filter(|n| !n.circular) {
            let Some(body) = content_by_page.get(&node.page_id) else {
                continue;
            };

            if !sections.is_empty() {
                content.push_str(SECTION_SEPARATOR);
            }
            let section = Self::format_section(node, body);
            let start = next_line;
            let end = start + section.lines().count() - 1;
            content.push_str(&section);

            sections.push(SectionEntry {
                page_id: node.page_id.clone(),
                name: node.name.clone(),
                path: node.path.clone(),
                line_range: format!("{start}-{end}"),
            });
            next_line = end + SEPARATOR_LINES + 1;
        }

        CombinedDocument { content, sections }
    }

    fn format_section(node: &HierarchyNode, body: &str) -> String {
        let level = (node.depth + 1).min(6);
        let mut section = format!(
            "{} {}\n<!-- page: {} | path: {} | depth: {} -->",
            "#".repeat(level),
            node.name,
            node.page_id,
            node.path,
            node.depth
        );
        let body = body.trim_end();
        if !body.trim().is_empty() {
            section.push_str("\n\n");
            section.push_str(body);
        }
        section
    }
}
