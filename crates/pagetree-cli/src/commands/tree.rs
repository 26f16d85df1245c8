//! Discovery-only view of a page tree.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use colored::Colorize;
use pagetree_core::{Config, DiscoveryResult, HierarchyNode, MaxDepth, PageRef};

use super::{cancel_on_interrupt, orchestrator};
use crate::cli::TargetArgs;
use crate::output::OutputFormat;

/// Execute the tree command
pub async fn execute(
    config: &Config,
    target: &TargetArgs,
    depth: Option<MaxDepth>,
    format: OutputFormat,
) -> Result<()> {
    let orchestrator = orchestrator(config).context("Failed to set up API client")?;
    let root = PageRef::new(&target.doc_id, &target.page_id);
    let depth = depth.unwrap_or(config.nested.depth);

    let interrupt = cancel_on_interrupt(orchestrator.limiter().clone());
    let discovery = orchestrator.discover(&root, depth).await;
    interrupt.abort();
    let discovery = discovery.with_context(|| format!("Failed to discover pages under {root}"))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&discovery)?),
        OutputFormat::Text => print!("{}", render(&discovery)),
    }
    Ok(())
}

fn render(discovery: &DiscoveryResult) -> String {
    let mut out = String::new();
    for node in discovery.tree.iter() {
        let _ = writeln!(out, "{}{}", "  ".repeat(node.depth), label(node));
    }

    let by_depth = discovery
        .by_depth
        .iter()
        .map(|(depth, count)| format!("{depth}:{count}"))
        .collect::<Vec<_>>()
        .join(" ");
    let _ = writeln!(
        out,
        "\n{} pages, max depth {}, by depth [{by_depth}]",
        discovery.total_pages.to_string().bold(),
        discovery.max_depth_reached
    );
    if discovery.circular_references > 0 {
        let _ = writeln!(
            out,
            "{}",
            format!("{} circular references skipped", discovery.circular_references).yellow()
        );
    }
    out
}

fn label(node: &HierarchyNode) -> String {
    if node.circular {
        format!("{} {}", "↺".yellow(), node.name.dimmed())
    } else {
        format!("{} {}", node.name, format!("({})", node.page_id).dimmed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, depth: usize, path: &str, children: Vec<HierarchyNode>) -> HierarchyNode {
        HierarchyNode {
            page_id: id.to_string(),
            doc_id: "doc".to_string(),
            name: format!("Page {id}"),
            depth,
            path: path.to_string(),
            updated_at: None,
            circular: false,
            children,
        }
    }

    #[test]
    fn test_render_indents_by_depth() {
        colored::control::set_override(false);
        let mut loop_back = node("root", 2, "0.0.0", vec![]);
        loop_back.circular = true;
        loop_back.name = "Circular reference to root".to_string();
        let tree = node(
            "root",
            0,
            "0",
            vec![node("a", 1, "0.0", vec![loop_back]), node("b", 1, "0.1", vec![])],
        );

        let text = render(&DiscoveryResult::from_tree(tree));
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines[0], "Page root (root)");
        assert_eq!(lines[1], "  Page a (a)");
        assert_eq!(lines[2], "    ↺ Circular reference to root");
        assert_eq!(lines[3], "  Page b (b)");
        assert!(text.contains("3 pages, max depth 1, by depth [0:1 1:2]"));
        assert!(text.contains("1 circular references skipped"));
    }
}
