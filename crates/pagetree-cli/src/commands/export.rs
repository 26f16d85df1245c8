//! Whole-tree export command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use pagetree_core::{Config, ExportResult, MaxDepth, NestedExportSettings, PageRef};
use serde::Serialize;

use super::{cancel_on_interrupt, orchestrator};
use crate::cli::TargetArgs;
use crate::error::PartialExport;
use crate::output::{OutputFormat, ProgressDisplay};

/// Arguments of `pagetree export`.
#[derive(Debug, Clone)]
pub struct ExportArgs {
    pub target: TargetArgs,
    pub depth: Option<MaxDepth>,
    pub no_nested: bool,
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
}

impl ExportArgs {
    /// Nesting settings: config values with command-line overrides.
    fn nested(&self, config: &Config) -> NestedExportSettings {
        NestedExportSettings {
            include_nested: config.nested.include_nested && !self.no_nested,
            depth: self.depth.unwrap_or(config.nested.depth),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportSummary<'a> {
    #[serde(flatten)]
    result: &'a ExportResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    combined_content: Option<&'a str>,
}

/// Execute the export command
pub async fn execute(config: &Config, args: &ExportArgs, quiet: bool) -> Result<()> {
    let display = Arc::new(ProgressDisplay::new(!quiet && args.format == OutputFormat::Text));
    let sink = Arc::clone(&display);
    let orchestrator = orchestrator(config)
        .context("Failed to set up API client")?
        .with_progress(move |progress| sink.update(progress));

    let root = PageRef::new(&args.target.doc_id, &args.target.page_id);
    let interrupt = cancel_on_interrupt(orchestrator.limiter().clone());
    let result = orchestrator.export_tree(&root, args.nested(config)).await;
    interrupt.abort();
    display.clear();
    let result = result.with_context(|| format!("Failed to export {root}"))?;

    if let Some(path) = &args.output {
        let mut content = result.combined_content.clone();
        content.push('\n');
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    match args.format {
        OutputFormat::Json => {
            let summary = ExportSummary {
                result: &result,
                output_path: args.output.as_ref().map(|p| p.display().to_string()),
                combined_content: args
                    .output
                    .is_none()
                    .then_some(result.combined_content.as_str()),
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        },
        OutputFormat::Text => {
            if args.output.is_none() {
                println!("{}", result.combined_content);
            }
            if !quiet {
                eprint!("{}", summarize(&result, args.output.as_ref()));
            }
        },
    }

    if result.success {
        Ok(())
    } else {
        Err(PartialExport {
            failed: result.failed_pages.len(),
            total: result.total_pages,
        }
        .into())
    }
}

fn summarize(result: &ExportResult, output: Option<&PathBuf>) -> String {
    let mut out = String::new();
    let headline = format!(
        "Exported {}/{} pages ({} cached)",
        result.successful_pages, result.total_pages, result.cached_pages
    );
    if result.success {
        out.push_str(&format!("{} {headline}\n", "✓".green()));
    } else {
        out.push_str(&format!("{} {headline}\n", "!".yellow()));
    }
    if let Some(path) = output {
        out.push_str(&format!("  written to {}\n", path.display()));
    }
    if result.circular_references > 0 {
        out.push_str(&format!(
            "  {} circular references skipped\n",
            result.circular_references
        ));
    }
    for failure in &result.failed_pages {
        out.push_str(&format!(
            "  {} {} [{}]: {}\n",
            "✗".red(),
            failure.page_name,
            failure.path,
            failure.error
        ));
    }
    out
}
