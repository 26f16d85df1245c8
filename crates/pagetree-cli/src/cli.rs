//! # CLI Structure and Argument Parsing
//!
//! ```bash
//! # Export a page and everything up to three levels below it
//! pagetree export AbCdEf canvas-1 -o handbook.md
//!
//! # Only the page itself
//! pagetree export AbCdEf canvas-1 --no-nested
//!
//! # Look at the tree without exporting
//! pagetree tree AbCdEf canvas-1 --depth unlimited
//!
//! # Effective rate limits
//! pagetree limits --format json
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pagetree_core::MaxDepth;

use crate::output::OutputFormat;

/// Main CLI structure for the `pagetree` command
#[derive(Parser, Clone, Debug)]
#[command(name = "pagetree")]
#[command(version)]
#[command(about = "pagetree - Export nested page trees as one Markdown document", long_about = None)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a config file (overrides PAGETREE_CONFIG)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Show debug logs, including rate-limiter decisions
    #[arg(long, global = true)]
    pub debug: bool,

    /// Suppress informational messages (only show errors)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Disable all ANSI colors in output (also respects `NO_COLOR` env)
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Export a page and its nested pages into one document
    Export {
        #[command(flatten)]
        target: TargetArgs,

        /// Maximum depth below the root (0-10 or "unlimited")
        #[arg(long, value_parser = parse_depth)]
        depth: Option<MaxDepth>,

        /// Export only the root page
        #[arg(long)]
        no_nested: bool,

        /// Write the combined document here instead of stdout
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Summary format
        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show the page tree below a page without exporting it
    Tree {
        #[command(flatten)]
        target: TargetArgs,

        /// Maximum depth below the root (0-10 or "unlimited")
        #[arg(long, value_parser = parse_depth)]
        depth: Option<MaxDepth>,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show the effective per-category rate limits
    Limits {
        /// Output format
        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

impl Commands {
    pub const fn format(&self) -> OutputFormat {
        match self {
            Self::Export { format, .. } | Self::Tree { format, .. } | Self::Limits { format } => {
                *format
            },
        }
    }
}

/// Document and page identifying the root of a tree.
#[derive(clap::Args, Clone, Debug)]
pub struct TargetArgs {
    /// Document id
    pub doc_id: String,
    /// Root page id
    pub page_id: String,
}

fn parse_depth(value: &str) -> Result<MaxDepth, String> {
    value.parse().map_err(|e: pagetree_core::Error| e.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_export_arguments() {
        let cli = Cli::try_parse_from([
            "pagetree", "export", "doc", "page", "--depth", "unlimited", "-o", "out.md",
        ])
        .unwrap();
        match cli.command {
            Commands::Export {
                target,
                depth,
                no_nested,
                output,
                format,
            } => {
                assert_eq!(target.doc_id, "doc");
                assert_eq!(target.page_id, "page");
                assert_eq!(depth, Some(MaxDepth::Unlimited));
                assert!(!no_nested);
                assert_eq!(output, Some(PathBuf::from("out.md")));
                assert_eq!(format, OutputFormat::Text);
            },
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_depth_out_of_range_is_rejected() {
        let err = Cli::try_parse_from(["pagetree", "tree", "doc", "page", "--depth", "11"])
            .unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["pagetree", "limits", "-q", "--no-color"]).unwrap();
        assert!(cli.quiet);
        assert!(cli.no_color);
        assert_eq!(cli.command.format(), OutputFormat::Text);
    }
}
