//! Effective rate limits.

use anyhow::Result;
use colored::Colorize;
use pagetree_core::{Config, RateLimitCategory};
use serde::Serialize;

use crate::output::OutputFormat;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LimitRow {
    category: RateLimitCategory,
    max_concurrent: usize,
    min_spacing_ms: u128,
    reservoir: u32,
    refresh_interval_ms: u128,
}

fn rows(config: &Config) -> Vec<LimitRow> {
    let limits = config.rate_limits();
    RateLimitCategory::ALL
        .into_iter()
        .map(|category| {
            let quota = limits.get(category);
            LimitRow {
                category,
                max_concurrent: quota.max_concurrent,
                min_spacing_ms: quota.min_spacing.as_millis(),
                reservoir: quota.reservoir,
                refresh_interval_ms: quota.refresh_interval.as_millis(),
            }
        })
        .collect()
}

/// Execute the limits command
pub fn execute(config: &Config, format: OutputFormat) -> Result<()> {
    let rows = rows(config);
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        },
        OutputFormat::Text => {
            println!(
                "{}",
                format!(
                    "{:<14} {:>11} {:>11} {:>10} {:>10}",
                    "CATEGORY", "CONCURRENT", "SPACING", "RESERVOIR", "WINDOW"
                )
                .bold()
            );
            for row in &rows {
                println!(
                    "{} {:>11} {:>9}ms {:>10} {:>8}ms",
                    format!("{:<14}", row.category.as_str()).cyan(),
                    row.max_concurrent,
                    row.min_spacing_ms,
                    row.reservoir,
                    row.refresh_interval_ms
                );
            }
        },
    }
    Ok(())
}
