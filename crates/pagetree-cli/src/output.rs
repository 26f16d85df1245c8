//! Output formats and progress display.

use std::sync::Mutex;

use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use is_terminal::IsTerminal;
use pagetree_core::{ExportPhase, ExportProgress};

/// Output format for command summaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Renders export progress events on stderr.
///
/// Shows a spinner while discovering and a bar once the page count is known.
/// Hidden entirely when stderr is not a terminal or output should stay quiet.
pub struct ProgressDisplay {
    bar: ProgressBar,
    phase: Mutex<Option<ExportPhase>>,
}

impl ProgressDisplay {
    pub fn new(visible: bool) -> Self {
        let bar = if visible && std::io::stderr().is_terminal() {
            ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr())
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(spinner_style());
        Self {
            bar,
            phase: Mutex::new(None),
        }
    }

    /// Apply one progress event.
    pub fn update(&self, progress: &ExportProgress) {
        let mut phase = self
            .phase
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if *phase != Some(progress.state) {
            match progress.state {
                ExportPhase::Exporting => self.bar.set_style(bar_style()),
                _ => self.bar.set_style(spinner_style()),
            }
            *phase = Some(progress.state);
        }

        if let (Some(done), Some(total)) = (progress.pages_processed, progress.total_pages) {
            self.bar.set_length(total as u64);
            self.bar.set_position(done as u64);
        }
        self.bar.set_message(progress.message.clone());
        self.bar.tick();

        if matches!(progress.state, ExportPhase::Complete | ExportPhase::Failed) {
            self.bar.finish_and_clear();
        }
    }

    /// Remove the display without waiting for a terminal event.
    pub fn clear(&self) {
        self.bar.finish_and_clear();
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}
