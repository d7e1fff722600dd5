//! Progress reporting for a running scan.
//!
//! The engine calls [`ProgressReporter::advance`] exactly once per completed
//! target and [`ProgressReporter::found`] once per newly discovered open
//! target. Implementations must not block the calling worker.
use indicatif::{ProgressBar, ProgressStyle};

use crate::report;
use crate::scanner::ScanEntry;

pub trait ProgressReporter: Send + Sync {
    /// One more target finished. `last_attempted` labels it for display.
    fn advance(&self, total: u64, last_attempted: &str);

    fn found(&self, _entry: &ScanEntry) {}

    fn finish(&self) {}
}

/// Reports nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl ProgressReporter for Silent {
    fn advance(&self, _total: u64, _last_attempted: &str) {}
}

/// A progress bar on stderr, with discoveries printed above it.
#[derive(Debug, Clone)]
pub struct TerminalProgress {
    bar: ProgressBar,
    accessible: bool,
}

impl TerminalProgress {
    #[must_use]
    pub fn new(total: u64, accessible: bool) -> Self {
        let bar = ProgressBar::new(total);
        let template = if accessible {
            "[{elapsed_precise}] {pos}/{len} ({eta}) current: {msg}"
        } else {
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) current: {msg}"
        };
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message("starting...");
        Self { bar, accessible }
    }
}

impl ProgressReporter for TerminalProgress {
    fn advance(&self, _total: u64, last_attempted: &str) {
        self.bar.set_message(last_attempted.to_owned());
        self.bar.inc(1);
    }

    fn found(&self, entry: &ScanEntry) {
        self.bar
            .println(report::discovery_line(entry, self.accessible));
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
