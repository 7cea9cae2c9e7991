//! Progress display for transfers
//!
//! Records carry their own completion percentage, so the bar is always
//! 0..=100 and the message shows how many records went through.

use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

/// Progress tracker for one transfer session
pub struct ProgressTracker {
    /// Highest percentage shown so far
    percent: u8,
    /// Records handled so far
    records: u64,
    /// Start time of the operation
    start_time: Instant,
    /// Progress bar (optional, can be disabled)
    bar: Option<ProgressBar>,
}

impl ProgressTracker {
    /// Create a new progress tracker
    ///
    /// # Arguments
    /// * `label` - Prefix shown before the bar (e.g. "export")
    /// * `enable_bar` - Whether to display a progress bar
    pub fn new(label: &str, enable_bar: bool) -> Self {
        let bar = enable_bar.then(|| {
            let bar = ProgressBar::new(100);
            let style = ProgressStyle::default_bar()
                .template("{prefix} {spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                .map(|style| style.progress_chars("#>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar.set_prefix(label.to_string());
            bar
        });

        Self {
            percent: 0,
            records: 0,
            start_time: Instant::now(),
            bar,
        }
    }

    /// Record one more handled record at `percent` completion
    pub fn update(&mut self, percent: u8) {
        self.records += 1;
        self.percent = self.percent.max(percent.min(100));

        if let Some(ref bar) = self.bar {
            bar.set_position(u64::from(self.percent));

            let elapsed = self.start_time.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                let speed = self.records as f64 / elapsed;
                bar.set_message(format!("{} records ({:.0} docs/sec)", self.records, speed));
            }
        }
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}
