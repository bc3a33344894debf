//! Throttled progress logging for long scans.

use std::time::{Duration, Instant};

const REPORT_EVERY_ITEMS: u64 = 100;
const REPORT_EVERY: Duration = Duration::from_secs(15);

/// Counts processed and saved items and logs at most every
/// [`REPORT_EVERY_ITEMS`] items, and no more often than [`REPORT_EVERY`].
#[derive(Debug)]
pub struct ProgressReporter {
    label: String,
    started: Instant,
    last_report: Instant,
    processed: u64,
    saved: u64,
}

impl ProgressReporter {
    pub fn new(label: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            label: label.into(),
            started: now,
            last_report: now,
            processed: 0,
            saved: 0,
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn saved(&self) -> u64 {
        self.saved
    }

    /// Note one processed item.
    pub fn tick(&mut self, current: &str) {
        self.processed += 1;
        if self.processed % REPORT_EVERY_ITEMS != 0 || self.last_report.elapsed() < REPORT_EVERY {
            return;
        }
        self.last_report = Instant::now();
        let secs = self.started.elapsed().as_secs_f64().max(f64::EPSILON);
        tracing::info!(
            cache = %self.label,
            processed = self.processed,
            saved = self.saved,
            elapsed_secs = self.started.elapsed().as_secs(),
            items_per_sec = (self.processed as f64 / secs) as u64,
            current,
            "refresh progress"
        );
    }

    pub fn add_saved(&mut self, count: usize) {
        self.saved += count as u64;
    }

    pub fn finish(&self) {
        tracing::info!(
            cache = %self.label,
            processed = self.processed,
            saved = self.saved,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "refresh finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_accumulate() {
        let mut progress = ProgressReporter::new("pages");
        for i in 0..250 {
            progress.tick(&format!("title {}", i));
        }
        progress.add_saved(120);
        assert_eq!(progress.processed(), 250);
        assert_eq!(progress.saved(), 120);
    }
}
