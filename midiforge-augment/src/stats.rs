//! Run counters and progress reporting

use crate::generator::{SkipReason, VariantBatch};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Counters accumulated by the writer over one run
///
/// Display: "Processed N documents (X docs/s, Y MB/s)"
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Documents whose batch reached the writer (written or skipped)
    pub documents_processed: u64,
    /// Documents with at least one variant stored
    pub documents_written: u64,
    /// Documents skipped because the MIDI did not parse
    pub documents_skipped_midi: u64,
    /// Documents skipped because the encoded text did not decode
    pub documents_skipped_text: u64,
    /// Parsed documents whose every variant was dropped
    pub documents_without_variants: u64,
    pub variants_written: u64,
    pub variants_dropped: u64,
    /// Uncompressed variant bytes stored in the archive
    pub bytes_written: u64,
    pub elapsed_secs: f64,
}

impl RunStatistics {
    /// Account for one document's batch
    pub fn record(&mut self, batch: &VariantBatch) {
        self.documents_processed += 1;
        self.variants_dropped += batch.dropped as u64;

        match &batch.skipped {
            Some(SkipReason::MalformedMidi(_)) => self.documents_skipped_midi += 1,
            Some(SkipReason::MalformedText(_)) => self.documents_skipped_text += 1,
            None if batch.is_empty() => self.documents_without_variants += 1,
            None => {
                self.documents_written += 1;
                self.variants_written += batch.len() as u64;
                self.bytes_written += batch.total_bytes();
            }
        }
    }

    pub fn documents_skipped(&self) -> u64 {
        self.documents_skipped_midi + self.documents_skipped_text
    }

    pub fn docs_per_sec(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.documents_processed as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }

    pub fn mb_per_sec(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.bytes_written as f64 / self.elapsed_secs / BYTES_PER_MB
        } else {
            0.0
        }
    }

    pub fn display_string(&self) -> String {
        format!(
            "Processed {} documents ({:.2} docs/s, {:.2} MB/s)",
            self.documents_processed,
            self.docs_per_sec(),
            self.mb_per_sec()
        )
    }
}

/// Wall clock for a run plus the periodic report schedule
#[derive(Debug)]
pub struct ProgressReporter {
    started: Instant,
    interval: Duration,
    last_report: Instant,
}

impl ProgressReporter {
    pub fn new(interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            started: now,
            interval,
            last_report: now,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Refresh `stats.elapsed_secs`; true when a progress line is due
    ///
    /// A zero interval reports after every document.
    pub fn tick(&mut self, stats: &mut RunStatistics) -> bool {
        stats.elapsed_secs = self.elapsed().as_secs_f64();
        if self.last_report.elapsed() >= self.interval {
            self.last_report = Instant::now();
            true
        } else {
            false
        }
    }
}
