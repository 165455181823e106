//! Augmentation pipeline orchestrator
//!
//! Wires the stages together for one run:
//!
//! ```text
//! DocumentSource ─▶ BoundedSourceFeed ─▶ AugmentationWorkerPool ─▶ StreamingArchiveWriter
//!   (reader thread)     (K permits)          (N blocking tasks)        (writer thread)
//!        ▲                                                                   │
//!        └──────────────────────── permit released ◀─────────────────────────┘
//! ```
//!
//! # Error Handling
//! - Malformed documents are skipped and counted, never fatal
//! - Reader, worker, and archive write failures abort the run
//! - File output goes to `<output>.partial` and is renamed only when the run
//!   completes without interruption
//!
//! # Example
//! ```rust,ignore
//! let pipeline = AugmentPipeline::new(PipelineOptions::default());
//! let summary = pipeline.run_paths(&input, &output, cancel).await?;
//! ```

use crate::error::{Error, Result};
use crate::events::{EventSender, PipelineEvent};
use crate::feed::{BoundedSourceFeed, PermitPool, PermitStats, DEFAULT_MAX_IN_FLIGHT};
use crate::generator::MidiVariantGenerator;
use crate::options::prepare_output_dir;
use crate::pool::AugmentationWorkerPool;
use crate::source::{self, DocumentSource};
use crate::stats::RunStatistics;
use crate::writer::{StreamingArchiveWriter, DEFAULT_ENTRY_EXTENSION};
use chrono::{DateTime, Utc};
use midiforge_common::AugmentParams;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Default seconds between progress reports
pub const DEFAULT_PROGRESS_INTERVAL_SECS: u64 = 5;

/// Pipeline tuning
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub params: AugmentParams,
    /// Documents generated concurrently
    pub workers: usize,
    /// Documents allowed between admission and archive write (K)
    pub max_in_flight: usize,
    pub progress_interval: Duration,
    /// Extension of archive entries, without the dot
    pub entry_extension: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            params: AugmentParams::default(),
            workers: 1,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            progress_interval: Duration::from_secs(DEFAULT_PROGRESS_INTERVAL_SECS),
            entry_extension: DEFAULT_ENTRY_EXTENSION.to_string(),
        }
    }
}

/// Outcome of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Final archive, or the `.partial` file when the run did not complete
    pub output_path: Option<PathBuf>,
    pub completed: bool,
    pub interrupted: bool,
    pub statistics: RunStatistics,
    pub permits: PermitStats,
}

/// One-shot augmentation run driver
pub struct AugmentPipeline {
    options: PipelineOptions,
    events: EventSender,
}

impl AugmentPipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            events: EventSender::disabled(),
        }
    }

    /// Create pipeline with event channel for progress reporting
    pub fn with_events(
        options: PipelineOptions,
        event_tx: mpsc::UnboundedSender<PipelineEvent>,
    ) -> Self {
        Self {
            options,
            events: EventSender::new(event_tx),
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Augment every document of `source` into a `.tar.gz` stream on `output`
    ///
    /// Returns the output writer once the archive is closed.
    pub async fn run<W>(
        &self,
        source: Box<dyn DocumentSource>,
        output: W,
        cancel: CancellationToken,
    ) -> Result<(W, RunSummary)>
    where
        W: Write + Send + 'static,
    {
        let (output, summary) = self.execute(source, output, cancel).await?;
        self.emit_finished(&summary);
        Ok((output, summary))
    }

    /// Augment the archive at `input` into a new archive at `output`
    ///
    /// Writes to `<output>.partial` first; the rename to `output` happens only
    /// after a complete run. An interrupted or failed run leaves the
    /// `.partial` file in place.
    pub async fn run_paths(
        &self,
        input: &Path,
        output: &Path,
        cancel: CancellationToken,
    ) -> Result<RunSummary> {
        if output.exists() {
            return Err(Error::OutputExists(output.to_path_buf()));
        }
        let source = source::open_path(input)?;
        prepare_output_dir(output)?;

        let partial = partial_path(output);
        let file = File::create(&partial).map_err(Error::ArchiveWrite)?;

        let (writer, mut summary) = match self.execute(source, BufWriter::new(file), cancel).await {
            Ok(result) => result,
            Err(e) => {
                warn!(path = %partial.display(), "Run failed; incomplete archive left in place");
                return Err(e);
            }
        };

        let file = writer
            .into_inner()
            .map_err(|e| Error::ArchiveWrite(e.into_error()))?;
        file.sync_all().map_err(Error::ArchiveWrite)?;
        drop(file);

        if summary.completed {
            tokio::fs::rename(&partial, output).await?;
            info!(path = %output.display(), "Archive complete");
            summary.output_path = Some(output.to_path_buf());
        } else {
            warn!(
                path = %partial.display(),
                "Run interrupted; archive is incomplete"
            );
            summary.output_path = Some(partial);
        }

        self.emit_finished(&summary);
        Ok(summary)
    }

    async fn execute<W>(
        &self,
        source: Box<dyn DocumentSource>,
        output: W,
        cancel: CancellationToken,
    ) -> Result<(W, RunSummary)>
    where
        W: Write + Send + 'static,
    {
        let started_at = Utc::now();
        let opts = &self.options;
        let description = source.describe();

        info!(
            source = %description,
            workers = opts.workers,
            max_in_flight = opts.max_in_flight,
            variants_per_document = opts.params.variant_count(),
            "Starting augmentation run"
        );
        self.events.emit(PipelineEvent::RunStarted {
            source: description,
            workers: opts.workers,
            max_in_flight: opts.max_in_flight,
            variants_per_document: opts.params.variant_count(),
            timestamp: started_at.timestamp(),
        });

        let permits = PermitPool::new(opts.max_in_flight);
        let feed = BoundedSourceFeed::spawn(source, permits.clone(), cancel)?;
        let interruption = feed.interruption();

        let (completed_tx, completed_rx) = mpsc::channel(opts.workers.max(1) * 2);
        let writer = StreamingArchiveWriter::new(
            output,
            opts.entry_extension.clone(),
            opts.progress_interval,
        )
        .with_events(self.events.clone());
        let writer_task = tokio::task::spawn_blocking(move || writer.drain(completed_rx));

        let generator = Arc::new(MidiVariantGenerator::new(opts.params.clone()));
        let pool = AugmentationWorkerPool::new(generator, opts.workers);
        let pool_result = pool.run(feed, completed_tx).await;

        let writer_result = writer_task
            .await
            .map_err(|e| Error::Worker(format!("archive writer task failed: {}", e)))?;

        // A writer failure closes its channel, which the pool sees as
        // WriterClosed; report the writer's own error instead.
        let written = match (pool_result, writer_result) {
            (_, Err(e)) => {
                error!(error = %e, "Archive writer failed");
                return Err(e);
            }
            (Err(e), Ok(_)) => {
                error!(error = %e, "Augmentation aborted");
                return Err(e);
            }
            (Ok(_), Ok(written)) => written,
        };

        let interrupted = interruption.is_set();
        let statistics = written.statistics;
        info!(
            documents = statistics.documents_processed,
            written = statistics.documents_written,
            skipped = statistics.documents_skipped(),
            variants = statistics.variants_written,
            dropped = statistics.variants_dropped,
            interrupted,
            "{}",
            statistics.display_string()
        );

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            output_path: None,
            completed: !interrupted,
            interrupted,
            statistics,
            permits: permits.snapshot(),
        };
        Ok((written.inner, summary))
    }

    fn emit_finished(&self, summary: &RunSummary) {
        self.events.emit(PipelineEvent::RunFinished {
            output_path: summary.output_path.clone(),
            completed: summary.completed,
            statistics: summary.statistics.clone(),
        });
    }
}

/// `<output>.partial`
pub fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}
