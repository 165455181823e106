//! Streaming archive writer
//!
//! The single consumer of completed batches. Owns the output `.tar.gz` stream,
//! names each document's entries after a fresh UUID, and releases the
//! document's permit only after its entries are written.

use crate::error::{Error, Result};
use crate::events::{EventSender, PipelineEvent};
use crate::pool::CompletedDocument;
use crate::stats::{ProgressReporter, RunStatistics};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Default entry extension
pub const DEFAULT_ENTRY_EXTENSION: &str = "mid";

/// Entry name for variant `index` of the document identified by `base_id`
pub fn entry_name(base_id: &Uuid, index: usize, extension: &str) -> String {
    format!("{}_{}.{}", base_id, index, extension)
}

/// What a finished writer hands back
#[derive(Debug)]
pub struct WriterOutput<W> {
    pub inner: W,
    pub statistics: RunStatistics,
}

/// Serial `.tar.gz` writer for completed documents
pub struct StreamingArchiveWriter<W: Write> {
    builder: tar::Builder<GzEncoder<W>>,
    extension: String,
    mtime: u64,
    statistics: RunStatistics,
    reporter: ProgressReporter,
    events: EventSender,
}

impl<W: Write> StreamingArchiveWriter<W> {
    pub fn new(inner: W, extension: impl Into<String>, progress_interval: Duration) -> Self {
        let encoder = GzEncoder::new(inner, Compression::default());
        Self {
            builder: tar::Builder::new(encoder),
            extension: extension.into(),
            mtime: chrono::Utc::now().timestamp().max(0) as u64,
            statistics: RunStatistics::default(),
            reporter: ProgressReporter::new(progress_interval),
            events: EventSender::disabled(),
        }
    }

    /// Attach an event sink for per-document and progress events
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    pub fn statistics(&self) -> &RunStatistics {
        &self.statistics
    }

    /// Store one document's batch and release its permit
    ///
    /// Empty batches write nothing but still release the permit.
    pub fn write(&mut self, done: CompletedDocument) -> Result<()> {
        let CompletedDocument {
            sequence,
            name,
            batch,
            permit,
        } = done;

        if batch.is_empty() {
            match &batch.skipped {
                Some(reason) => debug!(sequence, name = %name, reason = %reason, "Skipped document"),
                None => debug!(
                    sequence,
                    name = %name,
                    dropped = batch.dropped,
                    "Document produced no representable variants"
                ),
            }
            self.events.emit(PipelineEvent::DocumentSkipped {
                sequence,
                name,
                reason: batch.skipped.clone(),
            });
        } else {
            let base_id = Uuid::new_v4();
            for variant in &batch.variants {
                let path = entry_name(&base_id, variant.index, &self.extension);
                let mut header = tar::Header::new_gnu();
                header.set_size(variant.bytes.len() as u64);
                header.set_mode(0o644);
                header.set_mtime(self.mtime);
                self.builder
                    .append_data(&mut header, &path, variant.bytes.as_slice())
                    .map_err(Error::ArchiveWrite)?;
            }

            self.events.emit(PipelineEvent::DocumentWritten {
                sequence,
                name,
                base_id,
                variants: batch.len(),
                bytes: batch.total_bytes(),
            });
        }

        self.statistics.record(&batch);
        permit.release();

        if self.reporter.tick(&mut self.statistics) {
            info!("{}", self.statistics.display_string());
            self.events.emit(PipelineEvent::Progress {
                statistics: self.statistics.clone(),
            });
        }

        Ok(())
    }

    /// Write everything the channel delivers, in arrival order, then finish
    ///
    /// Blocks the calling thread; run it under `spawn_blocking`.
    pub fn drain(mut self, mut rx: mpsc::Receiver<CompletedDocument>) -> Result<WriterOutput<W>> {
        while let Some(done) = rx.blocking_recv() {
            self.write(done)?;
        }
        self.finish()
    }

    /// Close the tar and gzip streams
    pub fn finish(self) -> Result<WriterOutput<W>> {
        let StreamingArchiveWriter {
            builder,
            mut statistics,
            mut reporter,
            ..
        } = self;

        reporter.tick(&mut statistics);
        let encoder = builder.into_inner().map_err(Error::ArchiveWrite)?;
        let inner = encoder.finish().map_err(Error::ArchiveWrite)?;

        Ok(WriterOutput { inner, statistics })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::PermitPool;
    use crate::generator::{SkipReason, Variant, VariantBatch};
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn batch(count: usize) -> VariantBatch {
        VariantBatch {
            variants: (0..count)
                .map(|index| Variant {
                    index,
                    transpose: index as i32,
                    stretch: 0.0,
                    bytes: vec![index as u8; 4],
                })
                .collect(),
            ..Default::default()
        }
    }

    fn completed(pool: &PermitPool, sequence: u64, batch: VariantBatch) -> CompletedDocument {
        CompletedDocument {
            sequence,
            name: format!("doc{}", sequence),
            batch,
            permit: pool.try_acquire().unwrap(),
        }
    }

    fn entries(archive: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut tar = tar::Archive::new(GzDecoder::new(archive));
        tar.entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let name = entry.path().unwrap().to_string_lossy().into_owned();
                let mut body = Vec::new();
                entry.read_to_end(&mut body).unwrap();
                (name, body)
            })
            .collect()
    }

    #[test]
    fn test_entry_name_format() {
        let id = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(
            entry_name(&id, 3, "mid"),
            "67e55044-10b1-426f-9247-bb680e5fe0c8_3.mid"
        );
    }

    #[test]
    fn test_writes_one_group_per_document() {
        let pool = PermitPool::new(4);
        let mut writer = StreamingArchiveWriter::new(Vec::new(), "mid", Duration::from_secs(60));

        writer.write(completed(&pool, 0, batch(3))).unwrap();
        writer.write(completed(&pool, 1, batch(2))).unwrap();
        let output = writer.finish().unwrap();

        let entries = entries(&output.inner);
        assert_eq!(entries.len(), 5);

        let base_of = |name: &str| name.split('_').next().unwrap().to_string();
        let first = base_of(&entries[0].0);
        let second = base_of(&entries[3].0);
        assert_ne!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
        assert_eq!(entries[0].0, format!("{}_0.mid", first));
        assert_eq!(entries[2].0, format!("{}_2.mid", first));
        assert_eq!(entries[4].0, format!("{}_1.mid", second));
        assert_eq!(entries[4].1, vec![1u8; 4]);

        assert_eq!(output.statistics.documents_written, 2);
        assert_eq!(output.statistics.variants_written, 5);
        assert_eq!(output.statistics.bytes_written, 20);
        assert_eq!(pool.snapshot().in_flight, 0);
    }

    #[test]
    fn test_empty_batch_releases_permit() {
        let pool = PermitPool::new(1);
        let mut writer = StreamingArchiveWriter::new(Vec::new(), "mid", Duration::from_secs(60));

        let skipped = VariantBatch {
            skipped: Some(SkipReason::MalformedMidi("no header".into())),
            ..Default::default()
        };
        writer.write(completed(&pool, 0, skipped)).unwrap();

        // Capacity one: the next acquire only succeeds if the permit came back
        writer.write(completed(&pool, 1, batch(1))).unwrap();
        let output = writer.finish().unwrap();

        assert_eq!(entries(&output.inner).len(), 1);
        assert_eq!(output.statistics.documents_processed, 2);
        assert_eq!(output.statistics.documents_skipped_midi, 1);
        assert_eq!(pool.snapshot().released, 2);
    }

    #[test]
    fn test_events_emitted() {
        let pool = PermitPool::new(2);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut writer = StreamingArchiveWriter::new(Vec::new(), "midi", Duration::ZERO)
            .with_events(EventSender::new(tx));

        writer.write(completed(&pool, 7, batch(2))).unwrap();
        writer.finish().unwrap();

        match rx.try_recv().unwrap() {
            PipelineEvent::DocumentWritten {
                sequence, variants, ..
            } => {
                assert_eq!(sequence, 7);
                assert_eq!(variants, 2);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(rx.try_recv().unwrap(), PipelineEvent::Progress { .. }));
    }

    #[test]
    fn test_drain_writes_until_channel_closes() {
        let pool = PermitPool::new(8);
        let (tx, rx) = mpsc::channel(8);
        for sequence in 0..3 {
            tx.try_send(completed(&pool, sequence, batch(1))).unwrap();
        }
        drop(tx);

        let writer = StreamingArchiveWriter::new(Vec::new(), "mid", Duration::from_secs(60));
        let output = writer.drain(rx).unwrap();
        assert_eq!(entries(&output.inner).len(), 3);
        assert_eq!(pool.snapshot().in_flight, 0);
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_is_fatal() {
        let pool = PermitPool::new(1);
        let mut writer = StreamingArchiveWriter::new(FailingWriter, "mid", Duration::from_secs(60));

        // Gzip buffers small writes, so the failure may surface on finish
        let result = writer
            .write(completed(&pool, 0, batch(1)))
            .and_then(|()| writer.finish().map(|_| ()));
        assert!(matches!(result, Err(Error::ArchiveWrite(_))));
        assert_eq!(pool.snapshot().in_flight, 0);
    }
}
