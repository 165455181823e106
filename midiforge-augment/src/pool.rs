//! Augmentation worker pool
//!
//! Pulls documents from the [`BoundedSourceFeed`], runs variant generation on
//! tokio's blocking thread pool with at most N documents in progress, and hands
//! each finished batch to the writer stage.
//!
//! With one worker, documents complete in read order. With more, completion
//! order is whatever order the work finishes in; each document is still
//! processed exactly once.

use crate::error::{Error, Result};
use crate::feed::{BoundedSourceFeed, FeedItem, Permit};
use crate::generator::{MidiVariantGenerator, VariantBatch};
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// A generated batch on its way to the writer
#[derive(Debug)]
pub struct CompletedDocument {
    pub sequence: u64,
    pub name: String,
    pub batch: VariantBatch,
    /// Released by the writer once the batch is stored
    pub permit: Permit,
}

/// Totals for one pool run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolSummary {
    pub documents: u64,
    pub variants: u64,
}

/// Fixed-width pool of generation workers
pub struct AugmentationWorkerPool {
    generator: Arc<MidiVariantGenerator>,
    workers: usize,
}

impl AugmentationWorkerPool {
    /// Create a pool running up to `workers` documents at once (at least one)
    pub fn new(generator: Arc<MidiVariantGenerator>, workers: usize) -> Self {
        Self {
            generator,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Process every document the feed yields
    ///
    /// Returns when the feed is exhausted or cancelled. A feed error, a failed
    /// worker task, or a closed writer channel ends the run with an error.
    pub async fn run(
        &self,
        feed: BoundedSourceFeed,
        completed: mpsc::Sender<CompletedDocument>,
    ) -> Result<PoolSummary> {
        info!(workers = self.workers, "Starting augmentation workers");

        let generator = Arc::clone(&self.generator);
        let results = feed
            .into_stream()
            .map(move |item| {
                let generator = Arc::clone(&generator);
                async move {
                    let FeedItem {
                        sequence,
                        name,
                        payload,
                        permit,
                    } = item?;

                    let batch =
                        tokio::task::spawn_blocking(move || generator.generate_payload(&payload))
                            .await
                            .map_err(|e| {
                                Error::Worker(format!(
                                    "generation for document {} ({}) failed: {}",
                                    sequence, name, e
                                ))
                            })?;

                    debug!(
                        sequence,
                        name = %name,
                        variants = batch.len(),
                        dropped = batch.dropped,
                        "Document generated"
                    );

                    Ok::<_, Error>(CompletedDocument {
                        sequence,
                        name,
                        batch,
                        permit,
                    })
                }
            })
            .buffer_unordered(self.workers);
        tokio::pin!(results);

        let mut summary = PoolSummary::default();
        while let Some(done) = results.next().await {
            let done = done?;
            summary.documents += 1;
            summary.variants += done.batch.len() as u64;
            completed.send(done).await.map_err(|_| Error::WriterClosed)?;
        }

        info!(
            documents = summary.documents,
            variants = summary.variants,
            "Augmentation workers finished"
        );
        Ok(summary)
    }
}
