//! Pipeline events for progress observers

use crate::generator::SkipReason;
use crate::stats::RunStatistics;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Observable milestones of one augmentation run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Run accepted its input and began reading
    RunStarted {
        source: String,
        workers: usize,
        max_in_flight: usize,
        variants_per_document: usize,
        /// Unix timestamp (seconds since epoch)
        timestamp: i64,
    },

    /// A document's variants were stored in the archive
    DocumentWritten {
        sequence: u64,
        name: String,
        /// Shared prefix of this document's entry names
        base_id: Uuid,
        variants: usize,
        bytes: u64,
    },

    /// A document produced nothing
    DocumentSkipped {
        sequence: u64,
        name: String,
        /// `None` when the document parsed but every variant was dropped
        reason: Option<SkipReason>,
    },

    /// Periodic throughput report
    Progress { statistics: RunStatistics },

    /// Run ended (completed or interrupted)
    RunFinished {
        output_path: Option<PathBuf>,
        completed: bool,
        statistics: RunStatistics,
    },
}

/// Optional event sink shared by the pipeline stages
#[derive(Debug, Clone, Default)]
pub struct EventSender {
    tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
}

impl EventSender {
    pub fn new(tx: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Deliver an event; a dropped receiver is ignored
    pub fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
