//! # midiforge augmentation pipeline
//!
//! Expands a MIDI corpus archive into transposed and time-stretched variants,
//! streamed into a `.tar.gz` archive with bounded memory:
//! - `source`: record-by-record archive readers (tar, tar.gz, JSON lines)
//! - `feed`: permit-bounded admission of source documents
//! - `generator`: per-document variant generation via `midly`
//! - `pool`: parallel generation workers
//! - `writer`: single-writer output archive with run counters
//! - `pipeline`: run orchestration and summary

pub mod error;
pub mod events;
pub mod feed;
pub mod generator;
pub mod options;
pub mod pipeline;
pub mod pool;
pub mod source;
pub mod stats;
pub mod writer;

#[cfg(test)]
mod test_util;

pub use error::{Error, Result};
pub use events::PipelineEvent;
pub use feed::{BoundedSourceFeed, Interruption, PermitPool, PermitStats};
pub use generator::{MidiVariantGenerator, SkipReason, VariantBatch};
pub use options::{AugmentOptions, OptionOverrides};
pub use pipeline::{AugmentPipeline, PipelineOptions, RunSummary};
pub use pool::AugmentationWorkerPool;
pub use stats::RunStatistics;
pub use writer::StreamingArchiveWriter;
