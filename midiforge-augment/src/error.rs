//! Error types for midiforge-augment
//!
//! Fatal conditions only. Malformed documents are not errors here: they are
//! skipped by the generator and counted (see `generator::SkipReason`).

use crate::source::SourceError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the augmentation pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid option value or unusable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Output archive already exists
    #[error("Output path {0} already exists")]
    OutputExists(PathBuf),

    /// Output name does not end in .tar.gz
    #[error("Output archive must be a .tar.gz file, got extension '{0}'")]
    UnsupportedOutputExtension(String),

    /// Input archive format not recognized from its name
    #[error("Unsupported input archive: {0}")]
    UnsupportedInput(PathBuf),

    /// Input archive could not be read
    #[error("Source read error: {0}")]
    Source(#[from] SourceError),

    /// Output archive could not be written
    #[error("Archive write error: {0}")]
    ArchiveWrite(#[source] std::io::Error),

    /// A worker or stage task failed to complete
    #[error("Worker error: {0}")]
    Worker(String),

    /// Writer stage stopped accepting completed documents
    #[error("Writer stage closed before all documents were written")]
    WriterClosed,

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// midiforge-common error
    #[error(transparent)]
    Common(#[from] midiforge_common::Error),
}

/// Convenience Result type using the pipeline Error
pub type Result<T> = std::result::Result<T, Error>;
