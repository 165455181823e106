//! Input archive readers
//!
//! A [`DocumentSource`] walks an input archive record by record and pushes each
//! record into a [`RecordSink`]. Before reading a record body it asks the sink
//! for admission, which is where the feed applies backpressure: a source never
//! materializes a document the pipeline has no capacity for.
//!
//! Supported inputs (picked by file name):
//! - `.tar`, `.tar.gz`, `.tgz`: one document per regular file
//! - `.jsonl`, `.jsonl.gz`: one codec-encoded document per line (`"text"` field)

pub mod jsonl;
pub mod tarball;

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufReader};
use std::ops::ControlFlow;
use std::path::Path;
use thiserror::Error;

pub use self::jsonl::JsonlSource;
pub use self::tarball::TarSource;

/// Body of one input record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// MIDI file bytes as stored
    Raw(Vec<u8>),
    /// MIDI file bytes in byte-text codec form
    Encoded(String),
}

impl Payload {
    /// Size of the stored payload in bytes
    pub(crate) fn len(&self) -> usize {
        match self {
            Payload::Raw(bytes) => bytes.len(),
            Payload::Encoded(text) => text.len(),
        }
    }
}

/// One record read from an input archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    /// Entry name (tar path, or `file:line` for JSON lines)
    pub name: String,
    pub payload: Payload,
}

impl SourceRecord {
    pub fn raw(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            payload: Payload::Raw(bytes),
        }
    }

    pub fn encoded(name: impl Into<String>, text: String) -> Self {
        Self {
            name: name.into(),
            payload: Payload::Encoded(text),
        }
    }
}

/// Archive read failures (always fatal to the run)
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON on line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line} has no \"text\" field")]
    MissingText { line: usize },
}

impl SourceError {
    pub(crate) fn io(context: impl Into<String>) -> impl FnOnce(io::Error) -> SourceError {
        let context = context.into();
        move |source| SourceError::Io { context, source }
    }
}

/// Receiver side of a source walk
pub trait RecordSink {
    /// Called before each record body is read. `Break` stops the walk.
    fn admit(&mut self) -> ControlFlow<()>;

    /// Hand over a record that was admitted. `Break` stops the walk.
    fn accept(&mut self, record: SourceRecord) -> ControlFlow<()>;
}

/// A record-by-record archive reader
pub trait DocumentSource: Send {
    /// Human-readable label for logs
    fn describe(&self) -> String;

    /// Walk the archive in stored order until it is exhausted or the sink stops
    fn read_records(self: Box<Self>, sink: &mut dyn RecordSink) -> std::result::Result<(), SourceError>;
}

/// In-memory source, used for tests and for callers that already hold records
pub struct MemorySource {
    records: Vec<SourceRecord>,
}

impl MemorySource {
    pub fn new(records: Vec<SourceRecord>) -> Self {
        Self { records }
    }
}

impl DocumentSource for MemorySource {
    fn describe(&self) -> String {
        format!("memory ({} records)", self.records.len())
    }

    fn read_records(self: Box<Self>, sink: &mut dyn RecordSink) -> std::result::Result<(), SourceError> {
        for record in self.records {
            if sink.admit().is_break() || sink.accept(record).is_break() {
                break;
            }
        }
        Ok(())
    }
}

/// Input archive layouts recognized from the file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    TarGz,
    Jsonl,
    JsonlGz,
}

impl ArchiveFormat {
    const SUFFIXES: [(&'static str, ArchiveFormat); 5] = [
        (".tar.gz", ArchiveFormat::TarGz),
        (".tgz", ArchiveFormat::TarGz),
        (".tar", ArchiveFormat::Tar),
        (".jsonl.gz", ArchiveFormat::JsonlGz),
        (".jsonl", ArchiveFormat::Jsonl),
    ];

    /// Detect the format from a path's file name (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        Self::SUFFIXES
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix))
            .map(|(_, format)| *format)
    }

    /// File name with any recognized archive suffix removed
    pub fn stem(path: &Path) -> String {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let lower = name.to_lowercase();

        for (suffix, _) in Self::SUFFIXES.iter() {
            if lower.ends_with(suffix) && lower.len() > suffix.len() {
                let stem = name
                    .len()
                    .checked_sub(suffix.len())
                    .and_then(|end| name.get(..end));
                if let Some(stem) = stem {
                    return stem.to_string();
                }
            }
        }

        match path.file_stem() {
            Some(stem) => stem.to_string_lossy().into_owned(),
            None => name,
        }
    }
}

/// Open an input archive, choosing the reader from the file name
pub fn open_path(path: &Path) -> Result<Box<dyn DocumentSource>> {
    let format =
        ArchiveFormat::from_path(path).ok_or_else(|| Error::UnsupportedInput(path.to_path_buf()))?;

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let label = path.display().to_string();

    let source: Box<dyn DocumentSource> = match format {
        ArchiveFormat::Tar => Box::new(TarSource::new(reader, label)),
        ArchiveFormat::TarGz => Box::new(TarSource::new(GzDecoder::new(reader), label)),
        ArchiveFormat::Jsonl => Box::new(JsonlSource::new(reader, label)),
        ArchiveFormat::JsonlGz => {
            Box::new(JsonlSource::new(BufReader::new(GzDecoder::new(reader)), label))
        }
    };

    Ok(source)
}
