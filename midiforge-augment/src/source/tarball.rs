//! Tar archive reader (plain or gzip-compressed)

use super::{DocumentSource, Payload, RecordSink, SourceError, SourceRecord};
use std::io::{self, Read};
use tracing::{debug, trace};

/// Entries with this suffix hold codec-encoded text instead of raw MIDI
const ENCODED_SUFFIX: &str = ".txt";

/// Most a header-declared size may preallocate; larger bodies grow as read
const MAX_PREALLOC: u64 = 1 << 20;

/// Reads one document per regular-file entry of a tar stream
pub struct TarSource<R> {
    reader: R,
    label: String,
}

impl<R: Read + Send> TarSource<R> {
    pub fn new(reader: R, label: impl Into<String>) -> Self {
        Self {
            reader,
            label: label.into(),
        }
    }
}

impl<R: Read + Send> DocumentSource for TarSource<R> {
    fn describe(&self) -> String {
        format!("tar archive {}", self.label)
    }

    fn read_records(self: Box<Self>, sink: &mut dyn RecordSink) -> Result<(), SourceError> {
        let this = *self;
        let mut archive = tar::Archive::new(this.reader);
        let entries = archive
            .entries()
            .map_err(SourceError::io(format!("opening {}", this.label)))?;

        for (index, entry) in entries.enumerate() {
            let mut entry =
                entry.map_err(SourceError::io(format!("reading entry {} header", index)))?;

            if !entry.header().entry_type().is_file() {
                trace!(index, "Skipping non-file tar entry");
                continue;
            }

            let name = match entry.path() {
                Ok(path) => path.to_string_lossy().into_owned(),
                Err(_) => format!("entry-{}", index),
            };

            if sink.admit().is_break() {
                debug!(name = %name, "Reader stopped before entry");
                break;
            }

            let declared = entry.size();
            let mut body = Vec::with_capacity(declared.min(MAX_PREALLOC) as usize);
            entry
                .read_to_end(&mut body)
                .map_err(SourceError::io(format!("reading entry {}", name)))?;
            if body.len() as u64 != declared {
                let short = io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("header declares {} bytes, found {}", declared, body.len()),
                );
                return Err(SourceError::io(format!("reading entry {}", name))(short));
            }

            let payload = if name.to_lowercase().ends_with(ENCODED_SUFFIX) {
                // Invalid UTF-8 becomes replacement characters, which the
                // codec then rejects as malformed text.
                let text = match String::from_utf8(body) {
                    Ok(text) => text,
                    Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
                };
                Payload::Encoded(text)
            } else {
                Payload::Raw(body)
            };

            if sink.accept(SourceRecord { name, payload }).is_break() {
                break;
            }
        }

        Ok(())
    }
}
