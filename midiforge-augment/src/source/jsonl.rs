//! JSON lines reader
//!
//! Each non-blank line is an object whose `"text"` field holds one document in
//! byte-text codec form. Other fields are ignored.

use super::{DocumentSource, Payload, RecordSink, SourceError, SourceRecord};
use serde::Deserialize;
use std::io::BufRead;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct JsonlLine {
    #[serde(default)]
    text: Option<String>,
}

/// Reads one codec-encoded document per JSON line
pub struct JsonlSource<R> {
    reader: R,
    label: String,
}

impl<R: BufRead + Send> JsonlSource<R> {
    pub fn new(reader: R, label: impl Into<String>) -> Self {
        Self {
            reader,
            label: label.into(),
        }
    }
}

impl<R: BufRead + Send> DocumentSource for JsonlSource<R> {
    fn describe(&self) -> String {
        format!("JSON lines {}", self.label)
    }

    fn read_records(self: Box<Self>, sink: &mut dyn RecordSink) -> Result<(), SourceError> {
        let JsonlSource { mut reader, label } = *self;
        let mut buf = String::new();
        let mut line_no = 0usize;

        loop {
            buf.clear();
            let read = reader
                .read_line(&mut buf)
                .map_err(SourceError::io(format!("reading {} line {}", label, line_no + 1)))?;
            if read == 0 {
                break;
            }
            line_no += 1;

            let line = buf.trim();
            if line.is_empty() {
                continue;
            }

            if sink.admit().is_break() {
                debug!(line = line_no, "Reader stopped before line");
                break;
            }

            let parsed: JsonlLine = serde_json::from_str(line).map_err(|source| SourceError::Json {
                line: line_no,
                source,
            })?;
            let text = parsed.text.ok_or(SourceError::MissingText { line: line_no })?;

            let record = SourceRecord {
                name: format!("{}:{}", label, line_no),
                payload: Payload::Encoded(text),
            };
            if sink.accept(record).is_break() {
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::ControlFlow;

    #[derive(Default)]
    struct Collect(Vec<SourceRecord>);

    impl RecordSink for Collect {
        fn admit(&mut self) -> ControlFlow<()> {
            ControlFlow::Continue(())
        }

        fn accept(&mut self, record: SourceRecord) -> ControlFlow<()> {
            self.0.push(record);
            ControlFlow::Continue(())
        }
    }

    fn read(input: &str) -> (Collect, Result<(), SourceError>) {
        let mut sink = Collect::default();
        let result = Box::new(JsonlSource::new(input.as_bytes(), "set.jsonl")).read_records(&mut sink);
        (sink, result)
    }

    #[test]
    fn test_reads_text_fields_and_skips_blank_lines() {
        let (sink, result) = read("{\"text\":\"\u{0401}\u{0400}\",\"id\":7}\n\n{\"text\":\"\"}\n");
        result.unwrap();
        assert_eq!(
            sink.0,
            vec![
                SourceRecord::encoded("set.jsonl:1", "\u{0401}\u{0400}".to_string()),
                SourceRecord::encoded("set.jsonl:3", String::new()),
            ]
        );
    }

    #[test]
    fn test_invalid_json_reports_line() {
        let (sink, result) = read("{\"text\":\"\"}\n{oops\n");
        assert_eq!(sink.0.len(), 1);
        assert!(matches!(result, Err(SourceError::Json { line: 2, .. })));
    }

    #[test]
    fn test_missing_text_field() {
        let (_, result) = read("{\"title\":\"no body\"}\n");
        assert!(matches!(result, Err(SourceError::MissingText { line: 1 })));
    }
}
