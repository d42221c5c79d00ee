//! Streaming sample decoder
//!
//! ```text
//! BufRead ──► header scan (eager) ──► Metadata
//!                 │
//!                 └─► first record held back
//!                                   │
//!             Iterator::next() ◄────┘  one Result<Sample, DecodeError> per record
//! ```
//!
//! The wire format is detected from the first non-blank line. Metadata
//! appearing after samples is merged into [`SampleDecoder::metadata`].
//! Decoding stops at the first malformed record.

use log::debug;
use std::io::BufRead;
use threadscope_common::MODE_KEY;

use super::collapsed;
use super::json_lines::{self, JsonRecord};
use super::{Metadata, Sample};
use crate::domain::{DecodeError, MetricKind};

/// Wire shape of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Collapsed,
    JsonLines,
}

/// One physical line with its location.
struct RawLine {
    text: String,
    line: usize,
    offset: u64,
}

enum Record {
    Metadata(Metadata),
    Sample(Sample),
}

pub struct SampleDecoder<R> {
    reader: R,
    format: WireFormat,
    metadata: Metadata,
    /// First record after the header, decoded during the header scan.
    pending: Option<Result<Sample, DecodeError>>,
    line: usize,
    offset: u64,
    failed: bool,
}

impl<R: BufRead> SampleDecoder<R> {
    /// Read the metadata header and detect the wire format.
    ///
    /// # Errors
    /// Returns [`DecodeError`] if the header is malformed or unreadable.
    pub fn new(reader: R) -> Result<Self, DecodeError> {
        let mut decoder = Self {
            reader,
            format: WireFormat::Collapsed,
            metadata: Metadata::new(),
            pending: None,
            line: 0,
            offset: 0,
            failed: false,
        };

        let mut first = true;
        loop {
            let raw = match decoder.next_line() {
                Ok(Some(raw)) => raw,
                Ok(None) => break,
                Err(e @ DecodeError::Malformed { .. }) => {
                    decoder.pending = Some(Err(e));
                    break;
                }
                Err(e) => return Err(e),
            };
            if first && json_lines::looks_like_json(&raw.text) {
                decoder.format = WireFormat::JsonLines;
            }
            first = false;

            match decoder.decode(&raw) {
                Ok(Record::Metadata(metadata)) => decoder.metadata.merge(metadata),
                Ok(Record::Sample(sample)) => {
                    decoder.pending = Some(Ok(sample));
                    break;
                }
                Err(e) if decoder.is_metadata(&raw) => return Err(e),
                Err(e) => {
                    decoder.pending = Some(Err(e));
                    break;
                }
            }
        }

        debug!(
            "Detected {:?} recording with {} metadata entries",
            decoder.format,
            decoder.metadata.len()
        );
        Ok(decoder)
    }

    #[must_use]
    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Metadata seen so far: the full header, plus any trailing entries
    /// already consumed.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    #[must_use]
    pub fn into_metadata(self) -> Metadata {
        self.metadata
    }

    /// Next non-blank line, with its 1-based line number and byte offset.
    ///
    /// A line that is not valid UTF-8 is a malformed record.
    fn next_line(&mut self) -> Result<Option<RawLine>, DecodeError> {
        loop {
            let mut bytes = Vec::new();
            let offset = self.offset;
            let read = self.reader.read_until(b'\n', &mut bytes)?;
            if read == 0 {
                return Ok(None);
            }
            self.line += 1;
            self.offset += read as u64;

            let mut text = String::from_utf8(bytes).map_err(|e| DecodeError::Malformed {
                line: self.line,
                offset,
                reason: format!("invalid UTF-8: {}", e.utf8_error()),
            })?;
            let trimmed_len = text.trim_end_matches(['\n', '\r']).len();
            text.truncate(trimmed_len);
            if !text.trim().is_empty() {
                return Ok(Some(RawLine {
                    text,
                    line: self.line,
                    offset,
                }));
            }
        }
    }

    fn is_metadata(&self, raw: &RawLine) -> bool {
        match self.format {
            WireFormat::Collapsed => collapsed::is_metadata_line(&raw.text),
            WireFormat::JsonLines => json_lines::is_metadata_record(&raw.text),
        }
    }

    fn decode(&self, raw: &RawLine) -> Result<Record, DecodeError> {
        let malformed = |reason: String| DecodeError::Malformed {
            line: raw.line,
            offset: raw.offset,
            reason,
        };

        match self.format {
            WireFormat::Collapsed => {
                if collapsed::is_metadata_line(&raw.text) {
                    let (key, value) =
                        collapsed::parse_metadata_line(&raw.text).map_err(malformed)?;
                    let mut metadata = Metadata::new();
                    metadata.insert(key, value);
                    Ok(Record::Metadata(metadata))
                } else {
                    collapsed::parse_sample_line(&raw.text, self.metric_kind(raw)?)
                        .map(Record::Sample)
                        .map_err(malformed)
                }
            }
            WireFormat::JsonLines => match json_lines::parse_record(&raw.text).map_err(malformed)? {
                JsonRecord::Metadata(metadata) => Ok(Record::Metadata(metadata)),
                JsonRecord::Sample(sample) => Ok(Record::Sample(sample)),
            },
        }
    }

    fn metric_kind(&self, raw: &RawLine) -> Result<MetricKind, DecodeError> {
        self.metadata.metric_kind().ok_or_else(|| DecodeError::Malformed {
            line: raw.line,
            offset: raw.offset,
            reason: format!(
                "unknown metric mode {:?}",
                self.metadata.get(MODE_KEY).unwrap_or_default()
            ),
        })
    }

    fn next_record(&mut self) -> Result<Option<Sample>, DecodeError> {
        if let Some(pending) = self.pending.take() {
            return pending.map(Some);
        }
        while let Some(raw) = self.next_line()? {
            match self.decode(&raw)? {
                Record::Metadata(metadata) => self.metadata.merge(metadata),
                Record::Sample(sample) => return Ok(Some(sample)),
            }
        }
        Ok(None)
    }
}

impl<R: BufRead> Iterator for SampleDecoder<R> {
    type Item = Result<Sample, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_record() {
            Ok(sample) => sample.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
