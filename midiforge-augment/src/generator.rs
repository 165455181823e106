//! MIDI variant generation
//!
//! One document in, one batch of transposed/time-stretched MIDI files out.
//! Parsing and serialization go through `midly`. A document that does not
//! parse is skipped with an empty batch; it never fails the run.

use crate::source::Payload;
use midiforge_common::{codec, AugmentParams, FormatError};
use midly::num::{u28, u7};
use midly::{MidiMessage, Smf, TrackEventKind};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Largest delta-time a standard MIDI file can encode (28-bit VLQ)
const MAX_DELTA: i64 = (1 << 28) - 1;

/// Largest MIDI key number
const MAX_KEY: i64 = 127;

/// Why a document produced no variants
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// Bytes did not parse as a standard MIDI file
    MalformedMidi(String),
    /// Codec text could not be decoded back to bytes
    MalformedText(String),
}

impl From<FormatError> for SkipReason {
    fn from(e: FormatError) -> Self {
        SkipReason::MalformedText(e.to_string())
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MalformedMidi(detail) => write!(f, "malformed MIDI: {}", detail),
            SkipReason::MalformedText(detail) => write!(f, "malformed encoded text: {}", detail),
        }
    }
}

/// A single variant that could not be produced
#[derive(Debug, Error)]
pub enum VariantError {
    #[error("note {note} is outside the MIDI key range")]
    NoteOutOfRange { note: i64 },

    #[error("delta-time {delta} does not fit in 28 bits")]
    DeltaOutOfRange { delta: i64 },

    #[error("serialization failed: {0}")]
    Serialize(#[from] std::io::Error),
}

/// One serialized variant
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    /// Position in transpose-major, stretch-minor enumeration
    pub index: usize,
    pub transpose: i32,
    pub stretch: f64,
    pub bytes: Vec<u8>,
}

/// All variants of one document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantBatch {
    pub variants: Vec<Variant>,
    /// Variants dropped because they could not be serialized
    pub dropped: usize,
    /// Set when the whole document was skipped
    pub skipped: Option<SkipReason>,
}

impl VariantBatch {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            variants: Vec::new(),
            dropped: 0,
            skipped: Some(reason),
        }
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Total serialized size of all variants
    pub fn total_bytes(&self) -> u64 {
        self.variants.iter().map(|v| v.bytes.len() as u64).sum()
    }
}

/// Produces the transpose × stretch cross product for one document
#[derive(Debug, Clone)]
pub struct MidiVariantGenerator {
    params: AugmentParams,
}

impl MidiVariantGenerator {
    pub fn new(params: AugmentParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &AugmentParams {
        &self.params
    }

    /// Generate variants for a payload, decoding codec text first
    pub fn generate_payload(&self, payload: &Payload) -> VariantBatch {
        match payload {
            Payload::Raw(bytes) => self.generate(bytes),
            Payload::Encoded(text) => match codec::decode(text) {
                Ok(bytes) => self.generate(&bytes),
                Err(e) => {
                    debug!(error = %e, "Skipping undecodable text document");
                    VariantBatch::skipped(e.into())
                }
            },
        }
    }

    /// Generate variants for raw MIDI bytes
    pub fn generate(&self, document: &[u8]) -> VariantBatch {
        let smf = match Smf::parse(document) {
            Ok(smf) => smf,
            Err(e) => {
                debug!(error = %e, bytes = document.len(), "Skipping unparseable MIDI document");
                return VariantBatch::skipped(SkipReason::MalformedMidi(e.to_string()));
            }
        };

        let mut batch = VariantBatch {
            variants: Vec::with_capacity(self.params.variant_count()),
            ..Default::default()
        };

        for (index, transpose, stretch) in self.params.pairs() {
            let mut variant = smf.clone();
            let bytes = transpose_and_stretch(&mut variant, transpose, stretch).and_then(|()| {
                let mut out = Vec::with_capacity(document.len());
                variant.write_std(&mut out)?;
                Ok(out)
            });

            match bytes {
                Ok(bytes) => batch.variants.push(Variant {
                    index,
                    transpose,
                    stretch,
                    bytes,
                }),
                Err(e) => {
                    debug!(index, transpose, stretch, error = %e, "Dropping variant");
                    batch.dropped += 1;
                }
            }
        }

        batch
    }
}

/// Shift note-on/note-off keys by `transpose` and scale every delta-time by `1 + stretch`
///
/// Delta-times are truncated toward zero. Fails if a value leaves the range the
/// file format can carry, in which case `smf` is left partially rewritten.
pub fn transpose_and_stretch(
    smf: &mut Smf<'_>,
    transpose: i32,
    stretch: f64,
) -> Result<(), VariantError> {
    let factor = 1.0 + stretch;

    for track in smf.tracks.iter_mut() {
        for event in track.iter_mut() {
            if let TrackEventKind::Midi { message, .. } = &mut event.kind {
                match message {
                    MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                        *key = shift_key(*key, transpose)?;
                    }
                    _ => {}
                }
            }

            let scaled = (event.delta.as_int() as f64 * factor).trunc() as i64;
            if !(0..=MAX_DELTA).contains(&scaled) {
                return Err(VariantError::DeltaOutOfRange { delta: scaled });
            }
            event.delta = u28::new(scaled as u32);
        }
    }

    Ok(())
}

fn shift_key(key: u7, transpose: i32) -> Result<u7, VariantError> {
    let note = i64::from(key.as_int()) + i64::from(transpose);
    if !(0..=MAX_KEY).contains(&note) {
        return Err(VariantError::NoteOutOfRange { note });
    }
    Ok(u7::new(note as u8))
}
