//! Reversible byte-to-text codec
//!
//! Lets binary MIDI travel through text-only tooling (tokenizers, JSON-lines
//! corpora) without corruption.
//!
//! Every input byte becomes two characters from the Cyrillic block
//! U+0400..=U+040F: the low nibble first, then the high nibble. In UTF-8 each
//! of those characters is the pair `0xD0, 0x80 | nibble`, so encoded text is
//! always well-formed and takes exactly four UTF-8 bytes per input byte.
//!
//! ```
//! use midiforge_common::codec::{decode, encode};
//!
//! let text = encode(&[0x4D, 0x54]);
//! assert_eq!(text.chars().count(), 4);
//! assert_eq!(decode(&text).unwrap(), vec![0x4D, 0x54]);
//! ```

use thiserror::Error;

/// UTF-8 lead byte shared by every encoded character
const LEAD_UNIT: u8 = 0xD0;

/// Marker bits that place a nibble in the continuation-byte range
const CONTINUATION_MARKER: u8 = 0x80;

const MARKER_MASK: u8 = 0xF0;
const NIBBLE_MASK: u8 = 0x0F;

/// UTF-8 bytes produced per input byte (two 2-byte characters)
const UNITS_PER_BYTE: usize = 4;

/// One character per nibble value, U+0400..=U+040F
const NIBBLE_CHARS: [char; 16] = [
    '\u{0400}', '\u{0401}', '\u{0402}', '\u{0403}', '\u{0404}', '\u{0405}', '\u{0406}', '\u{0407}',
    '\u{0408}', '\u{0409}', '\u{040A}', '\u{040B}', '\u{040C}', '\u{040D}', '\u{040E}', '\u{040F}',
];

/// Encoded text that cannot be turned back into bytes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// A character outside U+0400..=U+040F
    #[error("invalid character {found:?} at byte offset {offset}")]
    InvalidCharacter { offset: usize, found: char },

    /// Nibbles come in pairs; a dangling one means the text was truncated
    #[error("odd number of nibble characters ({nibbles})")]
    OddLength { nibbles: usize },
}

/// Encode raw bytes as codec text
pub fn encode(data: &[u8]) -> String {
    let mut text = String::with_capacity(encoded_len(data.len()));
    for &byte in data {
        text.push(NIBBLE_CHARS[(byte & NIBBLE_MASK) as usize]);
        text.push(NIBBLE_CHARS[(byte >> 4) as usize]);
    }
    text
}

/// Decode codec text back into the original bytes
///
/// Fails on any character outside the nibble block and on an odd number of
/// nibble characters. Never returns partial output.
pub fn decode(text: &str) -> Result<Vec<u8>, FormatError> {
    let units = text.as_bytes();
    validate_units(text)?;

    let nibbles = units.len() / 2;
    if nibbles % 2 != 0 {
        return Err(FormatError::OddLength { nibbles });
    }

    // Each 4-unit group is [lead, low | marker, lead, high | marker]
    let bytes = units
        .chunks_exact(UNITS_PER_BYTE)
        .map(|group| ((group[3] & NIBBLE_MASK) << 4) | (group[1] & NIBBLE_MASK))
        .collect();

    Ok(bytes)
}

/// UTF-8 length of the text `encode` produces for `byte_len` input bytes
pub fn encoded_len(byte_len: usize) -> usize {
    byte_len * UNITS_PER_BYTE
}

/// True when `text` would decode successfully
pub fn is_encoded(text: &str) -> bool {
    validate_units(text).is_ok() && (text.len() / 2) % 2 == 0
}

fn validate_units(text: &str) -> Result<(), FormatError> {
    let units = text.as_bytes();
    let bad_pair = units.chunks(2).position(|pair| {
        pair.len() != 2
            || pair[0] != LEAD_UNIT
            || pair[1] & MARKER_MASK != CONTINUATION_MARKER
    });

    match bad_pair {
        None => Ok(()),
        Some(pair_index) => {
            // Every earlier pair was a whole 2-byte character, so this offset
            // sits on a character boundary.
            let offset = pair_index * 2;
            let found = text[offset..]
                .chars()
                .next()
                .unwrap_or(char::REPLACEMENT_CHARACTER);
            Err(FormatError::InvalidCharacter { offset, found })
        }
    }
}
