//! # midiforge common library
//!
//! Shared code for the midiforge tools:
//! - Byte-to-text codec for carrying MIDI through text pipelines
//! - Augmentation parameter set
//! - TOML configuration loading
//! - Common error type

pub mod codec;
pub mod config;
pub mod error;
pub mod params;

pub use codec::FormatError;
pub use error::{Error, Result};
pub use params::AugmentParams;
