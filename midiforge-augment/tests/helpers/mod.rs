//! Test Helper Utilities
//!
//! Shared fixtures for midiforge-augment integration tests

#![allow(dead_code)]

pub mod archive_utils;
pub mod midi_fixtures;

pub use archive_utils::{
    group_entries, read_output, write_jsonl, write_jsonl_gz, write_tar, write_tar_gz, OutputGroup,
};
pub use midi_fixtures::{first_note, melody};
