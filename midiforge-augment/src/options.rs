//! Run option resolution
//!
//! Merges command-line/environment values over the TOML config and the
//! built-in defaults, and performs every check that must fail before any
//! input is read.

use crate::error::{Error, Result};
use crate::feed::DEFAULT_MAX_IN_FLIGHT;
use crate::pipeline::{PipelineOptions, DEFAULT_PROGRESS_INTERVAL_SECS};
use crate::source::ArchiveFormat;
use crate::writer::DEFAULT_ENTRY_EXTENSION;
use midiforge_common::config::TomlConfig;
use midiforge_common::params::{parse_list, DEFAULT_TIME_STRETCH, DEFAULT_TRANSPOSE};
use midiforge_common::AugmentParams;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Only accepted output archive suffix
pub const OUTPUT_SUFFIX: &str = ".tar.gz";

/// Suffix appended to the input stem for the default output name
const DEFAULT_OUTPUT_TAG: &str = "_augmented";

/// Values given on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct OptionOverrides {
    pub output: Option<PathBuf>,
    /// Comma-separated transpose offsets
    pub transpose: Option<String>,
    /// Comma-separated stretch factors
    pub time_stretch: Option<String>,
    pub workers: Option<usize>,
    pub max_in_flight: Option<usize>,
    pub progress_interval_secs: Option<u64>,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct AugmentOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub pipeline: PipelineOptions,
}

impl AugmentOptions {
    /// Resolve settings (overrides > TOML > defaults) and validate them
    pub fn resolve(input: PathBuf, overrides: OptionOverrides, config: &TomlConfig) -> Result<Self> {
        let section = &config.augment;

        if ArchiveFormat::from_path(&input).is_none() {
            return Err(Error::UnsupportedInput(input));
        }
        if !input.is_file() {
            return Err(Error::Config(format!(
                "Input archive {} does not exist",
                input.display()
            )));
        }

        let transpose = match &overrides.transpose {
            Some(raw) => parse_list(raw, "transpose")?,
            None => section
                .transpose
                .clone()
                .unwrap_or_else(|| DEFAULT_TRANSPOSE.to_vec()),
        };
        let time_stretch = match &overrides.time_stretch {
            Some(raw) => parse_list(raw, "time stretch")?,
            None => section
                .time_stretch
                .clone()
                .unwrap_or_else(|| DEFAULT_TIME_STRETCH.to_vec()),
        };
        let params = AugmentParams::new(transpose, time_stretch)?;

        let workers = overrides.workers.or(section.workers).unwrap_or(1);
        if workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }

        let max_in_flight = overrides
            .max_in_flight
            .or(section.max_in_flight)
            .unwrap_or(DEFAULT_MAX_IN_FLIGHT);
        if max_in_flight == 0 {
            return Err(Error::Config("max_in_flight must be at least 1".to_string()));
        }

        let progress_interval = Duration::from_secs(
            overrides
                .progress_interval_secs
                .or(section.progress_interval_secs)
                .unwrap_or(DEFAULT_PROGRESS_INTERVAL_SECS),
        );

        let entry_extension = normalize_extension(
            section
                .entry_extension
                .as_deref()
                .unwrap_or(DEFAULT_ENTRY_EXTENSION),
        )?;

        let output = resolve_output_path(&input, overrides.output.as_deref())?;

        Ok(Self {
            input,
            output,
            pipeline: PipelineOptions {
                params,
                workers,
                max_in_flight,
                progress_interval,
                entry_extension,
            },
        })
    }
}

/// Pick the output archive path and reject unusable ones
///
/// - unspecified: `<input-stem>_augmented.tar.gz` next to the input
/// - no extension: `.tar.gz` is appended
/// - any extension other than `.tar.gz`: rejected
/// - an existing path: rejected
pub fn resolve_output_path(input: &Path, output: Option<&Path>) -> Result<PathBuf> {
    let output = match output {
        None => {
            let name = format!(
                "{}{}{}",
                ArchiveFormat::stem(input),
                DEFAULT_OUTPUT_TAG,
                OUTPUT_SUFFIX
            );
            let path = input.with_file_name(name);
            info!(path = %path.display(), "Output path not specified, using default");
            path
        }
        Some(path) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .ok_or_else(|| {
                    Error::Config(format!("Output path {} has no file name", path.display()))
                })?;

            if name.ends_with(OUTPUT_SUFFIX) {
                path.to_path_buf()
            } else if let Some(ext) = path.extension() {
                return Err(Error::UnsupportedOutputExtension(
                    ext.to_string_lossy().into_owned(),
                ));
            } else {
                let mut with_suffix = path.as_os_str().to_owned();
                with_suffix.push(OUTPUT_SUFFIX);
                PathBuf::from(with_suffix)
            }
        }
    };

    if output.exists() {
        return Err(Error::OutputExists(output));
    }
    Ok(output)
}

/// Create the output's parent directory if it is missing
pub fn prepare_output_dir(output: &Path) -> Result<()> {
    let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    if parent.is_dir() {
        return Ok(());
    }

    std::fs::create_dir_all(parent).map_err(|e| {
        Error::Config(format!(
            "Cannot create output directory {}: {}",
            parent.display(),
            e
        ))
    })?;
    info!(dir = %parent.display(), "Created output directory");
    Ok(())
}

fn normalize_extension(raw: &str) -> Result<String> {
    let ext = raw.trim().trim_start_matches('.');
    if ext.is_empty() || ext.contains(|c: char| c == '/' || c == '\\') {
        return Err(Error::Config(format!("Invalid entry extension '{}'", raw)));
    }
    Ok(ext.to_string())
}
