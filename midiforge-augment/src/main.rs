//! midiforge-augment - Main entry point
//!
//! Expands a MIDI archive into pitch-transposed and time-stretched variants.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use midiforge_augment::{AugmentOptions, AugmentPipeline, OptionOverrides};
use midiforge_common::config::load_config;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for midiforge-augment
#[derive(Parser, Debug)]
#[command(name = "midiforge-augment")]
#[command(about = "Augment a MIDI archive with transposed and time-stretched variants")]
#[command(version)]
struct Args {
    /// MIDI archive to augment (.tar, .tar.gz, .tgz, .jsonl, .jsonl.gz)
    #[arg(short, long, env = "MIDIFORGE_INPUT")]
    input: PathBuf,

    /// Output archive (default: <input-stem>_augmented.tar.gz)
    #[arg(short, long, env = "MIDIFORGE_OUTPUT")]
    output: Option<PathBuf>,

    /// Comma-separated semitone offsets
    #[arg(short, long, env = "MIDIFORGE_TRANSPOSE", allow_hyphen_values = true)]
    transpose: Option<String>,

    /// Comma-separated uniform time stretch factors
    #[arg(short = 's', long, env = "MIDIFORGE_TIME_STRETCH", allow_hyphen_values = true)]
    time_stretch: Option<String>,

    /// Number of parallel workers
    #[arg(short = 'n', long, env = "MIDIFORGE_WORKERS")]
    workers: Option<usize>,

    /// Maximum documents between read and archive write
    #[arg(long, env = "MIDIFORGE_MAX_IN_FLIGHT")]
    max_in_flight: Option<usize>,

    /// Seconds between progress reports
    #[arg(long, env = "MIDIFORGE_PROGRESS_INTERVAL")]
    progress_interval: Option<u64>,

    /// TOML config file (falls back to MIDIFORGE_CONFIG, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json_summary: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing (RUST_LOG wins over the configured level)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let overrides = OptionOverrides {
        output: args.output,
        transpose: args.transpose,
        time_stretch: args.time_stretch,
        workers: args.workers,
        max_in_flight: args.max_in_flight,
        progress_interval_secs: args.progress_interval,
    };
    let options = AugmentOptions::resolve(args.input, overrides, &config)
        .context("Invalid run options")?;

    info!(
        "Augmenting {} into {}",
        options.input.display(),
        options.output.display()
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    let pipeline = AugmentPipeline::new(options.pipeline);
    let summary = pipeline
        .run_paths(&options.input, &options.output, cancel)
        .await
        .context("Augmentation failed")?;

    if args.json_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
        );
    }

    if summary.interrupted {
        anyhow::bail!(
            "Interrupted after {} documents; incomplete archive at {}",
            summary.statistics.documents_processed,
            summary
                .output_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        );
    }

    info!("Augmentation complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, finishing in-flight documents");
        },
        _ = terminate => {
            info!("Received terminate signal, finishing in-flight documents");
        },
    }
}
