mod cli;

use camsync::common::paths::{has_extension, sidecar_index_path, INDEX_EXTENSION};
use camsync::common::time::{micros_to_secs, secs_to_micros};
use camsync::config;
use camsync::index::{DiskIndexCache, FrameIndex};
use camsync::media::read_recording_xml;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat};
use clap::Parser;
use cli::{Cli, Commands};
use serde::Serialize;
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "camsync=trace,camsync_media=trace,camsync_index=debug,camsync_common=debug"
                .to_string()
        } else {
            "camsync=info,camsync_media=info,camsync_index=info".to_string()
        }
    });

    // Logs go to stderr so --json output stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Recording { path, json } => show_recording(&path, json),
        Commands::Index { video, json } => show_index(&video, json),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("camsync {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn format_epoch(secs: f64) -> String {
    DateTime::from_timestamp_micros(secs_to_micros(secs))
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Micros, true))
        .unwrap_or_else(|| format!("{secs:.6}"))
}

fn show_recording(path: &Path, json: bool) -> Result<()> {
    let metadata = read_recording_xml(path)
        .with_context(|| format!("Failed to read recording: {:?}", path))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        return Ok(());
    }

    println!("Recording: {}", metadata.recording_id);
    println!("Channel: {}", metadata.channel);
    println!(
        "Video: {}x{} @ {:.3} fps",
        metadata.width, metadata.height, metadata.framerate
    );
    println!("Start: {}", format_epoch(metadata.start));
    println!("Stop: {}", format_epoch(metadata.stop));

    println!("\nBlocks: {}", metadata.blocks.len());
    let mut timestamp = 0.0;
    for (i, block) in metadata.blocks.iter().enumerate() {
        println!(
            "  [{}] {} +{:.3}s (at {:.3}s) {}",
            i,
            format_epoch(block.start),
            block.duration(),
            timestamp,
            block.path.display()
        );
        timestamp += block.duration();
    }

    Ok(())
}

/// Summary of a stored frame index.
#[derive(Debug, Serialize)]
struct IndexSummary {
    path: PathBuf,
    fingerprint: String,
    codec: String,
    frames: usize,
    keyframes: usize,
    clock_offset_us: i64,
    duration_secs: f64,
    first_systime: Option<f64>,
    last_systime: Option<f64>,
}

fn index_file(video: &Path) -> PathBuf {
    if has_extension(video, INDEX_EXTENSION) {
        video.to_path_buf()
    } else {
        sidecar_index_path(video)
    }
}

fn show_index(video: &Path, json: bool) -> Result<()> {
    let path = index_file(video);
    let stored = DiskIndexCache::inspect(&path)
        .with_context(|| format!("Failed to read index file: {:?}", path))?;
    let index = FrameIndex::from_record(stored.record);
    let systimes = index.systimes().ok();

    let summary = IndexSummary {
        fingerprint: stored.fingerprint.to_string(),
        codec: index.codec().to_string(),
        frames: index.len(),
        keyframes: index.keyframes().len(),
        clock_offset_us: index.clock_offset(),
        duration_secs: index.span_secs(),
        first_systime: systimes.as_ref().and_then(|t| t.first().copied()),
        last_systime: systimes.as_ref().and_then(|t| t.last().copied()),
        path,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Index: {}", summary.path.display());
    println!("Fingerprint: {}", summary.fingerprint);
    println!("Codec: {}", summary.codec);
    println!("Frames: {}", summary.frames);
    println!("Keyframes: {}", summary.keyframes);
    println!(
        "Clock offset: {} us ({:.6}s)",
        summary.clock_offset_us,
        micros_to_secs(summary.clock_offset_us)
    );
    println!("Duration: {:.3}s", summary.duration_secs);
    match (summary.first_systime, summary.last_systime) {
        (Some(first), Some(last)) => {
            println!("Wall clock: {} .. {}", format_epoch(first), format_epoch(last))
        }
        _ => println!("Wall clock: not available for {}", summary.codec),
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p)?
        }
        None => {
            println!("No config file specified, using defaults");
            config::load_config_or_default(None)?
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        for warning in &warnings {
            println!("! {}", warning);
        }
    }
    println!("  Cache mode: {:?}", config.cache.mode);
    if let Some(dir) = config.cache.expanded_dir() {
        println!("  Cache dir: {}", dir.display());
    }
    println!("  Grey: {}", config.decode.grey);
    println!("  Reindex: {}", config.decode.reindex);

    Ok(())
}
