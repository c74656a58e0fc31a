//! setid-rec - identify the tracks played in a long recording
//!
//! ```text
//! setid-rec /sets/friday.mp3
//! setid-rec https://youtu.be/<id> --force-redo --show-ids
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use setid_common::config::{default_config_path, resolve_data_dir, DATA_DIR_ENV};
use setid_rec::services::report::format_console_table;
use setid_rec::services::youtube::{download_audio, youtube_video_id};
use setid_rec::services::{FfprobeDurationProbe, HttpRecognitionClient, WorkflowOrchestrator};
use setid_rec::SetidConfig;

mod cli_progress;

#[derive(Debug, Parser)]
#[command(name = "setid-rec", version, about = "Identify tracks in a long audio recording")]
struct Args {
    /// Audio file path or YouTube URL
    input: String,

    /// Discard cached results for this recording before running
    #[arg(long, env = "SETID_FORCE_REDO")]
    force_redo: bool,

    /// Configuration file (default: ~/.config/setid/setid.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Data directory for caches and reports
    #[arg(long, value_name = "PATH")]
    data_dir: Option<PathBuf>,

    /// Concurrent recognition calls
    #[arg(long, value_name = "N")]
    max_concurrent: Option<usize>,

    /// Concurrent extraction processes
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Append the external track id to each result row
    #[arg(long)]
    show_ids: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = match &config_path {
        Some(path) => SetidConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => {
            let mut config = SetidConfig::default();
            config.apply_env_overrides();
            config
        }
    };
    apply_cli_overrides(&mut config, &args);

    setid_common::logging::init_tracing(&config.logging.level)?;
    info!("setid-rec {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Config: {}", path.display());
    }

    let data_dir = resolve_data_dir(
        args.data_dir.as_deref(),
        DATA_DIR_ENV,
        config.data_dir.as_deref(),
    );
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
    info!("Data directory: {}", data_dir.display());

    let audio_path = if youtube_video_id(&args.input).is_some() {
        download_audio(&args.input, &data_dir).await?
    } else {
        PathBuf::from(&args.input)
    };

    let service = HttpRecognitionClient::new(&config.recognition)
        .context("Failed to initialize recognition client")?;
    let probe = FfprobeDurationProbe::new(&config.probe);
    let orchestrator =
        WorkflowOrchestrator::new(&config, data_dir, Arc::new(service), Arc::new(probe))
            .with_progress(Arc::new(cli_progress::BarProgress::default()));

    let summary = orchestrator
        .run(&audio_path, args.force_redo)
        .await
        .with_context(|| format!("Track identification failed for {}", audio_path.display()))?;
    orchestrator.shutdown().await;

    println!();
    print!(
        "{}",
        format_console_table(
            &summary.tracks,
            summary.matches.len(),
            config.filter.show_track_ids
        )
    );
    println!();
    info!(
        processed = summary.processed_segments(),
        "Results file: {}",
        summary.report_path.display()
    );

    Ok(())
}

fn apply_cli_overrides(config: &mut SetidConfig, args: &Args) {
    if let Some(n) = args.max_concurrent {
        config.recognition.max_concurrent = n;
    }
    if let Some(n) = args.workers {
        config.extraction.workers = n;
    }
    if args.show_ids {
        config.filter.show_track_ids = true;
    }
}
