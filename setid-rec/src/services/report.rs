//! Human-readable results
//!
//! The results file is rewritten after each pass so partial results survive
//! an interrupted run. The console table shows only the filtered tracks.

use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use setid_common::human_time::format_timestamp_ms;

use crate::db::CacheStats;
use crate::models::{IdentifiedTrack, TrackMatch};

const RULE_WIDTH: usize = 80;

/// Run phase written into the report header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Pass1Complete,
    Complete,
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass1Complete => "Pass 1 complete",
            Self::Complete => "Complete",
        })
    }
}

/// `{data_dir}/shazam_results_{path_hash}.txt`
pub fn results_file_path(data_dir: &Path, audio_path: &Path) -> PathBuf {
    data_dir.join(format!(
        "shazam_results_{}.txt",
        setid_common::config::path_hash(audio_path)
    ))
}

/// Render the results file body (all detected tracks, unfiltered)
pub fn render_report(
    audio_path: &Path,
    matches: &HashMap<String, TrackMatch>,
    stats: &CacheStats,
    status: ReportStatus,
    updated_at: DateTime<Local>,
) -> String {
    let heavy = "=".repeat(RULE_WIDTH);
    let light = "-".repeat(RULE_WIDTH);

    let mut sorted: Vec<&TrackMatch> = matches.values().collect();
    sorted.sort_by(|a, b| {
        a.first_seen_ms
            .cmp(&b.first_seen_ms)
            .then_with(|| a.shazam_id.cmp(&b.shazam_id))
    });

    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(out, "{}", heavy);
    let _ = writeln!(out, "SHAZAM TRACK IDENTIFICATION RESULTS");
    let _ = writeln!(out, "{}\n", heavy);

    let _ = writeln!(out, "Audio file: {}", audio_path.display());
    let _ = writeln!(out, "Last updated: {}", updated_at.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "Status: {}\n", status);

    let _ = writeln!(out, "Progress: {} segments processed", stats.total_segments);
    let _ = writeln!(out, "Segments with matches: {}", stats.segments_with_match);
    let _ = writeln!(out, "Unique tracks found: {}\n", stats.unique_tracks);

    let _ = writeln!(out, "{}", light);
    let _ = writeln!(out, "IDENTIFIED TRACKS (sorted by timestamp)");
    let _ = writeln!(out, "{}\n", light);

    for m in &sorted {
        let _ = writeln!(
            out,
            "  {}  [{}x] {} - {}",
            format_timestamp_ms(m.first_seen_ms),
            m.match_count(),
            m.artist,
            m.title
        );
        let _ = writeln!(
            out,
            "             Confidence: {:.2}, Shazam ID: {}\n",
            m.confidence(),
            m.shazam_id
        );
    }

    let _ = writeln!(out, "{}", light);
    let _ = writeln!(out, "Total: {} unique tracks", sorted.len());
    let _ = writeln!(out, "{}", heavy);
    out
}

/// Rewrite the results file, replacing it atomically
pub async fn write_results_file(
    output_path: &Path,
    audio_path: &Path,
    matches: &HashMap<String, TrackMatch>,
    stats: &CacheStats,
    status: ReportStatus,
) -> std::io::Result<()> {
    let body = render_report(audio_path, matches, stats, status, Local::now());

    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = output_path.with_extension("txt.tmp");
    tokio::fs::write(&tmp_path, body).await?;
    tokio::fs::rename(&tmp_path, output_path).await?;

    info!("Results written to: {} ({})", output_path.display(), status);
    Ok(())
}

/// Console table of the filtered tracks
pub fn format_console_table(tracks: &[IdentifiedTrack], detected: usize, show_ids: bool) -> String {
    let heavy = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out, "{}", heavy);
    let _ = writeln!(out, "IDENTIFIED TRACKS");
    let _ = writeln!(out, "{}", heavy);

    for track in tracks {
        let _ = write!(
            out,
            "{:3}x  {}  {:30} - {:40}",
            track.match_count,
            format_timestamp_ms(track.first_seen_ms),
            track.artist,
            track.title
        );
        if show_ids {
            let _ = write!(out, "  [{}]", track.external_track_id);
        }
        out.push('\n');
    }

    let _ = writeln!(out, "{}", heavy);
    let _ = writeln!(
        out,
        "Total: {} tracks (filtered from {} detected)",
        tracks.len(),
        detected
    );
    out
}
