//! Two-pass recognition workflow
//!
//! # State Progression
//! INIT → PROBE_DURATION → PASS1_PLAN → PASS1_EXTRACT → PASS1_RECOGNIZE →
//! PASS1_AGGREGATE → PASS2_PLAN → PASS2_EXTRACT → PASS2_RECOGNIZE →
//! FINAL_AGGREGATE → REPORT → DONE
//!
//! Pass 1 samples the recording sparsely; pass 2 fills the gaps pass 1 left
//! unexplained. Each pass runs extraction and recognition as two bounded
//! stages joined by a channel (see `pipeline`). Every recognized segment is
//! cached immediately, so a rerun only processes what is missing.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use setid_common::human_time::format_duration_ms;

use crate::config::{FilterConfig, RecognitionConfig, SetidConfig};
use crate::db::{cache_db_path, CacheStats, SegmentCache};
use crate::error::PipelineError;
use crate::models::{IdentifiedTrack, SegmentCacheKey, TrackMatch};
use crate::services::aggregator::{aggregate_matches, filter_identified};
use crate::services::duration_probe::DurationProbe;
use crate::services::extractor::SegmentExtractor;
use crate::services::planner::SegmentPlanner;
use crate::services::recognition_client::RecognitionService;
use crate::services::recognizer::Recognizer;
use crate::services::report::{results_file_path, write_results_file, ReportStatus};

mod pipeline;

pub use pipeline::PassSummary;

/// Workflow state; transitions are strictly sequential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    ProbeDuration,
    Pass1Plan,
    Pass1Extract,
    Pass1Recognize,
    Pass1Aggregate,
    Pass2Plan,
    Pass2Extract,
    Pass2Recognize,
    FinalAggregate,
    Report,
    Done,
}

impl PipelineState {
    /// Successor state (`Done` is terminal)
    pub fn next(self) -> Self {
        use PipelineState::*;
        match self {
            Init => ProbeDuration,
            ProbeDuration => Pass1Plan,
            Pass1Plan => Pass1Extract,
            Pass1Extract => Pass1Recognize,
            Pass1Recognize => Pass1Aggregate,
            Pass1Aggregate => Pass2Plan,
            Pass2Plan => Pass2Extract,
            Pass2Extract => Pass2Recognize,
            Pass2Recognize => FinalAggregate,
            FinalAggregate => Report,
            Report => Done,
            Done => Done,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::ProbeDuration => "PROBE_DURATION",
            Self::Pass1Plan => "PASS1_PLAN",
            Self::Pass1Extract => "PASS1_EXTRACT",
            Self::Pass1Recognize => "PASS1_RECOGNIZE",
            Self::Pass1Aggregate => "PASS1_AGGREGATE",
            Self::Pass2Plan => "PASS2_PLAN",
            Self::Pass2Extract => "PASS2_EXTRACT",
            Self::Pass2Recognize => "PASS2_RECOGNIZE",
            Self::FinalAggregate => "FINAL_AGGREGATE",
            Self::Report => "REPORT",
            Self::Done => "DONE",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which sampling pass is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Discovery,
    GapFill,
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Discovery => "Pass 1",
            Self::GapFill => "Pass 2",
        })
    }
}

/// Receives per-pass progress (e.g. a terminal progress bar)
pub trait ProgressSink: Send + Sync {
    fn pass_started(&self, pass: Pass, total: usize);
    fn segment_done(&self, pass: Pass, done: usize, total: usize);
    fn pass_finished(&self, pass: Pass);
}

/// Outcome of one run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub audio_path: PathBuf,
    pub audio_hash: String,
    pub total_duration_ms: i64,
    pub pass1: PassSummary,
    pub pass2: PassSummary,
    /// Regions revisited by pass 2
    pub gaps: Vec<(i64, i64)>,
    /// Every detected track, before filtering
    pub matches: HashMap<String, TrackMatch>,
    /// Filtered tracks, by first detection
    pub tracks: Vec<IdentifiedTrack>,
    pub report_path: PathBuf,
    pub cache_stats: CacheStats,
}

impl RunSummary {
    /// Segments sent to the recognition service during this run
    pub fn processed_segments(&self) -> usize {
        self.pass1.recognized + self.pass2.recognized
    }
}

/// Logs and checks state transitions
struct StateTracker {
    state: PipelineState,
    started: Instant,
}

impl StateTracker {
    fn new() -> Self {
        info!(state = %PipelineState::Init, "Pipeline state");
        Self {
            state: PipelineState::Init,
            started: Instant::now(),
        }
    }

    fn advance(&mut self, to: PipelineState) {
        debug_assert_eq!(self.state.next(), to, "out-of-order transition");
        info!(
            from = %self.state,
            to = %to,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Pipeline state"
        );
        self.state = to;
    }
}

/// Per-run values threaded through both passes
pub(crate) struct RunContext<'a> {
    pub audio_path: &'a Path,
    pub temp_dir: &'a Path,
    pub audio_hash: &'a str,
    pub recognizer: &'a Recognizer,
}

/// Two-pass workflow over one recording at a time
pub struct WorkflowOrchestrator {
    data_dir: PathBuf,
    planner: SegmentPlanner,
    extractor: SegmentExtractor,
    probe: Arc<dyn DurationProbe>,
    service: Arc<dyn RecognitionService>,
    recognition: RecognitionConfig,
    filter: FilterConfig,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl WorkflowOrchestrator {
    /// Build an orchestrator; the service and probe are injected so tests
    /// (and alternative backends) can replace them.
    pub fn new(
        config: &SetidConfig,
        data_dir: PathBuf,
        service: Arc<dyn RecognitionService>,
        probe: Arc<dyn DurationProbe>,
    ) -> Self {
        Self {
            data_dir,
            planner: SegmentPlanner::new(config.planner.clone()),
            extractor: SegmentExtractor::new(config.extraction.clone()),
            probe,
            service,
            recognition: config.recognition.clone(),
            filter: config.filter.clone(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Run both passes over `audio_path`.
    ///
    /// With `force_redo` every cached result for this file is discarded
    /// first. Only duration probe failures (including an unreadable input file)
    /// and cache initialization failures, plus invalid planner parameters and
    /// local I/O errors, abort the run.
    pub async fn run(&self, audio_path: &Path, force_redo: bool) -> Result<RunSummary, PipelineError> {
        let mut tracker = StateTracker::new();

        self.planner.validate().map_err(PipelineError::Config)?;
        info!(audio = %audio_path.display(), "Starting track identification");

        tracker.advance(PipelineState::ProbeDuration);
        let total_ms = self.probe.probe_duration_ms(audio_path).await?;
        info!("Audio duration: {}", format_duration_ms(total_ms));

        let audio_hash = SegmentCacheKey::compute_file_hash(audio_path)
            .await
            .map_err(|e| PipelineError::Probe {
                path: audio_path.to_path_buf(),
                reason: format!("cannot read audio file: {}", e),
            })?;
        let cache = SegmentCache::open(&cache_db_path(&self.data_dir, audio_path)).await?;
        let recognizer = Recognizer::new(self.service.clone(), cache.clone(), &self.recognition);
        let report_path = results_file_path(&self.data_dir, audio_path);
        debug!(audio_hash = %audio_hash, "Audio fingerprint");

        if force_redo {
            let cleared = cache.clear_for_audio(&audio_hash).await?;
            info!("Force redo: discarded {} cached segments", cleared);
        }

        // Removed on drop, so every exit path below cleans up
        let temp_dir = tempfile::Builder::new()
            .prefix("setid_segments_")
            .tempdir()?;
        let ctx = RunContext {
            audio_path,
            temp_dir: temp_dir.path(),
            audio_hash: &audio_hash,
            recognizer: &recognizer,
        };

        // Pass 1: sparse discovery
        tracker.advance(PipelineState::Pass1Plan);
        let pass1_starts = self.planner.generate_pass1_segments(total_ms);
        info!("Pass 1: {} segments planned", pass1_starts.len());

        tracker.advance(PipelineState::Pass1Extract);
        let pass1 = self
            .run_pass(Pass::Discovery, &ctx, &pass1_starts, &mut tracker)
            .await?;

        tracker.advance(PipelineState::Pass1Aggregate);
        let pass1_matches = aggregate_matches(&cache.get_matches_only(&audio_hash).await?);
        info!("Pass 1 complete: {} unique tracks", pass1_matches.len());
        self.write_report(&report_path, audio_path, &cache, &audio_hash, &pass1_matches, ReportStatus::Pass1Complete)
            .await;

        // Pass 2: fill unexplained regions
        tracker.advance(PipelineState::Pass2Plan);
        let gaps = self.planner.find_gaps(
            pass1_matches.values(),
            total_ms,
            self.planner.config().min_gap_ms,
        );
        let pass2_starts = self.planner.generate_pass2_segments(&gaps);
        info!(
            "Pass 2: {} gaps, {} segments planned",
            gaps.len(),
            pass2_starts.len()
        );

        tracker.advance(PipelineState::Pass2Extract);
        let pass2 = self
            .run_pass(Pass::GapFill, &ctx, &pass2_starts, &mut tracker)
            .await?;

        tracker.advance(PipelineState::FinalAggregate);
        let matches = aggregate_matches(&cache.get_matches_only(&audio_hash).await?);
        let tracks = filter_identified(&matches, &self.filter);
        info!(
            "Identified {} tracks ({} detected)",
            tracks.len(),
            matches.len()
        );

        tracker.advance(PipelineState::Report);
        let cache_stats = self
            .write_report(&report_path, audio_path, &cache, &audio_hash, &matches, ReportStatus::Complete)
            .await;

        if let Err(e) = temp_dir.close() {
            warn!("Failed to remove segment directory: {}", e);
        }
        cache.close().await;
        tracker.advance(PipelineState::Done);

        Ok(RunSummary {
            audio_path: audio_path.to_path_buf(),
            audio_hash,
            total_duration_ms: total_ms,
            pass1,
            pass2,
            gaps,
            matches,
            tracks,
            report_path,
            cache_stats,
        })
    }

    /// Drain in-flight extractions and refuse new ones
    pub async fn shutdown(&self) {
        self.extractor.shutdown().await;
    }

    /// Rewrite the results file; failures are logged, never fatal
    async fn write_report(
        &self,
        report_path: &Path,
        audio_path: &Path,
        cache: &SegmentCache,
        audio_hash: &str,
        matches: &HashMap<String, TrackMatch>,
        status: ReportStatus,
    ) -> CacheStats {
        let stats = match cache.get_cache_stats(audio_hash).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Failed to read cache statistics: {}", e);
                CacheStats::default()
            }
        };

        if let Err(e) = write_results_file(report_path, audio_path, matches, &stats, status).await {
            warn!("Failed to write results file {}: {}", report_path.display(), e);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_sequence() {
        let mut state = PipelineState::Init;
        let mut seen = vec![state];
        while state != PipelineState::Done {
            state = state.next();
            seen.push(state);
        }
        assert_eq!(seen.len(), 12);
        assert_eq!(seen[3], PipelineState::Pass1Extract);
        assert_eq!(PipelineState::Done.next(), PipelineState::Done);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(PipelineState::Pass2Recognize.to_string(), "PASS2_RECOGNIZE");
        assert_eq!(Pass::GapFill.to_string(), "Pass 2");
    }
}
