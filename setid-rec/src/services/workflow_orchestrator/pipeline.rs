//! Extraction → recognition pipeline for one pass
//!
//! The extractor streams finished segments into a bounded channel while the
//! recognizer consumes them, one per recognition slot. Recognition starts as
//! soon as the first segment is cut, and a slow recognizer backs the channel
//! up until extraction waits. Segment files on disk stay within the channel
//! capacity plus extraction workers plus recognition slots.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::info;

use setid_common::human_time::format_duration_ms;

use super::{Pass, PipelineState, RunContext, StateTracker, WorkflowOrchestrator};
use crate::error::PipelineError;
use crate::models::SegmentSpec;
use crate::services::ProgressCallback;

/// Log a progress line every this many recognized segments
const PROGRESS_LOG_INTERVAL: usize = 10;

/// Segment counts for one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Starts produced by the planner
    pub planned: usize,
    /// Planned starts already in the cache (skipped)
    pub cached: usize,
    /// Segments cut successfully this run
    pub extracted: usize,
    /// Segments that went through recognition this run
    pub recognized: usize,
    /// Of those, segments that identified a track
    pub matched: usize,
}

impl WorkflowOrchestrator {
    /// Extract and recognize the planned starts that are not cached yet
    pub(super) async fn run_pass(
        &self,
        pass: Pass,
        ctx: &RunContext<'_>,
        starts: &[i64],
        tracker: &mut StateTracker,
    ) -> Result<PassSummary, PipelineError> {
        let recognize_state = match pass {
            Pass::Discovery => PipelineState::Pass1Recognize,
            Pass::GapFill => PipelineState::Pass2Recognize,
        };

        let cached = ctx.recognizer.cache().get_cached_segments(ctx.audio_hash).await?;
        let segment_ms = self.planner.config().segment_length_ms;
        let pending: Vec<SegmentSpec> = starts
            .iter()
            .copied()
            .collect::<BTreeSet<i64>>()
            .into_iter()
            .filter(|start| !cached.contains(start))
            .map(|start| SegmentSpec::new(start, segment_ms))
            .collect();

        let mut summary = PassSummary {
            planned: starts.len(),
            cached: starts.len() - pending.len(),
            ..PassSummary::default()
        };
        info!(
            "{}: {} planned, {} cached, {} to process",
            pass,
            summary.planned,
            summary.cached,
            pending.len()
        );

        if pending.is_empty() {
            tracker.advance(recognize_state);
            return Ok(summary);
        }

        let total = pending.len();
        if let Some(sink) = &self.progress {
            sink.pass_started(pass, total);
        }

        let (tx, rx) = mpsc::channel(self.extractor.workers() * 2);
        let progress = self.progress_callback(pass);

        let extraction = async {
            let sent = self
                .extractor
                .extract_to_channel(ctx.audio_path, ctx.temp_dir, &pending, tx, None)
                .await;
            // Remaining work is recognition of what is already queued
            tracker.advance(recognize_state);
            sent
        };
        let recognition = ctx.recognizer.recognize_stream(
            rx,
            ctx.audio_hash,
            segment_ms,
            total,
            Some(progress),
        );

        let (extracted, results) = tokio::join!(extraction, recognition);

        if let Some(sink) = &self.progress {
            sink.pass_finished(pass);
        }

        summary.extracted = extracted;
        summary.recognized = results.len();
        summary.matched = results.iter().filter(|r| r.has_match()).count();
        info!(
            "{} done: {} extracted, {} recognized, {} matched",
            pass, summary.extracted, summary.recognized, summary.matched
        );
        Ok(summary)
    }

    /// Forward to the progress sink and log rate/ETA periodically
    fn progress_callback(&self, pass: Pass) -> ProgressCallback {
        let sink = self.progress.clone();
        let started = Instant::now();

        Arc::new(move |done, total| {
            if let Some(sink) = &sink {
                sink.segment_done(pass, done, total);
            }
            if done % PROGRESS_LOG_INTERVAL == 0 || done == total {
                let elapsed = started.elapsed().as_secs_f64();
                let rate = if elapsed > 0.0 { done as f64 / elapsed } else { 0.0 };
                let eta_ms = if rate > 0.0 {
                    ((total - done.min(total)) as f64 / rate * 1000.0) as i64
                } else {
                    0
                };
                info!(
                    "{}: {}/{} segments ({:.2}/s, ETA {})",
                    pass,
                    done,
                    total,
                    rate,
                    format_duration_ms(eta_ms)
                );
            }
        })
    }
}
