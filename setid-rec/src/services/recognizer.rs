//! Cache-first segment recognition
//!
//! Every definitive answer (match or no-match) is written to the segment cache
//! as soon as it arrives. Transient failures produce an empty result that is
//! not cached, so the segment is retried on the next run. Nothing here fails a
//! batch: a segment that cannot be recognized only reduces coverage.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::recognition_client::RecognitionService;
use super::ProgressCallback;
use crate::config::RecognitionConfig;
use crate::db::SegmentCache;
use crate::models::{ExtractedSegment, SegmentCacheKey, SegmentResult};

/// Recognizes extracted segments through an injected [`RecognitionService`]
#[derive(Clone)]
pub struct Recognizer {
    service: Arc<dyn RecognitionService>,
    cache: SegmentCache,
    /// In-flight service calls
    slots: Arc<Semaphore>,
    /// Segments a stream consumer holds at once; equals the slot count
    max_in_flight: usize,
    /// Service calls completed so far (drives the periodic pause)
    calls: Arc<AtomicUsize>,
    pause: Option<(usize, Duration)>,
    cleanup: bool,
}

impl Recognizer {
    pub fn new(
        service: Arc<dyn RecognitionService>,
        cache: SegmentCache,
        config: &RecognitionConfig,
    ) -> Self {
        let max_in_flight = config.max_concurrent.max(1);
        Self {
            service,
            cache,
            slots: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
            calls: Arc::new(AtomicUsize::new(0)),
            pause: config.pause(),
            cleanup: config.cleanup_segments,
        }
    }

    pub fn cache(&self) -> &SegmentCache {
        &self.cache
    }

    /// Recognize one segment, consulting the cache first.
    ///
    /// A failed cache read counts as a miss. Service errors and cache writes
    /// are logged and absorbed.
    pub async fn recognize_segment(
        &self,
        segment_path: &Path,
        start_ms: i64,
        audio_hash: &str,
        duration_ms: i64,
    ) -> SegmentResult {
        let key = SegmentCacheKey::new(audio_hash, start_ms, duration_ms);

        match self.cache.get(&key).await {
            Ok(Some(cached)) => {
                debug!(start_ms, "Segment cache hit");
                return cached;
            }
            Ok(None) => {}
            Err(e) => warn!(start_ms, "Cache lookup failed, calling service: {}", e),
        }

        let outcome = {
            // Closed only if the recognizer is torn down mid-run
            let Ok(_slot) = self.slots.acquire().await else {
                warn!(start_ms, "Recognition slots closed, skipping segment");
                return SegmentResult::empty(start_ms);
            };

            let outcome = self.service.recognize(segment_path).await;
            self.pause_if_due().await;
            outcome
        };

        let result = match outcome {
            Ok(outcome) => SegmentResult::from_outcome(start_ms, outcome),
            Err(e) => {
                warn!(start_ms, "Recognition failed, segment left uncached: {}", e);
                return SegmentResult::empty(start_ms);
            }
        };

        if let Some(track_id) = &result.track_id {
            info!(
                start_ms,
                track_id = %track_id,
                "Matched: {} - {}",
                result.artist.as_deref().unwrap_or(""),
                result.title.as_deref().unwrap_or("")
            );
        } else {
            debug!(start_ms, "No match");
        }

        if let Err(e) = self.cache.set(&key, &result).await {
            error!(start_ms, "Failed to cache segment result: {}", e);
        }
        result
    }

    /// Recognize segments as they arrive on `rx` until the channel closes.
    ///
    /// At most one segment per recognition slot is taken off the channel at a
    /// time, so a full channel holds the extractor back. Results come back in
    /// completion order. `total` is only used for progress reporting.
    pub async fn recognize_stream(
        &self,
        mut rx: mpsc::Receiver<ExtractedSegment>,
        audio_hash: &str,
        duration_ms: i64,
        total: usize,
        progress: Option<ProgressCallback>,
    ) -> Vec<SegmentResult> {
        let mut tasks: JoinSet<SegmentResult> = JoinSet::new();
        let mut results = Vec::with_capacity(total);
        let mut receiving = true;

        loop {
            let has_room = tasks.len() < self.max_in_flight;
            tokio::select! {
                received = rx.recv(), if receiving && has_room => match received {
                    Some(segment) => {
                        let this = self.clone();
                        let audio_hash = audio_hash.to_string();
                        tasks.spawn(async move {
                            this.process_extracted(segment, &audio_hash, duration_ms).await
                        });
                    }
                    None => receiving = false,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    match joined {
                        Ok(result) => results.push(result),
                        Err(e) => error!("Recognition task panicked or was cancelled: {}", e),
                    }
                    if let Some(cb) = &progress {
                        cb(results.len(), total.max(results.len()));
                    }
                }
                else => break,
            }
        }

        let matched = results.iter().filter(|r| r.has_match()).count();
        info!("Recognized {} segments ({} matched)", results.len(), matched);
        results
    }

    /// Recognize an already extracted batch, in completion order
    pub async fn recognize_batch(
        &self,
        segments: Vec<ExtractedSegment>,
        audio_hash: &str,
        duration_ms: i64,
        progress: Option<ProgressCallback>,
    ) -> Vec<SegmentResult> {
        let total = segments.len();
        let (tx, rx) = mpsc::channel(total.max(1));
        for segment in segments {
            // Capacity equals the batch size, so this never waits
            if tx.send(segment).await.is_err() {
                break;
            }
        }
        drop(tx);

        self.recognize_stream(rx, audio_hash, duration_ms, total, progress)
            .await
    }

    /// Recognize an already extracted batch, results in input order
    pub async fn recognize_batch_ordered(
        &self,
        segments: Vec<ExtractedSegment>,
        audio_hash: &str,
        duration_ms: i64,
    ) -> Vec<SegmentResult> {
        futures::future::join_all(
            segments
                .into_iter()
                .map(|segment| self.process_extracted(segment, audio_hash, duration_ms)),
        )
        .await
    }

    async fn process_extracted(
        &self,
        segment: ExtractedSegment,
        audio_hash: &str,
        duration_ms: i64,
    ) -> SegmentResult {
        let result = self
            .recognize_segment(&segment.path, segment.start_ms, audio_hash, duration_ms)
            .await;

        if self.cleanup {
            remove_segment_file(&segment.path).await;
        }
        result
    }

    /// Sleep after every N-th service call; called while holding a slot
    async fn pause_if_due(&self) {
        let Some((every, pause)) = self.pause else {
            return;
        };
        let completed = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if completed % every == 0 {
            debug!(completed, pause_ms = pause.as_millis() as u64, "Pausing recognition");
            tokio::time::sleep(pause).await;
        }
    }
}

async fn remove_segment_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove segment file {}: {}", path.display(), e),
    }
}
