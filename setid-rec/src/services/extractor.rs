//! Segment extraction via ffmpeg
//!
//! Each segment is one ffmpeg child process writing
//! `{temp_dir}/segment_{start_ms}.{ext}`. Concurrency is bounded by a
//! semaphore sized to the worker count. A failed segment is logged and
//! dropped; extraction failures never abort a run.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::ProgressCallback;
use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::models::{ExtractedSegment, SegmentSpec};

/// Bounded pool of ffmpeg extractions
#[derive(Clone)]
pub struct SegmentExtractor {
    config: Arc<ExtractionConfig>,
    permits: Arc<Semaphore>,
    workers: usize,
}

impl SegmentExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        let workers = config.workers.max(1);
        Self {
            config: Arc::new(config),
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Output path for a segment starting at `start_ms`
    pub fn segment_path(&self, temp_dir: &Path, start_ms: i64) -> PathBuf {
        temp_dir.join(format!("segment_{}.{}", start_ms, self.config.extension))
    }

    /// Cut one segment; waits for a free worker slot first
    pub async fn extract_segment(
        &self,
        audio_path: &Path,
        temp_dir: &Path,
        spec: SegmentSpec,
    ) -> Result<ExtractedSegment, ExtractionError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ExtractionError::ShutDown {
                start_ms: spec.start_ms,
            })?;

        let output_path = self.segment_path(temp_dir, spec.start_ms);
        let program = self.config.ffmpeg_path.as_str();

        let output = Command::new(program)
            .arg("-y")
            .arg("-ss")
            .arg(ms_to_seconds_arg(spec.start_ms))
            .arg("-t")
            .arg(ms_to_seconds_arg(spec.duration_ms))
            .arg("-i")
            .arg(audio_path)
            .arg("-acodec")
            .arg(&self.config.codec)
            .arg("-ab")
            .arg(&self.config.bitrate)
            .arg("-loglevel")
            .arg("error")
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ExtractionError::Spawn {
                program: program.to_string(),
                start_ms: spec.start_ms,
                source,
            })?;

        if !output.status.success() {
            return Err(ExtractionError::ToolFailed {
                program: program.to_string(),
                start_ms: spec.start_ms,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!(start_ms = spec.start_ms, path = %output_path.display(), "Extracted segment");
        Ok(ExtractedSegment {
            path: output_path,
            start_ms: spec.start_ms,
        })
    }

    /// Extract all `specs`, returning segments in completion order
    pub async fn extract_batch(
        &self,
        audio_path: &Path,
        temp_dir: &Path,
        specs: &[SegmentSpec],
        progress: Option<ProgressCallback>,
    ) -> Vec<ExtractedSegment> {
        let total = specs.len();
        let mut tasks = self.spawn_all(audio_path, temp_dir, specs);
        let mut extracted = Vec::with_capacity(total);
        let mut completed = 0;

        while let Some(joined) = tasks.join_next().await {
            completed += 1;
            if let Some(segment) = log_outcome(joined) {
                extracted.push(segment);
            }
            if let Some(cb) = &progress {
                cb(completed, total);
            }
        }

        info!("Extracted {}/{} segments", extracted.len(), total);
        extracted
    }

    /// Extract all `specs`, returning segments in input order
    pub async fn extract_batch_ordered(
        &self,
        audio_path: &Path,
        temp_dir: &Path,
        specs: &[SegmentSpec],
    ) -> Vec<ExtractedSegment> {
        let results = futures::future::join_all(
            specs
                .iter()
                .map(|spec| self.extract_segment(audio_path, temp_dir, *spec)),
        )
        .await;

        let extracted: Vec<ExtractedSegment> = results
            .into_iter()
            .filter_map(|result| match result {
                Ok(segment) => Some(segment),
                Err(e) => {
                    log_failure(&e);
                    None
                }
            })
            .collect();

        info!("Extracted {}/{} segments", extracted.len(), specs.len());
        extracted
    }

    /// Stream each completed segment into `tx`; returns how many were sent.
    ///
    /// At most `workers` extractions are outstanding, and a new one starts only
    /// after a finished segment has been handed to the channel, so a full
    /// channel stalls extraction. Stops early (aborting outstanding
    /// extractions) when the receiver is dropped. `tx` is dropped on return,
    /// closing the channel.
    pub async fn extract_to_channel(
        &self,
        audio_path: &Path,
        temp_dir: &Path,
        specs: &[SegmentSpec],
        tx: mpsc::Sender<ExtractedSegment>,
        progress: Option<ProgressCallback>,
    ) -> usize {
        let total = specs.len();
        let mut queue = specs.iter().copied();
        let mut tasks = JoinSet::new();
        for spec in queue.by_ref().take(self.workers) {
            self.spawn_one(&mut tasks, audio_path, temp_dir, spec);
        }
        let mut completed = 0;
        let mut sent = 0;

        while let Some(joined) = tasks.join_next().await {
            completed += 1;
            if let Some(cb) = &progress {
                cb(completed, total);
            }
            if let Some(segment) = log_outcome(joined) {
                if tx.send(segment).await.is_err() {
                    warn!("Segment consumer went away, aborting remaining extractions");
                    tasks.abort_all();
                    break;
                }
                sent += 1;
            }
            if let Some(spec) = queue.next() {
                self.spawn_one(&mut tasks, audio_path, temp_dir, spec);
            }
        }

        debug!(sent, total, "Extraction stream finished");
        sent
    }

    /// Wait for in-flight extractions, then refuse new ones
    pub async fn shutdown(&self) {
        match self.permits.acquire_many(self.workers as u32).await {
            Ok(_all) => self.permits.close(),
            Err(_) => debug!("Extractor already shut down"),
        }
        info!("Segment extractor shut down");
    }

    fn spawn_all(
        &self,
        audio_path: &Path,
        temp_dir: &Path,
        specs: &[SegmentSpec],
    ) -> JoinSet<Result<ExtractedSegment, ExtractionError>> {
        let mut tasks = JoinSet::new();
        for spec in specs.iter().copied() {
            self.spawn_one(&mut tasks, audio_path, temp_dir, spec);
        }
        tasks
    }

    fn spawn_one(
        &self,
        tasks: &mut JoinSet<Result<ExtractedSegment, ExtractionError>>,
        audio_path: &Path,
        temp_dir: &Path,
        spec: SegmentSpec,
    ) {
        let this = self.clone();
        let audio_path = audio_path.to_path_buf();
        let temp_dir = temp_dir.to_path_buf();
        tasks.spawn(async move { this.extract_segment(&audio_path, &temp_dir, spec).await });
    }
}

/// `12345` ms -> `"12.345"`
fn ms_to_seconds_arg(ms: i64) -> String {
    format!("{}.{:03}", ms / 1000, (ms % 1000).abs())
}

fn log_outcome(
    joined: Result<Result<ExtractedSegment, ExtractionError>, tokio::task::JoinError>,
) -> Option<ExtractedSegment> {
    match joined {
        Ok(Ok(segment)) => Some(segment),
        Ok(Err(e)) => {
            log_failure(&e);
            None
        }
        Err(e) => {
            error!("Extraction task panicked or was cancelled: {}", e);
            None
        }
    }
}

fn log_failure(e: &ExtractionError) {
    match e {
        ExtractionError::ShutDown { .. } => error!("{}", e),
        _ => warn!("Segment extraction failed: {}", e),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn extractor(program: &str, workers: usize) -> SegmentExtractor {
        SegmentExtractor::new(ExtractionConfig {
            ffmpeg_path: program.to_string(),
            workers,
            ..ExtractionConfig::default()
        })
    }

    fn specs(starts: &[i64]) -> Vec<SegmentSpec> {
        starts.iter().map(|&s| SegmentSpec::new(s, 15_000)).collect()
    }

    #[test]
    fn test_seconds_argument() {
        assert_eq!(ms_to_seconds_arg(0), "0.000");
        assert_eq!(ms_to_seconds_arg(30_000), "30.000");
        assert_eq!(ms_to_seconds_arg(7_500), "7.500");
    }

    #[test]
    fn test_segment_path_naming() {
        let ex = extractor("true", 1);
        let path = ex.segment_path(Path::new("/tmp/x"), 45_000);
        assert_eq!(path, PathBuf::from("/tmp/x/segment_45000.mp3"));
    }

    #[tokio::test]
    async fn test_batch_success_reports_progress() {
        let temp = TempDir::new().unwrap();
        let ex = extractor("true", 2);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        let progress: ProgressCallback = Arc::new(move |done, total| {
            seen_cb.lock().unwrap().push((done, total));
        });

        let out = ex
            .extract_batch(Path::new("in.mp3"), temp.path(), &specs(&[0, 30_000, 60_000]), Some(progress))
            .await;

        let mut starts: Vec<i64> = out.iter().map(|s| s.start_ms).collect();
        starts.sort_unstable();
        assert_eq!(starts, vec![0, 30_000, 60_000]);
        assert_eq!(seen.lock().unwrap().last(), Some(&(3, 3)));
    }

    #[tokio::test]
    async fn test_failed_tool_drops_segments() {
        let temp = TempDir::new().unwrap();
        let ex = extractor("false", 2);
        let out = ex
            .extract_batch(Path::new("in.mp3"), temp.path(), &specs(&[0, 30_000]), None)
            .await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_missing_tool_is_spawn_error() {
        let temp = TempDir::new().unwrap();
        let ex = extractor("/nonexistent/ffmpeg", 1);
        let err = ex
            .extract_segment(Path::new("in.mp3"), temp.path(), SegmentSpec::new(0, 15_000))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Spawn { start_ms: 0, .. }));
    }

    #[tokio::test]
    async fn test_ordered_keeps_input_order() {
        let temp = TempDir::new().unwrap();
        let ex = extractor("true", 3);
        let out = ex
            .extract_batch_ordered(Path::new("in.mp3"), temp.path(), &specs(&[60_000, 0, 30_000]))
            .await;
        let starts: Vec<i64> = out.iter().map(|s| s.start_ms).collect();
        assert_eq!(starts, vec![60_000, 0, 30_000]);
    }

    #[tokio::test]
    async fn test_channel_streaming() {
        let temp = TempDir::new().unwrap();
        let ex = extractor("true", 2);
        let (tx, mut rx) = mpsc::channel(1);

        let audio = PathBuf::from("in.mp3");
        let dir = temp.path().to_path_buf();
        let producer = {
            let ex = ex.clone();
            tokio::spawn(async move {
                ex.extract_to_channel(&audio, &dir, &specs(&[0, 7_500, 15_000]), tx, None)
                    .await
            })
        };

        let mut received = Vec::new();
        while let Some(segment) = rx.recv().await {
            received.push(segment.start_ms);
        }
        assert_eq!(producer.await.unwrap(), 3);
        received.sort_unstable();
        assert_eq!(received, vec![0, 7_500, 15_000]);
    }

    #[tokio::test]
    async fn test_full_channel_stalls_extraction() {
        let temp = TempDir::new().unwrap();
        let ex = extractor("true", 2);
        let (tx, rx) = mpsc::channel(1);
        let completed = Arc::new(Mutex::new(0));
        let completed_cb = completed.clone();
        let progress: ProgressCallback = Arc::new(move |done, _| {
            *completed_cb.lock().unwrap() = done;
        });

        let audio = PathBuf::from("in.mp3");
        let dir = temp.path().to_path_buf();
        let starts: Vec<i64> = (0..10).map(|i| i * 7_500).collect();
        let producer = tokio::spawn(async move {
            ex.extract_to_channel(&audio, &dir, &specs(&starts), tx, Some(progress))
                .await
        });

        // Nobody reads: one segment buffered, one blocked in send
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        assert!(*completed.lock().unwrap() <= 3);

        drop(rx);
        assert_eq!(producer.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_submissions_after_shutdown_are_dropped() {
        let temp = TempDir::new().unwrap();
        let ex = extractor("true", 2);
        ex.shutdown().await;

        let err = ex
            .extract_segment(Path::new("in.mp3"), temp.path(), SegmentSpec::new(0, 15_000))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::ShutDown { .. }));
        assert!(ex
            .extract_batch(Path::new("in.mp3"), temp.path(), &specs(&[0]), None)
            .await
            .is_empty());
    }
}
