//! In-process stand-ins for the recognition service and duration probe

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use setid_rec::error::{PipelineError, RecognitionError};
use setid_rec::models::{RecognitionOutcome, TrackDescriptor};
use setid_rec::services::{DurationProbe, RecognitionService};

type Answer = Box<dyn Fn(i64) -> Option<&'static str> + Send + Sync>;

/// Recognition service answering from a function of the segment start.
///
/// The start is parsed from the `segment_{start_ms}.{ext}` file name.
pub struct MockRecognitionService {
    answer: Answer,
    /// Starts that fail transiently until [`Self::heal`] is called
    failing: Mutex<HashSet<i64>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<i64>>,
}

impl MockRecognitionService {
    pub fn new(answer: impl Fn(i64) -> Option<&'static str> + Send + Sync + 'static) -> Self {
        Self {
            answer: Box::new(answer),
            failing: Mutex::new(HashSet::new()),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_at(self, starts: &[i64]) -> Self {
        self.failing.lock().unwrap().extend(starts.iter().copied());
        self
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Starts seen so far, sorted
    pub fn seen_starts(&self) -> Vec<i64> {
        let mut seen = self.seen.lock().unwrap().clone();
        seen.sort_unstable();
        seen
    }
}

fn start_from_path(path: &Path) -> Option<i64> {
    path.file_stem()?
        .to_str()?
        .strip_prefix("segment_")?
        .parse()
        .ok()
}

#[async_trait]
impl RecognitionService for MockRecognitionService {
    async fn recognize(&self, segment_path: &Path) -> Result<RecognitionOutcome, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let start = start_from_path(segment_path)
            .ok_or_else(|| RecognitionError::Parse(format!("bad name {}", segment_path.display())))?;
        self.seen.lock().unwrap().push(start);

        if self.failing.lock().unwrap().contains(&start) {
            return Err(RecognitionError::Network("connection reset by peer".into()));
        }

        Ok(match (self.answer)(start) {
            Some(id) => {
                let raw = json!({
                    "matches": [{"id": id}],
                    "track": {"key": id, "title": format!("Title {}", id), "subtitle": format!("Artist {}", id)}
                });
                RecognitionOutcome::Track(TrackDescriptor {
                    track_id: id.to_string(),
                    title: Some(format!("Title {}", id)),
                    artist: Some(format!("Artist {}", id)),
                    raw,
                })
            }
            None => RecognitionOutcome::NoMatch {
                raw: json!({"matches": []}),
            },
        })
    }
}

/// Duration probe returning a fixed value
pub struct FixedDurationProbe {
    duration_ms: Option<i64>,
}

impl FixedDurationProbe {
    pub fn new(duration_ms: i64) -> Self {
        Self {
            duration_ms: Some(duration_ms),
        }
    }

    pub fn failing() -> Self {
        Self { duration_ms: None }
    }
}

#[async_trait]
impl DurationProbe for FixedDurationProbe {
    async fn probe_duration_ms(&self, audio_path: &Path) -> Result<i64, PipelineError> {
        self.duration_ms.ok_or_else(|| PipelineError::Probe {
            path: audio_path.to_path_buf(),
            reason: "no audio stream found".to_string(),
        })
    }
}
