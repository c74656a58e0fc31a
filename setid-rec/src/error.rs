//! Error types for setid-rec
//!
//! Only [`PipelineError`] escapes a run. Extraction and recognition errors are
//! per-segment: they are logged and absorbed, and show up only as reduced
//! coverage of the final track list.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Run-level error; aborts the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Audio duration cannot be determined
    #[error("Cannot determine duration of {path}: {reason}")]
    Probe { path: PathBuf, reason: String },

    /// Segment cache could not be opened or its schema created
    #[error("Segment cache initialization failed ({path}): {source}")]
    CacheInit {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },

    /// Cache read failed after a successful initialization
    #[error("Segment cache error: {0}")]
    Cache(#[from] setid_common::Error),

    /// IO error (temp directory, report file, hashing)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parameters that would make planning meaningless (e.g. zero step)
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Per-segment extraction failure
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Extraction tool could not be started
    #[error("Failed to spawn {program} for segment at {start_ms}ms: {source}")]
    Spawn {
        program: String,
        start_ms: i64,
        #[source]
        source: std::io::Error,
    },

    /// Extraction tool exited non-zero
    #[error("{program} failed for segment at {start_ms}ms ({status}): {stderr}")]
    ToolFailed {
        program: String,
        start_ms: i64,
        status: String,
        stderr: String,
    },

    /// Worker pool was shut down before the segment could run
    #[error("Extractor shut down, segment at {start_ms}ms dropped")]
    ShutDown { start_ms: i64 },
}

/// Failure fetching a recording from a video URL
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Not a recognised YouTube URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed ({status}): {stderr}")]
    ToolFailed {
        program: String,
        status: String,
        stderr: String,
    },

    /// Tool succeeded but the expected file is missing
    #[error("Download finished but {0} was not created")]
    MissingOutput(PathBuf),
}

/// Per-segment recognition failure (never cached, retried on the next run)
#[derive(Debug, Error)]
pub enum RecognitionError {
    /// Transport-level failure (connect, timeout, body read)
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP 429
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// HTTP 5xx
    #[error("Server error: HTTP {status}")]
    Server {
        status: u16,
        retry_after: Option<Duration>,
    },

    /// Non-retryable HTTP status (4xx other than 429)
    #[error("Request rejected: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Response body had an unexpected shape
    #[error("Unexpected response: {0}")]
    Parse(String),

    /// Segment file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Retry budget spent on retryable failures
    #[error("Giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<RecognitionError>,
    },
}

impl RecognitionError {
    /// Whether the call should be retried (429 and 5xx)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Server { .. })
    }

    /// Server-provided `Retry-After` hint, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } | Self::Server { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
