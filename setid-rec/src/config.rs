//! Configuration for setid-rec
//!
//! One TOML bootstrap file (`~/.config/setid/setid.toml` by default). Every
//! table and every field is optional; missing values fall back to the
//! built-in defaults below. Command-line flags are applied on top by the
//! binary.
//!
//! ```toml
//! data_dir = "/srv/setid"
//!
//! [logging]
//! level = "debug"
//!
//! [planner]
//! pass1_step_ms = 30000
//!
//! [recognition]
//! endpoint = "http://127.0.0.1:8080/recognize"
//! max_concurrent = 1
//! ```

use serde::Deserialize;
use setid_common::config::LoggingConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::models::DEFAULT_SEGMENT_DURATION_MS;

/// Environment variable holding the recognition API key
pub const API_KEY_ENV: &str = "SETID_RECOGNITION_API_KEY";

/// Top-level TOML document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SetidConfig {
    pub data_dir: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub planner: PlannerConfig,
    pub extraction: ExtractionConfig,
    pub recognition: RecognitionConfig,
    pub probe: ProbeConfig,
    pub filter: FilterConfig,
}

impl SetidConfig {
    /// Load from `path`; a missing file yields defaults
    pub fn load(path: &Path) -> setid_common::Result<Self> {
        let mut config: Self = setid_common::config::load_toml_config(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment wins over TOML for secrets
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                info!("Recognition API key loaded from environment variable");
                self.recognition.api_key = Some(key);
            }
        }
    }
}

/// Segment planning parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Length of each segment
    pub segment_length_ms: i64,
    /// Discovery pass spacing
    pub pass1_step_ms: i64,
    /// Gap-filling pass spacing
    pub pass2_step_ms: i64,
    /// Gaps shorter than this are not revisited in pass 2
    pub min_gap_ms: i64,
    /// How far a segment may run past the end of the audio (or gap)
    pub tail_tolerance_ms: i64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            segment_length_ms: DEFAULT_SEGMENT_DURATION_MS,
            pass1_step_ms: 30_000,
            pass2_step_ms: 7_500,
            min_gap_ms: 45_000,
            tail_tolerance_ms: 5_000,
        }
    }
}

/// Segment extraction (ffmpeg) parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Concurrent extraction processes
    pub workers: usize,
    pub ffmpeg_path: String,
    pub codec: String,
    pub bitrate: String,
    /// Segment file extension, matching `codec`
    pub extension: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            ffmpeg_path: "ffmpeg".to_string(),
            codec: "mp3".to_string(),
            bitrate: "128k".to_string(),
            extension: "mp3".to_string(),
        }
    }
}

/// Recognition service and rate limiting parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// HTTP endpoint accepting raw segment bytes
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Header carrying `api_key`
    pub api_key_header: String,
    pub timeout_secs: u64,
    /// Concurrent in-flight recognition calls
    pub max_concurrent: usize,
    /// Attempts per segment for 429/5xx answers
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Optional hard quota on calls per minute
    pub requests_per_minute: Option<u32>,
    /// Pause inserted after every `pause_every` completions (0 disables)
    pub pause_every: usize,
    pub pause_ms: u64,
    /// Delete segment files after their recognition attempt
    pub cleanup_segments: bool,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8765/recognize".to_string(),
            api_key: None,
            api_key_header: "X-Api-Key".to_string(),
            timeout_secs: 30,
            // The service rate-limits aggressively
            max_concurrent: 1,
            max_attempts: 12,
            initial_backoff_ms: 100,
            max_backoff_ms: 204_800,
            requests_per_minute: None,
            pause_every: 5,
            pause_ms: 2_000,
            cleanup_segments: true,
        }
    }
}

impl RecognitionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Post-completion pause, `None` when disabled
    pub fn pause(&self) -> Option<(usize, Duration)> {
        if self.pause_every == 0 || self.pause_ms == 0 {
            None
        } else {
            Some((self.pause_every, Duration::from_millis(self.pause_ms)))
        }
    }
}

/// Duration probe (ffprobe) parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub ffprobe_path: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

/// Final report filter
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub min_matches: usize,
    pub min_confidence: f64,
    /// Append the external track id to console rows
    pub show_track_ids: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_matches: 2,
            min_confidence: 0.7,
            show_track_ids: false,
        }
    }
}
