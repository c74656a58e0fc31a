//! Audio duration probe

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::config::ProbeConfig;
use crate::error::PipelineError;

/// Determines the length of a recording
#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// Total duration in milliseconds; failure is fatal for the run
    async fn probe_duration_ms(&self, audio_path: &Path) -> Result<i64, PipelineError>;
}

/// ffprobe-based [`DurationProbe`]
pub struct FfprobeDurationProbe {
    program: String,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    duration: Option<String>,
}

impl FfprobeDurationProbe {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            program: config.ffprobe_path.clone(),
        }
    }
}

#[async_trait]
impl DurationProbe for FfprobeDurationProbe {
    async fn probe_duration_ms(&self, audio_path: &Path) -> Result<i64, PipelineError> {
        let probe_error = |reason: String| PipelineError::Probe {
            path: audio_path.to_path_buf(),
            reason,
        };

        let output = Command::new(&self.program)
            .args(["-v", "error", "-print_format", "json", "-show_streams"])
            .arg(audio_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| probe_error(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(probe_error(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let duration_ms =
            parse_ffprobe_duration(&String::from_utf8_lossy(&output.stdout)).map_err(probe_error)?;
        debug!(path = %audio_path.display(), duration_ms, "Probed audio duration");
        Ok(duration_ms)
    }
}

/// Duration of the first audio stream in ffprobe's JSON output
pub fn parse_ffprobe_duration(json: &str) -> Result<i64, String> {
    let parsed: FfprobeOutput =
        serde_json::from_str(json).map_err(|e| format!("unparsable ffprobe output: {}", e))?;

    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .ok_or_else(|| "no audio stream found".to_string())?;

    let seconds: f64 = stream
        .duration
        .as_deref()
        .ok_or_else(|| "audio stream has no duration".to_string())?
        .trim()
        .parse()
        .map_err(|e| format!("invalid duration: {}", e))?;

    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!("invalid duration: {}", seconds));
    }
    Ok((seconds * 1000.0) as i64)
}
