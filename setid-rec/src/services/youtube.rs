//! YouTube input support
//!
//! A recording given as a YouTube URL is downloaded once with `yt-dlp` into
//! the data directory and reused on later runs.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

use crate::error::DownloadError;

const YT_DLP: &str = "yt-dlp";

/// Video id from a YouTube URL, if `url` is one.
///
/// Recognises `youtu.be/<id>`, `youtube.com/watch?v=<id>`,
/// `youtube.com/embed/<id>` and `youtube.com/v/<id>`.
pub fn youtube_video_id(url: &str) -> Option<String> {
    let rest = url
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let rest = rest.strip_prefix("www.").unwrap_or(rest);
    let rest = rest.strip_prefix("m.").unwrap_or(rest);

    let id = if let Some(path) = rest.strip_prefix("youtu.be/") {
        path
    } else if let Some(path) = rest.strip_prefix("youtube.com/") {
        if let Some(query) = path.strip_prefix("watch?") {
            query
                .split('&')
                .find_map(|pair| pair.strip_prefix("v="))?
        } else if let Some(id) = path.strip_prefix("embed/") {
            id
        } else if let Some(id) = path.strip_prefix("v/") {
            id
        } else {
            return None;
        }
    } else {
        return None;
    };

    let id: String = id
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    (!id.is_empty()).then_some(id)
}

/// Where the audio for `video_id` is stored
pub fn download_path(data_dir: &Path, video_id: &str) -> PathBuf {
    data_dir.join(format!("{}_audio_download.mp3", video_id))
}

/// Download the audio track of `url` as mp3, skipping if already present
pub async fn download_audio(url: &str, data_dir: &Path) -> Result<PathBuf, DownloadError> {
    let video_id =
        youtube_video_id(url).ok_or_else(|| DownloadError::InvalidUrl(url.to_string()))?;
    let output_path = download_path(data_dir, &video_id);

    if output_path.is_file() {
        info!("Found {}, skipping download", output_path.display());
        return Ok(output_path);
    }

    info!(video_id = %video_id, "Downloading audio from {}", url);
    let template = data_dir.join(format!("{}_audio_download.%(ext)s", video_id));

    let output = Command::new(YT_DLP)
        .args(["-x", "--audio-format", "mp3", "--audio-quality", "192K", "-o"])
        .arg(&template)
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| DownloadError::Spawn {
            program: YT_DLP.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(DownloadError::ToolFailed {
            program: YT_DLP.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    if !output_path.is_file() {
        return Err(DownloadError::MissingOutput(output_path));
    }
    Ok(output_path)
}
