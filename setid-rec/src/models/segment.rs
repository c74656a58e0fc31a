//! Segment-level data model
//!
//! A segment is one fixed-length window of the source recording. Segments are
//! planned as [`SegmentSpec`]s, cut to temp files, recognized, and persisted as
//! [`SegmentResult`]s under a [`SegmentCacheKey`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::recognition::RecognitionOutcome;

/// Default segment length (15 s)
pub const DEFAULT_SEGMENT_DURATION_MS: i64 = 15_000;

/// Bytes of the audio file hashed for the cache fingerprint (1 MiB)
pub const FILE_HASH_PREFIX_BYTES: u64 = 1024 * 1024;

/// Hex characters kept from the SHA-256 digest
const FILE_HASH_HEX_LEN: usize = 16;

/// One window of the source recording to extract and recognize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentSpec {
    pub start_ms: i64,
    pub duration_ms: i64,
}

impl SegmentSpec {
    pub fn new(start_ms: i64, duration_ms: i64) -> Self {
        Self {
            start_ms,
            duration_ms,
        }
    }

    pub fn end_ms(&self) -> i64 {
        self.start_ms + self.duration_ms
    }
}

/// A segment that was cut successfully and is waiting for recognition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSegment {
    pub path: PathBuf,
    pub start_ms: i64,
}

/// Persistent identifier of one recognition attempt
///
/// Combines a content fingerprint of the audio file with the segment window,
/// so a changed file (different leading bytes) or a changed segment length
/// never reuses stale rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentCacheKey {
    pub audio_file_hash: String,
    pub start_ms: i64,
    pub duration_ms: i64,
}

impl SegmentCacheKey {
    pub fn new(audio_file_hash: impl Into<String>, start_ms: i64, duration_ms: i64) -> Self {
        Self {
            audio_file_hash: audio_file_hash.into(),
            start_ms,
            duration_ms,
        }
    }

    /// Hash the first 1 MiB of `audio_path`.
    ///
    /// Runs on the blocking pool; hashing a prefix keeps this cheap even for
    /// multi-gigabyte recordings while still detecting a replaced file.
    pub async fn compute_file_hash(audio_path: &Path) -> std::io::Result<String> {
        let path = audio_path.to_path_buf();
        tokio::task::spawn_blocking(move || hash_file_prefix(&path, FILE_HASH_PREFIX_BYTES))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
    }
}

impl fmt::Display for SegmentCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.audio_file_hash, self.start_ms, self.duration_ms)
    }
}

/// SHA-256 of at most `read_bytes` leading bytes, truncated to 16 hex chars
pub fn hash_file_prefix(path: &Path, read_bytes: u64) -> std::io::Result<String> {
    let file = std::fs::File::open(path)?;
    let mut prefix = Vec::new();
    file.take(read_bytes).read_to_end(&mut prefix)?;

    let digest = Sha256::digest(&prefix);
    let hex = format!("{:x}", digest);
    Ok(hex[..FILE_HASH_HEX_LEN].to_string())
}

/// Recognition outcome of one segment
///
/// Immutable once persisted. A "no match" answer from the service is a valid
/// result and is cached; a failed call yields [`SegmentResult::empty`], which
/// the recognizer never persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentResult {
    pub start_ms: i64,
    pub raw_response: Option<serde_json::Value>,
    pub track_id: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
}

impl SegmentResult {
    /// Result carrying no information (transient failure)
    pub fn empty(start_ms: i64) -> Self {
        Self {
            start_ms,
            raw_response: None,
            track_id: None,
            title: None,
            artist: None,
        }
    }

    pub fn from_outcome(start_ms: i64, outcome: RecognitionOutcome) -> Self {
        match outcome {
            RecognitionOutcome::NoMatch { raw } => Self {
                start_ms,
                raw_response: Some(raw),
                track_id: None,
                title: None,
                artist: None,
            },
            RecognitionOutcome::Track(track) => Self {
                start_ms,
                raw_response: Some(track.raw),
                track_id: Some(track.track_id),
                title: track.title,
                artist: track.artist,
            },
        }
    }

    pub fn has_match(&self) -> bool {
        self.track_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::recognition::TrackDescriptor;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_segment_spec_end() {
        let spec = SegmentSpec::new(30_000, DEFAULT_SEGMENT_DURATION_MS);
        assert_eq!(spec.end_ms(), 45_000);
    }

    #[test]
    fn test_cache_key_string_form() {
        let key = SegmentCacheKey::new("abcdef0123456789", 30_000, 15_000);
        assert_eq!(key.to_string(), "abcdef0123456789_30000_15000");
    }

    #[test]
    fn test_hash_uses_only_prefix() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.bin");
        let b = temp.path().join("b.bin");

        let mut content = vec![7u8; 64];
        std::fs::write(&a, &content).unwrap();
        content.extend_from_slice(b"tail differs");
        std::fs::write(&b, &content).unwrap();

        let hash_a = hash_file_prefix(&a, 64).unwrap();
        let hash_b = hash_file_prefix(&b, 64).unwrap();
        assert_eq!(hash_a, hash_b, "Bytes past the prefix must not affect the hash");
        assert_eq!(hash_a.len(), 16);
    }

    #[test]
    fn test_hash_changes_with_leading_bytes() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.bin");
        let b = temp.path().join("b.bin");
        std::fs::write(&a, b"RIFF....one").unwrap();
        std::fs::write(&b, b"RIFF....two").unwrap();

        assert_ne!(
            hash_file_prefix(&a, FILE_HASH_PREFIX_BYTES).unwrap(),
            hash_file_prefix(&b, FILE_HASH_PREFIX_BYTES).unwrap()
        );
    }

    #[tokio::test]
    async fn test_compute_file_hash_missing_file() {
        let result = SegmentCacheKey::compute_file_hash(Path::new("/nonexistent/set.mp3")).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_result_from_track_outcome() {
        let raw = json!({"track": {"key": "42", "title": "Song", "subtitle": "Artist"}});
        let outcome = RecognitionOutcome::Track(TrackDescriptor {
            track_id: "42".to_string(),
            title: Some("Song".to_string()),
            artist: Some("Artist".to_string()),
            raw: raw.clone(),
        });

        let result = SegmentResult::from_outcome(15_000, outcome);
        assert!(result.has_match());
        assert_eq!(result.track_id.as_deref(), Some("42"));
        assert_eq!(result.raw_response, Some(raw));
    }

    #[test]
    fn test_result_from_no_match_keeps_payload() {
        let raw = json!({"matches": []});
        let result = SegmentResult::from_outcome(0, RecognitionOutcome::NoMatch { raw: raw.clone() });
        assert!(!result.has_match());
        assert_eq!(result.raw_response, Some(raw));
    }

    #[test]
    fn test_empty_result_has_no_match() {
        let result = SegmentResult::empty(7_500);
        assert!(!result.has_match());
        assert!(result.raw_response.is_none());
    }
}
