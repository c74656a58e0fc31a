//! Typed recognition outcome
//!
//! The service answers with a loosely shaped JSON document. It is parsed into
//! [`RecognitionOutcome`] at the point the response is received, and only the
//! opaque payload travels further (into the cache).

use serde::Deserialize;
use serde_json::Value;

use crate::error::RecognitionError;

/// Identified track as reported by the service
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDescriptor {
    pub track_id: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub raw: Value,
}

/// Result of a successful recognition call
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionOutcome {
    /// Service answered, but the segment matched nothing
    NoMatch { raw: Value },
    /// Service identified a track
    Track(TrackDescriptor),
}

/// `track` object of a Shazam-shaped response
#[derive(Debug, Deserialize)]
struct ResponseTrack {
    key: String,
    #[serde(default)]
    title: Option<String>,
    /// Shazam reports the artist as the track subtitle
    #[serde(default)]
    subtitle: Option<String>,
}

impl RecognitionOutcome {
    /// Parse a raw service response.
    ///
    /// A document without `track` is a no-match. A `track` that lacks a
    /// string `key` is an unexpected shape and surfaces as
    /// [`RecognitionError::Parse`] so the segment stays uncached.
    pub fn from_response(raw: Value) -> Result<Self, RecognitionError> {
        if !raw.is_object() {
            return Err(RecognitionError::Parse(format!(
                "Expected JSON object, got: {}",
                truncate_for_log(&raw.to_string())
            )));
        }

        let track = match raw.get("track") {
            None | Some(Value::Null) => return Ok(Self::NoMatch { raw }),
            Some(track) => track.clone(),
        };

        let track: ResponseTrack = serde_json::from_value(track)
            .map_err(|e| RecognitionError::Parse(format!("Malformed track object: {}", e)))?;

        Ok(Self::Track(TrackDescriptor {
            track_id: track.key,
            title: track.title,
            artist: track.subtitle,
            raw,
        }))
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Self::Track(_))
    }
}

fn truncate_for_log(s: &str) -> &str {
    match s.char_indices().nth(200) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
