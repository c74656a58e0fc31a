//! Per-track aggregate built from segment hits

use serde::Serialize;

use crate::services::aggregator::calculate_confidence;

/// Aggregated evidence that one track plays in the recording
///
/// Recomputed from cached [`super::SegmentResult`]s on every run; never
/// persisted. `match_timestamps` is kept sorted and free of duplicates so the
/// aggregate does not depend on scan order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackMatch {
    pub shazam_id: String,
    pub title: String,
    pub artist: String,
    pub first_seen_ms: i64,
    pub last_seen_ms: i64,
    pub match_timestamps: Vec<i64>,
}

impl TrackMatch {
    /// Seed a match from its first hit
    pub fn new(shazam_id: String, title: String, artist: String, timestamp_ms: i64) -> Self {
        Self {
            shazam_id,
            title,
            artist,
            first_seen_ms: timestamp_ms,
            last_seen_ms: timestamp_ms,
            match_timestamps: vec![timestamp_ms],
        }
    }

    /// Record another hit and widen the first/last bounds.
    ///
    /// Returns false when the timestamp was already recorded.
    pub fn add_match(&mut self, timestamp_ms: i64) -> bool {
        match self.match_timestamps.binary_search(&timestamp_ms) {
            Ok(_) => false,
            Err(pos) => {
                self.match_timestamps.insert(pos, timestamp_ms);
                self.first_seen_ms = self.first_seen_ms.min(timestamp_ms);
                self.last_seen_ms = self.last_seen_ms.max(timestamp_ms);
                true
            }
        }
    }

    pub fn match_count(&self) -> usize {
        self.match_timestamps.len()
    }

    /// Span between first and last detection
    pub fn duration_ms(&self) -> i64 {
        self.last_seen_ms - self.first_seen_ms
    }

    pub fn confidence(&self) -> f64 {
        calculate_confidence(self)
    }
}

/// One row of the final, filtered output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentifiedTrack {
    pub match_count: usize,
    pub first_seen_ms: i64,
    pub artist: String,
    pub title: String,
    pub external_track_id: String,
    pub confidence: f64,
}

impl From<&TrackMatch> for IdentifiedTrack {
    fn from(m: &TrackMatch) -> Self {
        Self {
            match_count: m.match_count(),
            first_seen_ms: m.first_seen_ms,
            artist: m.artist.clone(),
            title: m.title.clone(),
            external_track_id: m.shazam_id.clone(),
            confidence: m.confidence(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TrackMatch {
        TrackMatch::new("42".into(), "Title".into(), "Artist".into(), 60_000)
    }

    #[test]
    fn test_add_match_widens_bounds() {
        let mut m = sample();
        assert!(m.add_match(30_000));
        assert!(m.add_match(120_000));
        assert_eq!(m.first_seen_ms, 30_000);
        assert_eq!(m.last_seen_ms, 120_000);
        assert_eq!(m.duration_ms(), 90_000);
        assert_eq!(m.match_timestamps, vec![30_000, 60_000, 120_000]);
    }

    #[test]
    fn test_add_match_ignores_duplicate_timestamp() {
        let mut m = sample();
        assert!(!m.add_match(60_000));
        assert_eq!(m.match_count(), 1);
    }

    #[test]
    fn test_identified_track_from_match() {
        let mut m = sample();
        m.add_match(90_000);
        let row = IdentifiedTrack::from(&m);
        assert_eq!(row.match_count, 2);
        assert_eq!(row.first_seen_ms, 60_000);
        assert_eq!(row.external_track_id, "42");
        assert!((row.confidence - m.confidence()).abs() < f64::EPSILON);
    }
}
