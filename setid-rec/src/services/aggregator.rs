//! Match aggregation and confidence scoring
//!
//! Folds per-segment hits into one [`TrackMatch`] per external track id and
//! scores each by how often and over how long a span it was heard.

use std::collections::HashMap;
use tracing::debug;

use crate::config::FilterConfig;
use crate::models::{IdentifiedTrack, SegmentResult, TrackMatch};

/// Hits at which the count term saturates
const FULL_COUNT: f64 = 3.0;
/// Detection span at which the duration term saturates (90 s)
const FULL_SPAN_MS: f64 = 90_000.0;
const COUNT_WEIGHT: f64 = 0.6;
const SPAN_WEIGHT: f64 = 0.4;

/// Group hits by track id.
///
/// Results without a match are skipped. The output does not depend on the
/// order of `results`: timestamps are kept sorted and title/artist come from
/// the earliest hit.
pub fn aggregate_matches(results: &[SegmentResult]) -> HashMap<String, TrackMatch> {
    let mut matches: HashMap<String, TrackMatch> = HashMap::new();

    for result in results {
        let Some(track_id) = result.track_id.as_ref() else {
            continue;
        };
        let title = result.title.clone().unwrap_or_default();
        let artist = result.artist.clone().unwrap_or_default();

        match matches.get_mut(track_id) {
            Some(existing) => {
                let earlier = result.start_ms < existing.first_seen_ms;
                if existing.add_match(result.start_ms) && earlier {
                    existing.title = title;
                    existing.artist = artist;
                }
            }
            None => {
                matches.insert(
                    track_id.clone(),
                    TrackMatch::new(track_id.clone(), title, artist, result.start_ms),
                );
            }
        }
    }

    debug!(
        segments = results.len(),
        tracks = matches.len(),
        "Aggregated segment matches"
    );
    matches
}

/// `0.6 * min(count / 3, 1) + 0.4 * min(span / 90 s, 1)`, in `[0, 1]`
pub fn calculate_confidence(track: &TrackMatch) -> f64 {
    let count_term = (track.match_count() as f64 / FULL_COUNT).min(1.0);
    let span_term = (track.duration_ms().max(0) as f64 / FULL_SPAN_MS).min(1.0);
    COUNT_WEIGHT * count_term + SPAN_WEIGHT * span_term
}

/// Final report rows: matches passing both thresholds, by first detection
pub fn filter_identified(
    matches: &HashMap<String, TrackMatch>,
    filter: &FilterConfig,
) -> Vec<IdentifiedTrack> {
    let mut rows: Vec<IdentifiedTrack> = matches
        .values()
        .filter(|m| {
            let confidence = m.confidence();
            let keep = m.match_count() >= filter.min_matches && confidence >= filter.min_confidence;
            if !keep {
                debug!(
                    track_id = %m.shazam_id,
                    artist = %m.artist,
                    title = %m.title,
                    match_count = m.match_count(),
                    confidence,
                    "Filtered out low-evidence match"
                );
            }
            keep
        })
        .map(IdentifiedTrack::from)
        .collect();

    rows.sort_by(|a, b| {
        a.first_seen_ms
            .cmp(&b.first_seen_ms)
            .then_with(|| a.external_track_id.cmp(&b.external_track_id))
    });
    rows
}
