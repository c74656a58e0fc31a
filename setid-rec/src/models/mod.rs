//! Data models for setid-rec
//!
//! Lifecycle: [`SegmentSpec`] → temp audio file ([`ExtractedSegment`]) →
//! [`SegmentResult`] persisted under a [`SegmentCacheKey`] → [`TrackMatch`]
//! set recomputed on demand → filtered [`IdentifiedTrack`] rows.

pub mod recognition;
pub mod segment;
pub mod track_match;

pub use recognition::{RecognitionOutcome, TrackDescriptor};
pub use segment::{
    ExtractedSegment, SegmentCacheKey, SegmentResult, SegmentSpec, DEFAULT_SEGMENT_DURATION_MS,
};
pub use track_match::{IdentifiedTrack, TrackMatch};
