//! Segment planning
//!
//! Pass 1 samples the whole recording at a coarse step. Pass 2 revisits only
//! the regions pass 1 left unexplained, at a finer step. Planning is pure: no
//! I/O, no clock, same input gives the same plan.

use tracing::debug;

use crate::config::PlannerConfig;
use crate::models::TrackMatch;

/// Segment start planner for both passes
#[derive(Debug, Clone, Default)]
pub struct SegmentPlanner {
    config: PlannerConfig,
}

impl SegmentPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Reject parameters that would produce an empty or endless plan
    pub fn validate(&self) -> Result<(), String> {
        let c = &self.config;
        if c.segment_length_ms <= 0 {
            return Err(format!("segment_length_ms must be positive, got {}", c.segment_length_ms));
        }
        if c.pass1_step_ms <= 0 {
            return Err(format!("pass1_step_ms must be positive, got {}", c.pass1_step_ms));
        }
        if c.pass2_step_ms <= 0 {
            return Err(format!("pass2_step_ms must be positive, got {}", c.pass2_step_ms));
        }
        if c.min_gap_ms < 0 || c.tail_tolerance_ms < 0 {
            return Err("min_gap_ms and tail_tolerance_ms must not be negative".to_string());
        }
        Ok(())
    }

    /// Pass 1 starts: `0, step, 2*step, ...` inside `[0, total_ms)`.
    ///
    /// A start is kept only if its segment ends no later than
    /// `total_ms + tail_tolerance_ms`.
    pub fn generate_pass1_segments(&self, total_ms: i64) -> Vec<i64> {
        let starts = self.spaced_starts(0, total_ms, self.config.pass1_step_ms);
        debug!(total_ms, count = starts.len(), "Planned pass 1 segments");
        starts
    }

    /// Unexplained regions of at least `min_gap_ms`, in ascending order.
    ///
    /// Each match covers `[first_seen - L, last_seen + 2L]` (L = segment
    /// length) clamped to the recording; overlapping or touching regions are
    /// merged before the complement is taken.
    pub fn find_gaps<'a, I>(&self, matches: I, total_ms: i64, min_gap_ms: i64) -> Vec<(i64, i64)>
    where
        I: IntoIterator<Item = &'a TrackMatch>,
    {
        let seg = self.config.segment_length_ms;

        let mut regions: Vec<(i64, i64)> = matches
            .into_iter()
            .map(|m| {
                let start = (m.first_seen_ms - seg).max(0);
                let end = (m.last_seen_ms + 2 * seg).min(total_ms);
                (start, end)
            })
            .collect();

        if regions.is_empty() {
            return vec![(0, total_ms)];
        }

        regions.sort_unstable();

        let mut merged: Vec<(i64, i64)> = Vec::with_capacity(regions.len());
        for (start, end) in regions {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }

        let mut gaps = Vec::new();
        let mut cursor = 0;
        for (start, end) in &merged {
            if start - cursor >= min_gap_ms {
                gaps.push((cursor, *start));
            }
            cursor = cursor.max(*end);
        }
        if total_ms - cursor >= min_gap_ms {
            gaps.push((cursor, total_ms));
        }

        debug!(regions = merged.len(), gaps = gaps.len(), "Computed coverage gaps");
        gaps
    }

    /// Pass 2 starts: each gap sampled at the fine step from its start
    pub fn generate_pass2_segments(&self, gaps: &[(i64, i64)]) -> Vec<i64> {
        let starts: Vec<i64> = gaps
            .iter()
            .flat_map(|&(gap_start, gap_end)| {
                self.spaced_starts(gap_start, gap_end, self.config.pass2_step_ms)
            })
            .collect();
        debug!(gaps = gaps.len(), count = starts.len(), "Planned pass 2 segments");
        starts
    }

    fn spaced_starts(&self, from: i64, until: i64, step: i64) -> Vec<i64> {
        if step <= 0 {
            return Vec::new();
        }
        let limit = until + self.config.tail_tolerance_ms;
        let seg = self.config.segment_length_ms;

        let mut starts = Vec::new();
        let mut start = from;
        while start < until && start + seg <= limit {
            starts.push(start);
            start += step;
        }
        starts
    }
}
