//! Pipeline services
//!
//! Planner and aggregator are pure. Extractor, recognizer and probe wrap
//! external tools or services. The orchestrator drives them through the
//! two-pass workflow.

pub mod aggregator;
pub mod duration_probe;
pub mod extractor;
pub mod planner;
pub mod recognition_client;
pub mod recognizer;
pub mod report;
pub mod workflow_orchestrator;
pub mod youtube;

pub use aggregator::{aggregate_matches, calculate_confidence, filter_identified};
pub use duration_probe::{DurationProbe, FfprobeDurationProbe};
pub use extractor::SegmentExtractor;
pub use planner::SegmentPlanner;
pub use recognition_client::{HttpRecognitionClient, RecognitionService, RetryDecision, RetryPolicy};
pub use recognizer::Recognizer;
pub use workflow_orchestrator::{
    Pass, PassSummary, PipelineState, ProgressSink, RunSummary, WorkflowOrchestrator,
};

use std::sync::Arc;

/// `(completed, total)` progress notification
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;
