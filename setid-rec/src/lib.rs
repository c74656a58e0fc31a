//! setid-rec - track identification for long recordings
//!
//! Cuts a recording (typically a DJ set) into short segments, identifies each
//! through a recognition service, and folds the hits into a timestamped track
//! list. Results are cached per segment in SQLite, so interrupted or repeated
//! runs only process what is missing.
//!
//! Library interface; the `setid-rec` binary is a thin CLI over
//! [`services::WorkflowOrchestrator`].

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::config::SetidConfig;
pub use crate::error::{DownloadError, ExtractionError, PipelineError, RecognitionError};
