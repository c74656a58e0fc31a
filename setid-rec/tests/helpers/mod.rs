//! Test helpers shared by setid-rec integration tests

#![allow(dead_code)]

pub mod mock_service;

pub use mock_service::{FixedDurationProbe, MockRecognitionService};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use setid_rec::config::SetidConfig;
use setid_rec::services::WorkflowOrchestrator;

/// Config that runs fast and needs no external tools.
///
/// `true` stands in for ffmpeg: it exits 0 without writing the segment file,
/// and the mock service only looks at the file name.
pub fn test_config() -> SetidConfig {
    let mut config = SetidConfig::default();
    config.extraction.ffmpeg_path = "true".to_string();
    config.extraction.workers = 2;
    config.recognition.max_concurrent = 2;
    config.recognition.pause_every = 0;
    config
}

/// Write a fake recording; only its leading bytes matter (cache fingerprint)
pub fn write_fake_audio(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

pub fn create_test_orchestrator(
    config: &SetidConfig,
    data_dir: &Path,
    service: Arc<MockRecognitionService>,
    duration_ms: i64,
) -> WorkflowOrchestrator {
    WorkflowOrchestrator::new(
        config,
        data_dir.to_path_buf(),
        service,
        Arc::new(FixedDurationProbe::new(duration_ms)),
    )
}
