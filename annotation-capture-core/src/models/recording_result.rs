use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Result returned when a recording has been flushed to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub target: String,
    pub duration_secs: f64,
    pub sample_count: usize,
    pub checksum: String,
    pub metadata: RecordingMetadata,
}

/// Metadata describing a written annotation.
///
/// Serializable for the optional JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub target: String,
    pub file_path: String,
    pub created_at: String,
    pub duration_secs: f64,
    pub sample_count: usize,
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub checksum: String,
}

impl RecordingMetadata {
    pub fn new_mono(
        target: &str,
        file_path: &str,
        sample_count: usize,
        sample_rate: u32,
        bit_depth: u16,
        checksum: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            target: target.to_string(),
            file_path: file_path.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            duration_secs: sample_count as f64 / sample_rate as f64,
            sample_count,
            sample_rate,
            bit_depth,
            checksum: checksum.to_string(),
        }
    }
}

/// Outcome of the most recent `stop()`, whoever triggered it.
pub type StopOutcome = Result<RecordingResult, crate::models::error::CaptureError>;
