use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for a recording session.
///
/// Every field has a default, so a partial JSON document deserializes into a
/// complete configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfiguration {
    /// Sample rate of delivered blocks and of the written file (default: 44100).
    pub sample_rate: u32,

    /// Channel count. Only mono (1) is supported.
    pub channels: u16,

    /// Output bit depth: 16 for integer PCM, 32 for IEEE float (default: 16).
    pub bit_depth: u16,

    /// Directory where annotation files are written.
    pub output_directory: PathBuf,

    /// Auto-stop after this many seconds (None = until `stop()`).
    pub max_duration_secs: Option<f64>,

    /// Input device name, or None for the host default.
    pub mic_device_name: Option<String>,

    /// Requested frames per device buffer, or None for the backend default.
    pub block_frames: Option<u32>,

    /// Write a `<file>.metadata.json` sidecar next to each recording.
    pub write_metadata: bool,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if self.channels != 1 {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        if ![16, 32].contains(&self.bit_depth) {
            return Err(format!("unsupported bit depth: {}", self.bit_depth));
        }
        if let Some(secs) = self.max_duration_secs {
            if !(secs > 0.0 && secs.is_finite()) {
                return Err(format!("max duration must be positive, got {}", secs));
            }
        }
        if self.block_frames == Some(0) {
            return Err("block size must be positive".into());
        }
        Ok(())
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 1,
            bit_depth: 16,
            output_directory: PathBuf::from("audio_annotations"),
            max_duration_secs: None,
            mic_device_name: None,
            block_frames: None,
            write_metadata: false,
        }
    }
}
