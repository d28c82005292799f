use crate::models::audio_models::AudioLevels;
use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::RecordingState;

/// Main recording session interface, as seen by a UI driver.
pub trait CaptureSession: Send + Sync {
    /// Current session state.
    fn state(&self) -> RecordingState;

    /// Level of the most recent block.
    fn current_levels(&self) -> AudioLevels;

    /// Begin recording towards `target`. Transitions: idle → active.
    fn start(&self, target: &str) -> Result<(), CaptureError>;

    /// Stop and flush. Transitions: active → flushing → idle.
    fn stop(&self) -> Result<RecordingResult, CaptureError>;

    /// Stop and discard. Transitions: active → idle.
    fn abort(&self) -> Result<(), CaptureError>;
}
