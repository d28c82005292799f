use crate::models::audio_models::AudioLevels;
use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::RecordingState;

/// Event delegate for recording session notifications.
///
/// `on_levels_updated` is called from the capture context; the others from
/// whichever thread drove the transition (caller or auto-stop timer).
/// Implementations should marshal to a UI thread if needed.
pub trait CaptureDelegate: Send + Sync {
    fn on_state_changed(&self, state: RecordingState);

    /// Runs on the audio thread while the provider's callback slot is held.
    /// Must return quickly and never block; hand the levels off instead.
    fn on_levels_updated(&self, levels: &AudioLevels);

    /// Called for every error that ends a `stop()`.
    fn on_error(&self, error: &CaptureError);

    fn on_recording_finished(&self, result: &RecordingResult);
}
