use std::sync::Arc;

use crate::models::audio_models::{AudioBlock, AudioSource};
use crate::models::error::CaptureError;

/// Callback invoked for each captured block, in arrival order.
///
/// Fires on the provider's capture context, not the caller's thread.
pub type BlockCallback = Arc<dyn Fn(AudioBlock) + Send + Sync + 'static>;

/// A source of mono audio blocks at a fixed sample rate.
///
/// Implemented by:
/// - `CpalMicCapture` (annotation-capture-cpal)
/// - `SyntheticCapture` (tone generator, for tests and demos)
pub trait CaptureProvider: Send {
    /// Whether this capture source can currently be opened.
    fn is_available(&self) -> bool;

    /// Open the device and start delivering blocks via `callback`.
    ///
    /// Fails with `DeviceUnavailable` if the device cannot be opened, and
    /// with `InvalidState` if this instance is already capturing.
    fn start(&mut self, callback: BlockCallback) -> Result<(), CaptureError>;

    /// Stop capturing and release the device. Idempotent.
    ///
    /// Once this returns, `callback` is never invoked again.
    fn stop(&mut self) -> Result<(), CaptureError>;

    fn is_capturing(&self) -> bool;

    /// Rate of the delivered blocks in Hz. Fixed when the provider is built.
    fn sample_rate(&self) -> u32;

    /// Information about the device backing this provider.
    fn device_info(&self) -> AudioSource;
}
