//! Microphone access check.
//!
//! cpal has no permission API; access is probed by asking the default input
//! device for its configuration. On macOS an app without microphone consent
//! still sees the device but receives silence, so `true` here means "a
//! device is reachable", not "consent was granted".

use cpal::traits::{DeviceTrait, HostTrait};

use annotation_capture_core::models::error::CaptureError;

/// Check whether a default input device can be opened.
///
/// Returns `Ok(false)` when there is no input device or it refuses to report
/// a configuration.
pub fn check_microphone_access() -> Result<bool, CaptureError> {
    let host = cpal::default_host();

    let device = match host.default_input_device() {
        Some(d) => d,
        None => return Ok(false),
    };

    match device.default_input_config() {
        Ok(_) => Ok(true),
        Err(cpal::DefaultStreamConfigError::DeviceNotAvailable) => Ok(false),
        Err(e) => {
            log::warn!("unexpected error probing microphone access: {}", e);
            Ok(false)
        }
    }
}
