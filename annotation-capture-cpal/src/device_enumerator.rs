//! Input device enumeration through the cpal default host.

use cpal::traits::{DeviceTrait, HostTrait};

use annotation_capture_core::models::audio_models::AudioSource;
use annotation_capture_core::models::error::CaptureError;

/// Lists and resolves input devices on the platform's default audio host.
pub struct DeviceEnumerator {
    host: cpal::Host,
}

impl DeviceEnumerator {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// List input (microphone) devices. cpal exposes no stable device id,
    /// so the device name doubles as the id.
    pub fn list_capture_devices(&self) -> Result<Vec<AudioSource>, CaptureError> {
        let default_name = self.default_capture_device_name().ok();

        let devices = self
            .host
            .input_devices()
            .map_err(|e| CaptureError::Unknown(format!("failed to enumerate input devices: {}", e)))?;

        let mut sources = Vec::new();
        for (i, device) in devices.enumerate() {
            let name = device.name().unwrap_or_else(|_| format!("Input Device {}", i));
            let is_default = default_name.as_deref() == Some(name.as_str());
            sources.push(AudioSource {
                id: name.clone(),
                name,
                is_default,
            });
        }

        Ok(sources)
    }

    /// Name of the host's default input device.
    pub fn default_capture_device_name(&self) -> Result<String, CaptureError> {
        let device = self
            .host
            .default_input_device()
            .ok_or_else(|| CaptureError::DeviceUnavailable("no default input device".into()))?;
        device
            .name()
            .map_err(|e| CaptureError::DeviceUnavailable(format!("default input device has no name: {}", e)))
    }

    /// Resolve `name` to an input device, or the default device when `None`.
    pub fn find_capture_device(&self, name: Option<&str>) -> Result<cpal::Device, CaptureError> {
        let Some(wanted) = name else {
            return self
                .host
                .default_input_device()
                .ok_or_else(|| CaptureError::DeviceUnavailable("no default input device".into()));
        };

        let devices = self
            .host
            .input_devices()
            .map_err(|e| CaptureError::DeviceUnavailable(format!("failed to enumerate input devices: {}", e)))?;

        for device in devices {
            if let Ok(candidate) = device.name() {
                if name_matches(&candidate, wanted) {
                    return Ok(device);
                }
            }
        }

        Err(CaptureError::DeviceUnavailable(format!(
            "input device not found: {}",
            wanted
        )))
    }
}

impl Default for DeviceEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Device names compare case-insensitively, ignoring surrounding whitespace.
pub fn name_matches(candidate: &str, wanted: &str) -> bool {
    candidate.trim().eq_ignore_ascii_case(wanted.trim())
}
