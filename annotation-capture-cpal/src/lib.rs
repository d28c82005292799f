//! # annotation-capture-cpal
//!
//! Cross-platform microphone backend for annotation-capture, built on cpal.
//!
//! Provides:
//! - `CpalMicCapture`: microphone capture delivering mono blocks at the session rate
//! - `DeviceEnumerator`: input device listing and lookup by name
//! - `permissions`: microphone reachability probe
//!
//! ## Usage
//! ```ignore
//! use annotation_capture_core::{CaptureConfiguration, RecordingSession};
//! use annotation_capture_cpal::CpalMicCapture;
//!
//! let config = CaptureConfiguration::default();
//! let mic = CpalMicCapture::from_configuration(&config);
//! let session = RecordingSession::with_wav_writer(mic, config)?;
//! session.start("cat.wav")?;
//! // ...
//! let result = session.stop()?;
//! ```

pub mod cpal_mic;
pub mod device_enumerator;
pub mod permissions;

pub use cpal_mic::{CpalMicCapture, DeviceFormat};
pub use device_enumerator::DeviceEnumerator;
pub use permissions::check_microphone_access;
