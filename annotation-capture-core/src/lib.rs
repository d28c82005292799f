//! # annotation-capture-core
//!
//! Platform-agnostic core for recording short spoken annotations.
//!
//! A `RecordingSession` owns a block buffer, drives a `CaptureProvider`
//! (microphone backend or synthetic tone), and on stop hands the
//! concatenated samples to an `AudioFileWriter`, by default a mono WAV file
//! named after the annotated image.
//!
//! ## Architecture
//!
//! ```text
//! annotation-capture-core (this crate)
//! ├── traits/       ← CaptureProvider, AudioFileWriter, CaptureDelegate, CaptureSession
//! ├── models/       ← CaptureError, RecordingState, CaptureConfiguration, AudioBlock, etc.
//! ├── processing/   ← RecordingBuffer, SampleConverter
//! ├── session/      ← RecordingSession (state machine + flush)
//! ├── sources/      ← SyntheticCapture
//! └── storage/      ← WavFileWriter, annotation paths, metadata sidecar
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod sources;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{AudioBlock, AudioLevels, AudioSource, CaptureSessionDiagnostics};
pub use models::config::CaptureConfiguration;
pub use models::error::CaptureError;
pub use models::recording_result::{RecordingMetadata, RecordingResult, StopOutcome};
pub use models::state::RecordingState;
pub use processing::block_buffer::RecordingBuffer;
pub use processing::sample_converter::{SampleConverter, StreamResampler};
pub use session::recording::RecordingSession;
pub use sources::synthetic::SyntheticCapture;
pub use storage::wav_writer::{read_wav, WavFileWriter};
pub use traits::audio_writer::AudioFileWriter;
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::capture_provider::{BlockCallback, CaptureProvider};
pub use traits::capture_session::CaptureSession;
