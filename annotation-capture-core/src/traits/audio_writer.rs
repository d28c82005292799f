use std::path::Path;

use crate::models::error::CaptureError;

/// Persists a finished recording as a single-channel sound file.
pub trait AudioFileWriter: Send + Sync {
    /// Write `samples` at `sample_rate` and `bit_depth` to `path`, replacing
    /// any existing file. A failed write leaves an existing file untouched.
    ///
    /// Returns a checksum of the written file (may be empty if the writer
    /// does not compute one).
    fn write(
        &self,
        samples: &[f32],
        sample_rate: u32,
        bit_depth: u16,
        path: &Path,
    ) -> Result<String, CaptureError>;
}
