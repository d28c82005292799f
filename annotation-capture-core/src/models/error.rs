use thiserror::Error;

/// Errors reported by capture sources, writers and the recording session.
///
/// Causes are carried as rendered strings so the error stays `Clone` and can
/// be stored in session state or handed to a `CaptureDelegate`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The input device could not be opened (missing, busy, or access denied).
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("invalid state: {0}")]
    InvalidState(String),

    /// `stop()` found an empty buffer; nothing was written.
    #[error("no audio captured")]
    NoAudioCaptured,

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl CaptureError {
    /// Whether the session lifecycle survives this error.
    ///
    /// Only a device failure on start is fatal to the operation that raised it;
    /// every other kind leaves the session usable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DeviceUnavailable(_))
    }
}
