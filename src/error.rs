//! Error taxonomy for the capture and playback pipeline
//!
//! Synchronous preconditions surface as `Result<_, AudioError>` from the
//! triggering call. Asynchronous device faults are never thrown back through
//! the original call; they are published into the `error` field of the
//! component's state snapshot instead. Errors are `Clone + Serialize` so they
//! can ride inside those snapshots.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum AudioError {
    /// Microphone permission was not granted. Recoverable: request the
    /// permission and retry `start()`.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// The sample-rate/channel/format combination is not supported by the
    /// device. Not retryable without changing the config.
    #[error("unsupported capture config: {0}")]
    UnsupportedConfig(String),

    /// Device busy or hardware fault during acquisition.
    #[error("failed to initialize audio device: {0}")]
    DeviceInitFailed(String),

    /// Could not create the destination recording file.
    #[error("failed to create recording file: {0}")]
    FileCreateFailed(String),

    /// The requested file does not exist.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// I/O failure while writing the WAV container.
    #[error("failed to encode WAV file: {0}")]
    EncodeFailed(String),

    /// A recording session is already active; stop it before starting a new
    /// one.
    #[error("a recording is already in progress")]
    AlreadyRecording,

    /// The operation is not available on this device, e.g. variable-rate
    /// playback. Non-fatal; state is left unchanged.
    #[error("operation not supported: {0}")]
    UnsupportedOperation(String),

    /// Opaque lower-level failure reported asynchronously by the device.
    /// Terminal for the current session only.
    #[error("device error {code}: {detail}")]
    Device { code: i32, detail: String },
}

impl AudioError {
    pub(crate) fn file_create(err: std::io::Error) -> Self {
        AudioError::FileCreateFailed(err.to_string())
    }

    pub(crate) fn encode(err: std::io::Error) -> Self {
        AudioError::EncodeFailed(err.to_string())
    }
}
