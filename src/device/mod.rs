//! Device capability interfaces
//!
//! The concrete microphone/speaker bindings are platform-specific, so the
//! capture and playback state machines talk to these traits instead. That
//! keeps the WAV logic and session handling independent of the hardware
//! binding and lets tests substitute a deterministic simulated backend.
//!
//! Backends:
//! - [`sim`] - deterministic synthetic streams, always available
//! - [`pw`] - PipeWire binding (enabled with the `pipewire` feature)

use std::path::Path;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::AudioConfig;
use crate::error::AudioError;

pub mod sim;

#[cfg(feature = "pipewire")]
pub mod pw;

/// Asynchronous notifications from an output device
#[derive(Clone, Debug, PartialEq)]
pub enum PlayerEvent {
    /// The device finished preparing the source; duration is now known and
    /// the session may start.
    Prepared { duration_ms: u32 },
    /// Natural end of the source was reached.
    Completed,
    /// Unrecoverable device fault; terminal for this session.
    Error { code: i32, detail: String },
}

/// An open microphone handle streaming little-endian 16-bit frames
pub trait AudioInputDevice: Send {
    /// Blocking read of captured bytes into `buf`.
    ///
    /// `Ok(0)` signals a transient stall (nothing available right now) and is
    /// not an error; callers retry. `Err` is a terminal device fault.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, AudioError>;

    /// Release the hardware handle. Idempotent.
    fn close(&mut self);
}

/// An open playback handle for one source file
pub trait AudioOutputDevice: Send {
    /// Begin asynchronous preparation of `path`. Duration and readiness are
    /// reported through the returned event channel.
    fn open(&mut self, path: &Path) -> Result<UnboundedReceiver<PlayerEvent>, AudioError>;

    fn start(&mut self);

    /// Freeze playback at the current position.
    fn pause(&mut self);

    fn seek_ms(&mut self, position_ms: u32);

    fn position_ms(&self) -> u32;

    fn duration_ms(&self) -> u32;

    /// Apply a playback-rate change. Returns false when the device has no
    /// variable-rate support; the rate is then left unchanged.
    fn set_speed(&mut self, speed: f32) -> bool;

    /// Release the hardware handle. Idempotent.
    fn close(&mut self);
}

/// Factory for device handles; owns nothing itself
pub trait AudioBackend: Send + Sync {
    /// Minimum capture buffer size in bytes for `config`, or
    /// `UnsupportedConfig` when the platform cannot deliver it.
    fn min_input_buffer_size(&self, config: &AudioConfig) -> Result<usize, AudioError>;

    fn open_input(
        &self,
        config: &AudioConfig,
        buffer_size: usize,
    ) -> Result<Box<dyn AudioInputDevice>, AudioError>;

    fn open_output(&self) -> Result<Box<dyn AudioOutputDevice>, AudioError>;
}
