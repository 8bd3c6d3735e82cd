//! Voicenote - microphone capture, WAV encoding, and playback for voice
//! answers
//!
//! The crate captures raw PCM from a microphone into a timestamped file,
//! wraps finished captures in a canonical WAV container, and plays recorded
//! or downloaded audio with transport controls (pause/resume, seek,
//! variable speed). Both device-facing components publish read-only state
//! snapshots that observers subscribe to.
//!
//! Hardware access goes through the [`device`] capability traits; the crate
//! ships a deterministic simulated backend and, behind the `pipewire`
//! feature, a PipeWire binding.

pub mod capture;
pub mod config;
pub mod device;
pub mod error;
pub mod manager;
pub mod playback;
mod runtime;
pub mod state;
pub mod wav;

pub use capture::{AudioCapture, PermissionCheck};
pub use config::{AudioConfig, ChannelLayout, InputSource, SampleFormat};
pub use error::AudioError;
pub use manager::AudioManager;
pub use playback::AudioPlayback;
pub use state::{PlaybackState, RecordingState, StateCell};
