//! Capture configuration
//!
//! Immutable parameters for a capture session. The defaults (16 kHz mono
//! 16-bit from the plain microphone source) match what downstream speech
//! recognition expects; every field can be overridden for tests or alternate
//! uses.

use serde::{Deserialize, Serialize};

/// Channel layout of the captured stream
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    pub fn count(self) -> u16 {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }
}

/// Sample encoding of the captured stream
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    Pcm8,
    Pcm16,
}

impl SampleFormat {
    pub fn bits_per_sample(self) -> u16 {
        match self {
            SampleFormat::Pcm8 => 8,
            SampleFormat::Pcm16 => 16,
        }
    }

    pub fn bytes_per_sample(self) -> u16 {
        self.bits_per_sample() / 8
    }
}

/// Which platform input route feeds the capture device
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputSource {
    Mic,
    VoiceRecognition,
    VoiceCommunication,
}

/// Audio capture configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz (default: 16000 for speech-recognition compatibility)
    pub sample_rate_hz: u32,
    /// Channel layout (default: mono)
    pub channels: ChannelLayout,
    /// Sample encoding (default: 16-bit PCM)
    pub sample_format: SampleFormat,
    /// Platform input route (default: plain microphone)
    pub input_source: InputSource,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 16_000,
            channels: ChannelLayout::Mono,
            sample_format: SampleFormat::Pcm16,
            input_source: InputSource::Mic,
        }
    }
}

impl AudioConfig {
    /// Bytes of PCM produced per second of capture
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate_hz
            * self.channels.count() as u32
            * self.sample_format.bytes_per_sample() as u32
    }

    /// Bytes per frame (one sample across all channels)
    pub fn block_align(&self) -> u16 {
        self.channels.count() * self.sample_format.bytes_per_sample()
    }
}
