//! WAV container codec
//!
//! Wraps a raw PCM byte buffer in a canonical 44-byte RIFF/WAVE header.
//! Pure and synchronous; no device dependency. The payload passes through
//! unmodified - no resampling, no channel conversion.
//!
//! Header layout (all multi-byte integers little-endian, mono 16-bit PCM):
//!
//! | Offset | Bytes | Field          | Value             |
//! |--------|-------|----------------|-------------------|
//! | 0      | 4     | ChunkID        | "RIFF"            |
//! | 4      | 4     | ChunkSize      | 36 + data size    |
//! | 8      | 4     | Format         | "WAVE"            |
//! | 12     | 4     | Subchunk1ID    | "fmt "            |
//! | 16     | 4     | Subchunk1Size  | 16                |
//! | 20     | 2     | AudioFormat    | 1 (PCM)           |
//! | 22     | 2     | NumChannels    | 1                 |
//! | 24     | 4     | SampleRate     | sample rate       |
//! | 28     | 4     | ByteRate       | sample rate * 2   |
//! | 32     | 2     | BlockAlign     | 2                 |
//! | 34     | 2     | BitsPerSample  | 16                |
//! | 36     | 4     | Subchunk2ID    | "data"            |
//! | 40     | 4     | Subchunk2Size  | data size         |

use std::path::{Path, PathBuf};

use crate::error::AudioError;

pub const HEADER_LEN: usize = 44;

const NUM_CHANNELS: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;
const BLOCK_ALIGN: u16 = NUM_CHANNELS * BITS_PER_SAMPLE / 8;

/// Typed little-endian writer for header assembly
struct LeWriter {
    buf: Vec<u8>,
}

impl LeWriter {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    fn tag(&mut self, tag: &[u8; 4]) {
        self.buf.extend_from_slice(tag);
    }

    fn u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }
}

/// Encode a raw mono 16-bit PCM buffer as a complete WAV file image
///
/// The result is exactly `44 + pcm.len()` bytes; an empty input yields a
/// 44-byte, still RIFF-valid file.
pub fn encode(pcm: &[u8], sample_rate_hz: u32) -> Vec<u8> {
    let data_size = pcm.len() as u32;
    let byte_rate = sample_rate_hz * BLOCK_ALIGN as u32;

    let mut w = LeWriter::with_capacity(HEADER_LEN + pcm.len());

    w.tag(b"RIFF");
    w.u32(36 + data_size);
    w.tag(b"WAVE");

    w.tag(b"fmt ");
    w.u32(16); // Subchunk1Size for PCM
    w.u16(1); // AudioFormat: uncompressed PCM
    w.u16(NUM_CHANNELS);
    w.u32(sample_rate_hz);
    w.u32(byte_rate);
    w.u16(BLOCK_ALIGN);
    w.u16(BITS_PER_SAMPLE);

    w.tag(b"data");
    w.u32(data_size);
    w.bytes(pcm);

    w.buf
}

/// Encode a PCM file into a sibling `.wav` file
///
/// Returns the path of the written WAV file. The source PCM file is left in
/// place; callers that want the capture-pipeline semantics (delete the PCM
/// after a successful encode) go through `AudioCapture::convert_pcm_to_wav`.
pub fn encode_file(pcm_path: &Path, sample_rate_hz: u32) -> Result<PathBuf, AudioError> {
    if !pcm_path.is_file() {
        return Err(AudioError::FileNotFound(pcm_path.display().to_string()));
    }

    let pcm = std::fs::read(pcm_path).map_err(AudioError::encode)?;
    let wav_path = pcm_path.with_extension("wav");
    std::fs::write(&wav_path, encode(&pcm, sample_rate_hz)).map_err(AudioError::encode)?;

    Ok(wav_path)
}
