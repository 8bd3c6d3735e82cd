//! Collaborator-facing facade
//!
//! [`AudioManager`] is the single entry point the surrounding application
//! (UI/ViewModel layer) talks to: boolean-returning transport commands plus
//! observable state streams. Command failures are logged and reflected in
//! the state streams rather than propagated, so screen code never has to
//! handle errors inline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::warn;
use tokio::sync::broadcast;

use crate::capture::{AudioCapture, PermissionCheck};
use crate::config::AudioConfig;
use crate::device::AudioBackend;
use crate::playback::AudioPlayback;
use crate::state::{PlaybackState, RecordingState};

/// Facade over the capture and playback components
pub struct AudioManager {
    capture: AudioCapture,
    playback: AudioPlayback,
}

impl AudioManager {
    pub fn new(backend: Arc<dyn AudioBackend>, permission: PermissionCheck) -> Self {
        Self {
            capture: AudioCapture::new(backend.clone(), permission),
            playback: AudioPlayback::new(backend),
        }
    }

    pub fn with_recordings_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.capture.set_recordings_dir(dir);
        self
    }

    pub fn with_config(mut self, config: AudioConfig) -> Self {
        self.capture.set_config(config);
        self
    }

    pub fn recordings_dir(&self) -> &Path {
        self.capture.recordings_dir()
    }

    /// Start a recording session; false when rejected (see state for why)
    pub fn start_recording(&mut self) -> bool {
        match self.capture.start() {
            Ok(()) => true,
            Err(e) => {
                warn!("start_recording rejected: {}", e);
                false
            }
        }
    }

    pub fn stop_recording(&mut self) {
        self.capture.stop();
    }

    pub fn is_recording(&self) -> bool {
        self.capture.is_recording()
    }

    /// Play a recorded or downloaded file; false when it cannot start
    pub fn play_recording(&mut self, path: &Path) -> bool {
        match self.playback.play(path) {
            Ok(()) => true,
            Err(e) => {
                warn!("play_recording failed: {}", e);
                false
            }
        }
    }

    pub fn stop_playback(&mut self) {
        self.playback.stop();
    }

    pub fn is_playback_active(&self) -> bool {
        self.playback.is_active()
    }

    pub fn pause_resume(&mut self) -> bool {
        self.playback.pause_resume()
    }

    pub fn seek_to(&mut self, percent: u8) -> bool {
        self.playback.seek_to(percent)
    }

    pub fn set_playback_speed(&mut self, speed: f32) -> bool {
        match self.playback.set_speed(speed) {
            Ok(()) => true,
            Err(e) => {
                warn!("set_playback_speed rejected: {}", e);
                false
            }
        }
    }

    /// Encode a finished PCM capture as WAV, deleting the source on success
    pub fn convert_pcm_to_wav(&self, pcm_path: &Path) -> Option<PathBuf> {
        match self.capture.convert_pcm_to_wav(pcm_path) {
            Ok(wav_path) => Some(wav_path),
            Err(e) => {
                warn!("convert_pcm_to_wav failed: {}", e);
                None
            }
        }
    }

    /// Release every resource; safe to call at teardown from any state
    pub fn cleanup(&mut self) {
        self.capture.stop();
        self.playback.stop();
    }

    pub fn recording_state(&self) -> RecordingState {
        self.capture.state()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state()
    }

    /// Subscribe to recording transitions; yields the then-current snapshot
    /// plus a receiver of every later publish.
    pub fn subscribe_recording(
        &self,
    ) -> (RecordingState, broadcast::Receiver<RecordingState>) {
        self.capture.state_cell().subscribe()
    }

    pub fn subscribe_playback(
        &self,
    ) -> (PlaybackState, broadcast::Receiver<PlaybackState>) {
        self.playback.state_cell().subscribe()
    }

    /// Encoded recordings in the recordings directory, newest first
    pub fn list_recordings(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(self.capture.recordings_dir()) else {
            return Vec::new();
        };

        let mut recordings: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .map(|ext| ext.to_string_lossy().to_lowercase() == "wav")
                    .unwrap_or(false)
            })
            .collect();

        recordings.sort_by(|a, b| {
            let a_time = a.metadata().and_then(|m| m.modified()).ok();
            let b_time = b.metadata().and_then(|m| m.modified()).ok();
            b_time.cmp(&a_time)
        });

        recordings
    }
}

impl Drop for AudioManager {
    fn drop(&mut self) {
        self.cleanup();
    }
}
