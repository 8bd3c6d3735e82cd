//! Microphone capture
//!
//! [`AudioCapture`] owns the input device handle for at most one session at
//! a time. `start()` runs a precondition ladder (config support, permission,
//! device acquisition, file creation), then a reader thread streams raw PCM
//! to the destination file while a 1-second timer task republishes the
//! elapsed time. `stop()` cancels both, joins the reader, and releases the
//! device before returning, so a subsequent `start()` can always reacquire.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use log::{error, info, warn};
use uuid::Uuid;

use crate::config::AudioConfig;
use crate::device::AudioBackend;
use crate::error::AudioError;
use crate::runtime;
use crate::state::{RecordingState, StateCell};
use crate::wav;

/// Externally supplied microphone-permission predicate. Requesting the
/// permission is the collaborator's job; capture only consults the result
/// and fails closed.
pub type PermissionCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Microphone capture session owner
pub struct AudioCapture {
    backend: Arc<dyn AudioBackend>,
    permission: PermissionCheck,
    config: AudioConfig,
    recordings_dir: PathBuf,
    state: Arc<StateCell<RecordingState>>,
    session: Option<CaptureSession>,
}

struct CaptureSession {
    id: Uuid,
    cancel: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    timer: tokio::task::JoinHandle<()>,
}

impl AudioCapture {
    pub fn new(backend: Arc<dyn AudioBackend>, permission: PermissionCheck) -> Self {
        let recordings_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voicenote")
            .join("audio_recordings");

        Self {
            backend,
            permission,
            config: AudioConfig::default(),
            recordings_dir,
            state: Arc::new(StateCell::default()),
            session: None,
        }
    }

    pub fn with_recordings_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.set_recordings_dir(dir);
        self
    }

    pub fn with_config(mut self, config: AudioConfig) -> Self {
        self.set_config(config);
        self
    }

    pub fn set_recordings_dir(&mut self, dir: impl AsRef<Path>) {
        self.recordings_dir = dir.as_ref().to_path_buf();
    }

    pub fn set_config(&mut self, config: AudioConfig) {
        self.config = config;
    }

    pub fn recordings_dir(&self) -> &Path {
        &self.recordings_dir
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some() && self.state.get().is_recording
    }

    /// Current snapshot
    pub fn state(&self) -> RecordingState {
        self.state.get()
    }

    /// Observable state stream
    pub fn state_cell(&self) -> Arc<StateCell<RecordingState>> {
        self.state.clone()
    }

    /// Start a new recording session
    ///
    /// Rejects with `AlreadyRecording` while a session is active; callers
    /// must `stop()` first. Other precondition failures are returned and
    /// also published into the state stream's `error` field.
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.session.is_some() {
            if self.state.get().is_recording {
                // The active session is healthy; don't pollute its state
                // stream.
                return Err(AudioError::AlreadyRecording);
            }
            // The reader died on an asynchronous fault. Reap the leftover
            // handles so a restart needs no interposed stop().
            self.stop();
        }

        match self.try_start() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state.update(|s| {
                    s.is_recording = false;
                    s.is_complete = false;
                    s.error = Some(e.clone());
                });
                Err(e)
            }
        }
    }

    fn try_start(&mut self) -> Result<(), AudioError> {
        let min_buffer = self.backend.min_input_buffer_size(&self.config)?;

        if !(self.permission)() {
            return Err(AudioError::PermissionDenied);
        }

        // Double the minimum as headroom against scheduling jitter.
        let buffer_size = min_buffer * 2;
        let mut device = self.backend.open_input(&self.config, buffer_size)?;

        std::fs::create_dir_all(&self.recordings_dir).map_err(AudioError::file_create)?;
        let path = self.recordings_dir.join(format!(
            "voice_recording_{}.pcm",
            Utc::now().format("%Y%m%d_%H%M%S")
        ));
        let file = std::fs::File::create(&path).map_err(AudioError::file_create)?;

        let id = Uuid::new_v4();
        info!("recording session {} -> {}", id, path.display());

        self.state.publish(RecordingState {
            is_recording: true,
            recording_time_seconds: 0,
            audio_file_path: Some(path),
            is_complete: false,
            error: None,
        });

        let cancel = Arc::new(AtomicBool::new(false));

        let reader = {
            let cancel = cancel.clone();
            let state = self.state.clone();
            thread::Builder::new()
                .name("voicenote-capture".to_string())
                .spawn(move || {
                    let mut writer = BufWriter::new(file);
                    let mut buf = vec![0u8; buffer_size];

                    loop {
                        if cancel.load(Ordering::SeqCst) {
                            break;
                        }
                        match device.read(&mut buf) {
                            // Transient stall; a single empty read never
                            // kills the recording.
                            Ok(0) => continue,
                            Ok(n) => {
                                if let Err(e) = writer.write_all(&buf[..n]) {
                                    error!("recording write failed: {}", e);
                                    state.update(|s| {
                                        s.is_recording = false;
                                        s.error = Some(AudioError::Device {
                                            code: -2,
                                            detail: format!("write failed: {}", e),
                                        });
                                    });
                                    break;
                                }
                            }
                            Err(e) => {
                                error!("capture device failed: {}", e);
                                state.update(|s| {
                                    s.is_recording = false;
                                    s.error = Some(e);
                                });
                                break;
                            }
                        }
                    }

                    if let Err(e) = writer.flush() {
                        warn!("failed to flush recording file: {}", e);
                    }
                    device.close();
                })
                .map_err(|e| AudioError::DeviceInitFailed(e.to_string()))?
        };

        let timer = {
            let cancel = cancel.clone();
            let state = self.state.clone();
            runtime::handle().spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(1));
                // The first tick completes immediately; skip it.
                interval.tick().await;
                loop {
                    interval.tick().await;
                    if cancel.load(Ordering::SeqCst) {
                        break;
                    }
                    state.update(|s| {
                        if s.is_recording {
                            s.recording_time_seconds += 1;
                        }
                    });
                }
            })
        };

        self.session = Some(CaptureSession {
            id,
            cancel,
            reader: Some(reader),
            timer,
        });
        Ok(())
    }

    /// Stop the active session; safe to call from any state
    pub fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        session.cancel.store(true, Ordering::SeqCst);
        session.timer.abort();

        if let Some(reader) = session.reader.take() {
            if reader.join().is_err() {
                // Teardown faults are surfaced via state, never propagated.
                self.state.update(|s| {
                    s.error = Some(AudioError::Device {
                        code: -3,
                        detail: "capture thread panicked".to_string(),
                    });
                });
            }
        }

        self.state.update(|s| {
            s.is_recording = false;
            s.is_complete = s.error.is_none();
        });
        info!("recording session {} stopped", session.id);
    }

    /// Wrap a finished PCM recording in a WAV container
    ///
    /// The source PCM file is deleted on success only; the returned path is
    /// the sibling `.wav` file.
    pub fn convert_pcm_to_wav(&self, pcm_path: &Path) -> Result<PathBuf, AudioError> {
        let wav_path = wav::encode_file(pcm_path, self.config.sample_rate_hz)?;
        if let Err(e) = std::fs::remove_file(pcm_path) {
            warn!(
                "encoded {} but could not remove source: {}",
                wav_path.display(),
                e
            );
        }
        Ok(wav_path)
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
