//! Audio playback with transport controls
//!
//! [`AudioPlayback`] owns one output device handle at a time. `play()` tears
//! down any prior session first, then opens the device asynchronously: once
//! the Prepared event arrives the duration is known and playback starts,
//! and a 100 ms poller republishes the device position while playing.
//! Completed resets the session to the start of the file; a device Error is
//! terminal for the session and surfaces through the state stream.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};

use crate::device::{AudioBackend, AudioOutputDevice, PlayerEvent};
use crate::error::AudioError;
use crate::runtime;
use crate::state::{PlaybackState, StateCell};

type SharedDevice = Arc<Mutex<Option<Box<dyn AudioOutputDevice>>>>;

/// Playback session owner
pub struct AudioPlayback {
    backend: Arc<dyn AudioBackend>,
    state: Arc<StateCell<PlaybackState>>,
    device: SharedDevice,
    session: Option<PlaybackSession>,
}

struct PlaybackSession {
    cancel: Arc<AtomicBool>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl AudioPlayback {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            backend,
            state: Arc::new(StateCell::default()),
            device: Arc::new(Mutex::new(None)),
            session: None,
        }
    }

    /// Current snapshot
    pub fn state(&self) -> PlaybackState {
        self.state.get()
    }

    /// Whether a session currently holds the output device. Goes false once
    /// the session ends for any reason, including clips whose reported
    /// duration is zero.
    pub fn is_active(&self) -> bool {
        self.device.lock().unwrap().is_some()
    }

    /// Observable state stream
    pub fn state_cell(&self) -> Arc<StateCell<PlaybackState>> {
        self.state.clone()
    }

    /// Begin playing `path`, tearing down any existing session first
    ///
    /// Returns once the device is opening; actual playback starts when the
    /// device reports Prepared, at which point the duration becomes known.
    pub fn play(&mut self, path: &Path) -> Result<(), AudioError> {
        self.stop();

        if !path.is_file() {
            let err = AudioError::FileNotFound(path.display().to_string());
            self.state.update(|s| s.error = Some(err.clone()));
            return Err(err);
        }

        let mut device = match self.backend.open_output() {
            Ok(device) => device,
            Err(e) => {
                self.state.update(|s| s.error = Some(e.clone()));
                return Err(e);
            }
        };
        let mut events = match device.open(path) {
            Ok(events) => events,
            Err(e) => {
                self.state.update(|s| s.error = Some(e.clone()));
                return Err(e);
            }
        };
        *self.device.lock().unwrap() = Some(device);

        // Fresh session: duration unknown until the device reports it.
        self.state.publish(PlaybackState::default());
        info!("playback session opened: {}", path.display());

        let cancel = Arc::new(AtomicBool::new(false));
        let mut tasks = Vec::with_capacity(2);

        // Device event listener.
        tasks.push({
            let cancel = cancel.clone();
            let state = self.state.clone();
            let device = self.device.clone();
            runtime::handle().spawn(async move {
                while let Some(event) = events.recv().await {
                    if cancel.load(Ordering::SeqCst) {
                        break;
                    }
                    match event {
                        PlayerEvent::Prepared { duration_ms } => {
                            if let Some(d) = device.lock().unwrap().as_mut() {
                                d.start();
                            }
                            state.update(|s| {
                                s.is_playing = true;
                                s.is_paused = false;
                                s.position_ms = 0;
                                s.duration_ms = duration_ms;
                            });
                        }
                        PlayerEvent::Completed => {
                            // Release the device before the final publish so
                            // anyone observing the terminal transition also
                            // sees the session as inactive.
                            if let Some(mut d) = device.lock().unwrap().take() {
                                d.close();
                            }
                            // Natural completion rewinds to the start.
                            state.update(|s| {
                                s.is_playing = false;
                                s.is_paused = false;
                                s.position_ms = 0;
                            });
                            break;
                        }
                        PlayerEvent::Error { code, detail } => {
                            warn!("playback device error {}: {}", code, detail);
                            if let Some(mut d) = device.lock().unwrap().take() {
                                d.close();
                            }
                            state.update(|s| {
                                s.is_playing = false;
                                s.is_paused = false;
                                s.error = Some(AudioError::Device { code, detail });
                            });
                            break;
                        }
                    }
                }
            })
        });

        // Position poller: 100 ms cadence while the session is live. Paused
        // sessions skip the device read (position is frozen) but keep the
        // loop alive to catch a resume. The device slot is emptied when the
        // session ends (Completed or Error), so an empty slot is the
        // termination signal regardless of the clip's duration.
        tasks.push({
            let cancel = cancel.clone();
            let state = self.state.clone();
            let device = self.device.clone();
            runtime::handle().spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_millis(100));
                loop {
                    interval.tick().await;
                    if cancel.load(Ordering::SeqCst) {
                        break;
                    }
                    let snap = state.get();
                    if snap.error.is_some() {
                        break;
                    }
                    let position = {
                        let guard = device.lock().unwrap();
                        match guard.as_ref() {
                            None => break,
                            Some(d) => snap.is_playing.then(|| d.position_ms()),
                        }
                    };
                    if let Some(position) = position {
                        state.update(|s| {
                            s.position_ms = if s.duration_ms > 0 {
                                position.min(s.duration_ms)
                            } else {
                                position
                            };
                        });
                    }
                }
            })
        });

        self.session = Some(PlaybackSession { cancel, tasks });
        Ok(())
    }

    /// Toggle pause; no-op returning false when no device is open
    pub fn pause_resume(&mut self) -> bool {
        let mut guard = self.device.lock().unwrap();
        let Some(device) = guard.as_mut() else {
            return false;
        };

        let snap = self.state.get();
        if snap.is_playing {
            device.pause();
            self.state.update(|s| {
                s.is_playing = false;
                s.is_paused = true;
            });
            true
        } else if snap.is_paused {
            device.start();
            self.state.update(|s| {
                s.is_playing = true;
                s.is_paused = false;
            });
            true
        } else {
            // Open but not yet prepared; nothing to toggle.
            false
        }
    }

    /// Seek to a percentage of the duration, clamped to [0, 100]
    pub fn seek_to(&mut self, percent: u8) -> bool {
        let mut guard = self.device.lock().unwrap();
        let Some(device) = guard.as_mut() else {
            return false;
        };

        let percent = percent.min(100) as u64;
        let duration = device.duration_ms() as u64;
        let target = (percent * duration / 100) as u32;
        device.seek_ms(target);
        self.state.update(|s| s.position_ms = target);
        true
    }

    /// Change the playback rate
    ///
    /// Fails with `UnsupportedOperation` (leaving the published speed
    /// unchanged) when the device has no variable-rate support or no session
    /// is active; a rate change must never silently claim success.
    pub fn set_speed(&mut self, speed: f32) -> Result<(), AudioError> {
        let mut guard = self.device.lock().unwrap();
        let Some(device) = guard.as_mut() else {
            return Err(AudioError::UnsupportedOperation(
                "no active playback session".to_string(),
            ));
        };

        if !device.set_speed(speed) {
            return Err(AudioError::UnsupportedOperation(
                "variable-rate playback not available on this device".to_string(),
            ));
        }
        self.state.update(|s| s.speed = speed);
        Ok(())
    }

    /// Cancel the session, release the device, and rewind; idempotent
    pub fn stop(&mut self) {
        let session = self.session.take();
        if let Some(session) = &session {
            session.cancel.store(true, Ordering::SeqCst);
        }

        let device = self.device.lock().unwrap().take();
        let had_device = device.is_some();
        if let Some(mut device) = device {
            device.close();
        }

        if let Some(session) = session {
            for task in session.tasks {
                task.abort();
            }
        }

        let snap = self.state.get();
        if had_device || snap.is_playing || snap.is_paused {
            self.state.update(|s| {
                s.is_playing = false;
                s.is_paused = false;
                s.position_ms = 0;
            });
            info!("playback stopped");
        }
    }
}

impl Drop for AudioPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}
