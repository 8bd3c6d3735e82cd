//! End-to-end pipeline scenarios over the simulated backend
//!
//! Capture, encode, and playback exercised through the collaborator facade
//! with deterministic synthetic devices.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use voicenote::device::sim::SimBackend;
use voicenote::error::AudioError;
use voicenote::{AudioConfig, AudioManager, PermissionCheck, SampleFormat};

fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir()
        .join("voicenote-tests")
        .join(uuid::Uuid::new_v4().to_string());
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn allow() -> PermissionCheck {
    Arc::new(|| true)
}

fn deny() -> PermissionCheck {
    Arc::new(|| false)
}

/// Poll until `f` holds or the deadline passes.
fn wait_for(deadline: Duration, mut f: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if f() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

/// A WAV file containing `ms` milliseconds of 16 kHz silence.
fn short_wav(dir: &PathBuf, ms: usize) -> PathBuf {
    let pcm = vec![0u8; ms * 32]; // 32 bytes per ms at 16 kHz mono 16-bit
    let path = dir.join(format!("clip_{}ms.wav", ms));
    std::fs::write(&path, voicenote::wav::encode(&pcm, 16_000)).unwrap();
    path
}

#[test]
fn capture_then_encode() {
    let dir = scratch_dir();
    let backend = Arc::new(SimBackend::new().with_input_budget(3200));
    let mut manager = AudioManager::new(backend, allow()).with_recordings_dir(&dir);

    let (initial, mut rx) = manager.subscribe_recording();
    assert!(!initial.is_recording);

    assert!(manager.start_recording());
    let state = manager.recording_state();
    assert!(state.is_recording);
    assert_eq!(state.recording_time_seconds, 0);
    let pcm_path = state.audio_file_path.clone().expect("path set on start");
    assert!(pcm_path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("voice_recording_"));

    // Budget is 3200 bytes; give the reader thread time to drain it.
    thread::sleep(Duration::from_millis(200));
    manager.stop_recording();

    let state = manager.recording_state();
    assert!(!state.is_recording);
    assert!(state.is_complete);
    assert_eq!(state.error, None);
    assert_eq!(std::fs::metadata(&pcm_path).unwrap().len(), 3200);

    // First published transition was the session start with the path set.
    let first = rx.try_recv().unwrap();
    assert!(first.is_recording);
    assert_eq!(first.audio_file_path.as_deref(), Some(pcm_path.as_path()));

    let wav_path = manager.convert_pcm_to_wav(&pcm_path).expect("encode");
    assert_eq!(std::fs::metadata(&wav_path).unwrap().len(), 44 + 3200);
    assert!(!pcm_path.exists(), "source PCM removed after encode");
}

#[test]
fn permission_denied_creates_nothing() {
    let dir = scratch_dir();
    let backend = Arc::new(SimBackend::new());
    let mut manager = AudioManager::new(backend, deny()).with_recordings_dir(&dir);

    assert!(!manager.start_recording());

    let state = manager.recording_state();
    assert!(!state.is_recording);
    assert_eq!(state.error, Some(AudioError::PermissionDenied));
    assert_eq!(state.audio_file_path, None);
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
}

#[test]
fn unsupported_config_is_rejected() {
    let dir = scratch_dir();
    let backend = Arc::new(SimBackend::new());
    let config = AudioConfig {
        sample_format: SampleFormat::Pcm8,
        ..AudioConfig::default()
    };
    let mut manager = AudioManager::new(backend, allow())
        .with_recordings_dir(&dir)
        .with_config(config);

    assert!(!manager.start_recording());
    assert!(matches!(
        manager.recording_state().error,
        Some(AudioError::UnsupportedConfig(_))
    ));
}

#[test]
fn device_init_failure_is_reported() {
    let dir = scratch_dir();
    let backend = Arc::new(SimBackend::new().with_refused_input());
    let mut manager = AudioManager::new(backend, allow()).with_recordings_dir(&dir);

    assert!(!manager.start_recording());
    assert!(matches!(
        manager.recording_state().error,
        Some(AudioError::DeviceInitFailed(_))
    ));
}

#[test]
fn second_start_is_rejected_and_first_session_survives() {
    let dir = scratch_dir();
    let backend = Arc::new(SimBackend::new());
    let mut manager = AudioManager::new(backend, allow()).with_recordings_dir(&dir);

    assert!(manager.start_recording());
    let first_path = manager.recording_state().audio_file_path.clone();

    assert!(!manager.start_recording());
    let state = manager.recording_state();
    assert!(state.is_recording, "active session untouched by rejection");
    assert_eq!(state.audio_file_path, first_path);

    manager.stop_recording();
    assert!(!manager.is_recording());
}

#[test]
fn capture_fault_allows_restart_without_stop() {
    let dir = scratch_dir();
    let backend = Arc::new(SimBackend::new().with_input_fault_after(64));
    let mut manager = AudioManager::new(backend, allow()).with_recordings_dir(&dir);

    assert!(manager.start_recording());
    assert!(wait_for(Duration::from_secs(2), || {
        manager.recording_state().error.is_some()
    }));
    let state = manager.recording_state();
    assert!(!state.is_recording);
    assert!(matches!(state.error, Some(AudioError::Device { .. })));
    assert!(!manager.is_recording(), "dead session is not reported active");

    // A session killed by a device fault never blocks the next one; no
    // interposed stop is required.
    assert!(manager.start_recording());
    manager.stop_recording();
    assert!(!manager.is_recording());
}

#[test]
fn recording_timer_advances() {
    let dir = scratch_dir();
    let backend = Arc::new(SimBackend::new());
    let mut manager = AudioManager::new(backend, allow()).with_recordings_dir(&dir);

    assert!(manager.start_recording());
    assert!(wait_for(Duration::from_secs(3), || {
        manager.recording_state().recording_time_seconds >= 1
    }));
    let seconds = manager.recording_state().recording_time_seconds;
    manager.stop_recording();

    // Stop leaves the elapsed time unchanged.
    assert!(manager.recording_state().recording_time_seconds >= seconds);
}

#[test]
fn idempotent_stop() {
    let dir = scratch_dir();
    let backend = Arc::new(SimBackend::new().with_input_budget(64));
    let mut manager = AudioManager::new(backend, allow()).with_recordings_dir(&dir);

    // Stop with no session at all.
    manager.stop_recording();
    manager.stop_playback();
    assert_eq!(manager.recording_state(), Default::default());

    assert!(manager.start_recording());
    thread::sleep(Duration::from_millis(50));
    manager.stop_recording();
    let terminal = manager.recording_state();
    assert!(terminal.is_complete);

    // Stopping again changes nothing.
    manager.stop_recording();
    assert_eq!(manager.recording_state(), terminal);
}

#[test]
fn playback_completion_resets_state() {
    let dir = scratch_dir();
    let backend = Arc::new(SimBackend::new());
    let mut manager = AudioManager::new(backend, allow()).with_recordings_dir(&dir);
    let clip = short_wav(&dir, 100);

    assert!(manager.play_recording(&clip));

    assert!(wait_for(Duration::from_secs(2), || {
        manager.playback_state().is_playing
    }));
    assert_eq!(manager.playback_state().duration_ms, 100);

    assert!(wait_for(Duration::from_secs(2), || {
        let s = manager.playback_state();
        !s.is_playing && !s.is_paused
    }));
    let state = manager.playback_state();
    assert_eq!(state.position_ms, 0, "completion rewinds to the start");
    assert_eq!(state.error, None);
}

#[test]
fn empty_clip_playback_terminates() {
    let dir = scratch_dir();
    let backend = Arc::new(SimBackend::new());
    let mut manager = AudioManager::new(backend, allow()).with_recordings_dir(&dir);
    // Header only: a valid clip holding zero frames.
    let clip = short_wav(&dir, 0);
    assert_eq!(std::fs::metadata(&clip).unwrap().len(), 44);

    let (_, mut rx) = manager.subscribe_playback();
    assert!(manager.play_recording(&clip));

    // The session must start and then end on its own; duration 0 means the
    // published flags alone cannot distinguish "preparing" from "done", so
    // the device slot is the ground truth.
    let mut started = false;
    let mut ended = false;
    assert!(wait_for(Duration::from_secs(2), || {
        while let Ok(s) = rx.try_recv() {
            if s.is_playing || s.is_paused {
                started = true;
            } else if started {
                ended = true;
            }
        }
        ended && !manager.is_playback_active()
    }));

    let state = manager.playback_state();
    assert_eq!(state.duration_ms, 0);
    assert_eq!(state.position_ms, 0);
    assert_eq!(state.error, None);

    // The device was released, so a fresh session starts cleanly.
    assert!(manager.play_recording(&clip));
    manager.stop_playback();
}

#[test]
fn play_missing_file_fails() {
    let dir = scratch_dir();
    let backend = Arc::new(SimBackend::new());
    let mut manager = AudioManager::new(backend, allow()).with_recordings_dir(&dir);

    assert!(!manager.play_recording(&dir.join("missing.wav")));
    assert!(matches!(
        manager.playback_state().error,
        Some(AudioError::FileNotFound(_))
    ));
}

#[test]
fn corrupt_file_surfaces_device_error() {
    let dir = scratch_dir();
    let backend = Arc::new(SimBackend::new());
    let mut manager = AudioManager::new(backend, allow()).with_recordings_dir(&dir);

    let bogus = dir.join("not-a-wav.wav");
    std::fs::write(&bogus, b"definitely not RIFF").unwrap();
    assert!(manager.play_recording(&bogus), "open itself succeeds");

    assert!(wait_for(Duration::from_secs(2), || {
        manager.playback_state().error.is_some()
    }));
    let state = manager.playback_state();
    assert!(matches!(state.error, Some(AudioError::Device { .. })));
    assert!(!state.is_playing);
    assert!(!state.is_paused);
}

#[test]
fn pause_freezes_position_and_resume_continues() {
    let dir = scratch_dir();
    let backend = Arc::new(SimBackend::new());
    let mut manager = AudioManager::new(backend, allow()).with_recordings_dir(&dir);
    let clip = short_wav(&dir, 2000);

    // Toggling with nothing open is a no-op.
    assert!(!manager.pause_resume());

    assert!(manager.play_recording(&clip));
    assert!(wait_for(Duration::from_secs(2), || {
        manager.playback_state().position_ms > 0
    }));

    assert!(manager.pause_resume());
    // Let any poll that was already in flight land before snapshotting.
    thread::sleep(Duration::from_millis(150));
    let paused = manager.playback_state();
    assert!(paused.is_paused);
    assert!(!paused.is_playing);

    thread::sleep(Duration::from_millis(300));
    assert_eq!(manager.playback_state().position_ms, paused.position_ms);

    assert!(manager.pause_resume());
    assert!(wait_for(Duration::from_secs(2), || {
        manager.playback_state().position_ms > paused.position_ms
    }));

    manager.stop_playback();
    let state = manager.playback_state();
    assert_eq!(state.position_ms, 0);
    assert!(!state.is_playing && !state.is_paused);
}

#[test]
fn seek_clamps_to_duration() {
    let dir = scratch_dir();
    let backend = Arc::new(SimBackend::new());
    let mut manager = AudioManager::new(backend, allow()).with_recordings_dir(&dir);
    let clip = short_wav(&dir, 1000);

    // Seek with nothing open is a no-op.
    assert!(!manager.seek_to(50));

    assert!(manager.play_recording(&clip));
    assert!(wait_for(Duration::from_secs(2), || {
        manager.playback_state().is_playing
    }));
    assert!(manager.pause_resume());
    // Let any poll that was already in flight land before seeking.
    thread::sleep(Duration::from_millis(150));

    assert!(manager.seek_to(50));
    assert_eq!(manager.playback_state().position_ms, 500);

    // Out-of-range input clamps to the end, never past it.
    assert!(manager.seek_to(250));
    let state = manager.playback_state();
    assert_eq!(state.position_ms, state.duration_ms);

    assert!(manager.seek_to(0));
    assert_eq!(manager.playback_state().position_ms, 0);

    manager.stop_playback();
}

#[test]
fn speed_changes_apply_when_supported() {
    let dir = scratch_dir();
    let backend = Arc::new(SimBackend::new());
    let mut manager = AudioManager::new(backend, allow()).with_recordings_dir(&dir);
    let clip = short_wav(&dir, 1000);

    // No session: rejected, published speed untouched.
    assert!(!manager.set_playback_speed(2.0));
    assert_eq!(manager.playback_state().speed, 1.0);

    assert!(manager.play_recording(&clip));
    assert!(wait_for(Duration::from_secs(2), || {
        manager.playback_state().is_playing
    }));

    assert!(manager.set_playback_speed(2.0));
    assert_eq!(manager.playback_state().speed, 2.0);

    manager.stop_playback();
}

#[test]
fn speed_change_rejected_without_rate_control() {
    let dir = scratch_dir();
    let backend = Arc::new(SimBackend::new().without_rate_control());
    let mut manager = AudioManager::new(backend, allow()).with_recordings_dir(&dir);
    let clip = short_wav(&dir, 1000);

    assert!(manager.play_recording(&clip));
    assert!(wait_for(Duration::from_secs(2), || {
        manager.playback_state().is_playing
    }));

    assert!(!manager.set_playback_speed(2.0));
    assert_eq!(
        manager.playback_state().speed,
        1.0,
        "published speed untouched by the rejection"
    );

    manager.stop_playback();
}

#[test]
fn new_playback_tears_down_previous_session() {
    let dir = scratch_dir();
    let backend = Arc::new(SimBackend::new());
    let mut manager = AudioManager::new(backend, allow()).with_recordings_dir(&dir);
    let long_clip = short_wav(&dir, 2000);
    let short_clip = short_wav(&dir, 100);

    assert!(manager.play_recording(&long_clip));
    assert!(wait_for(Duration::from_secs(2), || {
        manager.playback_state().duration_ms == 2000
    }));

    // Second play replaces the first session wholesale.
    assert!(manager.play_recording(&short_clip));
    assert!(wait_for(Duration::from_secs(2), || {
        manager.playback_state().duration_ms == 100
    }));

    // The short clip runs to completion; nothing from the old session keeps
    // polling or rewriting state afterwards.
    assert!(wait_for(Duration::from_secs(2), || {
        let s = manager.playback_state();
        !s.is_playing && !s.is_paused
    }));
    thread::sleep(Duration::from_millis(300));
    let state = manager.playback_state();
    assert_eq!(state.position_ms, 0);
    assert_eq!(state.duration_ms, 100);
    assert_eq!(state.error, None);
}

#[test]
fn cleanup_releases_everything() {
    let dir = scratch_dir();
    let backend = Arc::new(SimBackend::new());
    let mut manager = AudioManager::new(backend, allow()).with_recordings_dir(&dir);
    let clip = short_wav(&dir, 2000);

    assert!(manager.start_recording());
    assert!(manager.play_recording(&clip));

    manager.cleanup();
    assert!(!manager.is_recording());
    let playback = manager.playback_state();
    assert!(!playback.is_playing && !playback.is_paused);

    // Devices were released: both pipelines restart cleanly.
    assert!(manager.start_recording());
    manager.stop_recording();
    assert!(manager.play_recording(&clip));
    manager.cleanup();
}

#[test]
fn list_recordings_finds_encoded_files() {
    let dir = scratch_dir();
    let backend = Arc::new(SimBackend::new());
    let manager = AudioManager::new(backend, allow()).with_recordings_dir(&dir);

    assert!(manager.list_recordings().is_empty());

    let a = short_wav(&dir, 100);
    std::fs::write(dir.join("notes.txt"), b"ignored").unwrap();
    thread::sleep(Duration::from_millis(20));
    let b = short_wav(&dir, 200);

    let listed = manager.list_recordings();
    assert_eq!(listed, vec![b, a], "wav files only, newest first");
}
