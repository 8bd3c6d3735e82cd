//! Voicenote CLI
//!
//! Exercises the capture/encode/playback pipeline the way the surrounding
//! application would: record a voice answer, encode it as WAV, and play it
//! back while observing the published state streams.

mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use tokio::sync::broadcast;

use voicenote::device::AudioBackend;
use voicenote::{AudioManager, PlaybackState, RecordingState};

fn backend() -> Arc<dyn AudioBackend> {
    #[cfg(feature = "pipewire")]
    {
        Arc::new(voicenote::device::pw::PipewireBackend::new())
    }
    #[cfg(not(feature = "pipewire"))]
    {
        Arc::new(voicenote::device::sim::SimBackend::new())
    }
}

fn main() -> Result<()> {
    let args = cli::Args::parse();
    cli::init_logging(&args);

    match args.command {
        cli::Command::Record { seconds, dir } => record(seconds, dir, args.json),
        cli::Command::Play { file, speed } => play(&file, speed, args.json),
        cli::Command::Encode { file, rate } => {
            let wav_path = voicenote::wav::encode_file(&file, rate)
                .with_context(|| format!("failed to encode {}", file.display()))?;
            println!("{}", wav_path.display());
            Ok(())
        }
        cli::Command::List { dir } => list(dir),
    }
}

fn new_manager(dir: Option<PathBuf>) -> AudioManager {
    let mut manager = AudioManager::new(backend(), Arc::new(|| true));
    if let Some(dir) = dir {
        manager = manager.with_recordings_dir(dir);
    }
    manager
}

fn record(seconds: u32, dir: Option<PathBuf>, json: bool) -> Result<()> {
    let mut manager = new_manager(dir);

    let (_, mut rx) = manager.subscribe_recording();
    thread::spawn(move || loop {
        match rx.blocking_recv() {
            Ok(state) => print_recording(&state, json),
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    });

    if !manager.start_recording() {
        bail!(
            "could not start recording: {:?}",
            manager.recording_state().error
        );
    }
    info!("recording for {} seconds", seconds);
    thread::sleep(Duration::from_secs(seconds as u64));
    manager.stop_recording();

    let state = manager.recording_state();
    if let Some(error) = state.error {
        bail!("recording failed: {}", error);
    }
    let pcm_path = state
        .audio_file_path
        .context("recording produced no file")?;
    let wav_path = manager
        .convert_pcm_to_wav(&pcm_path)
        .context("failed to encode recording as WAV")?;

    println!("{}", wav_path.display());
    Ok(())
}

fn play(file: &Path, speed: f32, json: bool) -> Result<()> {
    let mut manager = new_manager(None);

    if !manager.play_recording(file) {
        bail!(
            "could not start playback: {:?}",
            manager.playback_state().error
        );
    }
    if speed != 1.0 && !manager.set_playback_speed(speed) {
        bail!("this device does not support variable-rate playback");
    }

    let (mut state, mut rx) = manager.subscribe_playback();
    loop {
        print_playback(&state, json);

        if let Some(error) = state.error {
            bail!("playback failed: {}", error);
        }
        // Terminal once the session released the device. Duration is no
        // indicator here: a zero-length clip completes at duration 0.
        if !state.is_playing && !state.is_paused && !manager.is_playback_active() {
            break;
        }

        state = match rx.blocking_recv() {
            Ok(state) => state,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        };
    }

    Ok(())
}

fn list(dir: Option<PathBuf>) -> Result<()> {
    let manager = new_manager(dir);
    for path in manager.list_recordings() {
        println!("{}", path.display());
    }
    Ok(())
}

fn print_recording(state: &RecordingState, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(state) {
            println!("{}", line);
        }
    } else if state.is_recording {
        println!("recording... {} s", state.recording_time_seconds);
    }
}

fn print_playback(state: &PlaybackState, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(state) {
            println!("{}", line);
        }
    } else if state.is_playing {
        println!("playing {} / {} ms", state.position_ms, state.duration_ms);
    }
}
