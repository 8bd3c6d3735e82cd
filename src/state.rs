//! Published state snapshots for capture and playback
//!
//! Both components publish immutable snapshots through a [`StateCell`]:
//! a latest-value container plus a broadcast channel, so observers (UI or
//! test harness) see every transition in order without being able to reach
//! back into component internals.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::AudioError;

/// Snapshot of the recording session, replaced atomically on each update
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RecordingState {
    pub is_recording: bool,
    /// Whole seconds elapsed since `start()`; resets to 0 on each start and
    /// never decreases within a session.
    pub recording_time_seconds: u32,
    /// Destination PCM file. Set before the first publish after a successful
    /// start and never cleared while recording.
    pub audio_file_path: Option<PathBuf>,
    pub is_complete: bool,
    pub error: Option<AudioError>,
}

/// Snapshot of the playback session
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub is_paused: bool,
    pub position_ms: u32,
    /// 0 until the device reports it, which happens asynchronously after open.
    pub duration_ms: u32,
    pub speed: f32,
    pub error: Option<AudioError>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            is_playing: false,
            is_paused: false,
            position_ms: 0,
            duration_ms: 0,
            speed: 1.0,
            error: None,
        }
    }
}

/// Broadcast capacity. A subscriber that falls further behind than this only
/// loses stale snapshots; the latest value is always available via `get`.
const CHANNEL_CAPACITY: usize = 64;

/// Latest-value container with change broadcast - thread-safe
///
/// `publish`/`update` replace the stored snapshot and notify subscribers
/// while holding the lock, so every observer sees transitions in the exact
/// order they were made.
pub struct StateCell<T: Clone> {
    latest: Mutex<T>,
    tx: broadcast::Sender<T>,
}

impl<T: Clone> StateCell<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            latest: Mutex::new(initial),
            tx,
        }
    }

    /// Current snapshot
    pub fn get(&self) -> T {
        self.latest.lock().unwrap().clone()
    }

    /// Replace the snapshot and notify subscribers
    pub fn publish(&self, next: T) {
        let mut latest = self.latest.lock().unwrap();
        *latest = next.clone();
        // Send may fail when nobody is subscribed; the latest value is still
        // retained for the next `get`/`subscribe`.
        let _ = self.tx.send(next);
    }

    /// Mutate the snapshot in place and notify subscribers
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut latest = self.latest.lock().unwrap();
        f(&mut latest);
        let _ = self.tx.send(latest.clone());
    }

    /// Subscribe to the stream: returns the then-current snapshot plus a
    /// receiver of every subsequent transition.
    pub fn subscribe(&self) -> (T, broadcast::Receiver<T>) {
        let latest = self.latest.lock().unwrap();
        (latest.clone(), self.tx.subscribe())
    }
}

impl<T: Clone + Default> Default for StateCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
