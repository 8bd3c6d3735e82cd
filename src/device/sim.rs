//! Simulated audio backend
//!
//! Deterministic stand-in for real hardware: the input device produces a
//! synthetic 16-bit ramp, the output device plays a WAV file against the
//! wall clock and emits real Prepared/Completed/Error events. Used by the
//! test suite and by the CLI on machines without audio plumbing.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::debug;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::config::{AudioConfig, SampleFormat};
use crate::device::{AudioBackend, AudioInputDevice, AudioOutputDevice, PlayerEvent};
use crate::error::AudioError;

/// How much capture data the minimum buffer holds
const MIN_BUFFER_MILLIS: u32 = 100;

/// Tick interval of the simulated playback clock
const CLOCK_TICK: Duration = Duration::from_millis(10);

/// Simulated backend configuration
#[derive(Clone, Debug, Default)]
pub struct SimBackend {
    /// Total capture bytes the input device will deliver before reporting
    /// only stalls. `None` streams without limit.
    input_budget_bytes: Option<usize>,
    /// Make `open_input` fail, for exercising the device-acquisition path.
    refuse_input: bool,
    /// Bytes the input device delivers before every read fails, for
    /// exercising mid-session device faults. `None` never faults.
    input_fault_after_bytes: Option<usize>,
    /// Make the output device reject rate changes, like hardware without
    /// variable-rate support.
    fixed_rate: bool,
}

impl SimBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the total bytes the input device delivers; reads after the budget
    /// is exhausted return `Ok(0)` stalls forever.
    pub fn with_input_budget(mut self, bytes: usize) -> Self {
        self.input_budget_bytes = Some(bytes);
        self
    }

    /// Simulate a busy/faulty microphone.
    pub fn with_refused_input(mut self) -> Self {
        self.refuse_input = true;
        self
    }

    /// Deliver `bytes` of capture data, then fail every read, simulating a
    /// microphone that dies mid-session.
    pub fn with_input_fault_after(mut self, bytes: usize) -> Self {
        self.input_fault_after_bytes = Some(bytes);
        self
    }

    /// Simulate an output device without variable-rate support;
    /// `set_speed` reports failure.
    pub fn without_rate_control(mut self) -> Self {
        self.fixed_rate = true;
        self
    }
}

impl AudioBackend for SimBackend {
    fn min_input_buffer_size(&self, config: &AudioConfig) -> Result<usize, AudioError> {
        if config.sample_format != SampleFormat::Pcm16 {
            return Err(AudioError::UnsupportedConfig(format!(
                "{}-bit capture not supported",
                config.sample_format.bits_per_sample()
            )));
        }
        Ok((config.byte_rate() * MIN_BUFFER_MILLIS / 1000) as usize)
    }

    fn open_input(
        &self,
        _config: &AudioConfig,
        buffer_size: usize,
    ) -> Result<Box<dyn AudioInputDevice>, AudioError> {
        if self.refuse_input {
            return Err(AudioError::DeviceInitFailed(
                "simulated microphone is busy".to_string(),
            ));
        }
        debug!("sim: opening input device, buffer {} bytes", buffer_size);
        Ok(Box::new(SimInputDevice {
            remaining: self.input_budget_bytes,
            fault_after: self.input_fault_after_bytes,
            next_sample: 0,
            closed: false,
        }))
    }

    fn open_output(&self) -> Result<Box<dyn AudioOutputDevice>, AudioError> {
        Ok(Box::new(SimOutputDevice {
            inner: Arc::new(Mutex::new(PlayerClock::default())),
            shutdown: Arc::new(AtomicBool::new(false)),
            ticker: None,
            rate_control: !self.fixed_rate,
        }))
    }
}

/// Synthetic microphone: an endless little-endian i16 ramp
struct SimInputDevice {
    remaining: Option<usize>,
    fault_after: Option<usize>,
    next_sample: i16,
    closed: bool,
}

impl AudioInputDevice for SimInputDevice {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, AudioError> {
        if self.closed {
            return Ok(0);
        }
        if self.fault_after == Some(0) {
            return Err(AudioError::Device {
                code: -7,
                detail: "simulated microphone disconnect".to_string(),
            });
        }

        // Whole frames only.
        let mut n = buf.len() & !1;
        if let Some(remaining) = self.remaining {
            n = n.min(remaining);
        }
        if let Some(fault_after) = self.fault_after {
            n = n.min(fault_after);
        }
        if n == 0 {
            // Budget exhausted: behave like a stalled device.
            thread::sleep(Duration::from_millis(5));
            return Ok(0);
        }

        for chunk in buf[..n].chunks_exact_mut(2) {
            chunk.copy_from_slice(&self.next_sample.to_le_bytes());
            self.next_sample = self.next_sample.wrapping_add(1);
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= n;
        }
        if let Some(fault_after) = self.fault_after.as_mut() {
            *fault_after -= n;
        }

        // Pace roughly like a real device without slowing tests down.
        thread::sleep(Duration::from_millis(2));
        Ok(n)
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Position/rate bookkeeping shared with the clock thread
#[derive(Debug)]
struct PlayerClock {
    duration_ms: u32,
    position_ms: f64,
    playing: bool,
    speed: f64,
    finished: bool,
}

impl Default for PlayerClock {
    fn default() -> Self {
        Self {
            duration_ms: 0,
            position_ms: 0.0,
            playing: false,
            speed: 1.0,
            finished: false,
        }
    }
}

/// Simulated player: advances a clock instead of touching a speaker
struct SimOutputDevice {
    inner: Arc<Mutex<PlayerClock>>,
    shutdown: Arc<AtomicBool>,
    ticker: Option<JoinHandle<()>>,
    rate_control: bool,
}

impl SimOutputDevice {
    /// Duration of a WAV file in milliseconds, from its header.
    fn probe_duration(path: &Path) -> Result<u32, String> {
        let reader = hound::WavReader::open(path).map_err(|e| e.to_string())?;
        let spec = reader.spec();
        if spec.sample_rate == 0 {
            // A header can claim any rate; refuse one that would make the
            // duration undefined.
            return Err("header declares a sample rate of 0".to_string());
        }
        let frames = reader.duration() as u64;
        Ok((frames * 1000 / spec.sample_rate as u64) as u32)
    }
}

impl AudioOutputDevice for SimOutputDevice {
    fn open(&mut self, path: &Path) -> Result<UnboundedReceiver<PlayerEvent>, AudioError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = self.inner.clone();
        let shutdown = self.shutdown.clone();
        let path = path.to_path_buf();

        self.ticker = Some(thread::spawn(move || {
            run_clock(&path, inner, shutdown, tx);
        }));

        Ok(rx)
    }

    fn start(&mut self) {
        self.inner.lock().unwrap().playing = true;
    }

    fn pause(&mut self) {
        self.inner.lock().unwrap().playing = false;
    }

    fn seek_ms(&mut self, position_ms: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.position_ms = position_ms.min(inner.duration_ms) as f64;
    }

    fn position_ms(&self) -> u32 {
        self.inner.lock().unwrap().position_ms as u32
    }

    fn duration_ms(&self) -> u32 {
        self.inner.lock().unwrap().duration_ms
    }

    fn set_speed(&mut self, speed: f32) -> bool {
        if !self.rate_control {
            return false;
        }
        self.inner.lock().unwrap().speed = speed as f64;
        true
    }

    fn close(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.ticker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SimOutputDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Clock thread: prepares the source, then advances position while playing
fn run_clock(
    path: &Path,
    inner: Arc<Mutex<PlayerClock>>,
    shutdown: Arc<AtomicBool>,
    events: UnboundedSender<PlayerEvent>,
) {
    let duration_ms = match SimOutputDevice::probe_duration(path) {
        Ok(d) => d,
        Err(detail) => {
            let _ = events.send(PlayerEvent::Error { code: -1, detail });
            return;
        }
    };

    inner.lock().unwrap().duration_ms = duration_ms;
    if events.send(PlayerEvent::Prepared { duration_ms }).is_err() {
        return;
    }
    debug!("sim: prepared, duration {} ms", duration_ms);

    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        thread::sleep(CLOCK_TICK);

        let mut clock = inner.lock().unwrap();
        if !clock.playing || clock.finished {
            continue;
        }
        clock.position_ms += CLOCK_TICK.as_millis() as f64 * clock.speed;
        if clock.position_ms >= clock.duration_ms as f64 {
            clock.position_ms = clock.duration_ms as f64;
            clock.playing = false;
            clock.finished = true;
            drop(clock);
            let _ = events.send(PlayerEvent::Completed);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_ramp_is_deterministic() {
        let backend = SimBackend::new().with_input_budget(8);
        let mut device = backend
            .open_input(&AudioConfig::default(), 3200)
            .unwrap();

        let mut buf = [0u8; 16];
        let n = device.read(&mut buf).unwrap();
        assert_eq!(n, 8);
        assert_eq!(&buf[..8], &[0, 0, 1, 0, 2, 0, 3, 0]);

        // Budget exhausted: stalls, not errors.
        assert_eq!(device.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_min_buffer_rejects_8_bit() {
        let backend = SimBackend::new();
        let config = AudioConfig {
            sample_format: SampleFormat::Pcm8,
            ..AudioConfig::default()
        };
        assert!(matches!(
            backend.min_input_buffer_size(&config),
            Err(AudioError::UnsupportedConfig(_))
        ));
        assert_eq!(
            backend.min_input_buffer_size(&AudioConfig::default()).unwrap(),
            3200
        );
    }

    #[test]
    fn test_refused_input() {
        let backend = SimBackend::new().with_refused_input();
        assert!(matches!(
            backend.open_input(&AudioConfig::default(), 3200),
            Err(AudioError::DeviceInitFailed(_))
        ));
    }

    #[test]
    fn test_input_fault_fires_after_configured_bytes() {
        let backend = SimBackend::new().with_input_fault_after(8);
        let mut device = backend
            .open_input(&AudioConfig::default(), 3200)
            .unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(device.read(&mut buf).unwrap(), 8);
        assert!(matches!(
            device.read(&mut buf),
            Err(AudioError::Device { .. })
        ));
    }

    #[test]
    fn test_fixed_rate_output_rejects_speed_changes() {
        let backend = SimBackend::new().without_rate_control();
        let mut device = backend.open_output().unwrap();
        assert!(!device.set_speed(2.0));

        let mut device = SimBackend::new().open_output().unwrap();
        assert!(device.set_speed(2.0));
    }

    #[test]
    fn test_output_error_event_for_zero_rate_header() {
        let mut bytes = crate::wav::encode(&[0u8; 64], 16_000);
        bytes[24..28].copy_from_slice(&0u32.to_le_bytes());
        bytes[28..32].copy_from_slice(&0u32.to_le_bytes());
        let path = std::env::temp_dir().join(format!(
            "voicenote-zero-rate-{}.wav",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&path, bytes).unwrap();

        let backend = SimBackend::new();
        let mut device = backend.open_output().unwrap();
        let mut rx = device.open(&path).unwrap();
        match rx.blocking_recv() {
            Some(PlayerEvent::Error { .. }) => {}
            other => panic!("expected error event, got {:?}", other),
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_output_error_event_for_bad_file() {
        let backend = SimBackend::new();
        let mut device = backend.open_output().unwrap();
        let mut rx = device
            .open(Path::new("/nonexistent/voicenote.wav"))
            .unwrap();
        match rx.blocking_recv() {
            Some(PlayerEvent::Error { .. }) => {}
            other => panic!("expected error event, got {:?}", other),
        }
    }
}
