//! PipeWire audio backend
//!
//! Real microphone and speaker binding behind the `pipewire` feature. Each
//! open device runs its own PipeWire main loop on a dedicated thread; the
//! trait methods communicate with it through shared state and a stop channel.
//!
//! Capture converts the F32LE stream PipeWire delivers into little-endian
//! 16-bit frames pulled through blocking `read`. Playback streams a WAV file
//! (decoded with hound) and reports position from the consumed sample index.
//! Variable-rate playback is not supported by this backend.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};
use pipewire as pw;
use pw::spa;
use pw::spa::param::format::{MediaSubtype, MediaType};
use pw::spa::param::format_utils;
use pw::spa::pod::Pod;
use tokio::sync::mpsc::{self as tokio_mpsc, UnboundedReceiver, UnboundedSender};

use crate::config::{AudioConfig, ChannelLayout, InputSource, SampleFormat};
use crate::device::{AudioBackend, AudioInputDevice, AudioOutputDevice, PlayerEvent};
use crate::error::AudioError;

const APP_NAME: &str = "Voicenote";

/// How much capture data the minimum buffer holds
const MIN_BUFFER_MILLIS: u32 = 100;

/// Chunks buffered between the stream callback and `read` before the
/// callback starts dropping data.
const CAPTURE_QUEUE_DEPTH: usize = 32;

enum LoopCommand {
    Stop,
}

/// PipeWire media role for a capture source. Plain microphone capture is
/// tagged as production audio; the voice-tuned sources ask the session
/// manager for the communication profile (echo cancellation, ducking).
fn capture_media_role(source: InputSource) -> &'static str {
    match source {
        InputSource::Mic => "Production",
        InputSource::VoiceRecognition | InputSource::VoiceCommunication => "Communication",
    }
}

/// PipeWire-backed device factory
#[derive(Clone, Debug, Default)]
pub struct PipewireBackend;

impl PipewireBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for PipewireBackend {
    fn min_input_buffer_size(&self, config: &AudioConfig) -> Result<usize, AudioError> {
        if config.sample_format != SampleFormat::Pcm16 {
            return Err(AudioError::UnsupportedConfig(format!(
                "{}-bit capture not supported",
                config.sample_format.bits_per_sample()
            )));
        }
        if config.channels != ChannelLayout::Mono {
            return Err(AudioError::UnsupportedConfig(
                "only mono capture is supported".to_string(),
            ));
        }
        Ok((config.byte_rate() * MIN_BUFFER_MILLIS / 1000) as usize)
    }

    fn open_input(
        &self,
        config: &AudioConfig,
        buffer_size: usize,
    ) -> Result<Box<dyn AudioInputDevice>, AudioError> {
        let (chunk_tx, chunk_rx) = std_mpsc::sync_channel::<Vec<u8>>(CAPTURE_QUEUE_DEPTH);
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), String>>();
        let (stop_tx, stop_rx) = pw::channel::channel::<LoopCommand>();

        let sample_rate = config.sample_rate_hz;
        let media_role = capture_media_role(config.input_source);
        let handle = thread::spawn(move || {
            if let Err(e) =
                run_capture_loop(sample_rate, media_role, chunk_tx, &ready_tx, stop_rx)
            {
                // If setup already succeeded this only logs; the reader sees
                // the disconnect through the chunk channel.
                let _ = ready_tx.send(Err(e.clone()));
                warn!("pipewire capture loop ended: {}", e);
            }
        });

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(AudioError::DeviceInitFailed(e));
            }
            Err(_) => {
                let _ = stop_tx.send(LoopCommand::Stop);
                let _ = handle.join();
                return Err(AudioError::DeviceInitFailed(
                    "timed out waiting for pipewire stream".to_string(),
                ));
            }
        }

        debug!("pipewire: capture stream up, buffer {} bytes", buffer_size);
        Ok(Box::new(PwInputDevice {
            chunks: chunk_rx,
            pending: Vec::new(),
            stop: Some(stop_tx),
            thread: Some(handle),
        }))
    }

    fn open_output(&self) -> Result<Box<dyn AudioOutputDevice>, AudioError> {
        Ok(Box::new(PwOutputDevice {
            shared: Arc::new(PlayoutShared::default()),
            stop: None,
            thread: None,
        }))
    }
}

/// Microphone handle pulling from the capture thread's chunk queue
struct PwInputDevice {
    chunks: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    stop: Option<pw::channel::Sender<LoopCommand>>,
    thread: Option<JoinHandle<()>>,
}

impl AudioInputDevice for PwInputDevice {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, AudioError> {
        if self.pending.is_empty() {
            match self.chunks.recv_timeout(Duration::from_millis(100)) {
                Ok(chunk) => self.pending = chunk,
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(AudioError::Device {
                        code: -1,
                        detail: "capture stream closed".to_string(),
                    })
                }
            }
        }

        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    fn close(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(LoopCommand::Stop);
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PwInputDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Run the PipeWire capture loop until stopped
fn run_capture_loop(
    sample_rate: u32,
    media_role: &'static str,
    chunks: SyncSender<Vec<u8>>,
    ready: &std_mpsc::Sender<Result<(), String>>,
    stop: pw::channel::Receiver<LoopCommand>,
) -> Result<(), String> {
    pw::init();

    let mainloop = pw::main_loop::MainLoopRc::new(None)
        .map_err(|e| format!("failed to create pipewire main loop: {}", e))?;
    let context = pw::context::ContextRc::new(&mainloop, None)
        .map_err(|e| format!("failed to create pipewire context: {}", e))?;
    let core = context
        .connect_rc(None)
        .map_err(|e| format!("failed to connect to pipewire: {}", e))?;

    let mainloop_weak = mainloop.downgrade();
    let _stop_handle = stop.attach(mainloop.loop_(), move |cmd| match cmd {
        LoopCommand::Stop => {
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });

    struct UserData {
        format: spa::param::audio::AudioInfoRaw,
        chunks: SyncSender<Vec<u8>>,
    }

    let user_data = UserData {
        format: Default::default(),
        chunks,
    };

    let props = pw::properties::properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Capture",
        *pw::keys::MEDIA_ROLE => media_role,
        *pw::keys::APP_NAME => APP_NAME,
    };

    let stream = pw::stream::StreamBox::new(&core, "voicenote-capture", props)
        .map_err(|e| format!("failed to create pipewire stream: {}", e))?;

    let _listener = stream
        .add_local_listener_with_user_data(user_data)
        .param_changed(|_, user_data, id, param| {
            let Some(param) = param else { return };
            if id != spa::param::ParamType::Format.as_raw() {
                return;
            }
            let (media_type, media_subtype) = match format_utils::parse_format(param) {
                Ok(v) => v,
                Err(_) => return,
            };
            if media_type != MediaType::Audio || media_subtype != MediaSubtype::Raw {
                return;
            }
            if user_data.format.parse(param).is_err() {
                warn!("pipewire: failed to parse capture format");
            }
        })
        .process(|stream, user_data| {
            let Some(mut buffer) = stream.dequeue_buffer() else {
                return;
            };
            let datas = buffer.datas_mut();
            if datas.is_empty() {
                return;
            }

            let data = &mut datas[0];
            let n_channels = user_data.format.channels().max(1) as usize;
            let n_samples = data.chunk().size() as usize / std::mem::size_of::<f32>();
            let Some(raw) = data.data() else { return };

            // Downmix to mono by taking channel 0, then quantize to i16 LE.
            let mut pcm = Vec::with_capacity((n_samples / n_channels) * 2);
            for i in (0..n_samples).step_by(n_channels) {
                let start = i * std::mem::size_of::<f32>();
                let end = start + std::mem::size_of::<f32>();
                if end > raw.len() {
                    break;
                }
                let sample =
                    f32::from_le_bytes(raw[start..end].try_into().unwrap_or([0; 4]));
                let quantized = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                pcm.extend_from_slice(&quantized.to_le_bytes());
            }

            match user_data.chunks.try_send(pcm) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    // Reader is behind; dropping is better than blocking the
                    // realtime callback.
                    warn!("pipewire: capture queue full, dropping chunk");
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        })
        .register()
        .map_err(|e| format!("failed to register stream listener: {}", e))?;

    let mut audio_info = spa::param::audio::AudioInfoRaw::new();
    audio_info.set_format(spa::param::audio::AudioFormat::F32LE);
    audio_info.set_rate(sample_rate);
    audio_info.set_channels(1);

    let obj = spa::pod::Object {
        type_: spa::utils::SpaTypes::ObjectParamFormat.as_raw(),
        id: spa::param::ParamType::EnumFormat.as_raw(),
        properties: audio_info.into(),
    };
    let values: Vec<u8> = spa::pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &spa::pod::Value::Object(obj),
    )
    .map_err(|e| format!("failed to serialize audio format: {:?}", e))?
    .0
    .into_inner();
    let mut params = [Pod::from_bytes(&values)
        .ok_or_else(|| "failed to build format pod".to_string())?];

    stream
        .connect(
            spa::utils::Direction::Input,
            None,
            pw::stream::StreamFlags::AUTOCONNECT
                | pw::stream::StreamFlags::MAP_BUFFERS
                | pw::stream::StreamFlags::RT_PROCESS,
            &mut params,
        )
        .map_err(|e| format!("failed to connect stream: {}", e))?;

    let _ = ready.send(Ok(()));
    mainloop.run();

    Ok(())
}

/// Playback position/pause state shared with the playout thread
#[derive(Default)]
struct PlayoutShared {
    /// Next sample index to play.
    position: AtomicUsize,
    paused: AtomicBool,
    /// Set once the source is decoded.
    info: Mutex<Option<SourceInfo>>,
}

#[derive(Clone, Copy)]
struct SourceInfo {
    sample_rate: u32,
    total_samples: usize,
}

impl PlayoutShared {
    fn ms_to_samples(&self, ms: u32) -> usize {
        match *self.info.lock().unwrap() {
            Some(info) => ((ms as u64 * info.sample_rate as u64) / 1000) as usize,
            None => 0,
        }
    }

    fn samples_to_ms(&self, samples: usize) -> u32 {
        match *self.info.lock().unwrap() {
            Some(info) => ((samples as u64 * 1000) / info.sample_rate as u64) as u32,
            None => 0,
        }
    }
}

/// Speaker handle streaming one WAV file
struct PwOutputDevice {
    shared: Arc<PlayoutShared>,
    stop: Option<pw::channel::Sender<LoopCommand>>,
    thread: Option<JoinHandle<()>>,
}

impl AudioOutputDevice for PwOutputDevice {
    fn open(&mut self, path: &Path) -> Result<UnboundedReceiver<PlayerEvent>, AudioError> {
        let (events_tx, events_rx) = tokio_mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = pw::channel::channel::<LoopCommand>();
        self.stop = Some(stop_tx);

        let shared = self.shared.clone();
        let path = path.to_path_buf();
        self.thread = Some(thread::spawn(move || {
            if let Err(detail) = run_playout_loop(&path, shared, &events_tx, stop_rx) {
                let _ = events_tx.send(PlayerEvent::Error { code: -1, detail });
            }
        }));

        Ok(events_rx)
    }

    fn start(&mut self) {
        self.shared.paused.store(false, Ordering::SeqCst);
    }

    fn pause(&mut self) {
        self.shared.paused.store(true, Ordering::SeqCst);
    }

    fn seek_ms(&mut self, position_ms: u32) {
        let target = self.shared.ms_to_samples(position_ms);
        let total = self
            .shared
            .info
            .lock()
            .unwrap()
            .map(|i| i.total_samples)
            .unwrap_or(0);
        self.shared.position.store(target.min(total), Ordering::SeqCst);
    }

    fn position_ms(&self) -> u32 {
        self.shared
            .samples_to_ms(self.shared.position.load(Ordering::SeqCst))
    }

    fn duration_ms(&self) -> u32 {
        let total = self
            .shared
            .info
            .lock()
            .unwrap()
            .map(|i| i.total_samples)
            .unwrap_or(0);
        self.shared.samples_to_ms(total)
    }

    fn set_speed(&mut self, _speed: f32) -> bool {
        // No variable-rate support in this backend.
        false
    }

    fn close(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(LoopCommand::Stop);
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PwOutputDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Decode a WAV file into f32 samples (channel 0 only)
fn load_wav(path: &Path) -> Result<(Vec<f32>, u32), String> {
    let reader = hound::WavReader::open(path).map_err(|e| e.to_string())?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Result<Vec<f32>, _> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .step_by(channels)
            .collect(),
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .step_by(channels)
                .map(|s| s.map(|v| v as f32 / scale))
                .collect()
        }
    };

    samples
        .map(|s| (s, spec.sample_rate))
        .map_err(|e| e.to_string())
}

/// Run the PipeWire playout loop until stopped or the source is exhausted
fn run_playout_loop(
    path: &Path,
    shared: Arc<PlayoutShared>,
    events: &UnboundedSender<PlayerEvent>,
    stop: pw::channel::Receiver<LoopCommand>,
) -> Result<(), String> {
    let (samples, sample_rate) = load_wav(path)?;
    let total_samples = samples.len();
    *shared.info.lock().unwrap() = Some(SourceInfo {
        sample_rate,
        total_samples,
    });
    shared.position.store(0, Ordering::SeqCst);

    pw::init();

    let mainloop = pw::main_loop::MainLoopRc::new(None)
        .map_err(|e| format!("failed to create pipewire main loop: {}", e))?;
    let context = pw::context::ContextRc::new(&mainloop, None)
        .map_err(|e| format!("failed to create pipewire context: {}", e))?;
    let core = context
        .connect_rc(None)
        .map_err(|e| format!("failed to connect to pipewire: {}", e))?;

    let mainloop_weak = mainloop.downgrade();
    let _stop_handle = stop.attach(mainloop.loop_(), move |cmd| match cmd {
        LoopCommand::Stop => {
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });

    struct UserData {
        format: spa::param::audio::AudioInfoRaw,
        samples: Vec<f32>,
        shared: Arc<PlayoutShared>,
        events: UnboundedSender<PlayerEvent>,
        mainloop_weak: pw::main_loop::MainLoopWeak,
        completed: bool,
    }

    let user_data = UserData {
        format: Default::default(),
        samples,
        shared: shared.clone(),
        events: events.clone(),
        mainloop_weak: mainloop.downgrade(),
        completed: false,
    };

    let props = pw::properties::properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Playback",
        *pw::keys::MEDIA_ROLE => "Music",
        *pw::keys::APP_NAME => APP_NAME,
    };

    let stream = pw::stream::StreamBox::new(&core, "voicenote-playback", props)
        .map_err(|e| format!("failed to create pipewire stream: {}", e))?;

    let _listener = stream
        .add_local_listener_with_user_data(user_data)
        .param_changed(|_, user_data, id, param| {
            let Some(param) = param else { return };
            if id != spa::param::ParamType::Format.as_raw() {
                return;
            }
            let (media_type, media_subtype) = match format_utils::parse_format(param) {
                Ok(v) => v,
                Err(_) => return,
            };
            if media_type != MediaType::Audio || media_subtype != MediaSubtype::Raw {
                return;
            }
            if user_data.format.parse(param).is_err() {
                warn!("pipewire: failed to parse playback format");
            }
        })
        .process(|stream, user_data| {
            let Some(mut buffer) = stream.dequeue_buffer() else {
                return;
            };
            let datas = buffer.datas_mut();
            if datas.is_empty() {
                return;
            }

            let data = &mut datas[0];
            let n_channels = user_data.format.channels().max(1) as usize;
            let stride = std::mem::size_of::<f32>() * n_channels;
            let Some(slice) = data.data() else { return };
            let n_frames = slice.len() / stride;

            let paused = user_data.shared.paused.load(Ordering::SeqCst);
            let position = user_data.shared.position.load(Ordering::SeqCst);

            if paused || position >= user_data.samples.len() {
                // Emit silence; when the source is exhausted also finish.
                slice.fill(0);
                let chunk = data.chunk_mut();
                *chunk.offset_mut() = 0;
                *chunk.stride_mut() = stride as i32;
                *chunk.size_mut() = (n_frames * stride) as u32;

                if !paused && !user_data.completed {
                    user_data.completed = true;
                    let _ = user_data.events.send(PlayerEvent::Completed);
                    if let Some(mainloop) = user_data.mainloop_weak.upgrade() {
                        mainloop.quit();
                    }
                }
                return;
            }

            let end = (position + n_frames).min(user_data.samples.len());
            let frames = &user_data.samples[position..end];
            for (i, &sample) in frames.iter().enumerate() {
                let bytes = sample.to_le_bytes();
                let offset = i * stride;
                // Duplicate the mono source into every output channel.
                for ch in 0..n_channels {
                    let at = offset + ch * 4;
                    if at + 4 <= slice.len() {
                        slice[at..at + 4].copy_from_slice(&bytes);
                    }
                }
            }
            let written = frames.len() * stride;
            if written < slice.len() {
                slice[written..].fill(0);
            }

            let chunk = data.chunk_mut();
            *chunk.offset_mut() = 0;
            *chunk.stride_mut() = stride as i32;
            *chunk.size_mut() = written as u32;

            user_data.shared.position.store(end, Ordering::SeqCst);
        })
        .register()
        .map_err(|e| format!("failed to register stream listener: {}", e))?;

    let mut audio_info = spa::param::audio::AudioInfoRaw::new();
    audio_info.set_format(spa::param::audio::AudioFormat::F32LE);
    audio_info.set_rate(sample_rate);

    let obj = spa::pod::Object {
        type_: spa::utils::SpaTypes::ObjectParamFormat.as_raw(),
        id: spa::param::ParamType::EnumFormat.as_raw(),
        properties: audio_info.into(),
    };
    let values: Vec<u8> = spa::pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &spa::pod::Value::Object(obj),
    )
    .map_err(|e| format!("failed to serialize audio format: {:?}", e))?
    .0
    .into_inner();
    let mut params = [Pod::from_bytes(&values)
        .ok_or_else(|| "failed to build format pod".to_string())?];

    stream
        .connect(
            spa::utils::Direction::Output,
            None,
            pw::stream::StreamFlags::AUTOCONNECT
                | pw::stream::StreamFlags::MAP_BUFFERS
                | pw::stream::StreamFlags::RT_PROCESS,
            &mut params,
        )
        .map_err(|e| format!("failed to connect stream: {}", e))?;

    // Start paused; the playback component calls start() on Prepared.
    shared.paused.store(true, Ordering::SeqCst);
    let duration_ms = shared.samples_to_ms(total_samples);
    let _ = events.send(PlayerEvent::Prepared { duration_ms });

    mainloop.run();

    Ok(())
}
