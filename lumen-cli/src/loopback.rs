//! In-process protocol engine.
//!
//! Plays the role of the native streaming engine without a network: it walks
//! through the connection stages, then a worker thread delivers synthetic
//! fragmented video frames and raw PCM audio packets through the callback
//! table until the configured frame count is reached or the router stops it.
//!
//! Input events are encoded to their byte form and counted, standing in for
//! transmission.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Notify;
use tracing::{debug, info, trace, warn};

use lumen_core::error::STATUS_INVALID_STATE;
use lumen_core::stream::audio::MAX_SAMPLES_PER_CHANNEL;
use lumen_core::stream::{DR_NEED_IDR, DR_OK};
use lumen_core::{
    AudioDecoder, AudioFormat, DecodeUnit, EngineCallbacks, InputEvent, LumenError,
    ProtocolEngine, Stage, StatusCode, StreamConfiguration,
};

use crate::config::LoopbackConfig;

/// Status returned when the engine refuses to connect.
pub const LOOPBACK_REFUSED: StatusCode = -1;

/// Ordinal range the engine reports stages with.
const STAGE_ORDINALS: std::ops::RangeInclusive<i32> = 1..=10;

// ── RawPcmDecoder ────────────────────────────────────────────────

/// "Decoder" for packets that already carry interleaved little-endian
/// 16-bit PCM.
#[derive(Debug)]
pub struct RawPcmDecoder {
    channels: usize,
}

impl RawPcmDecoder {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            channels: format.channels.max(1),
        }
    }

    /// Factory closure for [`StreamRouter`](lumen_core::StreamRouter).
    pub fn factory(format: AudioFormat) -> Result<Box<dyn AudioDecoder>, LumenError> {
        Ok(Box::new(Self::new(format)))
    }
}

impl AudioDecoder for RawPcmDecoder {
    fn decode(&mut self, packet: &[u8], pcm: &mut [i16], max_samples_per_channel: usize) -> i32 {
        let limit = (max_samples_per_channel * self.channels).min(pcm.len());
        let samples = (packet.len() / 2).min(limit);
        let frames = samples / self.channels;
        for (dst, src) in pcm.iter_mut().zip(packet.chunks_exact(2)).take(frames * self.channels) {
            *dst = i16::from_le_bytes([src[0], src[1]]);
        }
        frames as i32
    }
}

// ── Synthetic payloads ───────────────────────────────────────────

/// Frame `number` split into `fragments` zero-copy slices.
pub fn synthetic_unit(number: u64, frame_size: usize, fragments: u32) -> DecodeUnit {
    let frame = Bytes::from(vec![(number % 251) as u8; frame_size]);
    let chunk = frame_size.div_ceil(fragments.max(1) as usize).max(1);
    let parts = (0..frame_size)
        .step_by(chunk)
        .map(|start| frame.slice(start..(start + chunk).min(frame_size)))
        .collect();
    DecodeUnit::new(parts).with_frame_number(number)
}

/// One 5 ms stereo packet of a sawtooth.
pub fn synthetic_packet(number: u64) -> Vec<u8> {
    (0..MAX_SAMPLES_PER_CHANNEL * 2)
        .flat_map(|i| (((i as u64 + number) % 256) as i16 * 64).to_le_bytes())
        .collect()
}

// ── LoopbackEngine ───────────────────────────────────────────────

struct Running {
    callbacks: EngineCallbacks,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

/// Engine that streams synthetic media from a local thread.
pub struct LoopbackEngine {
    settings: LoopbackConfig,
    running: Mutex<Option<Running>>,
    finished: Arc<Notify>,
    inputs_sent: AtomicU64,
    input_bytes: AtomicU64,
}

impl LoopbackEngine {
    pub fn new(settings: LoopbackConfig) -> Self {
        Self {
            settings,
            running: Mutex::new(None),
            finished: Arc::new(Notify::new()),
            inputs_sent: AtomicU64::new(0),
            input_bytes: AtomicU64::new(0),
        }
    }

    /// Resolves once the worker has delivered every frame or was stopped.
    pub async fn wait_finished(&self) {
        self.finished.notified().await;
    }

    /// Input events transmitted so far.
    pub fn inputs_sent(&self) -> u64 {
        self.inputs_sent.load(Ordering::Relaxed)
    }

    /// Encoded input bytes transmitted so far.
    pub fn input_bytes(&self) -> u64 {
        self.input_bytes.load(Ordering::Relaxed)
    }

    /// Report an unexpected loss of the connection, as a server dropping
    /// the stream would.
    pub fn simulate_termination(&self, error_code: i64) {
        let callbacks = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|r| r.callbacks.clone());
        if let Some(callbacks) = callbacks {
            callbacks.connection_terminated(error_code);
        }
    }

    /// Walk the stages, bringing video and audio up along the way.
    fn bring_up(&self, config: &StreamConfiguration, cb: &EngineCallbacks) -> StatusCode {
        for ordinal in STAGE_ORDINALS {
            let stage = match Stage::from_ordinal(ordinal) {
                Ok(stage) => stage,
                Err(e) => {
                    warn!("skipping stage: {e}");
                    continue;
                }
            };
            cb.stage_starting(stage);
            match stage {
                Stage::VideoStreamInit => {
                    cb.video_setup(config.width, config.height, config.fps, 0);
                }
                Stage::AudioStreamInit => {
                    let status = cb.audio_init();
                    if status != DR_OK {
                        cb.stage_failed(stage, i64::from(status));
                        return status;
                    }
                }
                Stage::VideoStreamStart => cb.video_start(),
                Stage::AudioStreamStart => cb.audio_start(),
                _ => {}
            }
            cb.stage_complete(stage);
        }
        DR_OK
    }

    fn spawn_worker(&self, callbacks: EngineCallbacks, stop: Arc<AtomicBool>) -> JoinHandle<()> {
        let settings = self.settings.clone();
        let finished = Arc::clone(&self.finished);
        std::thread::spawn(move || {
            let interval = Duration::from_millis(settings.frame_interval_ms);
            let mut keyframe_requests = 0u64;
            let mut delivered = 0u64;

            for number in 0..u64::from(settings.frames) {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                let unit =
                    synthetic_unit(number, settings.frame_size, settings.fragments_per_frame);
                match callbacks.submit_decode_unit(&unit) {
                    DR_OK => {}
                    DR_NEED_IDR => keyframe_requests += 1,
                    STATUS_INVALID_STATE => break,
                    other => trace!(frame = number, status = other, "renderer status"),
                }
                if number < u64::from(settings.audio_packets) {
                    callbacks.decode_and_play_sample(&synthetic_packet(number));
                }
                delivered += 1;
                if !interval.is_zero() {
                    std::thread::sleep(interval);
                }
            }

            debug!(delivered, keyframe_requests, "loopback worker finished");
            callbacks.display_transient_message("loopback stream complete");
            finished.notify_one();
        })
    }
}

impl ProtocolEngine for LoopbackEngine {
    fn start(
        &self,
        host: &str,
        config: &StreamConfiguration,
        callbacks: EngineCallbacks,
    ) -> StatusCode {
        if host.trim().is_empty() {
            warn!("no host to connect to");
            return LOOPBACK_REFUSED;
        }
        info!(host, key_id = config.remote_input.key_id(), "loopback connecting");

        let status = self.bring_up(config, &callbacks);
        if status != DR_OK {
            return status;
        }
        callbacks.connection_started();

        let stop = Arc::new(AtomicBool::new(false));
        let worker = self.spawn_worker(callbacks.clone(), Arc::clone(&stop));
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = Some(Running {
            callbacks,
            stop,
            worker: Some(worker),
        });
        DR_OK
    }

    fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut running) = running else {
            return;
        };

        running.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = running.worker.take() {
            if worker.thread().id() == std::thread::current().id() {
                debug!("stop requested from the worker thread");
            } else if worker.join().is_err() {
                warn!("loopback worker panicked");
            }
        }

        let cb = &running.callbacks;
        cb.video_stop();
        cb.audio_stop();
        cb.video_cleanup();
        cb.audio_cleanup();
        info!(inputs = self.inputs_sent(), "loopback stopped");
    }

    fn send_input(&self, event: &InputEvent) -> StatusCode {
        match event.to_bytes() {
            Ok(bytes) => {
                self.inputs_sent.fetch_add(1, Ordering::Relaxed);
                self.input_bytes
                    .fetch_add(bytes.len() as u64, Ordering::Relaxed);
                trace!(kind = event.kind(), len = bytes.len(), "input sent");
                DR_OK
            }
            Err(e) => {
                warn!("input not encodable: {e}");
                LOOPBACK_REFUSED
            }
        }
    }
}

impl std::fmt::Debug for LoopbackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackEngine")
            .field("settings", &self.settings)
            .field("inputs_sent", &self.inputs_sent())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────
