//! Integration tests — full session lifecycle, frame and audio routing,
//! input forwarding and error scenarios against a scripted engine.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use lumen_core::{
    AudioDecoder, AudioDecoderFactory, AudioFormat, AudioRenderer, ConnectionListener,
    DecodeUnit, DecoderStatus, EngineCallbacks, GrowthPolicy, InputEvent, KeyAction, LumenError,
    Modifiers, MouseButton, MouseButtonAction, ProtocolEngine, ReassemblyConfig, Stage,
    StatusCode, StreamConfiguration, StreamRouter, VideoRenderer,
};

// ── Helpers ──────────────────────────────────────────────────────

/// Ordered record of every capability call, shared by all fakes.
type Log = Arc<Mutex<Vec<String>>>;

fn push(log: &Log, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Engine driven by the test: `start` plays the usual handshake unless
/// told to refuse, and keeps the callback table for later injection.
struct ScriptedEngine {
    log: Log,
    refuse_with: StatusCode,
    input_status: StatusCode,
    callbacks: Mutex<Option<EngineCallbacks>>,
    inputs: Mutex<Vec<InputEvent>>,
}

impl ScriptedEngine {
    fn new(log: &Log) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::clone(log),
            refuse_with: 0,
            input_status: 0,
            callbacks: Mutex::new(None),
            inputs: Mutex::new(Vec::new()),
        })
    }

    fn refusing(log: &Log, status: StatusCode) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::clone(log),
            refuse_with: status,
            input_status: 0,
            callbacks: Mutex::new(None),
            inputs: Mutex::new(Vec::new()),
        })
    }

    fn with_input_status(log: &Log, status: StatusCode) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::clone(log),
            refuse_with: 0,
            input_status: status,
            callbacks: Mutex::new(None),
            inputs: Mutex::new(Vec::new()),
        })
    }

    fn callbacks(&self) -> EngineCallbacks {
        self.callbacks.lock().unwrap().clone().expect("engine started")
    }
}

impl ProtocolEngine for ScriptedEngine {
    fn start(&self, host: &str, config: &StreamConfiguration, cb: EngineCallbacks) -> StatusCode {
        push(&self.log, format!("engine.start {host}"));
        if self.refuse_with != 0 {
            return self.refuse_with;
        }
        for stage in [Stage::Handshake, Stage::VideoStreamInit, Stage::AudioStreamInit] {
            cb.stage_starting(stage);
            cb.stage_complete(stage);
        }
        cb.video_setup(config.width, config.height, config.fps, 0);
        cb.video_start();
        cb.audio_init();
        cb.audio_start();
        cb.connection_started();
        *self.callbacks.lock().unwrap() = Some(cb);
        0
    }

    fn stop(&self) {
        push(&self.log, "engine.stop");
        if let Some(cb) = self.callbacks.lock().unwrap().clone() {
            cb.video_stop();
            cb.audio_stop();
            cb.video_cleanup();
            cb.audio_cleanup();
        }
    }

    fn send_input(&self, event: &InputEvent) -> StatusCode {
        self.inputs.lock().unwrap().push(*event);
        self.input_status
    }
}

struct LoggingVideo {
    log: Log,
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl VideoRenderer for LoggingVideo {
    fn setup(&mut self, width: u32, height: u32, refresh_rate_hz: u32, _flags: u32) {
        push(&self.log, format!("video.setup {width}x{height}@{refresh_rate_hz}"));
    }

    fn start(&mut self) {
        push(&self.log, "video.start");
    }

    fn stop(&mut self) {
        push(&self.log, "video.stop");
    }

    fn submit_frame(&mut self, frame: &[u8]) -> DecoderStatus {
        self.frames.lock().unwrap().push(frame.to_vec());
        DecoderStatus::Ok
    }

    fn destroy(&mut self) {
        push(&self.log, "video.destroy");
    }
}

struct LoggingAudio {
    log: Log,
    played: Arc<Mutex<Vec<usize>>>,
}

impl AudioRenderer for LoggingAudio {
    fn init(&mut self) {
        push(&self.log, "audio.init");
    }

    fn play_sample(&mut self, pcm: &[u8]) {
        self.played.lock().unwrap().push(pcm.len());
    }

    fn destroy(&mut self) {
        push(&self.log, "audio.destroy");
    }
}

struct LoggingListener {
    log: Log,
}

impl ConnectionListener for LoggingListener {
    fn stage_starting(&self, stage: Stage) {
        push(&self.log, format!("stage.starting {}", stage.ordinal()));
    }

    fn stage_complete(&self, stage: Stage) {
        push(&self.log, format!("stage.complete {}", stage.ordinal()));
    }

    fn connection_started(&self) {
        push(&self.log, "connection.started");
    }

    fn connection_terminated(&self, error_code: i64) {
        push(&self.log, format!("connection.terminated {error_code}"));
    }

    fn display_message(&self, message: &str) {
        push(&self.log, format!("message {message}"));
    }
}

/// Decoder whose sample count is the first byte of the packet, as `i8`.
struct ByteCountDecoder;

impl AudioDecoder for ByteCountDecoder {
    fn decode(&mut self, packet: &[u8], pcm: &mut [i16], _max: usize) -> i32 {
        pcm.fill(1);
        packet.first().map_or(0, |&b| b as i8 as i32)
    }
}

fn decoders() -> Arc<dyn AudioDecoderFactory> {
    Arc::new(|_fmt: AudioFormat| -> Result<Box<dyn AudioDecoder>, LumenError> {
        Ok(Box::new(ByteCountDecoder))
    })
}

struct Harness {
    log: Log,
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
    played: Arc<Mutex<Vec<usize>>>,
}

impl Harness {
    fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            frames: Arc::new(Mutex::new(Vec::new())),
            played: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn start(&self, router: &StreamRouter) -> Result<(), LumenError> {
        router.start_connection(
            "192.168.1.20",
            StreamConfiguration::new(1280, 720, 60),
            Arc::new(LoggingListener {
                log: Arc::clone(&self.log),
            }),
            Box::new(LoggingVideo {
                log: Arc::clone(&self.log),
                frames: Arc::clone(&self.frames),
            }),
            Box::new(LoggingAudio {
                log: Arc::clone(&self.log),
                played: Arc::clone(&self.played),
            }),
        )
    }
}

fn unit(parts: &[&'static [u8]]) -> DecodeUnit {
    DecodeUnit::new(parts.iter().map(|&p| Bytes::from_static(p)).collect())
}

// ── Session lifecycle ────────────────────────────────────────────

#[test]
fn test_connect_routes_handshake() {
    let h = Harness::new();
    let engine = ScriptedEngine::new(&h.log);
    let router = StreamRouter::new(engine.clone(), decoders());

    h.start(&router).unwrap();
    assert!(router.is_connected());

    let log = entries(&h.log);
    assert_eq!(log[0], "engine.start 192.168.1.20");
    assert!(log.contains(&"stage.starting 2".to_string()));
    assert!(log.contains(&"stage.complete 5".to_string()));
    assert!(log.contains(&"video.setup 1280x720@60".to_string()));
    assert!(log.contains(&"audio.init".to_string()));
    assert_eq!(log.last().unwrap(), "connection.started");
}

#[test]
fn test_refused_start_reports_no_stages() {
    let h = Harness::new();
    let engine = ScriptedEngine::refusing(&h.log, -1);
    let router = StreamRouter::new(engine.clone(), decoders());

    let err = h.start(&router).unwrap_err();
    assert!(matches!(err, LumenError::ConnectFailed(-1)));
    assert!(router.phase().is_idle());
    assert_eq!(entries(&h.log), vec!["engine.start 192.168.1.20"]);

    // The router accepts a fresh start afterwards.
    let ok = ScriptedEngine::new(&h.log);
    let router = StreamRouter::new(ok, decoders());
    h.start(&router).unwrap();
    assert!(router.is_connected());
}

#[test]
fn test_second_start_is_rejected() {
    let h = Harness::new();
    let engine = ScriptedEngine::new(&h.log);
    let router = StreamRouter::new(engine.clone(), decoders());
    h.start(&router).unwrap();

    let err = h.start(&router).unwrap_err();
    assert!(matches!(err, LumenError::InvalidState { phase: "Connected", .. }));
    assert!(router.is_connected());

    // The first session keeps working.
    engine.callbacks().submit_decode_unit(&unit(&[b"still", b"here"]));
    assert_eq!(h.frames.lock().unwrap().as_slice(), &[b"stillhere".to_vec()]);
}

#[test]
fn test_stop_from_idle_is_rejected() {
    let h = Harness::new();
    let router = StreamRouter::new(ScriptedEngine::new(&h.log), decoders());
    assert!(matches!(
        router.stop_connection(),
        Err(LumenError::InvalidState { phase: "Idle", .. })
    ));
    assert!(entries(&h.log).is_empty());
}

#[test]
fn test_stop_destroys_video_then_audio() {
    let h = Harness::new();
    let engine = ScriptedEngine::new(&h.log);
    let router = StreamRouter::new(engine.clone(), decoders());
    h.start(&router).unwrap();
    h.log.lock().unwrap().clear();

    router.stop_connection().unwrap();
    assert!(router.phase().is_idle());

    let log = entries(&h.log);
    let video = log.iter().position(|e| e == "video.destroy").unwrap();
    let audio = log.iter().position(|e| e == "audio.destroy").unwrap();
    assert_eq!(log[0], "engine.stop");
    assert!(video < audio);

    // Stopping twice is harmless.
    assert!(router.stop_connection().is_err());
    assert_eq!(entries(&h.log).iter().filter(|e| *e == "engine.stop").count(), 1);
}

#[test]
fn test_engine_termination_tears_down() {
    let h = Harness::new();
    let engine = ScriptedEngine::new(&h.log);
    let router = StreamRouter::new(engine.clone(), decoders());
    h.start(&router).unwrap();
    let cb = engine.callbacks();

    cb.connection_terminated(-100);
    assert!(router.phase().is_idle());

    let log = entries(&h.log);
    let notified = log.iter().position(|e| e == "connection.terminated -100").unwrap();
    let stopped = log.iter().position(|e| e == "engine.stop").unwrap();
    assert!(notified < stopped);
    assert!(log.contains(&"video.destroy".to_string()));

    // Late frames from the dead session only get a keyframe request back.
    assert_eq!(cb.submit_decode_unit(&unit(&[b"late"])), -1);
    assert!(h.frames.lock().unwrap().is_empty());
    assert!(matches!(
        router.send_mouse_move(1, 1),
        Err(LumenError::InvalidState { .. })
    ));
}

#[test]
fn test_restart_ignores_previous_session_callbacks() {
    let first = Harness::new();
    let engine = ScriptedEngine::new(&first.log);
    let router = StreamRouter::new(engine.clone(), decoders());
    first.start(&router).unwrap();
    let stale = engine.callbacks();
    router.stop_connection().unwrap();

    let second = Harness::new();
    second.start(&router).unwrap();
    let fresh = engine.callbacks();
    assert!(fresh.generation() > stale.generation());

    assert_eq!(stale.submit_decode_unit(&unit(&[b"old"])), -1);
    stale.decode_and_play_sample(&[10]);
    stale.display_message("from the past");
    stale.connection_terminated(-7);

    assert!(router.is_connected());
    assert!(second.frames.lock().unwrap().is_empty());
    assert!(second.played.lock().unwrap().is_empty());
    let log = entries(&second.log);
    assert!(!log.iter().any(|e| e.starts_with("message") || e.starts_with("connection.terminated")));
    assert!(!log.contains(&"video.destroy".to_string()));

    assert_eq!(fresh.submit_decode_unit(&unit(&[b"new"])), 0);
    assert_eq!(second.frames.lock().unwrap().as_slice(), &[b"new".to_vec()]);
    assert_eq!(router.stats().frames_submitted, 1);
}

#[test]
fn test_unusable_buffer_config_fails_start() {
    let h = Harness::new();
    let engine = ScriptedEngine::new(&h.log);
    let config = ReassemblyConfig {
        initial_capacity: 0,
        max_frame_size: 0,
        ..Default::default()
    };
    let router = StreamRouter::with_reassembly(engine.clone(), decoders(), config);

    assert!(matches!(h.start(&router), Err(LumenError::InvalidConfig(_))));
    assert!(router.phase().is_idle());
    assert!(entries(&h.log).is_empty());
}

#[test]
fn test_messages_reach_listener() {
    let h = Harness::new();
    let engine = ScriptedEngine::new(&h.log);
    let router = StreamRouter::new(engine.clone(), decoders());
    h.start(&router).unwrap();

    engine.callbacks().display_message("Host is busy");
    assert_eq!(entries(&h.log).last().unwrap(), "message Host is busy");
}

// ── Video ────────────────────────────────────────────────────────

#[test]
fn test_fragments_are_joined_in_order() {
    let h = Harness::new();
    let engine = ScriptedEngine::new(&h.log);
    let router = StreamRouter::new(engine.clone(), decoders());
    h.start(&router).unwrap();

    let status = engine.callbacks().submit_decode_unit(&unit(&[b"AB", b"", b"CDE"]));
    assert_eq!(status, 0);
    assert_eq!(h.frames.lock().unwrap().as_slice(), &[b"ABCDE".to_vec()]);
    assert_eq!(router.stats().bytes_reassembled, 5);
}

#[test]
fn test_submit_before_connected_is_rejected() {
    let h = Harness::new();
    let router = StreamRouter::new(ScriptedEngine::new(&h.log), decoders());
    assert!(matches!(
        router.submit_decode_unit(&unit(&[b"early"])),
        Err(LumenError::InvalidState { .. })
    ));
    assert!(h.frames.lock().unwrap().is_empty());
}

#[test]
fn test_buffer_grows_exactly_and_is_reused() {
    let h = Harness::new();
    let engine = ScriptedEngine::new(&h.log);
    let router = StreamRouter::new(engine.clone(), decoders());
    h.start(&router).unwrap();
    assert_eq!(router.stats().buffer_capacity, 1_048_576);

    let big = DecodeUnit::new(vec![Bytes::from(vec![7u8; 2_000_000])]);
    assert_eq!(router.submit_decode_unit(&big).unwrap(), DecoderStatus::Ok);
    assert_eq!(router.stats().buffer_capacity, 2_000_000);

    let small = DecodeUnit::new(vec![Bytes::from(vec![9u8; 500_000])]);
    router.submit_decode_unit(&small).unwrap();

    let stats = router.stats();
    assert_eq!(stats.buffer_capacity, 2_000_000);
    assert_eq!(stats.buffer_reallocations, 1);
    assert_eq!(h.frames.lock().unwrap()[1].len(), 500_000);
}

#[test]
fn test_doubling_growth_policy() {
    let h = Harness::new();
    let engine = ScriptedEngine::new(&h.log);
    let config = ReassemblyConfig {
        growth: GrowthPolicy::Doubling,
        ..Default::default()
    };
    let router = StreamRouter::with_reassembly(engine.clone(), decoders(), config);
    h.start(&router).unwrap();

    let big = DecodeUnit::new(vec![Bytes::from(vec![1u8; 1_500_000])]);
    router.submit_decode_unit(&big).unwrap();
    assert_eq!(router.stats().buffer_capacity, 2_097_152);
}

#[test]
fn test_oversized_frame_requests_keyframe_status() {
    let h = Harness::new();
    let engine = ScriptedEngine::new(&h.log);
    let config = ReassemblyConfig {
        initial_capacity: 16,
        max_frame_size: 16,
        ..Default::default()
    };
    let router = StreamRouter::with_reassembly(engine.clone(), decoders(), config);
    h.start(&router).unwrap();

    let status = engine
        .callbacks()
        .submit_decode_unit(&DecodeUnit::new(vec![Bytes::from(vec![0u8; 17])]));
    assert_eq!(status, -1);
    assert_eq!(router.stats().frames_rejected, 1);
    assert!(h.frames.lock().unwrap().is_empty());
}

// ── Audio ────────────────────────────────────────────────────────

#[test]
fn test_audio_plays_only_decoded_packets() {
    let h = Harness::new();
    let engine = ScriptedEngine::new(&h.log);
    let router = StreamRouter::new(engine.clone(), decoders());
    h.start(&router).unwrap();
    let cb = engine.callbacks();

    cb.decode_and_play_sample(&[120]);
    cb.decode_and_play_sample(&[0]);
    cb.decode_and_play_sample(&[0xFB]); // -5
    router.decode_and_play_sample(&[100]);

    assert_eq!(h.played.lock().unwrap().as_slice(), &[480, 400]);
    let stats = router.stats();
    assert_eq!(stats.audio_packets_played, 2);
    assert_eq!(stats.audio_packets_dropped, 2);
}

#[test]
fn test_audio_after_stop_is_ignored() {
    let h = Harness::new();
    let engine = ScriptedEngine::new(&h.log);
    let router = StreamRouter::new(engine.clone(), decoders());
    h.start(&router).unwrap();
    let cb = engine.callbacks();
    router.stop_connection().unwrap();

    cb.decode_and_play_sample(&[10]);
    assert!(h.played.lock().unwrap().is_empty());
}

// ── Input ────────────────────────────────────────────────────────

#[test]
fn test_input_status_passes_through() {
    let h = Harness::new();
    let engine = ScriptedEngine::with_input_status(&h.log, -3);
    let router = StreamRouter::new(engine.clone(), decoders());
    h.start(&router).unwrap();

    assert_eq!(
        router
            .send_mouse_button(MouseButtonAction::Press, MouseButton::Left)
            .unwrap(),
        -3
    );
    assert_eq!(
        router
            .send_keyboard_event(0x41, KeyAction::Down, Modifiers::SHIFT)
            .unwrap(),
        -3
    );

    let inputs = engine.inputs.lock().unwrap();
    assert_eq!(inputs[0], InputEvent::press(MouseButton::Left));
    assert_eq!(inputs[1], InputEvent::key_down(0x41, Modifiers::SHIFT));
}

#[test]
fn test_input_before_connect_is_rejected() {
    let h = Harness::new();
    let engine = ScriptedEngine::new(&h.log);
    let router = StreamRouter::new(engine.clone(), decoders());
    assert!(router.send_scroll_event(1).is_err());
    assert!(engine.inputs.lock().unwrap().is_empty());
}

// ── Concurrency ──────────────────────────────────────────────────

#[tokio::test]
async fn test_stats_observed_from_engine_thread() {
    let h = Harness::new();
    let engine = ScriptedEngine::new(&h.log);
    let router = StreamRouter::new(engine.clone(), decoders());
    h.start(&router).unwrap();
    let mut rx = router.stats_receiver();

    let cb = engine.callbacks();
    let worker = std::thread::spawn(move || {
        for _ in 0..10 {
            cb.submit_decode_unit(&unit(&[b"frame"]));
        }
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while rx.borrow_and_update().frames_submitted < 10 {
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("timeout");

    worker.join().unwrap();
    assert_eq!(h.frames.lock().unwrap().len(), 10);
}
