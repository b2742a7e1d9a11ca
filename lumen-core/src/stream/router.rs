//! Callback dispatch router.
//!
//! Owns the single streaming session and routes every engine-originated
//! event to it:
//!
//! 1. [`StreamRouter::start_connection`] installs the host's capabilities
//!    and hands the engine an [`EngineCallbacks`] table.
//! 2. Video decode units go through the session's [`FrameReassembler`] and
//!    then to its [`VideoRenderer`]; the renderer's status flows back to the
//!    engine.
//! 3. Audio packets go through the external decoder into the
//!    [`AudioRenderer`].
//! 4. Input events from the host are forwarded to the engine unchanged.
//! 5. [`StreamRouter::stop_connection`] or an engine-reported termination
//!    tears the session down.
//!
//! # Locking
//!
//! # Generations
//!
//! Every session gets a generation number when it is installed, and the
//! [`EngineCallbacks`] table handed to the engine carries it. Callbacks whose
//! generation does not match the installed session are ignored (submission
//! answers with a keyframe request), so a table kept by the engine past a
//! stop cannot reach the next session.
//!
//! Router state sits behind one mutex that is never held while calling the
//! engine or a capability. The video path (renderer + reassembler) and the
//! audio path each have their own mutex, which makes the reassembler a
//! single-writer buffer even if the engine ever delivered frames from more
//! than one thread.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::error::{LumenError, STATUS_INVALID_STATE};
use crate::protocol::{
    ControllerState, InputEvent, KeyAction, Modifiers, MouseButton, MouseButtonAction,
    StreamConfiguration,
};
use crate::state::{SessionPhase, Stage};
use crate::stream::audio::{AudioDecoderFactory, AudioPipeline};
use crate::stream::decode_unit::DecodeUnit;
use crate::stream::engine::{EngineCallbacks, ProtocolEngine};
use crate::stream::reassembly::{FrameReassembler, ReassemblyConfig};
use crate::stream::renderer::{
    AudioRenderer, ConnectionListener, DecoderStatus, StatusCode, VideoRenderer,
};
use crate::stream::stats::{StatsPublisher, StreamStats};

/// Lock ignoring poisoning: a panicking capability must not wedge teardown.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Session ──────────────────────────────────────────────────────

struct VideoPipeline {
    renderer: Box<dyn VideoRenderer>,
    reassembler: FrameReassembler,
}

/// Everything that belongs to one connection.
struct Session {
    generation: u64,
    host: String,
    config: StreamConfiguration,
    listener: Arc<dyn ConnectionListener>,
    video: Mutex<VideoPipeline>,
    audio: Mutex<AudioPipeline>,
}

impl Session {
    fn new(
        generation: u64,
        host: &str,
        config: StreamConfiguration,
        listener: Arc<dyn ConnectionListener>,
        video: Box<dyn VideoRenderer>,
        audio: Box<dyn AudioRenderer>,
        reassembly: ReassemblyConfig,
    ) -> Result<Self, LumenError> {
        Ok(Self {
            generation,
            host: host.to_string(),
            config,
            listener,
            video: Mutex::new(VideoPipeline {
                renderer: video,
                reassembler: FrameReassembler::with_config(reassembly)?,
            }),
            audio: Mutex::new(AudioPipeline::new(audio)),
        })
    }
}

#[derive(Default)]
struct RouterState {
    phase: SessionPhase,
    session: Option<Arc<Session>>,
    /// Generation handed to the most recently installed session.
    generation: u64,
}

impl RouterState {
    fn current_generation(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.generation)
    }
}

// ── RouterShared ─────────────────────────────────────────────────

/// State shared between the host-facing router and the engine callbacks.
pub(crate) struct RouterShared {
    engine: Arc<dyn ProtocolEngine>,
    decoders: Arc<dyn AudioDecoderFactory>,
    reassembly: ReassemblyConfig,
    state: Mutex<RouterState>,
    stats: StatsPublisher,
}

impl RouterShared {
    fn phase(&self) -> SessionPhase {
        lock(&self.state).phase.clone()
    }

    /// Session of `generation` if it is still installed, whatever the phase.
    fn installed(&self, generation: u64) -> Option<Arc<Session>> {
        let state = lock(&self.state);
        match &state.session {
            Some(session) if session.generation == generation => Some(Arc::clone(session)),
            _ => {
                trace!(
                    generation,
                    current = ?state.current_generation(),
                    "callback from stale session ignored"
                );
                None
            }
        }
    }

    /// Session if the connection is up; `InvalidState` otherwise.
    ///
    /// With a `generation`, the installed session must also be that one,
    /// or the call fails with `StaleCallback`.
    fn connected(
        &self,
        operation: &'static str,
        generation: Option<u64>,
    ) -> Result<Arc<Session>, LumenError> {
        let state = lock(&self.state);
        if let Some(generation) = generation {
            let current = state.current_generation();
            if current != Some(generation) {
                return Err(LumenError::StaleCallback {
                    generation,
                    current,
                });
            }
        }
        match (&state.phase, &state.session) {
            (SessionPhase::Connected { .. }, Some(session)) => Ok(Arc::clone(session)),
            (phase, _) => Err(phase.reject(operation)),
        }
    }

    /// Drop the session and return to `Idle`.
    fn release(&self, expected: &'static str) {
        let session = {
            let mut state = lock(&self.state);
            let result = match state.phase {
                SessionPhase::Stopping => state.phase.finish_stop(),
                _ => state.phase.abort_start(),
            };
            if let Err(e) = result {
                warn!("releasing session from unexpected phase ({expected}): {e}");
                state.phase = SessionPhase::Idle;
            }
            state.session.take()
        };

        if let Some(session) = session {
            lock(&session.audio).release_decoder();
            info!(host = %session.host, "session released");
        }
    }

    /// Engine stop plus release; shared by host stop and termination.
    fn teardown(&self) {
        self.engine.stop();
        self.release("teardown");
    }

    // ── Video callbacks ──────────────────────────────────────────

    pub(crate) fn video_setup(
        &self,
        generation: u64,
        width: u32,
        height: u32,
        refresh_rate_hz: u32,
        flags: u32,
    ) {
        let Some(session) = self.installed(generation) else {
            warn!(generation, "video setup without a session");
            return;
        };
        info!(width, height, refresh_rate_hz, flags, "video renderer setup");
        lock(&session.video)
            .renderer
            .setup(width, height, refresh_rate_hz, flags);
    }

    pub(crate) fn video_start(&self, generation: u64) {
        if let Some(session) = self.installed(generation) {
            lock(&session.video).renderer.start();
        }
    }

    pub(crate) fn video_stop(&self, generation: u64) {
        if let Some(session) = self.installed(generation) {
            lock(&session.video).renderer.stop();
        }
    }

    pub(crate) fn video_cleanup(&self, generation: u64) {
        if let Some(session) = self.installed(generation) {
            debug!("video renderer cleanup");
            lock(&session.video).renderer.destroy();
        }
    }

    pub(crate) fn submit_decode_unit(
        &self,
        generation: Option<u64>,
        unit: &DecodeUnit,
    ) -> Result<DecoderStatus, LumenError> {
        let session = self.connected("submit a decode unit", generation)?;
        let mut video = lock(&session.video);
        let VideoPipeline {
            renderer,
            reassembler,
        } = &mut *video;

        let outcome = match reassembler.submit(unit) {
            Ok(frame) => Ok(Submitted::Rendered(render(&mut **renderer, frame))),
            Err(e) if e.is_recoverable() => {
                warn!(frame = ?unit.frame_number(), "requesting keyframe: {e}");
                Ok(Submitted::Dropped)
            }
            Err(e) => Err(e),
        };

        let capacity = reassembler.capacity();
        let reallocations = reassembler.reallocations();
        let len = unit.full_length() as u64;
        self.stats.update(|s| {
            s.buffer_capacity = capacity;
            s.buffer_reallocations = reallocations;
            match &outcome {
                Ok(Submitted::Rendered(status)) => {
                    s.frames_submitted += 1;
                    s.bytes_reassembled += len;
                    if *status == DecoderStatus::NeedKeyframe {
                        s.keyframe_requests += 1;
                    }
                }
                Ok(Submitted::Dropped) => s.keyframe_requests += 1,
                Err(_) => s.frames_rejected += 1,
            }
        });
        outcome.map(Submitted::status)
    }

    // ── Audio callbacks ──────────────────────────────────────────

    pub(crate) fn audio_init(&self, generation: u64) -> Result<(), LumenError> {
        let Some(session) = self.installed(generation) else {
            return Err(LumenError::StaleCallback {
                generation,
                current: lock(&self.state).current_generation(),
            });
        };
        lock(&session.audio).init(&*self.decoders).inspect_err(|e| {
            error!("audio decoder creation failed: {e}");
        })
    }

    pub(crate) fn audio_start(&self, generation: u64) {
        if let Some(session) = self.installed(generation) {
            lock(&session.audio).start();
        }
    }

    pub(crate) fn audio_stop(&self, generation: u64) {
        if let Some(session) = self.installed(generation) {
            lock(&session.audio).stop();
        }
    }

    pub(crate) fn audio_cleanup(&self, generation: u64) {
        if let Some(session) = self.installed(generation) {
            debug!("audio renderer cleanup");
            lock(&session.audio).cleanup();
        }
    }

    pub(crate) fn decode_and_play_sample(&self, generation: Option<u64>, packet: &[u8]) {
        let session = match self.connected("play audio", generation) {
            Ok(session) => session,
            Err(e) => {
                trace!("audio packet ignored: {e}");
                return;
            }
        };

        let played = lock(&session.audio).decode_and_play(packet);
        match played {
            Ok(_) => self.stats.update(|s| s.audio_packets_played += 1),
            Err(e) => {
                trace!("audio packet dropped: {e}");
                self.stats.update(|s| s.audio_packets_dropped += 1);
            }
        }
    }

    // ── Listener callbacks ───────────────────────────────────────

    pub(crate) fn stage_starting(&self, generation: u64, stage: Stage) {
        debug!(stage = stage.ordinal(), "{stage}...");
        if let Some(session) = self.installed(generation) {
            session.listener.stage_starting(stage);
        }
    }

    pub(crate) fn stage_complete(&self, generation: u64, stage: Stage) {
        debug!(stage = stage.ordinal(), "{stage} complete");
        if let Some(session) = self.installed(generation) {
            session.listener.stage_complete(stage);
        }
    }

    pub(crate) fn stage_failed(&self, generation: u64, stage: Stage, error_code: i64) {
        warn!(stage = stage.ordinal(), error_code, "{stage} failed");
        if let Some(session) = self.installed(generation) {
            session.listener.stage_failed(stage, error_code);
        }
    }

    pub(crate) fn connection_started(&self, generation: u64) {
        let session = {
            let mut state = lock(&self.state);
            let session = match &state.session {
                Some(session) if session.generation == generation => Arc::clone(session),
                _ => {
                    debug!(generation, "started notification from stale session ignored");
                    return;
                }
            };
            if let Err(e) = state.phase.complete_start() {
                warn!("connection started notification ignored: {e}");
                return;
            }
            session
        };
        info!(host = %session.host, mode = %session.config.mode_string(), "connection started");
        session.listener.connection_started();
    }

    pub(crate) fn connection_terminated(&self, generation: u64, error_code: i64) {
        let (session, owns_teardown) = {
            let mut state = lock(&self.state);
            let session = match &state.session {
                Some(session) if session.generation == generation => Arc::clone(session),
                _ => {
                    debug!(generation, error_code, "termination from stale session ignored");
                    return;
                }
            };
            let owns_teardown = state.phase.begin_stop().is_ok();
            (session, owns_teardown)
        };

        warn!(error_code, "connection terminated");
        session.listener.connection_terminated(error_code);

        if owns_teardown {
            self.teardown();
        }
    }

    pub(crate) fn display_message(&self, generation: u64, message: &str, transient: bool) {
        let Some(session) = self.installed(generation) else {
            return;
        };
        if transient {
            debug!("transient message: {message}");
            session.listener.display_transient_message(message);
        } else {
            info!("message: {message}");
            session.listener.display_message(message);
        }
    }
}

/// What happened to one decode unit.
enum Submitted {
    /// Reassembled and handed to the renderer.
    Rendered(DecoderStatus),
    /// The buffer could not take it; nothing reached the renderer.
    Dropped,
}

impl Submitted {
    fn status(self) -> DecoderStatus {
        match self {
            Submitted::Rendered(status) => status,
            Submitted::Dropped => DecoderStatus::NeedKeyframe,
        }
    }
}

/// Hand a frame to the renderer. The router's own error code is not a
/// renderer status; a renderer returning it is treated as losing sync.
fn render(renderer: &mut dyn VideoRenderer, frame: &[u8]) -> DecoderStatus {
    match renderer.submit_frame(frame) {
        DecoderStatus::Other(STATUS_INVALID_STATE) => {
            warn!("renderer returned the reserved status; requesting keyframe");
            DecoderStatus::NeedKeyframe
        }
        status => status,
    }
}

// ── StreamRouter ─────────────────────────────────────────────────

/// Host-facing handle that drives one engine and its single session.
///
/// Share it with `Arc` if several host threads need to send input.
pub struct StreamRouter {
    shared: Arc<RouterShared>,
}

impl StreamRouter {
    /// Create a router with the default frame-buffer configuration.
    pub fn new(engine: Arc<dyn ProtocolEngine>, decoders: Arc<dyn AudioDecoderFactory>) -> Self {
        Self::with_reassembly(engine, decoders, ReassemblyConfig::default())
    }

    /// Create a router with an explicit frame-buffer configuration.
    pub fn with_reassembly(
        engine: Arc<dyn ProtocolEngine>,
        decoders: Arc<dyn AudioDecoderFactory>,
        reassembly: ReassemblyConfig,
    ) -> Self {
        Self {
            shared: Arc::new(RouterShared {
                engine,
                decoders,
                reassembly,
                state: Mutex::new(RouterState::default()),
                stats: StatsPublisher::new(),
            }),
        }
    }

    /// Current session phase.
    pub fn phase(&self) -> SessionPhase {
        self.shared.phase()
    }

    pub fn is_connected(&self) -> bool {
        self.phase().is_connected()
    }

    /// Receiver for the session counters.
    pub fn stats_receiver(&self) -> watch::Receiver<StreamStats> {
        self.shared.stats.subscribe()
    }

    /// Latest counters.
    pub fn stats(&self) -> StreamStats {
        self.shared.stats.snapshot()
    }

    /// Install a session and ask the engine to connect.
    ///
    /// Fails with `InvalidState` if a session already exists (the active one
    /// is left untouched), with `InvalidConfig` or `AllocationFailed` if the
    /// frame buffer cannot be set up, and with `ConnectFailed` carrying the
    /// engine's status if the engine refuses. The router is `Idle` again
    /// after any failure other than `InvalidState`.
    pub fn start_connection(
        &self,
        host: &str,
        config: StreamConfiguration,
        listener: Arc<dyn ConnectionListener>,
        video: Box<dyn VideoRenderer>,
        audio: Box<dyn AudioRenderer>,
    ) -> Result<(), LumenError> {
        config.validate()?;
        self.shared.reassembly.validate()?;

        let session = {
            let mut state = lock(&self.shared.state);
            state.phase.begin_start()?;
            state.generation += 1;
            let session = match Session::new(
                state.generation,
                host,
                config,
                listener,
                video,
                audio,
                self.shared.reassembly,
            ) {
                Ok(session) => Arc::new(session),
                Err(e) => {
                    error!("session setup failed: {e}");
                    state.phase.abort_start()?;
                    return Err(e);
                }
            };
            state.session = Some(Arc::clone(&session));
            session
        };
        self.shared.stats.reset(self.shared.reassembly.initial_capacity);

        info!(
            host,
            generation = session.generation,
            mode = %session.config.mode_string(),
            bitrate_kbps = session.config.bitrate_kbps,
            packet_size = session.config.packet_size,
            "starting connection"
        );
        let status = self
            .shared
            .engine
            .start(
                host,
                &session.config,
                EngineCallbacks::new(&self.shared, session.generation),
            );
        drop(session);

        if status != 0 {
            warn!(status, "engine refused the connection");
            self.shared.release("failed start");
            return Err(LumenError::ConnectFailed(status));
        }

        lock(&self.shared.state).phase.complete_start()
    }

    /// Stop the connection and release the session.
    ///
    /// Returns `InvalidState` instead of doing anything when no connection
    /// is up, so calling it twice is harmless.
    pub fn stop_connection(&self) -> Result<(), LumenError> {
        let since = {
            let mut state = lock(&self.shared.state);
            let since = state.phase.connected_duration();
            state.phase.begin_stop()?;
            since
        };
        info!(connected_for = ?since, "stopping connection");
        self.shared.teardown();
        Ok(())
    }

    /// Reassemble a decode unit and hand it to the video renderer.
    ///
    /// A frame buffer that cannot grow is reported as
    /// [`DecoderStatus::NeedKeyframe`], not as an error.
    pub fn submit_decode_unit(&self, unit: &DecodeUnit) -> Result<DecoderStatus, LumenError> {
        self.shared.submit_decode_unit(None, unit)
    }

    /// Decode one audio packet and play it. Undecodable packets are dropped.
    pub fn decode_and_play_sample(&self, packet: &[u8]) {
        self.shared.decode_and_play_sample(None, packet);
    }

    // ── Input ────────────────────────────────────────────────────

    /// Forward one input event to the engine and return its status.
    pub fn send_input(&self, event: InputEvent) -> Result<StatusCode, LumenError> {
        self.shared.connected("send input", None)?;
        let status = self.shared.engine.send_input(&event);
        trace!(kind = event.kind(), status, "input forwarded");
        self.shared.stats.update(|s| s.input_events_sent += 1);
        Ok(status)
    }

    pub fn send_mouse_move(&self, dx: i16, dy: i16) -> Result<StatusCode, LumenError> {
        self.send_input(InputEvent::MouseMove { dx, dy })
    }

    pub fn send_mouse_button(
        &self,
        action: MouseButtonAction,
        button: MouseButton,
    ) -> Result<StatusCode, LumenError> {
        self.send_input(InputEvent::MouseButton { action, button })
    }

    pub fn send_keyboard_event(
        &self,
        key_code: i16,
        action: KeyAction,
        modifiers: Modifiers,
    ) -> Result<StatusCode, LumenError> {
        self.send_input(InputEvent::Keyboard {
            key_code,
            action,
            modifiers,
        })
    }

    pub fn send_controller_input(&self, state: ControllerState) -> Result<StatusCode, LumenError> {
        self.send_input(InputEvent::Controller(state))
    }

    pub fn send_multi_controller_input(
        &self,
        controller_number: i16,
        state: ControllerState,
    ) -> Result<StatusCode, LumenError> {
        self.send_input(InputEvent::MultiController {
            controller_number,
            state,
        })
    }

    pub fn send_scroll_event(&self, clicks: i16) -> Result<StatusCode, LumenError> {
        self.send_input(InputEvent::Scroll { clicks })
    }
}

impl Drop for StreamRouter {
    fn drop(&mut self) {
        if self.is_connected() {
            if let Err(e) = self.stop_connection() {
                warn!("stop on drop failed: {e}");
            }
        }
    }
}

impl std::fmt::Debug for StreamRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRouter")
            .field("phase", &self.phase())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────
