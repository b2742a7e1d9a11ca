//! Boundary with the external protocol engine.
//!
//! The engine owns the network: it performs the handshake, receives video
//! and audio packets on its own threads and transmits input. Lumen drives it
//! through [`ProtocolEngine`]; the engine reports back through the
//! [`EngineCallbacks`] handle it receives in [`ProtocolEngine::start`].
//!
//! ```text
//!   host ──start/stop/input──► StreamRouter ──► ProtocolEngine
//!                                  ▲                  │
//!                                  └──EngineCallbacks─┘
//!            (stages, decode units, audio packets, termination)
//! ```

use std::sync::{Arc, Weak};

use tracing::{debug, trace};

use crate::protocol::{InputEvent, StreamConfiguration};
use crate::state::Stage;
use crate::stream::decode_unit::DecodeUnit;
use crate::stream::renderer::{DR_NEED_IDR, DR_OK, StatusCode};
use crate::stream::router::RouterShared;

// ── ProtocolEngine ───────────────────────────────────────────────

/// Entry points of the external streaming engine.
///
/// The engine supports one connection at a time.
pub trait ProtocolEngine: Send + Sync {
    /// Establish the connection.
    ///
    /// Returns `0` on success. The engine may invoke any callback on
    /// `callbacks` from any thread, both during and after this call.
    fn start(&self, host: &str, config: &StreamConfiguration, callbacks: EngineCallbacks)
    -> StatusCode;

    /// Tear the connection down.
    ///
    /// Must invoke the video and then the audio cleanup callbacks before
    /// returning.
    fn stop(&self);

    /// Transmit one input event. Returns the transmission status.
    fn send_input(&self, event: &InputEvent) -> StatusCode;
}

// ── EngineCallbacks ──────────────────────────────────────────────

/// Typed callback table handed to the engine.
///
/// Cheap to clone. Bound to the session it was issued for: once that
/// session is gone (stopped, terminated, or replaced by a newer one) every
/// callback is a no-op and submission answers with a keyframe request.
/// Holds only a weak reference to the router, so an engine that keeps it
/// around does not keep the router alive.
#[derive(Clone)]
pub struct EngineCallbacks {
    router: Weak<RouterShared>,
    generation: u64,
}

impl EngineCallbacks {
    pub(crate) fn new(router: &Arc<RouterShared>, generation: u64) -> Self {
        Self {
            router: Arc::downgrade(router),
            generation,
        }
    }

    /// Session generation this table was issued for.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn with_router<R>(&self, fallback: R, f: impl FnOnce(&RouterShared, u64) -> R) -> R {
        match self.router.upgrade() {
            Some(router) => f(&router, self.generation),
            None => {
                trace!("callback after router dropped");
                fallback
            }
        }
    }

    // ── Video ────────────────────────────────────────────────────

    pub fn video_setup(&self, width: u32, height: u32, refresh_rate_hz: u32, flags: u32) {
        self.with_router((), |r, g| r.video_setup(g, width, height, refresh_rate_hz, flags));
    }

    pub fn video_start(&self) {
        self.with_router((), |r, g| r.video_start(g));
    }

    pub fn video_stop(&self) {
        self.with_router((), |r, g| r.video_stop(g));
    }

    /// Reassemble and render one decode unit.
    ///
    /// Returns [`DR_OK`], [`DR_NEED_IDR`] or a renderer-specific code.
    pub fn submit_decode_unit(&self, unit: &DecodeUnit) -> StatusCode {
        self.with_router(DR_NEED_IDR, |r, g| match r.submit_decode_unit(Some(g), unit) {
            Ok(status) => status.code(),
            Err(e) => {
                debug!("decode unit not rendered: {e}");
                e.status_code()
            }
        })
    }

    pub fn video_cleanup(&self) {
        self.with_router((), |r, g| r.video_cleanup(g));
    }

    // ── Audio ────────────────────────────────────────────────────

    /// Create the audio decoder and initialise the renderer.
    pub fn audio_init(&self) -> StatusCode {
        self.with_router(DR_OK, |r, g| match r.audio_init(g) {
            Ok(()) => DR_OK,
            Err(e) => e.status_code(),
        })
    }

    pub fn audio_start(&self) {
        self.with_router((), |r, g| r.audio_start(g));
    }

    pub fn audio_stop(&self) {
        self.with_router((), |r, g| r.audio_stop(g));
    }

    pub fn decode_and_play_sample(&self, packet: &[u8]) {
        self.with_router((), |r, g| r.decode_and_play_sample(Some(g), packet));
    }

    pub fn audio_cleanup(&self) {
        self.with_router((), |r, g| r.audio_cleanup(g));
    }

    // ── Connection listener ──────────────────────────────────────

    pub fn stage_starting(&self, stage: Stage) {
        self.with_router((), |r, g| r.stage_starting(g, stage));
    }

    pub fn stage_complete(&self, stage: Stage) {
        self.with_router((), |r, g| r.stage_complete(g, stage));
    }

    pub fn stage_failed(&self, stage: Stage, error_code: i64) {
        self.with_router((), |r, g| r.stage_failed(g, stage, error_code));
    }

    pub fn connection_started(&self) {
        self.with_router((), |r, g| r.connection_started(g));
    }

    /// The connection died without the host asking for it.
    pub fn connection_terminated(&self, error_code: i64) {
        self.with_router((), |r, g| r.connection_terminated(g, error_code));
    }

    pub fn display_message(&self, message: &str) {
        self.with_router((), |r, g| r.display_message(g, message, false));
    }

    pub fn display_transient_message(&self, message: &str) {
        self.with_router((), |r, g| r.display_message(g, message, true));
    }

    // ── Platform ─────────────────────────────────────────────────

    /// Engine diagnostics, routed into `tracing`.
    pub fn debug_print(&self, message: &str) {
        debug!(target: "lumen::engine", "{}", message.trim_end());
    }

    /// Whether the router behind this handle still exists.
    pub fn is_attached(&self) -> bool {
        self.router.strong_count() > 0
    }
}

impl std::fmt::Debug for EngineCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineCallbacks")
            .field("generation", &self.generation)
            .field("attached", &self.is_attached())
            .finish()
    }
}
