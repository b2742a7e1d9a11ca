//! Host-supplied capabilities.
//!
//! The host implements these traits and hands them to
//! [`StreamRouter::start_connection`](super::router::StreamRouter::start_connection).
//! The router owns them for the lifetime of one session and calls them from
//! the engine's threads, so every capability must be `Send`.

use crate::state::Stage;

/// Plain integer status exchanged with the engine.
pub type StatusCode = i32;

/// Decoder accepted the frame.
pub const DR_OK: StatusCode = 0;

/// Decoder needs an IDR frame (keyframe) before it can continue.
pub const DR_NEED_IDR: StatusCode = -1;

// ── DecoderStatus ────────────────────────────────────────────────

/// Result of handing one frame to the video renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecoderStatus {
    /// Frame consumed.
    Ok,
    /// The decoder lost sync; the engine should request a keyframe.
    NeedKeyframe,
    /// Renderer-specific code passed through to the engine unchanged.
    ///
    /// `i32::MIN` is reserved for router errors and is reported to the
    /// engine as a keyframe request instead.
    Other(StatusCode),
}

impl DecoderStatus {
    pub const fn code(self) -> StatusCode {
        match self {
            DecoderStatus::Ok => DR_OK,
            DecoderStatus::NeedKeyframe => DR_NEED_IDR,
            DecoderStatus::Other(code) => code,
        }
    }

    pub const fn from_code(code: StatusCode) -> Self {
        match code {
            DR_OK => DecoderStatus::Ok,
            DR_NEED_IDR => DecoderStatus::NeedKeyframe,
            other => DecoderStatus::Other(other),
        }
    }

    pub fn is_ok(self) -> bool {
        self == DecoderStatus::Ok
    }
}

impl From<DecoderStatus> for StatusCode {
    fn from(status: DecoderStatus) -> Self {
        status.code()
    }
}

// ── VideoRenderer ────────────────────────────────────────────────

/// Decodes and presents reassembled video frames.
pub trait VideoRenderer: Send {
    /// Called once before streaming with the negotiated video format.
    fn setup(&mut self, width: u32, height: u32, refresh_rate_hz: u32, flags: u32);

    fn start(&mut self) {}

    fn stop(&mut self) {}

    /// Consume one contiguous frame.
    ///
    /// `frame` is only valid for the duration of the call; the buffer
    /// behind it is reused for the next frame.
    fn submit_frame(&mut self, frame: &[u8]) -> DecoderStatus;

    /// Release renderer resources. Called during teardown.
    fn destroy(&mut self) {}
}

// ── AudioRenderer ────────────────────────────────────────────────

/// Plays decoded PCM audio.
pub trait AudioRenderer: Send {
    fn init(&mut self) {}

    fn start(&mut self) {}

    fn stop(&mut self) {}

    /// Play interleaved 16-bit little-endian PCM.
    fn play_sample(&mut self, pcm: &[u8]);

    fn destroy(&mut self) {}
}

// ── ConnectionListener ───────────────────────────────────────────

/// Receives connection lifecycle notifications.
///
/// Notifications arrive on engine threads, possibly concurrently with
/// frame delivery, hence `&self` and `Sync`.
pub trait ConnectionListener: Send + Sync {
    fn stage_starting(&self, _stage: Stage) {}

    fn stage_complete(&self, _stage: Stage) {}

    fn stage_failed(&self, _stage: Stage, _error_code: i64) {}

    fn connection_started(&self) {}

    fn connection_terminated(&self, _error_code: i64) {}

    fn display_message(&self, _message: &str) {}

    fn display_transient_message(&self, _message: &str) {}
}

// ── Tests ────────────────────────────────────────────────────────
