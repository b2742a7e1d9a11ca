//! Domain-specific error types for the Lumen streaming core.
//!
//! All fallible operations return `Result<T, LumenError>`.
//! No panics on invalid input — every error is typed, and the router maps
//! each one to a plain status code at the engine boundary.

use thiserror::Error;

use crate::stream::renderer::{DR_NEED_IDR, StatusCode};

/// Status code returned to the engine for errors without a code of their own.
///
/// Reserved: renderers must not report it through `DecoderStatus::Other`;
/// the router turns such a status into a keyframe request.
pub const STATUS_INVALID_STATE: StatusCode = i32::MIN;

/// The canonical error type for the streaming core.
#[derive(Debug, Error)]
pub enum LumenError {
    // ── Session Errors ───────────────────────────────────────────
    /// The engine refused to establish the connection.
    #[error("connection failed with status {0}")]
    ConnectFailed(StatusCode),

    /// An operation was invoked outside the phase it requires.
    #[error("invalid state: cannot {operation} while {phase}")]
    InvalidState {
        operation: &'static str,
        phase: &'static str,
    },

    /// A callback arrived through a table issued to an earlier session.
    #[error("callback from stale session generation {generation} (current {current:?})")]
    StaleCallback {
        generation: u64,
        current: Option<u64>,
    },

    /// The stream configuration was rejected before connecting.
    #[error("invalid stream configuration: {0}")]
    InvalidConfig(&'static str),

    /// The engine reported a stage ordinal we do not know.
    #[error("unknown connection stage ordinal: {0}")]
    UnknownStage(i32),

    // ── Frame Errors ─────────────────────────────────────────────
    /// The frame buffer could not grow to hold the incoming decode unit.
    #[error("frame buffer allocation of {requested} bytes failed")]
    AllocationFailed { requested: usize },

    /// The fragment list does not add up to the declared frame length.
    #[error("fragment lengths sum to {actual} bytes, decode unit declares {declared}")]
    FragmentLengthMismatch { declared: usize, actual: usize },

    /// Frame size exceeded the configured limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    // ── Audio Errors ─────────────────────────────────────────────
    /// The audio decoder produced no samples.
    #[error("audio decode produced {0} samples")]
    DecodeFailed(i32),

    // ── Serialization / IO Errors ────────────────────────────────
    /// Encoding or decoding of a payload failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The IO layer reported an error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl LumenError {
    /// Whether the stream can continue after this error.
    ///
    /// A failed frame-buffer growth only costs a keyframe; a failed audio
    /// decode only costs one packet.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::AllocationFailed { .. } | Self::DecodeFailed(_))
    }

    /// Integer status handed back to the engine when a callback fails.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ConnectFailed(code) => *code,
            Self::DecodeFailed(samples) => *samples,
            Self::AllocationFailed { .. }
            | Self::StaleCallback { .. }
            | Self::FragmentLengthMismatch { .. }
            | Self::FrameTooLarge { .. } => DR_NEED_IDR,
            _ => STATUS_INVALID_STATE,
        }
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for LumenError {
    fn from(s: String) -> Self {
        LumenError::Other(s)
    }
}

impl From<&str> for LumenError {
    fn from(s: &str) -> Self {
        LumenError::Other(s.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for LumenError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        LumenError::Encoding(e.to_string())
    }
}
