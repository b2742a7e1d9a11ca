//! # lumen-core
//!
//! Client-side core of the Lumen game-streaming client.
//!
//! This crate sits between an external streaming engine (which owns the
//! network protocol) and host-supplied renderers:
//! - **Stream**: `StreamRouter` owning the single session, `FrameReassembler`
//!   joining fragmented decode units, the audio decode path and the
//!   `ProtocolEngine` / `EngineCallbacks` boundary
//! - **Protocol**: `StreamConfiguration` and the `InputEvent` family
//! - **State**: `SessionPhase` lifecycle and connection `Stage`s
//! - **Error**: `LumenError` — typed, `thiserror`-based error hierarchy

pub mod error;
pub mod protocol;
pub mod state;
pub mod stream;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use error::LumenError;
pub use protocol::{
    ControllerButtons, ControllerState, InputEvent, KeyAction, Modifiers, MouseButton,
    MouseButtonAction, RemoteInputKeys, StreamConfiguration,
};
pub use state::{SessionPhase, Stage};
pub use stream::{
    AudioDecoder, AudioDecoderFactory, AudioFormat, AudioRenderer, ConnectionListener,
    DecodeUnit, DecoderStatus, EngineCallbacks, FrameReassembler, GrowthPolicy,
    ProtocolEngine, ReassemblyConfig, StatusCode, StreamRouter, StreamStats, VideoRenderer,
};
