//! # Streaming session plumbing
//!
//! Everything between the external protocol engine and the host's
//! renderers.
//!
//! ## Architecture
//!
//! ```text
//! ENGINE (network threads)                    HOST
//! ┌──────────────────────┐                ┌──────────────────────────┐
//! │ DecodeUnit fragments │                │ StreamRouter             │
//! │   ↓                  │  callbacks     │   ↓                      │
//! │ EngineCallbacks      │ ──────────►    │ FrameReassembler         │
//! │                      │                │   ↓                      │
//! │ audio packets        │ ──────────►    │ VideoRenderer            │
//! │                      │                │ AudioPipeline → Renderer │
//! └──────────────────────┘                └──────────────────────────┘
//!
//! Input: Host ──[InputEvent]──► StreamRouter ──► ProtocolEngine
//! ```
//!
//! ## Sub-modules
//!
//! | Module        | Purpose                                          |
//! |---------------|--------------------------------------------------|
//! | `decode_unit` | Fragmented video frame as delivered by the engine |
//! | `reassembly`  | Reusable frame buffer that joins fragments        |
//! | `renderer`    | Host capability traits and decoder status codes   |
//! | `audio`       | Decoder contract and per-session audio path       |
//! | `engine`      | Engine trait and the callback table it receives   |
//! | `router`      | Session owner and callback dispatch               |
//! | `stats`       | Per-session counters over a `watch` channel       |

pub mod audio;
pub mod decode_unit;
pub mod engine;
pub mod reassembly;
pub mod renderer;
pub mod router;
pub mod stats;

// ── Re-exports ───────────────────────────────────────────────────

pub use audio::{AudioDecoder, AudioDecoderFactory, AudioFormat, AudioPipeline};
pub use decode_unit::DecodeUnit;
pub use engine::{EngineCallbacks, ProtocolEngine};
pub use reassembly::{FrameReassembler, GrowthPolicy, INITIAL_FRAME_BUFFER_SIZE, ReassemblyConfig};
pub use renderer::{
    AudioRenderer, ConnectionListener, DR_NEED_IDR, DR_OK, DecoderStatus, StatusCode,
    VideoRenderer,
};
pub use router::StreamRouter;
pub use stats::StreamStats;
