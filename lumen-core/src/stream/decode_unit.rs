//! Fragmented video decode units as delivered by the engine.
//!
//! A decode unit is one compressed video frame that arrived in several
//! network-sized pieces. The pieces are kept as [`Bytes`] handles so the
//! engine can hand over its receive buffers without copying; the only copy
//! happens once, inside [`FrameReassembler`](super::reassembly::FrameReassembler).

use bytes::Bytes;

use crate::error::LumenError;

// ── DecodeUnit ───────────────────────────────────────────────────

/// An ordered list of fragments plus the frame length the engine declared.
#[derive(Debug, Clone, Default)]
pub struct DecodeUnit {
    fragments: Vec<Bytes>,
    full_length: usize,
    frame_number: Option<u64>,
}

impl DecodeUnit {
    /// Build a unit whose declared length is the sum of its fragments.
    pub fn new(fragments: Vec<Bytes>) -> Self {
        let full_length = fragments.iter().map(Bytes::len).sum();
        Self {
            fragments,
            full_length,
            frame_number: None,
        }
    }

    /// Build a unit from an engine-declared length.
    ///
    /// The declaration is not trusted here; [`validate`](Self::validate)
    /// checks it before any byte is copied.
    pub fn with_declared_length(fragments: Vec<Bytes>, full_length: usize) -> Self {
        Self {
            fragments,
            full_length,
            frame_number: None,
        }
    }

    /// Tag the unit with the engine's frame number (used in logs only).
    pub fn with_frame_number(mut self, frame_number: u64) -> Self {
        self.frame_number = Some(frame_number);
        self
    }

    /// Declared total length in bytes.
    pub fn full_length(&self) -> usize {
        self.full_length
    }

    /// Fragments in arrival order.
    pub fn fragments(&self) -> &[Bytes] {
        &self.fragments
    }

    pub fn frame_number(&self) -> Option<u64> {
        self.frame_number
    }

    /// Sum of the fragment lengths.
    pub fn fragment_bytes(&self) -> usize {
        self.fragments.iter().map(Bytes::len).sum()
    }

    /// Check that the fragments add up to the declared length.
    pub fn validate(&self) -> Result<(), LumenError> {
        let actual = self.fragment_bytes();
        if actual != self.full_length {
            return Err(LumenError::FragmentLengthMismatch {
                declared: self.full_length,
                actual,
            });
        }
        Ok(())
    }
}

impl From<Vec<Bytes>> for DecodeUnit {
    fn from(fragments: Vec<Bytes>) -> Self {
        Self::new(fragments)
    }
}

// ── Tests ────────────────────────────────────────────────────────
