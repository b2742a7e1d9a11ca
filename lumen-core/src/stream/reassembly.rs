//! Frame reassembly buffer.
//!
//! Coalesces the fragments of a [`DecodeUnit`] into one contiguous frame.
//! The backing storage is allocated once and reused for every frame; it
//! grows only when a frame does not fit and never shrinks while the owning
//! session is alive.
//!
//! ```text
//!  fragments:  [AB] [CDE] [F]
//!                │    │    │
//!                ▼    ▼    ▼
//!  storage:   |A|B|C|D|E|F|. . . . . . . . . . . . .|
//!             └── len ───┘                           │
//!             └──────────────── capacity ────────────┘
//! ```
//!
//! `submit` takes `&mut self`, so a reassembler has exactly one writer at a
//! time. The returned slice borrows the reassembler and cannot be held across
//! the next `submit`.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::LumenError;
use crate::stream::decode_unit::DecodeUnit;

// ── Constants ────────────────────────────────────────────────────

/// Capacity a fresh frame buffer starts with (1 MiB).
pub const INITIAL_FRAME_BUFFER_SIZE: usize = 1_048_576;

/// Default upper bound on a single frame (64 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

// ── GrowthPolicy ─────────────────────────────────────────────────

/// How the buffer grows when a frame does not fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthPolicy {
    /// Reallocate to exactly the frame length.
    #[default]
    Exact,
    /// Reallocate to the next power of two, capped at the frame limit.
    ///
    /// Fewer reallocations when frame sizes creep upwards, at the cost of
    /// slack memory. Off unless configured.
    Doubling,
}

impl GrowthPolicy {
    /// Capacity to allocate for a frame of `required` bytes.
    fn target(self, required: usize, max: usize) -> usize {
        match self {
            GrowthPolicy::Exact => required,
            GrowthPolicy::Doubling => required
                .checked_next_power_of_two()
                .unwrap_or(required)
                .min(max)
                .max(required),
        }
    }
}

// ── ReassemblyConfig ─────────────────────────────────────────────

/// Tuning knobs for [`FrameReassembler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassemblyConfig {
    /// Capacity allocated up front.
    pub initial_capacity: usize,
    /// Largest frame accepted.
    pub max_frame_size: usize,
    /// Growth policy on overflow.
    pub growth: GrowthPolicy,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            initial_capacity: INITIAL_FRAME_BUFFER_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            growth: GrowthPolicy::Exact,
        }
    }
}

impl ReassemblyConfig {
    /// Reject settings the buffer could never honour.
    pub fn validate(&self) -> Result<(), LumenError> {
        if self.max_frame_size == 0 {
            return Err(LumenError::InvalidConfig("max_frame_size must be non-zero"));
        }
        if self.initial_capacity > self.max_frame_size {
            return Err(LumenError::InvalidConfig(
                "initial_capacity must not exceed max_frame_size",
            ));
        }
        Ok(())
    }
}

/// Allocate an empty buffer able to hold `capacity` bytes.
fn allocate(capacity: usize) -> Result<Vec<u8>, LumenError> {
    let mut storage = Vec::new();
    storage.try_reserve_exact(capacity).map_err(|e| {
        warn!(requested = capacity, "frame buffer allocation failed: {e}");
        LumenError::AllocationFailed {
            requested: capacity,
        }
    })?;
    Ok(storage)
}

// ── FrameReassembler ─────────────────────────────────────────────

/// Grow-only buffer that turns a fragment list into one contiguous frame.
#[derive(Debug)]
pub struct FrameReassembler {
    storage: Vec<u8>,
    /// Logical capacity. Kept separately because the allocator may hand
    /// out more than was asked for.
    capacity: usize,
    reallocations: u64,
    config: ReassemblyConfig,
    /// Makes the next growth fail as if the allocator had refused it.
    #[cfg(test)]
    pub(crate) fail_next_growth: bool,
}

impl FrameReassembler {
    /// Create a reassembler with a 1 MiB buffer and exact growth.
    pub fn new() -> Result<Self, LumenError> {
        Self::with_config(ReassemblyConfig::default())
    }

    /// Create a reassembler with explicit configuration.
    ///
    /// Fails with `InvalidConfig` for inconsistent settings and with
    /// `AllocationFailed` if the initial buffer cannot be allocated.
    pub fn with_config(config: ReassemblyConfig) -> Result<Self, LumenError> {
        config.validate()?;
        Ok(Self {
            storage: allocate(config.initial_capacity)?,
            capacity: config.initial_capacity,
            reallocations: 0,
            config,
            #[cfg(test)]
            fail_next_growth: false,
        })
    }

    /// Current buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Length of the most recently assembled frame.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Number of times the buffer has been reallocated.
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    /// Coalesce `unit` into the buffer and return the assembled frame.
    ///
    /// On error the buffer keeps its previous capacity and the caller
    /// should ask the engine for a keyframe.
    pub fn submit(&mut self, unit: &DecodeUnit) -> Result<&[u8], LumenError> {
        let full_length = unit.full_length();
        self.check_limit(full_length)?;
        unit.validate()?;
        self.ensure_capacity(full_length)?;

        self.storage.clear();
        for fragment in unit.fragments() {
            self.storage.extend_from_slice(fragment);
        }

        trace!(
            frame = ?unit.frame_number(),
            fragments = unit.fragments().len(),
            len = full_length,
            "frame reassembled"
        );
        Ok(&self.storage)
    }

    fn check_limit(&self, size: usize) -> Result<(), LumenError> {
        if size > self.config.max_frame_size {
            return Err(LumenError::FrameTooLarge {
                size,
                max: self.config.max_frame_size,
            });
        }
        Ok(())
    }

    /// Make sure a frame of `required` bytes fits without reallocating
    /// during the copy.
    fn ensure_capacity(&mut self, required: usize) -> Result<(), LumenError> {
        if required <= self.capacity {
            return Ok(());
        }
        self.check_limit(required)?;

        let target = self.config.growth.target(required, self.config.max_frame_size);

        if self.injected_failure() {
            return Err(LumenError::AllocationFailed { requested: target });
        }

        let fresh = allocate(target)?;
        debug!(from = self.capacity, to = target, "growing frame buffer");
        self.storage = fresh;
        self.capacity = target;
        self.reallocations += 1;
        Ok(())
    }

    #[cfg(test)]
    fn injected_failure(&mut self) -> bool {
        std::mem::take(&mut self.fail_next_growth)
    }

    #[cfg(not(test))]
    fn injected_failure(&mut self) -> bool {
        false
    }
}

// ── Tests ────────────────────────────────────────────────────────
