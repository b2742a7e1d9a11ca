//! Per-session counters published to the host.
//!
//! Counters live in a `tokio::sync::watch` channel so a UI or log task can
//! read the latest snapshot without touching the frame path.

use tokio::sync::watch;

/// Snapshot of the active session's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Frames handed to the video renderer.
    pub frames_submitted: u64,
    /// Total bytes of reassembled frames.
    pub bytes_reassembled: u64,
    /// Frames answered with a keyframe request.
    pub keyframe_requests: u64,
    /// Decode units rejected before reaching the renderer.
    pub frames_rejected: u64,
    /// Current frame-buffer capacity.
    pub buffer_capacity: usize,
    /// Frame-buffer reallocations this session.
    pub buffer_reallocations: u64,
    /// Audio packets decoded and played.
    pub audio_packets_played: u64,
    /// Audio packets that decoded to nothing.
    pub audio_packets_dropped: u64,
    /// Input events forwarded to the engine.
    pub input_events_sent: u64,
}

/// Sender side of the stats channel.
#[derive(Debug)]
pub(crate) struct StatsPublisher {
    tx: watch::Sender<StreamStats>,
}

impl StatsPublisher {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(StreamStats::default());
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<StreamStats> {
        self.tx.subscribe()
    }

    pub(crate) fn snapshot(&self) -> StreamStats {
        self.tx.borrow().clone()
    }

    /// Start a fresh session's counters.
    pub(crate) fn reset(&self, buffer_capacity: usize) {
        self.tx.send_replace(StreamStats {
            buffer_capacity,
            ..Default::default()
        });
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut StreamStats)) {
        self.tx.send_modify(f);
    }
}
