//! Headless capabilities: renderers and a listener that report through
//! `tracing` and keep simple tallies the caller can read afterwards.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use lumen_core::{AudioRenderer, ConnectionListener, DecoderStatus, Stage, VideoRenderer};

/// Counts shared between the sinks and the caller.
#[derive(Debug, Default)]
pub struct SinkTally {
    pub frames: AtomicU64,
    pub frame_bytes: AtomicU64,
    pub pcm_bytes: AtomicU64,
    pub stages_completed: AtomicU64,
    pub terminated: AtomicU64,
}

impl SinkTally {
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn pcm_bytes(&self) -> u64 {
        self.pcm_bytes.load(Ordering::Relaxed)
    }

    pub fn stages_completed(&self) -> u64 {
        self.stages_completed.load(Ordering::Relaxed)
    }
}

// ── Video ────────────────────────────────────────────────────────

/// Accepts every frame and checks it against the negotiated format.
pub struct NullVideoRenderer {
    tally: Arc<SinkTally>,
    width: u32,
    height: u32,
}

impl NullVideoRenderer {
    pub fn new(tally: Arc<SinkTally>) -> Self {
        Self {
            tally,
            width: 0,
            height: 0,
        }
    }
}

impl VideoRenderer for NullVideoRenderer {
    fn setup(&mut self, width: u32, height: u32, refresh_rate_hz: u32, flags: u32) {
        info!(width, height, refresh_rate_hz, flags, "video format");
        self.width = width;
        self.height = height;
    }

    fn submit_frame(&mut self, frame: &[u8]) -> DecoderStatus {
        if self.width == 0 || self.height == 0 {
            warn!("frame before video setup");
            return DecoderStatus::NeedKeyframe;
        }
        self.tally.frames.fetch_add(1, Ordering::Relaxed);
        self.tally
            .frame_bytes
            .fetch_add(frame.len() as u64, Ordering::Relaxed);
        DecoderStatus::Ok
    }

    fn destroy(&mut self) {
        debug!(frames = self.tally.frames(), "video renderer destroyed");
    }
}

// ── Audio ────────────────────────────────────────────────────────

pub struct NullAudioRenderer {
    tally: Arc<SinkTally>,
}

impl NullAudioRenderer {
    pub fn new(tally: Arc<SinkTally>) -> Self {
        Self { tally }
    }
}

impl AudioRenderer for NullAudioRenderer {
    fn play_sample(&mut self, pcm: &[u8]) {
        self.tally
            .pcm_bytes
            .fetch_add(pcm.len() as u64, Ordering::Relaxed);
    }

    fn destroy(&mut self) {
        debug!(pcm_bytes = self.tally.pcm_bytes(), "audio renderer destroyed");
    }
}

// ── Listener ─────────────────────────────────────────────────────

/// Prints connection progress.
pub struct LogListener {
    tally: Arc<SinkTally>,
}

impl LogListener {
    pub fn new(tally: Arc<SinkTally>) -> Self {
        Self { tally }
    }
}

impl ConnectionListener for LogListener {
    fn stage_starting(&self, stage: Stage) {
        info!("{}...", stage.description());
    }

    fn stage_complete(&self, _stage: Stage) {
        self.tally.stages_completed.fetch_add(1, Ordering::Relaxed);
    }

    fn stage_failed(&self, stage: Stage, error_code: i64) {
        warn!(error_code, "{} failed", stage.description());
    }

    fn connection_started(&self) {
        info!("connection established");
    }

    fn connection_terminated(&self, error_code: i64) {
        self.tally.terminated.fetch_add(1, Ordering::Relaxed);
        warn!(error_code, "connection terminated");
    }

    fn display_message(&self, message: &str) {
        info!("{message}");
    }

    fn display_transient_message(&self, message: &str) {
        debug!("{message}");
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_requires_setup() {
        let tally = Arc::new(SinkTally::default());
        let mut video = NullVideoRenderer::new(Arc::clone(&tally));
        assert_eq!(video.submit_frame(b"early"), DecoderStatus::NeedKeyframe);

        video.setup(640, 480, 30, 0);
        assert_eq!(video.submit_frame(b"frame"), DecoderStatus::Ok);
        assert_eq!(tally.frames(), 1);
        assert_eq!(tally.frame_bytes.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn audio_counts_bytes() {
        let tally = Arc::new(SinkTally::default());
        let mut audio = NullAudioRenderer::new(Arc::clone(&tally));
        audio.play_sample(&[0; 960]);
        audio.play_sample(&[0; 480]);
        assert_eq!(tally.pcm_bytes(), 1440);
    }
}
