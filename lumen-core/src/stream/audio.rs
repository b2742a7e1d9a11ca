//! Audio decode path.
//!
//! The codec itself is external: the router only knows the
//! [`AudioDecoder`] contract. [`AudioPipeline`] owns the decoder handle for
//! the init..cleanup window, decodes each packet into a fixed PCM buffer and
//! forwards the decoded span to the session's [`AudioRenderer`].

use tracing::{debug, trace};

use crate::error::LumenError;
use crate::stream::renderer::AudioRenderer;

// ── Constants ────────────────────────────────────────────────────

pub const SAMPLE_RATE_HZ: u32 = 48_000;
pub const CHANNEL_COUNT: usize = 2;
pub const MAX_SAMPLES_PER_CHANNEL: usize = 240;

/// Capacity of the PCM scratch buffer, in `i16` samples.
pub const PCM_BUFFER_SAMPLES: usize = MAX_SAMPLES_PER_CHANNEL * CHANNEL_COUNT;

/// Largest PCM span handed to the renderer (960 bytes).
pub const MAX_PCM_BYTES: usize = PCM_BUFFER_SAMPLES * std::mem::size_of::<i16>();

// ── AudioFormat ──────────────────────────────────────────────────

/// Output format the decoder is created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: usize,
    pub max_samples_per_channel: usize,
}

impl AudioFormat {
    /// 48 kHz stereo, 5 ms packets.
    pub const STEREO_48K: Self = Self {
        sample_rate: SAMPLE_RATE_HZ,
        channels: CHANNEL_COUNT,
        max_samples_per_channel: MAX_SAMPLES_PER_CHANNEL,
    };
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::STEREO_48K
    }
}

// ── Decoder contracts ────────────────────────────────────────────

/// External compressed-audio decoder.
pub trait AudioDecoder: Send {
    /// Decode `packet` into interleaved samples.
    ///
    /// Writes at most `max_samples_per_channel * channels` samples into
    /// `pcm` and returns the number of samples **per channel**. Zero or a
    /// negative value means nothing was decoded.
    fn decode(&mut self, packet: &[u8], pcm: &mut [i16], max_samples_per_channel: usize) -> i32;
}

/// Creates a decoder when the engine initialises audio.
pub trait AudioDecoderFactory: Send + Sync {
    fn create(&self, format: AudioFormat) -> Result<Box<dyn AudioDecoder>, LumenError>;
}

impl<F> AudioDecoderFactory for F
where
    F: Fn(AudioFormat) -> Result<Box<dyn AudioDecoder>, LumenError> + Send + Sync,
{
    fn create(&self, format: AudioFormat) -> Result<Box<dyn AudioDecoder>, LumenError> {
        self(format)
    }
}

// ── AudioPipeline ────────────────────────────────────────────────

/// Per-session audio path: renderer, decoder handle and PCM scratch space.
pub struct AudioPipeline {
    renderer: Box<dyn AudioRenderer>,
    decoder: Option<Box<dyn AudioDecoder>>,
    format: AudioFormat,
    pcm: [i16; PCM_BUFFER_SAMPLES],
    bytes: [u8; MAX_PCM_BYTES],
}

impl AudioPipeline {
    pub fn new(renderer: Box<dyn AudioRenderer>) -> Self {
        Self {
            renderer,
            decoder: None,
            format: AudioFormat::STEREO_48K,
            pcm: [0; PCM_BUFFER_SAMPLES],
            bytes: [0; MAX_PCM_BYTES],
        }
    }

    /// Whether a decoder handle is currently live.
    pub fn has_decoder(&self) -> bool {
        self.decoder.is_some()
    }

    /// Create the decoder, then initialise the renderer.
    pub fn init(&mut self, factory: &dyn AudioDecoderFactory) -> Result<(), LumenError> {
        let decoder = factory.create(self.format)?;
        self.decoder = Some(decoder);
        debug!(
            sample_rate = self.format.sample_rate,
            channels = self.format.channels,
            "audio decoder created"
        );
        self.renderer.init();
        Ok(())
    }

    pub fn start(&mut self) {
        self.renderer.start();
    }

    pub fn stop(&mut self) {
        self.renderer.stop();
    }

    /// Destroy the decoder, then the renderer.
    pub fn cleanup(&mut self) {
        if self.decoder.take().is_some() {
            debug!("audio decoder destroyed");
        }
        self.renderer.destroy();
    }

    /// Drop the decoder if the engine never ran audio cleanup.
    pub fn release_decoder(&mut self) {
        if self.decoder.take().is_some() {
            debug!("audio decoder released at teardown");
        }
    }

    /// Decode one packet and play it.
    ///
    /// Returns the number of PCM bytes handed to the renderer.
    pub fn decode_and_play(&mut self, packet: &[u8]) -> Result<usize, LumenError> {
        let decoder = self.decoder.as_mut().ok_or(LumenError::InvalidState {
            operation: "decode audio",
            phase: "without a decoder",
        })?;

        let samples = decoder.decode(packet, &mut self.pcm, self.format.max_samples_per_channel);
        if samples <= 0 {
            trace!(samples, "audio packet dropped");
            return Err(LumenError::DecodeFailed(samples));
        }

        let count = (samples as usize).min(self.format.max_samples_per_channel) * self.format.channels;
        let len = count * std::mem::size_of::<i16>();
        for (dst, sample) in self.bytes.chunks_exact_mut(2).zip(&self.pcm[..count]) {
            dst.copy_from_slice(&sample.to_le_bytes());
        }
        self.renderer.play_sample(&self.bytes[..len]);
        Ok(len)
    }
}

impl std::fmt::Debug for AudioPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioPipeline")
            .field("format", &self.format)
            .field("has_decoder", &self.decoder.is_some())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────
