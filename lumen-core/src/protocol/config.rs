//! Stream configuration handed to the engine at connect time.

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::LumenError;

/// Length of the remote-input AES key and IV.
pub const REMOTE_INPUT_KEY_LEN: usize = 16;

/// Bytes of the IV the host actually randomises; the rest stay zero.
const REMOTE_INPUT_IV_RANDOM_LEN: usize = 4;

// ── RemoteInputKeys ──────────────────────────────────────────────

/// Symmetric key material for the encrypted input channel.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteInputKeys {
    pub key: [u8; REMOTE_INPUT_KEY_LEN],
    pub iv: [u8; REMOTE_INPUT_KEY_LEN],
}

impl RemoteInputKeys {
    /// Fresh random key; the IV carries a random 4-byte key id followed by zeros.
    pub fn generate() -> Self {
        let mut keys = Self::default();
        OsRng.fill_bytes(&mut keys.key);
        OsRng.fill_bytes(&mut keys.iv[..REMOTE_INPUT_IV_RANDOM_LEN]);
        keys
    }

    /// Key id announced to the server: the first four IV bytes, big-endian.
    pub fn key_id(&self) -> i32 {
        i32::from_be_bytes([self.iv[0], self.iv[1], self.iv[2], self.iv[3]])
    }
}

impl std::fmt::Debug for RemoteInputKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteInputKeys")
            .field("key", &"<redacted>")
            .field("key_id", &self.key_id())
            .finish()
    }
}

// ── StreamConfiguration ──────────────────────────────────────────

/// Video/stream parameters negotiated with the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfiguration {
    /// Stream width in pixels.
    pub width: u32,
    /// Stream height in pixels.
    pub height: u32,
    /// Target frames per second.
    pub fps: u32,
    /// Video bitrate in kbps.
    pub bitrate_kbps: u32,
    /// Maximum video packet size in bytes.
    pub packet_size: u32,
    /// Server generation; selects the protocol variant inside the engine.
    pub server_major_version: u32,
    /// Input channel keys. Never read from config files.
    #[serde(skip)]
    pub remote_input: RemoteInputKeys,
}

impl Default for StreamConfiguration {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 60,
            bitrate_kbps: 10_000,
            packet_size: 1024,
            server_major_version: 4,
            remote_input: RemoteInputKeys::default(),
        }
    }
}

impl StreamConfiguration {
    /// Create a configuration for the given mode with default bitrate and
    /// freshly generated input keys.
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            remote_input: RemoteInputKeys::generate(),
            ..Default::default()
        }
    }

    pub fn with_bitrate(mut self, bitrate_kbps: u32) -> Self {
        self.bitrate_kbps = bitrate_kbps;
        self
    }

    pub fn with_packet_size(mut self, packet_size: u32) -> Self {
        self.packet_size = packet_size;
        self
    }

    pub fn with_remote_input(mut self, keys: RemoteInputKeys) -> Self {
        self.remote_input = keys;
        self
    }

    /// `WIDTHxHEIGHTxFPS`, the mode string servers expect on launch.
    pub fn mode_string(&self) -> String {
        format!("{}x{}x{}", self.width, self.height, self.fps)
    }

    /// Reject configurations the engine cannot stream.
    pub fn validate(&self) -> Result<(), LumenError> {
        if self.width == 0 || self.height == 0 {
            return Err(LumenError::InvalidConfig("width and height must be non-zero"));
        }
        if !(1..=240).contains(&self.fps) {
            return Err(LumenError::InvalidConfig("fps must be within 1..=240"));
        }
        if self.bitrate_kbps == 0 {
            return Err(LumenError::InvalidConfig("bitrate must be non-zero"));
        }
        if self.packet_size == 0 {
            return Err(LumenError::InvalidConfig("packet size must be non-zero"));
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
