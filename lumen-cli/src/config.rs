//! Client configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use lumen_core::{ReassemblyConfig, StreamConfiguration};

/// Top-level configuration for the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Streaming host.
    pub host: HostConfig,
    /// Negotiated stream parameters.
    pub stream: StreamConfiguration,
    /// Frame-buffer tuning.
    pub buffer: ReassemblyConfig,
    /// Synthetic stream produced by the loopback engine.
    pub loopback: LoopbackConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Streaming host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Host name or IP address.
    pub address: String,
}

/// Loopback stream shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopbackConfig {
    /// Frames to deliver before the stream ends.
    pub frames: u32,
    /// Fragments each frame is split into.
    pub fragments_per_frame: u32,
    /// Bytes per synthetic frame.
    pub frame_size: usize,
    /// Audio packets to deliver, one per frame until exhausted.
    pub audio_packets: u32,
    /// Delay between frames in milliseconds.
    pub frame_interval_ms: u64,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level, used when `RUST_LOG` is unset.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".into(),
        }
    }
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            frames: 120,
            fragments_per_frame: 8,
            frame_size: 64 * 1024,
            audio_packets: 120,
            frame_interval_ms: 16,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        let config = match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        };
        config.with_usable_buffer()
    }

    /// Parse TOML text.
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Default configuration as pretty TOML.
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&Self::default())
    }

    /// Replace a `[buffer]` section the frame buffer could not honour.
    fn with_usable_buffer(self) -> Self {
        match self.buffer.validate() {
            Ok(()) => self,
            Err(e) => {
                tracing::warn!("invalid [buffer] section: {e}; using default buffer settings");
                Self {
                    buffer: ReassemblyConfig::default(),
                    ..self
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
