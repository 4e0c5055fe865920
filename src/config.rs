//! Configuration management for H.264 RTP streaming

use crate::capture::{CaptureConfig, SourceKind};
use crate::codec::{CodecConfig, SUPPORTED_CODECS};
use crate::pipeline::PipelineConfig;
use crate::rtp::{TimestampMode, RTP_HEADER_SIZE};
use crate::streamer::TransportConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Largest UDP payload over IPv4
const MAX_DATAGRAM_SIZE: usize = 65507;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete streamer configuration, immutable after startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureSection,

    #[serde(default)]
    pub encoder: EncoderSection,

    #[serde(default)]
    pub transport: TransportSection,

    #[serde(default)]
    pub pipeline: PipelineSection,
}

/// Frame source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSection {
    /// "device" or "test-pattern"
    #[serde(default)]
    pub source: SourceKind,

    /// Camera selector
    /// - a number picks a camera by index ("0" → /dev/video0 on Linux)
    /// - anything else is used as a platform path or camera name
    #[serde(default = "default_device")]
    pub device: String,

    /// Frame width in pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// Frame height in pixels
    #[serde(default = "default_height")]
    pub height: u32,

    /// Frames per second
    #[serde(default = "default_fps")]
    pub fps: u32,
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            device: default_device(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
        }
    }
}

/// Encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderSection {
    /// Codec identifier ("h264", "raw")
    #[serde(default = "default_codec")]
    pub codec: String,

    /// Target bitrate in bits per second
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,

    /// Frames between keyframes
    #[serde(default = "default_keyframe_interval")]
    pub keyframe_interval: u32,

    #[serde(default = "default_max_b_frames")]
    pub max_b_frames: u32,
}

impl Default for EncoderSection {
    fn default() -> Self {
        Self {
            codec: default_codec(),
            bitrate: default_bitrate(),
            keyframe_interval: default_keyframe_interval(),
            max_b_frames: default_max_b_frames(),
        }
    }
}

/// RTP/UDP output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSection {
    /// RTP destination host
    #[serde(default = "default_dest_host")]
    pub dest_host: String,

    /// RTP destination port
    #[serde(default = "default_dest_port")]
    pub dest_port: u16,

    /// Local port (0 = auto-assign)
    #[serde(default)]
    pub local_port: u16,

    /// Maximum payload bytes per datagram, header excluded
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,

    #[serde(default = "default_payload_type")]
    pub payload_type: u8,

    /// RTP SSRC identifier
    #[serde(default = "default_ssrc")]
    pub ssrc: u32,

    /// "frame-counter" or "video-clock"
    #[serde(default)]
    pub timestamp_mode: TimestampMode,

    /// Set the RTP marker bit on the last fragment of each access unit
    #[serde(default)]
    pub marker_on_last_fragment: bool,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            dest_host: default_dest_host(),
            dest_port: default_dest_port(),
            local_port: 0,
            max_payload_size: default_max_payload_size(),
            payload_type: default_payload_type(),
            ssrc: default_ssrc(),
            timestamp_mode: TimestampMode::default(),
            marker_on_last_fragment: false,
        }
    }
}

/// Main loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Stop after this many captured frames (0 = unbounded)
    #[serde(default)]
    pub max_frames: u64,

    /// Log statistics every N captured frames (0 = never)
    #[serde(default = "default_stats_interval")]
    pub stats_interval_frames: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_frames: 0,
            stats_interval_frames: default_stats_interval(),
        }
    }
}

// Default value functions
fn default_device() -> String {
    "0".to_string()
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_fps() -> u32 {
    30
}
fn default_codec() -> String {
    crate::codec::DEFAULT_CODEC.to_string()
}
fn default_bitrate() -> u32 {
    crate::codec::DEFAULT_BITRATE
}
fn default_keyframe_interval() -> u32 {
    crate::codec::DEFAULT_KEYFRAME_INTERVAL
}
fn default_max_b_frames() -> u32 {
    crate::codec::DEFAULT_MAX_B_FRAMES
}
fn default_dest_host() -> String {
    "127.0.0.1".to_string()
}
fn default_dest_port() -> u16 {
    5004
}
fn default_max_payload_size() -> usize {
    crate::rtp::DEFAULT_MAX_PAYLOAD_SIZE
}
fn default_payload_type() -> u8 {
    crate::rtp::RTP_PAYLOAD_TYPE_DYNAMIC
}
fn default_ssrc() -> u32 {
    crate::rtp::DEFAULT_SSRC
}
fn default_stats_interval() -> u64 {
    100
}

impl Config {
    /// Loads configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Loads configuration from TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cap = &self.capture;

        if cap.width == 0 || cap.height == 0 {
            return Err(ConfigError::Invalid("width and height must be > 0".to_string()));
        }

        if cap.width % 2 != 0 || cap.height % 2 != 0 {
            return Err(ConfigError::Invalid(format!(
                "width and height must be even for 4:2:0 encoding, got {}x{}",
                cap.width, cap.height
            )));
        }

        if cap.fps == 0 || cap.fps > 120 {
            return Err(ConfigError::Invalid(format!(
                "FPS must be between 1 and 120, got {}",
                cap.fps
            )));
        }

        let enc = &self.encoder;

        let codec = enc.codec.trim().to_ascii_lowercase();
        if !SUPPORTED_CODECS.contains(&codec.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unsupported codec '{}' (supported: {})",
                enc.codec,
                SUPPORTED_CODECS.join(", ")
            )));
        }

        if enc.bitrate == 0 {
            return Err(ConfigError::Invalid("bitrate must be > 0".to_string()));
        }

        if enc.keyframe_interval == 0 {
            return Err(ConfigError::Invalid("keyframe_interval must be > 0".to_string()));
        }

        let tr = &self.transport;

        let max_payload = MAX_DATAGRAM_SIZE - RTP_HEADER_SIZE;
        if tr.max_payload_size == 0 || tr.max_payload_size > max_payload {
            return Err(ConfigError::Invalid(format!(
                "max_payload_size must be between 1 and {}, got {}",
                max_payload, tr.max_payload_size
            )));
        }

        if tr.payload_type > 127 {
            return Err(ConfigError::Invalid(format!(
                "payload_type must be between 0 and 127, got {}",
                tr.payload_type
            )));
        }

        if tr.dest_port == 0 {
            return Err(ConfigError::Invalid("dest_port must be > 0".to_string()));
        }

        if tr.dest_host.trim().is_empty() {
            return Err(ConfigError::Invalid("dest_host must not be empty".to_string()));
        }

        Ok(())
    }

    /// Saves configuration to TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            source: self.capture.source,
            device: self.capture.device.clone(),
            width: self.capture.width,
            height: self.capture.height,
            fps: self.capture.fps,
        }
    }

    pub fn codec_config(&self) -> CodecConfig {
        CodecConfig {
            width: self.capture.width,
            height: self.capture.height,
            fps: self.capture.fps,
            bitrate: self.encoder.bitrate,
            keyframe_interval: self.encoder.keyframe_interval,
            max_b_frames: self.encoder.max_b_frames,
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            dest_host: self.transport.dest_host.clone(),
            dest_port: self.transport.dest_port,
            local_port: self.transport.local_port,
            max_payload_size: self.transport.max_payload_size,
            payload_type: self.transport.payload_type,
            ssrc: self.transport.ssrc,
            marker_on_last_fragment: self.transport.marker_on_last_fragment,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            fps: self.capture.fps,
            timestamp_mode: self.transport.timestamp_mode,
            max_frames: self.pipeline.max_frames,
            stats_interval_frames: self.pipeline.stats_interval_frames,
        }
    }
}
