//! Compressor backends behind the codec session
//!
//! A backend follows the submit/drain model of stateful video encoders: every
//! submitted frame may or may not make a compressed unit available, and a
//! drain either yields one unit or reports "not ready".

use tracing::debug;

use super::convert::PlanarFrame;
use super::{CodecConfig, CodecError};

/// Result of draining a compressor once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drain {
    /// A unit was written into the output buffer
    Ready { pts: u64, keyframe: bool },

    /// The compressor needs more input before it can emit anything
    NotReady,
}

/// A stateful frame compressor
///
/// Implementations are driven by exactly one [`CodecSession`](super::CodecSession)
/// and are never shared.
pub trait Compressor {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Submits one planar frame with its presentation timestamp
    fn submit(&mut self, frame: &PlanarFrame, pts: u64) -> Result<(), CodecError>;

    /// Moves at most one compressed unit into `out`
    fn drain(&mut self, out: &mut Vec<u8>) -> Result<Drain, CodecError>;

    /// Requests that the next emitted unit be a keyframe
    fn force_keyframe(&mut self) {}
}

/// Identifiers accepted by [`open_compressor`]
pub const SUPPORTED_CODECS: &[&str] = &["h264", "avc", "openh264", "raw", "i420"];

/// Selects and opens a compressor by identifier (case-insensitive)
pub fn open_compressor(codec_id: &str, config: &CodecConfig) -> Result<Box<dyn Compressor>, CodecError> {
    match codec_id.trim().to_ascii_lowercase().as_str() {
        "h264" | "avc" | "openh264" => open_h264(config),
        "raw" | "i420" => Ok(Box::new(RawCompressor::new())),
        other => Err(CodecError::Configuration(format!(
            "unsupported codec '{}' (supported: {})",
            other,
            SUPPORTED_CODECS.join(", ")
        ))),
    }
}

#[cfg(feature = "h264")]
fn open_h264(config: &CodecConfig) -> Result<Box<dyn Compressor>, CodecError> {
    Ok(Box::new(super::h264::OpenH264Compressor::new(config)?))
}

#[cfg(not(feature = "h264"))]
fn open_h264(_config: &CodecConfig) -> Result<Box<dyn Compressor>, CodecError> {
    Err(CodecError::Configuration(
        "h264 requested but the crate was built without the `h264` feature".to_string(),
    ))
}

/// Uncompressed passthrough: every submission emits the I420 frame as-is
///
/// Fully deterministic, which makes it useful for bring-up and testing of the
/// transport path without an encoder.
#[derive(Debug, Default)]
pub struct RawCompressor {
    pending: Option<u64>,
    frame: Vec<u8>,
}

impl RawCompressor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Compressor for RawCompressor {
    fn name(&self) -> &'static str {
        "raw-i420"
    }

    fn submit(&mut self, frame: &PlanarFrame, pts: u64) -> Result<(), CodecError> {
        self.frame.clear();
        self.frame.extend_from_slice(frame.as_bytes());
        self.pending = Some(pts);
        Ok(())
    }

    fn drain(&mut self, out: &mut Vec<u8>) -> Result<Drain, CodecError> {
        match self.pending.take() {
            Some(pts) => {
                out.extend_from_slice(&self.frame);
                debug!(pts, bytes = self.frame.len(), "raw frame drained");
                Ok(Drain::Ready { pts, keyframe: true })
            }
            None => Ok(Drain::NotReady),
        }
    }
}
