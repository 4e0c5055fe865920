//! Camera to H.264 to RTP/UDP streaming
//!
//! Frames from a [`FrameSource`] are converted to planar 4:2:0, compressed by
//! a [`CodecSession`], fragmented into RTP datagrams and sent over UDP by a
//! [`Transport`]:
//! - Zero-copy fragment construction using `bytes::Bytes`
//! - OpenH264 encoding behind the `h264` feature, raw I420 passthrough always
//! - GStreamer camera capture behind the `gstreamer` feature
//!
//! # Example
//!
//! ```no_run
//! use h264_rtp_streamer::capture::TestPatternSource;
//! use h264_rtp_streamer::codec::{CodecConfig, CodecSession};
//! use h264_rtp_streamer::streamer::{Transport, TransportConfig};
//! use h264_rtp_streamer::capture::FrameSource;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut source = TestPatternSource::new(640, 480);
//! let mut session = CodecSession::new(CodecConfig::default());
//! session.init("h264")?;
//! let mut transport = Transport::new(TransportConfig::default())?;
//!
//! if let Some(frame) = source.capture()? {
//!     if let Some(unit) = session.encode_frame(&frame)? {
//!         transport.send_access_unit(&unit, unit.pts as u32)?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod codec;
pub mod config;
pub mod pipeline;
pub mod rtp;
pub mod streamer;

// Re-exports for convenience
pub use capture::{CaptureConfig, CaptureStats, FrameSource, PixelFormat, PlatformInfo, RawFrame, TestPatternSource};
pub use codec::{AccessUnit, CodecConfig, CodecError, CodecSession, SessionState};
pub use pipeline::{CycleOutcome, Pipeline, PipelineConfig, PipelineError, PipelineStats, RateReport};
pub use rtp::{RtpHeader, RtpPacketizer, TimestampGenerator, TimestampMode};
pub use streamer::{SendReport, Transport, TransportConfig, TransportError, TransportStats};
