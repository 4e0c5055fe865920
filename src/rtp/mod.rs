//! RTP packetization of encoded access units
//!
//! Each access unit is split into consecutive chunks of at most
//! `max_payload_size` bytes. Every chunk is prefixed with a 12-byte RTP
//! fixed header and becomes one datagram. The sequence number advances once
//! per fragment for the lifetime of the packetizer and wraps at 65536; all
//! fragments of one access unit share its timestamp.

mod packet;

pub use packet::{RtpHeader, RtpPacket};

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// RTP protocol constants
pub const RTP_VERSION: u8 = 2;
pub const RTP_HEADER_SIZE: usize = 12;
pub const RTP_PAYLOAD_TYPE_DYNAMIC: u8 = 96;
pub const RTP_CLOCK_RATE: u32 = 90000; // Standard 90kHz clock for video
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 1400;
pub const DEFAULT_SSRC: u32 = 0x12345678;

#[derive(Error, Debug)]
pub enum PacketizerError {
    #[error("empty access unit")]
    EmptyPayload,
}

/// Fragments access units into RTP datagrams
///
/// The sequence counter and SSRC are private to the instance, so two
/// packetizers never interfere with each other.
#[derive(Debug)]
pub struct RtpPacketizer {
    payload_type: u8,
    ssrc: u32,
    max_payload_size: usize,
    marker_on_last_fragment: bool,

    sequence_number: u16,
}

impl RtpPacketizer {
    /// Creates a new RTP packetizer
    ///
    /// # Arguments
    /// * `payload_type` - RTP payload type written into every header
    /// * `ssrc` - Synchronization source identifier (constant per stream)
    /// * `max_payload_size` - Maximum payload bytes per datagram (0 selects 1400)
    pub fn new(payload_type: u8, ssrc: u32, max_payload_size: usize) -> Self {
        let max_payload_size = if max_payload_size == 0 {
            DEFAULT_MAX_PAYLOAD_SIZE
        } else {
            max_payload_size
        };

        Self {
            payload_type: payload_type & 0x7F,
            ssrc,
            max_payload_size,
            marker_on_last_fragment: false,
            sequence_number: 0,
        }
    }

    /// Sets the marker bit on the final fragment of each access unit
    pub fn with_marker_on_last_fragment(mut self, enabled: bool) -> Self {
        self.marker_on_last_fragment = enabled;
        self
    }

    /// Packetizes one access unit into RTP datagrams
    ///
    /// Produces exactly `ceil(len / max_payload_size)` packets; the last one
    /// carries the remainder.
    pub fn packetize(&mut self, payload: &[u8], timestamp: u32) -> Result<Vec<Bytes>, PacketizerError> {
        if payload.is_empty() {
            return Err(PacketizerError::EmptyPayload);
        }

        let num_packets = self.fragment_count(payload.len());
        let mut packets = Vec::with_capacity(num_packets);

        for (i, chunk) in payload.chunks(self.max_payload_size).enumerate() {
            let mut header = RtpHeader::new(self.payload_type, self.sequence_number, timestamp, self.ssrc);
            header.marker = self.marker_on_last_fragment && i + 1 == num_packets;

            let mut buf = BytesMut::with_capacity(RTP_HEADER_SIZE + chunk.len());
            buf.put_slice(&header.to_bytes());
            buf.put_slice(chunk);
            packets.push(buf.freeze());

            self.sequence_number = self.sequence_number.wrapping_add(1);
        }

        Ok(packets)
    }

    /// Number of fragments a payload of `len` bytes is split into
    pub fn fragment_count(&self, len: usize) -> usize {
        len.div_ceil(self.max_payload_size)
    }

    /// Sequence number the next fragment will carry
    pub fn next_sequence(&self) -> u16 {
        self.sequence_number
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }
}

/// How presentation timestamps map onto the 32-bit RTP timestamp field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimestampMode {
    /// Wire timestamp is the frame counter itself
    #[default]
    FrameCounter,

    /// Wire timestamp advances by `90000 / fps` per frame
    VideoClock,
}

/// Timestamp generator for consistent frame timing
#[derive(Debug, Clone, Copy)]
pub struct TimestampGenerator {
    mode: TimestampMode,
    increment: u32,
}

impl TimestampGenerator {
    pub fn new(mode: TimestampMode, fps: u32) -> Self {
        let increment = match mode {
            TimestampMode::FrameCounter => 1,
            TimestampMode::VideoClock => RTP_CLOCK_RATE / fps.max(1),
        };

        Self { mode, increment }
    }

    pub fn mode(&self) -> TimestampMode {
        self.mode
    }

    /// Returns the wire timestamp for a presentation timestamp
    pub fn timestamp_for(&self, pts: u64) -> u32 {
        (pts as u32).wrapping_mul(self.increment)
    }
}
