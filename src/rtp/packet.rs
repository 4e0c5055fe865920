//! Fixed 12-byte RTP header (RFC 3550 subset)

use bytes::Bytes;

use super::{RTP_HEADER_SIZE, RTP_VERSION};

/// RTP fixed header as it appears on the wire
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       sequence number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           synchronization source (SSRC) identifier            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Padding, extension and CSRC count are always zero, so byte 0 is the
/// constant `0x80`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// Marker bit (only set when the transport is configured to flag the
    /// last fragment of an access unit)
    pub marker: bool,

    /// Payload type (96 = first dynamic type)
    pub payload_type: u8,

    /// Sequence number (16 bits, wraps around)
    pub sequence_number: u16,

    /// Timestamp shared by every fragment of one access unit
    pub timestamp: u32,

    /// Synchronization source identifier
    pub ssrc: u32,
}

impl RtpHeader {
    pub fn new(payload_type: u8, sequence_number: u16, timestamp: u32, ssrc: u32) -> Self {
        Self {
            marker: false,
            payload_type: payload_type & 0x7F,
            sequence_number,
            timestamp,
            ssrc,
        }
    }

    /// Parses a header from the first 12 bytes of `data`
    ///
    /// Returns `None` for short buffers or a version other than 2.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < RTP_HEADER_SIZE {
            return None;
        }

        let version = (data[0] >> 6) & 0x03;
        if version != RTP_VERSION {
            return None;
        }

        Some(Self {
            marker: (data[1] & 0x80) != 0,
            payload_type: data[1] & 0x7F,
            sequence_number: u16::from_be_bytes([data[2], data[3]]),
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
        })
    }

    /// Serializes the header to its wire form
    pub fn to_bytes(&self) -> [u8; RTP_HEADER_SIZE] {
        let mut bytes = [0u8; RTP_HEADER_SIZE];

        bytes[0] = RTP_VERSION << 6;
        bytes[1] = (if self.marker { 0x80 } else { 0 }) | (self.payload_type & 0x7F);
        bytes[2..4].copy_from_slice(&self.sequence_number.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        bytes
    }
}

/// A received datagram split into header and payload
#[derive(Debug, Clone)]
pub struct RtpPacket {
    pub header: RtpHeader,
    pub payload: Bytes,
}

impl RtpPacket {
    pub fn new(header: RtpHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Parses a datagram; the payload slice shares the input buffer
    pub fn from_bytes(data: Bytes) -> Option<Self> {
        let header = RtpHeader::from_bytes(&data)?;
        let payload = data.slice(RTP_HEADER_SIZE..);

        Some(Self { header, payload })
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut bytes = Vec::with_capacity(RTP_HEADER_SIZE + self.payload.len());
        bytes.extend_from_slice(&self.header.to_bytes());
        bytes.extend_from_slice(&self.payload);
        Bytes::from(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = RtpHeader::new(96, 0x0102, 0x0A0B0C0D, 0x12345678);
        let bytes = header.to_bytes();

        assert_eq!(
            bytes,
            [0x80, 96, 0x01, 0x02, 0x0A, 0x0B, 0x0C, 0x0D, 0x12, 0x34, 0x56, 0x78]
        );
    }

    #[test]
    fn test_header_roundtrip_with_marker() {
        let mut header = RtpHeader::new(96, u16::MAX, 90000, 0xDEADBEEF);
        header.marker = true;

        let parsed = RtpHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(header.to_bytes()[1], 0x80 | 96);
    }

    #[test]
    fn test_payload_type_is_seven_bits() {
        let header = RtpHeader::new(0xFF, 0, 0, 0);
        assert_eq!(header.payload_type, 0x7F);
    }

    #[test]
    fn test_from_bytes_rejects_short_or_wrong_version() {
        assert!(RtpHeader::from_bytes(&[0x80; 11]).is_none());

        let mut bytes = RtpHeader::new(96, 1, 2, 3).to_bytes();
        bytes[0] = 0x40; // version 1
        assert!(RtpHeader::from_bytes(&bytes).is_none());
    }

    #[test]
    fn test_packet_payload_split() {
        let header = RtpHeader::new(96, 7, 42, 0x12345678);
        let packet = RtpPacket::new(header, Bytes::from_static(b"payload"));

        let parsed = RtpPacket::from_bytes(packet.to_bytes()).unwrap();
        assert_eq!(parsed.header.sequence_number, 7);
        assert_eq!(&parsed.payload[..], b"payload");
    }
}
