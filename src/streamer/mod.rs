//! UDP RTP transport with statistics

mod stats;

pub use stats::TransportStats;

use crate::codec::AccessUnit;
use crate::rtp::{PacketizerError, RtpPacketizer, DEFAULT_MAX_PAYLOAD_SIZE, DEFAULT_SSRC, RTP_PAYLOAD_TYPE_DYNAMIC};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("invalid max payload size: {0}")]
    InvalidPayloadSize(usize),

    #[error("empty access unit, nothing sent")]
    EmptyAccessUnit,

    #[error("{failed} of {total} fragments failed to send: {last_error}")]
    Send {
        failed: usize,
        total: usize,
        last_error: std::io::Error,
    },
}

impl From<PacketizerError> for TransportError {
    fn from(e: PacketizerError) -> Self {
        match e {
            PacketizerError::EmptyPayload => TransportError::EmptyAccessUnit,
        }
    }
}

/// Configuration for the UDP RTP transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub dest_host: String,
    pub dest_port: u16,
    /// 0 binds an ephemeral port
    pub local_port: u16,
    pub max_payload_size: usize,
    pub payload_type: u8,
    pub ssrc: u32,
    pub marker_on_last_fragment: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            dest_host: "127.0.0.1".to_string(),
            dest_port: 5004,
            local_port: 0,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            payload_type: RTP_PAYLOAD_TYPE_DYNAMIC,
            ssrc: DEFAULT_SSRC,
            marker_on_last_fragment: false,
        }
    }
}

/// Outcome of a fully successful send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    /// Datagrams sent
    pub fragments: usize,
    /// Datagram bytes sent, headers included
    pub bytes: usize,
}

/// Fragments access units and sends them as RTP datagrams to one destination
///
/// Each instance owns its socket, sequence counter and SSRC. Sends are
/// fire-and-forget: no acknowledgment and no retry.
pub struct Transport {
    socket: UdpSocket,
    dest_addr: SocketAddr,
    packetizer: RtpPacketizer,
    stats: TransportStats,
}

impl Transport {
    /// Resolves the destination and binds the local socket
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        if config.max_payload_size == 0 {
            return Err(TransportError::InvalidPayloadSize(config.max_payload_size));
        }

        let dest_str = format!("{}:{}", config.dest_host, config.dest_port);
        let dest_addr = dest_str
            .to_socket_addrs()
            .map_err(|e| TransportError::InvalidDestination(format!("{}: {}", dest_str, e)))?
            .next()
            .ok_or_else(|| TransportError::InvalidDestination(format!("{}: no address", dest_str)))?;

        let local_addr: SocketAddr = if dest_addr.is_ipv4() {
            ([0, 0, 0, 0], config.local_port).into()
        } else {
            ([0u16; 8], config.local_port).into()
        };
        let socket = UdpSocket::bind(local_addr)?;

        let packetizer = RtpPacketizer::new(config.payload_type, config.ssrc, config.max_payload_size)
            .with_marker_on_last_fragment(config.marker_on_last_fragment);

        info!(
            local = %socket.local_addr()?,
            dest = %dest_addr,
            max_payload = %config.max_payload_size,
            payload_type = %config.payload_type,
            ssrc = %format!("{:#010x}", config.ssrc),
            "RTP transport opened"
        );

        Ok(Self {
            socket,
            dest_addr,
            packetizer,
            stats: TransportStats::default(),
        })
    }

    /// Sends one access unit as `ceil(len / max_payload_size)` datagrams
    ///
    /// Every fragment carries `timestamp`. A failed datagram does not stop
    /// the remaining ones; the failure is reported after all were attempted.
    /// Sequence numbers are consumed for every fragment built.
    pub fn send(&mut self, payload: &[u8], timestamp: u32) -> Result<SendReport, TransportError> {
        let packets = self.packetizer.packetize(payload, timestamp)?;
        let total = packets.len();

        let mut bytes = 0;
        let mut failed = 0;
        let mut last_error = None;

        for (i, packet) in packets.iter().enumerate() {
            match self.socket.send_to(packet, self.dest_addr) {
                Ok(n) => {
                    bytes += n;
                    self.stats.fragments_sent += 1;
                    self.stats.bytes_sent += n as u64;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        packet = %i,
                        total = %total,
                        "Failed to send RTP packet"
                    );
                    self.stats.send_errors += 1;
                    failed += 1;
                    last_error = Some(e);
                }
            }
        }

        self.stats.next_seq = self.packetizer.next_sequence();

        if let Some(last_error) = last_error {
            return Err(TransportError::Send {
                failed,
                total,
                last_error,
            });
        }

        self.stats.access_units_sent += 1;
        debug!(timestamp, fragments = total, bytes, "Access unit sent");

        Ok(SendReport { fragments: total, bytes })
    }

    /// Sends the payload of an encoded access unit
    pub fn send_access_unit(&mut self, unit: &AccessUnit, timestamp: u32) -> Result<SendReport, TransportError> {
        self.send(&unit.data, timestamp)
    }

    /// Gets transport statistics
    pub fn stats(&self) -> TransportStats {
        TransportStats {
            next_seq: self.packetizer.next_sequence(),
            ..self.stats.clone()
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn destination(&self) -> SocketAddr {
        self.dest_addr
    }

    pub fn ssrc(&self) -> u32 {
        self.packetizer.ssrc()
    }

    /// Sequence number the next fragment will carry
    pub fn next_sequence(&self) -> u16 {
        self.packetizer.next_sequence()
    }

    pub fn max_payload_size(&self) -> usize {
        self.packetizer.max_payload_size()
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        info!(
            dest = %self.dest_addr,
            units = %self.stats.access_units_sent,
            fragments = %self.stats.fragments_sent,
            errors = %self.stats.send_errors,
            "RTP transport closed"
        );
    }
}
