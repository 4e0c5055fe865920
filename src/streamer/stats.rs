//! Transport statistics

use serde::{Deserialize, Serialize};

/// Counters of one UDP RTP transport
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportStats {
    /// Access units fully handed to the socket
    pub access_units_sent: u64,

    /// Datagrams accepted by the socket
    pub fragments_sent: u64,

    /// Datagrams the socket rejected
    pub send_errors: u64,

    /// Total datagram bytes sent, headers included
    pub bytes_sent: u64,

    /// Sequence number of the next fragment
    pub next_seq: u16,
}

impl TransportStats {
    /// Calculates access unit rate based on delta
    pub fn calculate_fps(&self, previous: &Self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }

        let units_delta = self.access_units_sent.saturating_sub(previous.access_units_sent);
        units_delta as f64 / elapsed_secs
    }

    /// Calculates bitrate in kbps based on delta
    pub fn calculate_bitrate_kbps(&self, previous: &Self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }

        let bytes_delta = self.bytes_sent.saturating_sub(previous.bytes_sent);
        (bytes_delta as f64 * 8.0) / elapsed_secs / 1000.0
    }

    /// Fraction of datagrams the socket rejected
    pub fn send_failure_rate(&self) -> f64 {
        let total = self.fragments_sent + self.send_errors;
        if total == 0 {
            return 0.0;
        }

        self.send_errors as f64 / total as f64
    }
}
