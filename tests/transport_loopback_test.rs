//! UDP loopback tests: a local receiver checks what the transport puts on the wire

use h264_rtp_streamer::codec::AccessUnit;
use h264_rtp_streamer::rtp::{RtpHeader, RTP_HEADER_SIZE};
use h264_rtp_streamer::streamer::{SendReport, Transport, TransportConfig, TransportError};
use bytes::Bytes;
use std::net::UdpSocket;
use std::time::Duration;

struct Loopback {
    receiver: UdpSocket,
    transport: Transport,
}

impl Loopback {
    fn new(max_payload_size: usize, ssrc: u32) -> Self {
        let receiver = UdpSocket::bind("127.0.0.1:0").expect("Failed to bind receiver socket");
        receiver.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        let transport = Transport::new(TransportConfig {
            dest_host: "127.0.0.1".to_string(),
            dest_port: receiver.local_addr().unwrap().port(),
            max_payload_size,
            ssrc,
            ..TransportConfig::default()
        })
        .expect("Failed to open transport");

        Self { receiver, transport }
    }

    fn recv(&self, count: usize) -> Vec<(RtpHeader, Vec<u8>)> {
        let mut buf = vec![0u8; 65_536];
        (0..count)
            .map(|_| {
                let n = self.receiver.recv(&mut buf).expect("datagram not received");
                let header = RtpHeader::from_bytes(&buf[..n]).expect("invalid RTP header");
                (header, buf[RTP_HEADER_SIZE..n].to_vec())
            })
            .collect()
    }

    fn assert_nothing_pending(&self) {
        self.receiver
            .set_read_timeout(Some(Duration::from_millis(100)))
            .unwrap();
        let mut buf = [0u8; 64];
        assert!(self.receiver.recv(&mut buf).is_err(), "unexpected datagram");
    }
}

fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 7 % 256) as u8).collect()
}

#[test]
fn test_send_reconstructs_access_unit() {
    let mut link = Loopback::new(1400, 0x12345678);
    let data = payload(10_000);

    let report = link.transport.send(&data, 3000).unwrap();
    assert_eq!(report.fragments, 8);
    assert_eq!(report.bytes, 10_000 + 8 * RTP_HEADER_SIZE);

    let received = link.recv(8);

    let rebuilt: Vec<u8> = received.iter().flat_map(|(_, p)| p.clone()).collect();
    assert_eq!(rebuilt, data);
    assert_eq!(received.last().unwrap().1.len(), 10_000 - 7 * 1400);

    for (i, (header, _)) in received.iter().enumerate() {
        assert_eq!(header.sequence_number, i as u16);
        assert_eq!(header.timestamp, 3000);
        assert_eq!(header.ssrc, 0x12345678);
        assert_eq!(header.payload_type, 96);
    }
}

#[test]
fn test_sequence_increments_across_sends() {
    let mut link = Loopback::new(100, 7);

    let mut expected = 0u16;
    for ts in 0..4u32 {
        link.transport.send(&payload(250), ts).unwrap();
        for (header, _) in link.recv(3) {
            assert_eq!(header.sequence_number, expected);
            assert_eq!(header.timestamp, ts);
            assert_eq!(header.ssrc, 7);
            expected = expected.wrapping_add(1);
        }
    }

    assert_eq!(link.transport.next_sequence(), 12);
}

#[test]
fn test_payload_of_exact_size() {
    let mut link = Loopback::new(1400, 1);

    let report = link.transport.send(&payload(1400), 0).unwrap();
    assert_eq!(report, SendReport { fragments: 1, bytes: 1412 });

    let received = link.recv(1);
    assert_eq!(received[0].1.len(), 1400);
    link.assert_nothing_pending();
}

#[test]
fn test_payload_one_byte_over() {
    let mut link = Loopback::new(1400, 1);
    let data = payload(1401);

    assert_eq!(link.transport.send(&data, 0).unwrap().fragments, 2);

    let received = link.recv(2);
    assert_eq!(received[0].1.len(), 1400);
    assert_eq!(received[1].1, vec![data[1400]]);
}

#[test]
fn test_empty_send_transmits_nothing() {
    let mut link = Loopback::new(1400, 1);

    assert!(matches!(link.transport.send(&[], 0), Err(TransportError::EmptyAccessUnit)));
    link.assert_nothing_pending();

    // The counter was not consumed
    link.transport.send(&payload(10), 1).unwrap();
    assert_eq!(link.recv(1)[0].0.sequence_number, 0);
}

#[test]
fn test_send_access_unit() {
    let mut link = Loopback::new(1400, 1);
    let unit = AccessUnit {
        data: Bytes::from(payload(64)),
        pts: 9,
        keyframe: true,
    };

    link.transport.send_access_unit(&unit, 9).unwrap();
    let received = link.recv(1);
    assert_eq!(received[0].0.timestamp, 9);
    assert_eq!(received[0].1, payload(64));
}

#[test]
fn test_transports_do_not_share_state() {
    let mut a = Loopback::new(1400, 0xAAAA);
    let b = Loopback::new(1400, 0xBBBB);

    a.transport.send(&payload(10), 0).unwrap();
    a.transport.send(&payload(10), 1).unwrap();

    assert_eq!(a.transport.next_sequence(), 2);
    assert_eq!(b.transport.next_sequence(), 0);
    assert_eq!(a.transport.ssrc(), 0xAAAA);
    assert_eq!(b.transport.ssrc(), 0xBBBB);
}
