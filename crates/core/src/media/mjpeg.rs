//! JPEG frame fragmentation and reassembly.
//!
//! A whole JPEG frame is cut into payload chunks of at most
//! [`MAX_PAYLOAD`] bytes. Each chunk travels in its own [`MediaPacket`]
//! whose frame-number field names the frame; only the last chunk sets
//! the marker bit. There is no per-fragment offset, so the receiver
//! concatenates fragments in arrival order and abandons a frame as soon
//! as a different frame number shows up.

use super::Packetizer;
use super::rtp::{MediaPacket, PAYLOAD_TYPE_JPEG};

/// Largest payload carried by a single datagram.
pub const MAX_PAYLOAD: usize = 1500;

/// Splits JPEG frames into marker-terminated packet runs.
#[derive(Debug)]
pub struct MjpegPacketizer {
    max_payload: usize,
}

impl MjpegPacketizer {
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD)
    }

    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            max_payload: max_payload.max(1),
        }
    }
}

impl Default for MjpegPacketizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Packetizer for MjpegPacketizer {
    fn packetize(&mut self, frame_number: u16, frame: &[u8]) -> Vec<Vec<u8>> {
        let count = frame.len().div_ceil(self.max_payload);
        let packets: Vec<Vec<u8>> = frame
            .chunks(self.max_payload)
            .enumerate()
            .map(|(i, chunk)| MediaPacket::new(frame_number, i + 1 == count, chunk.to_vec()).encode())
            .collect();

        tracing::trace!(frame_number, bytes = frame.len(), packets = packets.len(), "frame packetized");
        packets
    }

    fn payload_type(&self) -> u8 {
        PAYLOAD_TYPE_JPEG
    }

    fn max_payload(&self) -> usize {
        self.max_payload
    }
}

/// A frame rebuilt from its fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub number: u16,
    pub data: Vec<u8>,
}

/// Accumulates fragments until a marker packet completes the frame.
#[derive(Debug, Default)]
pub struct Reassembler {
    current: Option<u16>,
    buffer: Vec<u8>,
    abandoned: u64,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one packet. Returns the finished frame on the marker fragment.
    pub fn push(&mut self, packet: MediaPacket) -> Option<Frame> {
        if self.current != Some(packet.frame_number) {
            if !self.buffer.is_empty() {
                self.abandoned += 1;
                tracing::debug!(
                    abandoned = ?self.current,
                    next = packet.frame_number,
                    partial_bytes = self.buffer.len(),
                    "incomplete frame dropped"
                );
                self.buffer.clear();
            }
            self.current = Some(packet.frame_number);
        }

        self.buffer.extend_from_slice(&packet.payload);

        if packet.marker {
            return Some(Frame {
                number: packet.frame_number,
                data: std::mem::take(&mut self.buffer),
            });
        }
        None
    }

    /// Number of partially received frames thrown away so far.
    pub fn abandoned(&self) -> u64 {
        self.abandoned
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_of(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn decode_all(packets: &[Vec<u8>]) -> Vec<MediaPacket> {
        packets.iter().map(|p| MediaPacket::decode(p).unwrap()).collect()
    }

    #[test]
    fn packet_count_is_ceiling_of_size() {
        let mut p = MjpegPacketizer::new();
        for (size, expected) in [(1, 1), (1499, 1), (1500, 1), (1501, 2), (3000, 2), (4501, 4)] {
            assert_eq!(p.packetize(1, &frame_of(size)).len(), expected, "size {size}");
        }
    }

    #[test]
    fn only_last_fragment_has_marker() {
        let mut p = MjpegPacketizer::new();
        let packets = decode_all(&p.packetize(42, &frame_of(5000)));
        let markers: Vec<bool> = packets.iter().map(|p| p.marker).collect();
        assert_eq!(markers, vec![false, false, false, true]);
        assert!(packets.iter().all(|p| p.frame_number == 42));
        assert!(packets.iter().all(|p| p.payload.len() <= MAX_PAYLOAD));
    }

    #[test]
    fn empty_frame_produces_no_packets() {
        let mut p = MjpegPacketizer::new();
        assert!(p.packetize(1, &[]).is_empty());
    }

    #[test]
    fn reassembles_in_order_fragments() {
        let frame = frame_of(4000);
        let mut p = MjpegPacketizer::new();
        let mut r = Reassembler::new();

        let mut done = None;
        for packet in decode_all(&p.packetize(9, &frame)) {
            assert!(done.is_none());
            done = r.push(packet);
        }

        let done = done.expect("marker completes the frame");
        assert_eq!(done.number, 9);
        assert_eq!(done.data, frame);
    }

    #[test]
    fn new_frame_number_abandons_partial_frame() {
        let mut p = MjpegPacketizer::new();
        let mut r = Reassembler::new();

        let first = decode_all(&p.packetize(1, &frame_of(3000)));
        // Lose the marker fragment of frame 1.
        assert!(r.push(first[0].clone()).is_none());

        let second = frame_of(2000);
        let mut done = None;
        for packet in decode_all(&p.packetize(2, &second)) {
            done = r.push(packet);
        }

        assert_eq!(done.unwrap().data, second);
        assert_eq!(r.abandoned(), 1);
    }

    #[test]
    fn consecutive_single_packet_frames() {
        let mut p = MjpegPacketizer::new();
        let mut r = Reassembler::new();
        for n in 1..=3u16 {
            let packet = decode_all(&p.packetize(n, &[n as u8; 10])).remove(0);
            let frame = r.push(packet).unwrap();
            assert_eq!(frame.number, n);
            assert_eq!(frame.data, vec![n as u8; 10]);
        }
        assert_eq!(r.abandoned(), 0);
    }
}
