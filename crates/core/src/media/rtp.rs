use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Result, StreamError};

/// Size of the fixed media header in bytes.
pub const HEADER_SIZE: usize = 12;

/// RTP version written into every packet.
pub const RTP_VERSION: u8 = 2;

/// Static payload type for JPEG video (RFC 3551).
pub const PAYLOAD_TYPE_JPEG: u8 = 26;

/// Media packet with the RTP fixed header layout (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |         Frame Number          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                    Timestamp (Unix seconds)                   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           SSRC = 0                            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The sequence-number field carries the *frame* number: every fragment
/// of one frame repeats it, and the marker bit flags the last fragment.
/// There is a single stream per session, so SSRC is always 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPacket {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    pub payload_type: u8,
    pub frame_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub payload: Vec<u8>,
}

impl MediaPacket {
    /// Build a JPEG packet stamped with the current wall-clock second.
    pub fn new(frame_number: u16, marker: bool, payload: Vec<u8>) -> Self {
        Self::with_timestamp(frame_number, marker, unix_seconds(), payload)
    }

    pub fn with_timestamp(frame_number: u16, marker: bool, timestamp: u32, payload: Vec<u8>) -> Self {
        Self {
            version: RTP_VERSION,
            padding: false,
            extension: false,
            csrc_count: 0,
            marker,
            payload_type: PAYLOAD_TYPE_JPEG,
            frame_number,
            timestamp,
            ssrc: 0,
            payload,
        }
    }

    /// Serialize the 12-byte header followed by the payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        packet.push(
            (self.version << 6)
                | ((self.padding as u8) << 5)
                | ((self.extension as u8) << 4)
                | (self.csrc_count & 0x0f),
        );
        packet.push(((self.marker as u8) << 7) | (self.payload_type & 0x7f));
        packet.extend_from_slice(&self.frame_number.to_be_bytes());
        packet.extend_from_slice(&self.timestamp.to_be_bytes());
        packet.extend_from_slice(&self.ssrc.to_be_bytes());
        packet.extend_from_slice(&self.payload);
        packet
    }

    /// Parse a datagram. Everything after the header is payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(StreamError::MalformedPacket { len: bytes.len() });
        }

        Ok(Self {
            version: bytes[0] >> 6,
            padding: bytes[0] & 0x20 != 0,
            extension: bytes[0] & 0x10 != 0,
            csrc_count: bytes[0] & 0x0f,
            marker: bytes[1] & 0x80 != 0,
            payload_type: bytes[1] & 0x7f,
            frame_number: u16::from_be_bytes([bytes[2], bytes[3]]),
            timestamp: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            ssrc: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            payload: bytes[HEADER_SIZE..].to_vec(),
        })
    }
}

/// Coarse media clock: whole seconds since the Unix epoch, truncated to 32 bits.
pub fn unix_seconds() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
