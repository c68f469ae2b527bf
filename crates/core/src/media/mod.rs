//! Media framing: the packet codec, frame fragmentation, and frame sources.
//!
//! ## Media path
//!
//! ```text
//! VideoFile ──frame──▶ Packetizer ──datagrams──▶ UDP ──▶ MediaPacket::decode ──▶ Reassembler ──frame──▶
//! ```
//!
//! Every datagram carries a 12-byte RTP-style header ([`rtp::MediaPacket`])
//! whose 16-bit sequence field is reused as the frame number, so all
//! fragments of one frame share it and the marker bit closes the frame.
//! When the source is exhausted the server sends the bare datagram
//! [`END_OF_VIDEO`] (no header).

pub mod mjpeg;
pub mod rtp;
pub mod source;

pub use mjpeg::{Frame, MjpegPacketizer, Reassembler};
pub use rtp::MediaPacket;
pub use source::{FrameSource, QualityMode, VideoFile};

/// Datagram sent in place of a media packet once the source is exhausted.
pub const END_OF_VIDEO: &[u8] = b"END_OF_VIDEO";

/// Codec-specific frame packetizer.
///
/// Turns one encoded frame into the datagrams that carry it. Each returned
/// `Vec<u8>` is a complete packet: 12-byte header followed by a payload
/// fragment of at most [`max_payload`](Self::max_payload) bytes.
pub trait Packetizer: Send {
    fn packetize(&mut self, frame_number: u16, frame: &[u8]) -> Vec<Vec<u8>>;

    /// RTP payload type number (RFC 3551).
    fn payload_type(&self) -> u8;

    fn max_payload(&self) -> usize;
}
